//! Application state for the appeals HTTP server.

use crate::emitter::RealtimeEvent;
use crate::services::AppealsService;
use appeals_web::FanoutHub;
use axum::extract::FromRef;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Ticket and thread operations
    pub service: AppealsService,

    /// Real-time fan-out bus the WebSocket endpoint subscribes to
    pub hub: FanoutHub<RealtimeEvent>,

    /// Prometheus renderer, `None` when no recorder is installed
    pub metrics: Option<PrometheusHandle>,

    /// Database pool for readiness checks, `None` for in-memory setups
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(service: AppealsService, hub: FanoutHub<RealtimeEvent>) -> Self {
        Self {
            service,
            hub,
            metrics: None,
            pool: None,
        }
    }

    /// Attach a Prometheus renderer.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Attach the database pool checked by `/ready`.
    #[must_use]
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

impl FromRef<AppState> for AppealsService {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.service.clone()
    }
}
