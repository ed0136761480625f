//! Declarative application builder API.
//!
//! The builder follows a step-by-step initialization pattern:
//! 1. Configure (config, tracing)
//! 2. Initialize infrastructure (database, cache, push, storage)
//! 3. Wire services, the event emitter and the HTTP router
//! 4. Run (emitter worker, server, graceful shutdown)
//!
//! # Example
//!
//! ```rust,ignore
//! ApplicationBuilder::new()
//!     .with_config(Config::from_env())
//!     .with_tracing("info")?
//!     .with_resources().await?
//!     .build().await?
//!     .run().await?;
//! ```

use crate::bootstrap::ResourceManager;
use crate::config::Config;
use crate::emitter::EventEmitter;
use crate::metrics::register_business_metrics;
use crate::runtime::Application;
use crate::server::{build_router, AppState};
use crate::services::{AppealsService, ServiceDeps};
use anyhow::{anyhow, Context};
use appeals_postgres::{PgDirectory, PgPermissions, PgStore};
use appeals_web::FanoutHub;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builder for a fully configured appeals application.
///
/// Option fields track which steps have run; [`ApplicationBuilder::build`]
/// reports the first missing one.
pub struct ApplicationBuilder {
    /// Application configuration
    config: Option<Arc<Config>>,

    /// Infrastructure resources
    resources: Option<ResourceManager>,

    /// Shutdown signal broadcaster
    shutdown_tx: broadcast::Sender<()>,
}

impl ApplicationBuilder {
    /// Create a new application builder with its shutdown channel.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            config: None,
            resources: None,
            shutdown_tx,
        }
    }

    /// Set application configuration. Call this first.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Setup tracing and logging.
    ///
    /// `RUST_LOG` wins over `default_filter` when set.
    ///
    /// # Errors
    ///
    /// Returns error if a global subscriber is already installed.
    pub fn with_tracing(self, default_filter: &str) -> anyhow::Result<Self> {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize tracing: {e}"))?;

        Ok(self)
    }

    /// Initialize infrastructure resources.
    ///
    /// # Errors
    ///
    /// Returns error if config is not set or any resource fails to initialize.
    pub async fn with_resources(mut self) -> anyhow::Result<Self> {
        let config = self
            .config
            .clone()
            .context("Config must be set before initializing resources")?;

        self.resources = Some(ResourceManager::from_config(config).await?);
        Ok(self)
    }

    /// Wire services and bind the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns error if a step was skipped or the listener cannot bind.
    pub async fn build(self) -> anyhow::Result<Application> {
        let config = self.config.context("Config must be set")?;
        let resources = self.resources.context("Resources must be initialized")?;

        register_business_metrics();

        let hub = FanoutHub::new();
        let (emitter, worker) =
            EventEmitter::channel(hub.clone(), resources.notifier.clone(), config.push_timeout());

        let store = Arc::new(PgStore::new(resources.pool.clone()));
        let service = AppealsService::new(ServiceDeps {
            tickets: store.clone(),
            messages: store,
            directory: Arc::new(PgDirectory::new(resources.pool.clone())),
            permissions: Arc::new(PgPermissions::new(resources.pool.clone())),
            attachments: resources.attachments.clone(),
            cache: resources.cache.clone(),
            emitter,
            clock: resources.clock.clone(),
            thread: config.thread,
        });

        let mut state = AppState::new(service, hub).with_pool(resources.pool.clone());
        if let Some(handle) = resources.metrics.clone() {
            state = state.with_metrics(handle);
        }
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind(config.bind_address())
            .await
            .with_context(|| format!("Failed to bind {}", config.bind_address()))?;

        Ok(Application::new(listener, router, worker, self.shutdown_tx, config))
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
