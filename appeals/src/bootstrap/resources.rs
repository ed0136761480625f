//! Resource management for infrastructure setup.
//!
//! Centralizes infrastructure initialization into [`ResourceManager`]:
//!
//! 1. Connect to `PostgreSQL` (and run migrations when enabled)
//! 2. Connect to Redis, or fall back to the in-process cache
//! 3. Pick the push dispatcher (webhook or log-only)
//! 4. Prepare attachment storage
//! 5. Install the Prometheus recorder
//!
//! # Example
//!
//! ```rust,ignore
//! let config = Arc::new(Config::from_env());
//! let resources = ResourceManager::from_config(config).await?;
//! ```

use crate::cache::{Cache, MemoryCache, RedisCache, TicketCache};
use crate::config::Config;
use crate::metrics::install_prometheus;
use crate::notify::{LogNotifier, WebhookNotifier};
use crate::storage::LocalDiskStorage;
use anyhow::Context;
use appeals_core::environment::{Clock, SystemClock};
use appeals_core::ports::{AttachmentStore, PushNotifier};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Central resource manager for all infrastructure components.
///
/// All resources are cheap handles that can be shared across tasks.
#[derive(Clone)]
pub struct ResourceManager {
    /// Application configuration
    pub config: Arc<Config>,

    /// `PostgreSQL` pool shared by the store, directory and permissions
    pub pool: PgPool,

    /// List and detail cache
    pub cache: TicketCache,

    /// Push notification dispatcher
    pub notifier: Arc<dyn PushNotifier>,

    /// Attachment storage
    pub attachments: Arc<dyn AttachmentStore>,

    /// System clock for timestamps
    pub clock: Arc<dyn Clock>,

    /// Prometheus renderer, `None` when a recorder was already installed
    pub metrics: Option<PrometheusHandle>,
}

impl ResourceManager {
    /// Initialize all infrastructure resources from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The database connection fails
    /// - Migrations fail
    /// - Redis is configured but unreachable
    /// - The push client cannot be built
    pub async fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        info!("Connecting to appeals database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres.max_connections)
            .min_connections(config.postgres.min_connections)
            .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
            .connect(&config.postgres.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        if config.postgres.run_migrations {
            info!("Running appeals migrations...");
            appeals_postgres::migrate(&pool).await?;
        }

        let backend: Arc<dyn Cache> = match &config.cache.redis_url {
            Some(url) => {
                info!("Connecting to Redis cache...");
                Arc::new(RedisCache::new(url).await.context("Failed to connect to Redis")?)
            }
            None => {
                info!("No REDIS_URL configured, using in-process cache");
                Arc::new(MemoryCache::new())
            }
        };
        let cache = TicketCache::new(backend, config.cache_ttl());

        let notifier: Arc<dyn PushNotifier> = match &config.push.webhook_url {
            Some(url) => {
                info!(url = %url, "Push notifications go to webhook");
                Arc::new(WebhookNotifier::new(url.clone(), config.push_timeout())?)
            }
            None => {
                info!("No PUSH_WEBHOOK_URL configured, push notifications are logged only");
                Arc::new(LogNotifier)
            }
        };

        let attachments: Arc<dyn AttachmentStore> = Arc::new(LocalDiskStorage::new(
            config.attachments.dir.clone(),
            config.attachments.public_url.clone(),
        ));

        let metrics = match install_prometheus() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Prometheus recorder not installed, /metrics disabled");
                None
            }
        };

        info!("All resources initialized successfully");

        Ok(Self {
            config,
            pool,
            cache,
            notifier,
            attachments,
            clock: Arc::new(SystemClock),
            metrics,
        })
    }
}
