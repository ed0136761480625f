//! Read-through cache for ticket lists and ticket details.
//!
//! # Key layout
//!
//! - **List**: `appeals:list:{viewer}:{scope}:{status}:{priority}:{limit}:{offset}`
//! - **Detail**: `appeals:detail:{ticket_id}`
//!
//! Any mutation touching a ticket deletes its detail key and every key under
//! `appeals:list:`. Cached details hold viewer-independent data only.
//!
//! Two backends implement [`Cache`]: [`RedisCache`] (shared across replicas)
//! and [`MemoryCache`] (single process, used when no Redis URL is configured).
//! Cache failures never fail a request: they are logged and treated as misses.

use crate::metrics::record_cache;
use appeals_core::{TicketFilter, TicketId, UserId};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Prefix of every list key.
pub const LIST_PREFIX: &str = "appeals:list:";

/// Prefix of every detail key.
pub const DETAIL_PREFIX: &str = "appeals:detail:";

const SCAN_BATCH: usize = 500;

/// Cache backend errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Cached value could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value store with TTL, point delete and prefix delete.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Value under `key`, if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `ttl`.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Backend reachability, for readiness probes.
    async fn ping(&self) -> bool;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the initial connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn_manager.clone();
        let () = conn.del(key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn_manager.clone();
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix, removed, "Deleted cache keys by prefix");
        Ok(removed)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }
}

// ============================================================================
// In-process
// ============================================================================

/// In-process cache with per-entry expiry.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Whether no live entries exist.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires)| *expires > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    async fn ping(&self) -> bool {
        true
    }
}

// ============================================================================
// Ticket cache
// ============================================================================

/// Typed view over a [`Cache`] for ticket lists and details.
#[derive(Clone)]
pub struct TicketCache {
    backend: Arc<dyn Cache>,
    ttl: Duration,
}

impl TicketCache {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Cache> {
        &self.backend
    }

    /// Key of one list page for one viewer.
    #[must_use]
    pub fn list_key(viewer: UserId, filter: &TicketFilter) -> String {
        format!(
            "{LIST_PREFIX}{viewer}:{}:{}:{}:{}:{}",
            filter.scope.as_str(),
            filter.status.map_or("all", |s| s.as_str()),
            filter.priority.map_or("all", |p| p.as_str()),
            filter.limit,
            filter.offset,
        )
    }

    /// Key of a ticket detail.
    #[must_use]
    pub fn detail_key(ticket_id: TicketId) -> String {
        format!("{DETAIL_PREFIX}{ticket_id}")
    }

    /// Read and decode `key`. Misses, expired entries and failures return `None`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                record_cache("miss");
                return None;
            }
            Err(e) => {
                record_cache("error");
                tracing::warn!(key, error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                record_cache("hit");
                Some(value)
            }
            Err(e) => {
                record_cache("error");
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Encode and store `value` under `key`. Failures are logged.
    pub async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) {
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.backend.set_ex(key, raw, self.ttl).await,
            Err(e) => Err(CacheError::from(e)),
        };
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Drop the detail of `ticket_id` and every list page.
    pub async fn invalidate_ticket(&self, ticket_id: TicketId) {
        if let Err(e) = self.backend.delete(&Self::detail_key(ticket_id)).await {
            tracing::warn!(ticket_id = %ticket_id, error = %e, "Failed to invalidate ticket detail");
        }
        self.invalidate_lists().await;
    }

    /// Drop every list page.
    pub async fn invalidate_lists(&self) {
        if let Err(e) = self.backend.delete_prefix(LIST_PREFIX).await {
            tracing::warn!(error = %e, "Failed to invalidate ticket lists");
        }
    }
}
