//! `PostgreSQL` adapters for the appeals service.
//!
//! This crate implements the ports of `appeals-core` on top of sqlx:
//!
//! - [`PgStore`]: tickets, assignees, watchers, status history, messages,
//!   attachments and read receipts
//! - [`PgDirectory`]: users, departments and bearer tokens
//! - [`PgPermissions`]: role hierarchy and department managers
//!
//! Ticket mutations run in one transaction holding `SELECT ... FOR UPDATE` on
//! the ticket row; read-receipt backfill runs in one transaction per call.
//!
//! # Example
//!
//! ```no_run
//! use appeals_postgres::{migrate, PgStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/appeals").await?;
//! migrate(&pool).await?;
//! let store = PgStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod permissions;
mod rows;
mod store;

pub use directory::{hash_token, PgDirectory};
pub use permissions::PgPermissions;
pub use store::PgStore;

use appeals_core::AppealsError;
use sqlx::PgPool;

/// Run the embedded migrations.
///
/// # Errors
///
/// Returns [`AppealsError::Storage`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), AppealsError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppealsError::Storage(format!("Migration failed: {e}")))
}

/// Map a sqlx error into a storage error with context.
pub(crate) fn storage(context: &'static str) -> impl Fn(sqlx::Error) -> AppealsError {
    move |e| AppealsError::Storage(format!("{context}: {e}"))
}
