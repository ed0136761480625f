//! Users, departments and bearer tokens.

use crate::rows::{DepartmentRow, UserRow, USER_COLUMNS};
use crate::storage;
use appeals_core::ports::Directory;
use appeals_core::{Department, DepartmentId, Result, UserId, UserProfile};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::fmt::Write as _;

/// SHA-256 hex digest of a bearer token, the form stored in `user_tokens`.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// `PostgreSQL` implementation of [`Directory`].
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    /// Create a directory over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<UserProfile>> {
        let sql = format!(
            "SELECT {USER_COLUMNS}
             FROM user_tokens t
             JOIN users u ON u.id = t.user_id
             WHERE t.token_hash = $1
               AND (t.expires_at IS NULL OR t.expires_at > now())"
        );

        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(hash_token(token))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to authenticate token"))?;

        Ok(row.map(UserProfile::from))
    }

    async fn profile(&self, id: UserId) -> Result<Option<UserProfile>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load user"))?;

        Ok(row.map(UserProfile::from))
    }

    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ANY($1) ORDER BY u.id");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(ids.iter().map(|id| id.0).collect::<Vec<_>>())
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to load users"))?;

        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>> {
        let row: Option<DepartmentRow> = sqlx::query_as("SELECT id, name FROM departments WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("Failed to load department"))?;

        Ok(row.map(Department::from))
    }

    async fn departments(&self, ids: &[DepartmentId]) -> Result<Vec<Department>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<DepartmentRow> =
            sqlx::query_as("SELECT id, name FROM departments WHERE id = ANY($1) ORDER BY id")
                .bind(ids.iter().map(|id| id.0).collect::<Vec<_>>())
                .fetch_all(&self.pool)
                .await
                .map_err(storage("Failed to load departments"))?;

        Ok(rows.into_iter().map(Department::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
