//! Role hierarchy and department managers.

use crate::storage;
use appeals_core::capabilities::{permissions, Role};
use appeals_core::ports::PermissionAdapter;
use appeals_core::{Capabilities, DepartmentId, Result, RoleGraph, RoleId, UserProfile};
use async_trait::async_trait;
use sqlx::PgPool;

/// `PostgreSQL` implementation of [`PermissionAdapter`].
///
/// Capabilities are the flattened role permissions plus two directory flags:
/// `is_admin` grants `appeals.admin`, `is_manager` makes the user a manager of
/// their home department. Explicit `department_managers` rows add more.
#[derive(Clone)]
pub struct PgPermissions {
    pool: PgPool,
}

impl PgPermissions {
    /// Create an adapter over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn role_graph(&self) -> Result<RoleGraph> {
        let rows: Vec<(i64, String, Option<i64>, Vec<String>)> = sqlx::query_as(
            "SELECT r.id, r.name, r.parent_id,
                    COALESCE(array_agg(p.permission) FILTER (WHERE p.permission IS NOT NULL), '{}')
             FROM roles r
             LEFT JOIN role_permissions p ON p.role_id = r.id
             GROUP BY r.id, r.name, r.parent_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load roles"))?;

        Ok(RoleGraph::new(rows.into_iter().map(
            |(id, name, parent, permissions)| Role {
                id: RoleId(id),
                name,
                parent: parent.map(RoleId),
                permissions,
            },
        )))
    }
}

#[async_trait]
impl PermissionAdapter for PgPermissions {
    async fn capabilities(&self, profile: &UserProfile) -> Result<Capabilities> {
        let graph = self.role_graph().await?;

        let assigned: Vec<(i64,)> = sqlx::query_as("SELECT role_id FROM user_roles WHERE user_id = $1")
            .bind(profile.id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("Failed to load user roles"))?;
        let assigned: Vec<RoleId> = assigned.into_iter().map(|(id,)| RoleId(id)).collect();

        let managed: Vec<(i64,)> =
            sqlx::query_as("SELECT department_id FROM department_managers WHERE user_id = $1")
                .bind(profile.id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(storage("Failed to load managed departments"))?;

        let mut caps = Capabilities::new(profile.id, profile.department_id);
        caps.permissions = graph.flatten(&assigned);
        caps.managed_departments = managed.into_iter().map(|(id,)| DepartmentId(id)).collect();

        if profile.is_admin {
            caps.permissions.insert(permissions::ADMIN.to_string());
        }
        if let (true, Some(home)) = (profile.is_manager, profile.department_id) {
            caps.managed_departments.insert(home);
        }

        tracing::trace!(
            user_id = %profile.id,
            roles = assigned.len(),
            permissions = caps.permissions.len(),
            "Resolved capabilities"
        );

        Ok(caps)
    }
}
