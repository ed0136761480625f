//! In-memory identity and permission adapters.

use appeals_core::capabilities::{permissions, Role};
use appeals_core::ports::{Directory, PermissionAdapter};
use appeals_core::{
    Capabilities, Department, DepartmentId, Result, RoleGraph, RoleId, UserId, UserProfile,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// Directory backed by maps, built up front.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDirectory {
    users: BTreeMap<UserId, UserProfile>,
    departments: BTreeMap<DepartmentId, Department>,
    tokens: HashMap<String, UserId>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a department.
    #[must_use]
    pub fn with_department(mut self, id: DepartmentId, name: &str) -> Self {
        self.departments.insert(
            id,
            Department {
                id,
                name: name.to_string(),
            },
        );
        self
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(mut self, profile: UserProfile) -> Self {
        self.users.insert(profile.id, profile);
        self
    }

    /// Accept `token` as a bearer token for `user`.
    #[must_use]
    pub fn with_token(mut self, token: &str, user: UserId) -> Self {
        self.tokens.insert(token.to_string(), user);
        self
    }

    /// Synchronous profile lookup for test setup.
    #[must_use]
    pub fn get(&self, id: UserId) -> Option<&UserProfile> {
        self.users.get(&id)
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<UserProfile>> {
        Ok(self
            .tokens
            .get(token)
            .and_then(|id| self.users.get(id))
            .cloned())
    }

    async fn profile(&self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.get(&id).cloned())
    }

    async fn profiles(&self, ids: &[UserId]) -> Result<Vec<UserProfile>> {
        Ok(ids.iter().filter_map(|id| self.users.get(id)).cloned().collect())
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>> {
        Ok(self.departments.get(&id).cloned())
    }

    async fn departments(&self, ids: &[DepartmentId]) -> Result<Vec<Department>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.departments.get(id))
            .cloned()
            .collect())
    }
}

/// Role-based permissions held in memory.
///
/// Resolution mirrors the Postgres adapter: flattened roles, plus `appeals.admin`
/// for directory admins and the home department for directory managers.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPermissions {
    graph: RoleGraph,
    assigned: HashMap<UserId, Vec<RoleId>>,
    managed: HashMap<UserId, Vec<DepartmentId>>,
}

impl InMemoryPermissions {
    /// Create an adapter over a role hierarchy.
    #[must_use]
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            graph: RoleGraph::new(roles),
            ..Self::default()
        }
    }

    /// Assign a role to a user.
    #[must_use]
    pub fn assign(mut self, user: UserId, role: RoleId) -> Self {
        self.assigned.entry(user).or_default().push(role);
        self
    }

    /// Make a user manager of a department.
    #[must_use]
    pub fn manage(mut self, user: UserId, department: DepartmentId) -> Self {
        self.managed.entry(user).or_default().push(department);
        self
    }

    /// Resolve capabilities without going through the async port.
    #[must_use]
    pub fn resolve(&self, profile: &UserProfile) -> Capabilities {
        let mut caps = Capabilities::new(profile.id, profile.department_id);
        let roles = self.assigned.get(&profile.id).map_or(&[][..], Vec::as_slice);
        caps.permissions = self.graph.flatten(roles);
        caps.managed_departments = self
            .managed
            .get(&profile.id)
            .into_iter()
            .flatten()
            .copied()
            .collect();

        if profile.is_admin {
            caps.permissions.insert(permissions::ADMIN.to_string());
        }
        if let (true, Some(home)) = (profile.is_manager, profile.department_id) {
            caps.managed_departments.insert(home);
        }
        caps
    }
}

#[async_trait]
impl PermissionAdapter for InMemoryPermissions {
    async fn capabilities(&self, profile: &UserProfile) -> Result<Capabilities> {
        Ok(self.resolve(profile))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{self, ADA, BOB, MIA, NOA, SUPPORT, ZED};

    #[tokio::test]
    async fn test_authenticate_by_token() {
        let directory = fixtures::directory();
        let bob = directory.authenticate("bob-token").await.unwrap().unwrap();
        assert_eq!(bob.id, BOB);
        assert!(directory.authenticate("nobody").await.unwrap().is_none());
    }

    #[test]
    fn test_resolution_matches_directory_flags() {
        let directory = fixtures::directory();
        let permissions = fixtures::permissions();

        let mia = permissions.resolve(directory.get(MIA).unwrap());
        assert!(mia.is_manager_of(SUPPORT));
        assert!(mia.can_access());

        let ada = permissions.resolve(directory.get(ADA).unwrap());
        assert!(ada.is_admin());

        let zed = permissions.resolve(directory.get(ZED).unwrap());
        assert!(zed.can_access());
        assert!(!zed.can_export());

        let noa = permissions.resolve(directory.get(NOA).unwrap());
        assert!(!noa.can_access());
    }
}
