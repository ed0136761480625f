//! Capabilities: what a user may do, resolved once per request.
//!
//! Roles form a parent-pointer DAG. A user's effective permission set is the
//! union of the permissions of every role reachable from their assigned roles.
//! [`RoleGraph::flatten`] walks that graph once; the result is frozen into a
//! [`Capabilities`] value carried by the request context.

use crate::ids::{DepartmentId, RoleId, UserId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Permission names understood by the service.
pub mod permissions {
    /// May use the appeals module at all.
    pub const ACCESS: &str = "appeals.access";
    /// Full control over every ticket.
    pub const ADMIN: &str = "appeals.admin";
    /// May download CSV exports.
    pub const EXPORT: &str = "appeals.export";
}

/// A role in the role hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    /// Role id
    pub id: RoleId,
    /// Role name
    pub name: String,
    /// Parent role whose permissions are inherited
    pub parent: Option<RoleId>,
    /// Permissions granted directly by this role
    pub permissions: Vec<String>,
}

/// The role hierarchy.
#[derive(Clone, Debug, Default)]
pub struct RoleGraph {
    roles: HashMap<RoleId, Role>,
}

impl RoleGraph {
    /// Build a graph from role rows.
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().map(|role| (role.id, role)).collect(),
        }
    }

    /// Number of known roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether the graph has no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Union of permissions reachable from `assigned`.
    ///
    /// Unknown role ids are ignored. Cycles in the parent chain are tolerated:
    /// each role is visited once.
    #[must_use]
    pub fn flatten(&self, assigned: &[RoleId]) -> BTreeSet<String> {
        let mut granted = BTreeSet::new();
        let mut visited = HashSet::new();

        for &start in assigned {
            let mut cursor = Some(start);
            while let Some(id) = cursor {
                if !visited.insert(id) {
                    break;
                }
                let Some(role) = self.roles.get(&id) else {
                    break;
                };
                granted.extend(role.permissions.iter().cloned());
                cursor = role.parent;
            }
        }

        granted
    }
}

/// Flattened authority of one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// The user
    pub user_id: UserId,
    /// Home department
    pub department: Option<DepartmentId>,
    /// Effective permission names
    pub permissions: BTreeSet<String>,
    /// Departments this user manages
    pub managed_departments: BTreeSet<DepartmentId>,
}

impl Capabilities {
    /// Capabilities with no permissions.
    #[must_use]
    pub const fn new(user_id: UserId, department: Option<DepartmentId>) -> Self {
        Self {
            user_id,
            department,
            permissions: BTreeSet::new(),
            managed_departments: BTreeSet::new(),
        }
    }

    /// Add a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Add a managed department.
    #[must_use]
    pub fn managing(mut self, department: DepartmentId) -> Self {
        self.managed_departments.insert(department);
        self
    }

    /// `hasPermission(user, permission)`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Full control over every ticket.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_permission(permissions::ADMIN)
    }

    /// May use the module.
    #[must_use]
    pub fn can_access(&self) -> bool {
        self.is_admin() || self.has_permission(permissions::ACCESS)
    }

    /// May download exports.
    #[must_use]
    pub fn can_export(&self) -> bool {
        self.is_admin() || self.has_permission(permissions::EXPORT)
    }

    /// Manager of `department`.
    #[must_use]
    pub fn is_manager_of(&self, department: DepartmentId) -> bool {
        self.managed_departments.contains(&department)
    }

    /// Member of `department` (home department).
    #[must_use]
    pub fn belongs_to(&self, department: DepartmentId) -> bool {
        self.department == Some(department)
    }

    /// Admin, or manager of `department`.
    #[must_use]
    pub fn supervises(&self, department: DepartmentId) -> bool {
        self.is_admin() || self.is_manager_of(department)
    }

    /// Departments whose tickets show up in the `department` list scope.
    #[must_use]
    pub fn visible_departments(&self) -> Vec<DepartmentId> {
        let mut departments: BTreeSet<DepartmentId> = self.managed_departments.clone();
        departments.extend(self.department);
        departments.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(id: i64, parent: Option<i64>, permissions: &[&str]) -> Role {
        Role {
            id: RoleId(id),
            name: format!("role-{id}"),
            parent: parent.map(RoleId),
            permissions: permissions.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_flatten_inherits_parent_permissions() {
        let graph = RoleGraph::new([
            role(1, None, &[permissions::ACCESS]),
            role(2, Some(1), &[permissions::EXPORT]),
            role(3, Some(2), &["appeals.other"]),
        ]);

        let flat = graph.flatten(&[RoleId(3)]);
        assert!(flat.contains(permissions::ACCESS));
        assert!(flat.contains(permissions::EXPORT));
        assert!(flat.contains("appeals.other"));
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_flatten_survives_cycles_and_unknown_roles() {
        let graph = RoleGraph::new([
            role(1, Some(2), &["a"]),
            role(2, Some(1), &["b"]),
        ]);

        let flat = graph.flatten(&[RoleId(1), RoleId(99)]);
        assert_eq!(flat.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_supervision_rules() {
        let manager = Capabilities::new(UserId(1), Some(DepartmentId(10)))
            .with_permission(permissions::ACCESS)
            .managing(DepartmentId(10));
        assert!(manager.supervises(DepartmentId(10)));
        assert!(!manager.supervises(DepartmentId(11)));
        assert!(!manager.can_export());

        let admin = Capabilities::new(UserId(2), None).with_permission(permissions::ADMIN);
        assert!(admin.supervises(DepartmentId(11)));
        assert!(admin.can_access());
        assert!(admin.can_export());
    }

    #[test]
    fn test_visible_departments_include_home_and_managed() {
        let caps = Capabilities::new(UserId(1), Some(DepartmentId(3))).managing(DepartmentId(5));
        assert_eq!(caps.visible_departments(), vec![DepartmentId(3), DepartmentId(5)]);
    }
}
