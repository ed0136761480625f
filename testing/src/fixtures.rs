//! A small organisation used across tests.
//!
//! | User | Department | Roles / flags |
//! |------|------------|---------------|
//! | Ann  | Sales      | employee |
//! | Bob  | Support    | auditor (employee + export) |
//! | Mia  | Support    | employee, manager |
//! | Zed  | IT         | employee |
//! | Ada  | IT         | admin |
//! | Noa  | Sales      | none |
//!
//! Every user authenticates with `<name>-token`, e.g. `bob-token`.

use crate::directory::{InMemoryDirectory, InMemoryPermissions};
use appeals_core::capabilities::{permissions, Role};
use appeals_core::{Capabilities, DepartmentId, RoleId, UserId, UserProfile};

/// Support department.
pub const SUPPORT: DepartmentId = DepartmentId(1);
/// Sales department.
pub const SALES: DepartmentId = DepartmentId(2);
/// IT department.
pub const IT: DepartmentId = DepartmentId(3);

/// Ann, Sales employee who raises tickets.
pub const ANN: UserId = UserId(1);
/// Bob, Support employee with export rights.
pub const BOB: UserId = UserId(2);
/// Mia, Support manager.
pub const MIA: UserId = UserId(3);
/// Zed, IT employee with no stake in Support tickets.
pub const ZED: UserId = UserId(4);
/// Ada, administrator.
pub const ADA: UserId = UserId(5);
/// Noa, no appeals access at all.
pub const NOA: UserId = UserId(6);

/// Role granting `appeals.access`.
pub const EMPLOYEE: RoleId = RoleId(1);
/// Role inheriting from employee and granting `appeals.export`.
pub const AUDITOR: RoleId = RoleId(2);

const USERS: [(UserId, &str, DepartmentId, bool, bool); 6] = [
    (ANN, "Ann", SALES, false, false),
    (BOB, "Bob", SUPPORT, false, false),
    (MIA, "Mia", SUPPORT, false, true),
    (ZED, "Zed", IT, false, false),
    (ADA, "Ada", IT, true, false),
    (NOA, "Noa", SALES, false, false),
];

/// Profile of a fixture user.
///
/// # Panics
///
/// Panics for ids outside the fixture.
#[must_use]
#[allow(clippy::panic)]
pub fn profile(id: UserId) -> UserProfile {
    let Some(&(id, name, department, is_admin, is_manager)) =
        USERS.iter().find(|(user, ..)| *user == id)
    else {
        panic!("unknown fixture user {id}");
    };

    UserProfile {
        id,
        display_name: name.to_string(),
        avatar_url: None,
        department_id: Some(department),
        is_admin,
        is_manager,
    }
}

/// Directory with every fixture department, user and token.
#[must_use]
pub fn directory() -> InMemoryDirectory {
    let mut directory = InMemoryDirectory::new()
        .with_department(SUPPORT, "Support")
        .with_department(SALES, "Sales")
        .with_department(IT, "IT");

    for (id, name, ..) in USERS {
        directory = directory
            .with_user(profile(id))
            .with_token(&format!("{}-token", name.to_lowercase()), id);
    }
    directory
}

/// Role hierarchy and assignments of the fixture.
#[must_use]
pub fn permissions() -> InMemoryPermissions {
    InMemoryPermissions::new([
        Role {
            id: EMPLOYEE,
            name: "employee".into(),
            parent: None,
            permissions: vec![permissions::ACCESS.into()],
        },
        Role {
            id: AUDITOR,
            name: "auditor".into(),
            parent: Some(EMPLOYEE),
            permissions: vec![permissions::EXPORT.into()],
        },
    ])
    .assign(ANN, EMPLOYEE)
    .assign(BOB, AUDITOR)
    .assign(MIA, EMPLOYEE)
    .assign(ZED, EMPLOYEE)
}

/// Resolved capabilities of a fixture user.
#[must_use]
pub fn capabilities(id: UserId) -> Capabilities {
    permissions().resolve(&profile(id))
}
