pub mod permission;
pub mod role;

use anyhow::Result;
use serde::Deserialize;

pub use permission::Permission;
pub use role::Role;

/// Anything that carries a role and an activation flag can be checked.
pub trait Subject {
    fn role(&self) -> Role;
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Any,
    All,
}

pub fn permissions_of(role: Role) -> &'static [Permission] {
    role.permissions()
}

fn granted<S: Subject>(user: Option<&S>) -> Option<&'static [Permission]> {
    match user {
        Some(u) if u.is_active() => Some(permissions_of(u.role())),
        _ => None,
    }
}

pub fn has_permission<S: Subject>(user: Option<&S>, permission: Permission) -> bool {
    granted(user).is_some_and(|set| set.contains(&permission))
}

/// False for an empty `permissions` list.
pub fn has_any_permission<S: Subject>(
    user: Option<&S>,
    permissions: &[Permission],
) -> bool {
    granted(user)
        .is_some_and(|set| permissions.iter().any(|p| set.contains(p)))
}

/// True for an empty `permissions` list as long as the user is active.
pub fn has_all_permissions<S: Subject>(
    user: Option<&S>,
    permissions: &[Permission],
) -> bool {
    granted(user)
        .is_some_and(|set| permissions.iter().all(|p| set.contains(p)))
}

pub fn has_role<S: Subject>(user: Option<&S>, role: Role) -> bool {
    user.is_some_and(|u| u.role() == role)
}

pub fn has_any_role<S: Subject>(user: Option<&S>, roles: &[Role]) -> bool {
    user.is_some_and(|u| roles.contains(&u.role()))
}

pub fn check<S: Subject>(
    user: Option<&S>,
    permissions: &[Permission],
    mode: Mode,
) -> bool {
    match mode {
        Mode::Any => has_any_permission(user, permissions),
        Mode::All => has_all_permissions(user, permissions),
    }
}

/// Route guard evaluation. An empty `roles` list accepts every role; every
/// listed permission must be granted.
pub fn authorize<S: Subject>(
    user: &S,
    roles: &[Role],
    permissions: &[Permission],
) -> Result<()> {
    if !user.is_active() {
        return Err(anyhow::anyhow!("the user account is deactivated"));
    }
    let role = user.role();
    if !roles.is_empty() && !roles.contains(&role) {
        return Err(anyhow::anyhow!(
            "the request was denied because role `{}` is not allowed",
            role
        ));
    }
    if let Some(missing) = permissions
        .iter()
        .find(|p| !role.permissions().contains(p))
    {
        return Err(anyhow::anyhow!(
            "the request was denied because role `{}` lacks permission `{}`",
            role,
            missing
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Principal {
        role: Role,
        active: bool,
    }

    impl Subject for Principal {
        fn role(&self) -> Role {
            self.role
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    fn user(role: Role) -> Principal {
        Principal { role, active: true }
    }

    #[test]
    fn absent_user_has_nothing() {
        let none: Option<&Principal> = None;
        for p in Permission::ALL {
            assert!(!has_permission(none, *p));
        }
        assert!(!has_all_permissions(none, &[]));
        assert!(!has_role(none, Role::Admin));
        assert!(!has_any_role(none, Role::ALL));
    }

    #[test]
    fn inactive_user_has_nothing() {
        let u = Principal {
            role: Role::Admin,
            active: false,
        };
        assert!(!has_permission(Some(&u), Permission::ViewCourses));
        assert!(!has_any_permission(Some(&u), Permission::ALL));
        // role equality does not consult the table
        assert!(has_role(Some(&u), Role::Admin));
    }

    #[test]
    fn empty_lists() {
        let u = user(Role::Student);
        assert!(has_all_permissions(Some(&u), &[]));
        assert!(!has_any_permission(Some(&u), &[]));
        assert!(check(Some(&u), &[], Mode::All));
        assert!(!check(Some(&u), &[], Mode::Any));
    }

    #[test]
    fn any_and_all() {
        let u = user(Role::TeacherExecutor);
        let mixed = [Permission::GradeSubmissions, Permission::EditTopics];
        assert!(has_any_permission(Some(&u), &mixed));
        assert!(!has_all_permissions(Some(&u), &mixed));
        assert!(check(Some(&u), &mixed, Mode::Any));
        assert!(!check(Some(&u), &mixed, Mode::All));
    }

    #[test]
    fn predicates_follow_the_table() {
        for role in Role::ALL {
            let u = user(*role);
            for p in Permission::ALL {
                assert_eq!(
                    has_permission(Some(&u), *p),
                    permissions_of(*role).contains(p)
                );
            }
        }
    }

    #[test]
    fn authorize_roles_and_permissions() {
        let editor = user(Role::TeacherEditor);
        let student = user(Role::Student);
        authorize(&editor, &[], &[Permission::ManageGroups]).unwrap();
        authorize(
            &editor,
            &[Role::Admin, Role::TeacherEditor],
            &[Permission::ManageGroups],
        )
        .unwrap();
        assert!(authorize(&student, &[Role::Admin], &[]).is_err());
        assert!(authorize(&student, &[], &[Permission::EnrollStudents]).is_err());
        let inactive = Principal {
            role: Role::Admin,
            active: false,
        };
        assert!(authorize(&inactive, &[], &[]).is_err());
    }

    #[test]
    fn mode_from_query_token() {
        let m: Mode = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(m, Mode::All);
        assert_eq!(Mode::default(), Mode::Any);
    }
}
