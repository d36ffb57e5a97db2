use std::collections::HashSet;

use rand::{distributions::Alphanumeric, Rng};
use tracing::info;

use lms_rbac::Role;
use lms_slo::{errors, Result};
use lms_storage::{
    convert::parse_id,
    courses::CourseStore,
    enrollments::{
        Content as NewEnrollment, EnrolledBy, Enrollment, EnrollmentStore,
    },
    groups::{check_window, Content, Group, GroupStore, ListOpts, UpdateOpts},
    users::{User, UserStore},
    List, ID,
};

use crate::services::clock::Clock;

pub const GROUP_MANAGERS: &[Role] =
    &[Role::Admin, Role::TeacherEditor, Role::TeacherExecutor];
pub const GROUP_AUTHORS: &[Role] = &[Role::Admin, Role::TeacherEditor];

const ENROLLMENT_KEY_LEN: usize = 8;

/// Loads a group and checks it belongs to the edition in the route.
pub async fn get_edition_group<G>(
    groups: &G,
    edition_id: &str,
    group_id: &str,
) -> Result<Group>
where
    G: GroupStore + Sync,
{
    let group = groups.get_group(group_id).await?;
    if group.course_id != edition_id {
        return Err(errors::not_found("group not found"));
    }
    Ok(group)
}

/// Editors may change any group; an executor only the groups they teach.
pub fn ensure_group_editor(user: &User, group: &Group) -> Result<()> {
    match user.role {
        Role::Admin | Role::TeacherEditor => Ok(()),
        Role::TeacherExecutor
            if group.instructor_id.as_deref() == Some(user.id.as_str()) =>
        {
            Ok(())
        }
        _ => Err(errors::forbidden(
            "only editors or the group's instructor may change this group",
        )),
    }
}

pub async fn list_groups<C, G>(
    courses: &C,
    groups: &G,
    opts: &ListOpts,
) -> Result<List<Group>>
where
    C: CourseStore + Sync,
    G: GroupStore + Sync,
{
    courses.get_course(&opts.course_id).await?;
    groups.list_group(opts).await
}

pub async fn create_group<C, G>(
    courses: &C,
    groups: &G,
    edition_id: &str,
    content: &Content,
) -> Result<ID>
where
    C: CourseStore + Sync,
    G: GroupStore + Sync,
{
    courses.get_course(edition_id).await?;
    let id = groups.create_group(None, edition_id, content).await?;
    info!("created group {} in edition {}", id.id, edition_id);
    Ok(id)
}

pub async fn update_group<G>(
    groups: &G,
    user: &User,
    edition_id: &str,
    group_id: &str,
    opts: &UpdateOpts,
) -> Result<()>
where
    G: GroupStore + Sync,
{
    let group = get_edition_group(groups, edition_id, group_id).await?;
    ensure_group_editor(user, &group)?;
    // the stored half of the window counts when only one end changes
    check_window(
        opts.enrollment_start_date.unwrap_or(group.enrollment_start_date),
        opts.enrollment_end_date.unwrap_or(group.enrollment_end_date),
    )
    .map_err(|_| errors::bad_request("enrollment window ends before it starts"))?;
    groups.update_group(group_id, opts).await
}

pub async fn delete_group<G>(
    groups: &G,
    edition_id: &str,
    group_id: &str,
) -> Result<()>
where
    G: GroupStore + Sync,
{
    get_edition_group(groups, edition_id, group_id).await?;
    groups.delete_group(group_id).await
}

pub async fn assign_instructor<G, U>(
    groups: &G,
    users: &U,
    edition_id: &str,
    group_id: &str,
    instructor_id: Option<String>,
) -> Result<()>
where
    G: GroupStore + Sync,
    U: UserStore + Sync,
{
    get_edition_group(groups, edition_id, group_id).await?;
    if let Some(id) = &instructor_id {
        let instructor = users.get_user(id).await?;
        if instructor.role == Role::Student {
            return Err(errors::bad_request("a student cannot teach a group"));
        }
    }
    groups.assign_instructor(group_id, instructor_id).await
}

/// Replaces the group's enrollment key with a fresh random one.
pub async fn regenerate_enrollment_key<G>(
    groups: &G,
    user: &User,
    edition_id: &str,
    group_id: &str,
) -> Result<String>
where
    G: GroupStore + Sync,
{
    let group = get_edition_group(groups, edition_id, group_id).await?;
    ensure_group_editor(user, &group)?;
    let key = random_key();
    groups.set_enrollment_key(group_id, &key).await?;
    Ok(key)
}

fn random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ENROLLMENT_KEY_LEN)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// Staff enrollment. Skips the window, key and capacity rules of
/// self-service admission but keeps one group per user and edition.
/// The whole batch is checked before anything is written, and the store
/// inserts it in a single transaction.
pub async fn enroll_students<G, E, C>(
    groups: &G,
    enrollments: &E,
    clock: &C,
    edition_id: &str,
    group_id: &str,
    user_ids: &[String],
) -> Result<Vec<Enrollment>>
where
    G: GroupStore + Sync,
    E: EnrollmentStore + Sync,
    C: Clock + Sync,
{
    let group = get_edition_group(groups, edition_id, group_id).await?;

    let mut seen = HashSet::with_capacity(user_ids.len());
    for user_id in user_ids {
        parse_id(user_id)?;
        if !seen.insert(user_id.as_str()) {
            return Err(errors::bad_request(&format!(
                "user {} is listed more than once",
                user_id
            )));
        }
    }
    for user_id in user_ids {
        if enrollments
            .find_enrollment_in_course(&group.course_id, user_id)
            .await?
            .is_some()
        {
            return Err(errors::conflict(&format!(
                "user {} is already enrolled in this edition",
                user_id
            )));
        }
    }

    let enrolled_at = clock.now();
    let batch = user_ids
        .iter()
        .map(|user_id| NewEnrollment {
            group_id: group.id.clone(),
            user_id: user_id.clone(),
            enrolled_by: EnrolledBy::Admin,
            enrolled_at,
        })
        .collect::<Vec<_>>();
    let result = enrollments
        .create_enrollments(&group.course_id, &batch)
        .await?;
    info!("enrolled {} users into group {}", result.len(), group.id);
    Ok(result)
}

pub async fn remove_enrollment<G, E>(
    groups: &G,
    enrollments: &E,
    edition_id: &str,
    group_id: &str,
    user_id: &str,
) -> Result<()>
where
    G: GroupStore + Sync,
    E: EnrollmentStore + Sync,
{
    get_edition_group(groups, edition_id, group_id).await?;
    enrollments.delete_enrollment(group_id, user_id).await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{NaiveDate, NaiveDateTime};
    use lms_storage::{
        courses::{Course, CourseStatus, MockCourseStore},
        enrollments::{EnrollmentStatus, MockEnrollmentStore},
        groups::MockGroupStore,
        users::MockUserStore,
    };

    use super::*;
    use crate::services::clock::MockClock;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_owned(),
            name: format!("user {id}"),
            email: format!("{id}@example.com"),
            role,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn group(instructor_id: Option<&str>) -> Group {
        Group {
            id: "10".to_owned(),
            course_id: "1".to_owned(),
            name: "Group A".to_owned(),
            schedule: Some("Mon 10:00".to_owned()),
            instructor_id: instructor_id.map(str::to_owned),
            is_active: true,
            enrollment_key: Some("ABC123".to_owned()),
            max_students: Some(30),
            enrollment_start_date: Some(now()),
            enrollment_end_date: None,
            is_enrollment_open: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn groups_with(group: Group) -> MockGroupStore {
        let mut groups = MockGroupStore::new();
        groups
            .expect_get_group()
            .returning(move |_| Ok(group.clone()));
        groups
    }

    #[test]
    fn group_editor_guard() {
        let g = group(Some("5"));
        assert!(ensure_group_editor(&user("1", Role::Admin), &g).is_ok());
        assert!(
            ensure_group_editor(&user("2", Role::TeacherEditor), &g).is_ok()
        );
        assert!(
            ensure_group_editor(&user("5", Role::TeacherExecutor), &g).is_ok()
        );
        assert_eq!(
            ensure_group_editor(&user("6", Role::TeacherExecutor), &g)
                .unwrap_err(),
            errors::forbidden("")
        );
        assert_eq!(
            ensure_group_editor(&user("5", Role::Student), &g).unwrap_err(),
            errors::forbidden("")
        );
        assert!(ensure_group_editor(
            &user("5", Role::TeacherExecutor),
            &group(None)
        )
        .is_err());
    }

    #[tokio::test]
    async fn group_of_another_edition_is_not_found() {
        let groups = groups_with(group(None));
        let err = get_edition_group(&groups, "2", "10").await.unwrap_err();
        assert_eq!(err, errors::not_found(""));
        assert!(get_edition_group(&groups, "1", "10").await.is_ok());
    }

    #[tokio::test]
    async fn create_requires_edition() {
        let content = Content {
            name: "Group B".to_owned(),
            schedule: None,
            instructor_id: None,
            enrollment_key: None,
            max_students: None,
            enrollment_start_date: None,
            enrollment_end_date: None,
            is_enrollment_open: true,
        };

        let mut courses = MockCourseStore::new();
        courses
            .expect_get_course()
            .returning(|_| Err(errors::not_found("course not found")));
        let mut groups = MockGroupStore::new();
        groups.expect_create_group().never();
        let err = create_group(&courses, &groups, "9", &content)
            .await
            .unwrap_err();
        assert_eq!(err, errors::not_found(""));

        let mut courses = MockCourseStore::new();
        courses.expect_get_course().returning(|id| {
            Ok(Course {
                id: id.to_owned(),
                title: "Rust 101".to_owned(),
                description: None,
                status: CourseStatus::Active,
                instructor_id: None,
                is_active: true,
                created_at: now(),
                updated_at: now(),
            })
        });
        let mut groups = MockGroupStore::new();
        groups
            .expect_create_group()
            .withf(|id, course_id, _| id.is_none() && course_id == "1")
            .returning(|_, _, _| {
                Ok(ID {
                    id: "11".to_owned(),
                })
            });
        let id = create_group(&courses, &groups, "1", &content).await.unwrap();
        assert_eq!(id.id, "11");
    }

    #[tokio::test]
    async fn list_of_missing_edition() {
        let mut courses = MockCourseStore::new();
        courses
            .expect_get_course()
            .returning(|_| Err(errors::not_found("course not found")));
        let mut groups = MockGroupStore::new();
        groups.expect_list_group().never();
        let opts = ListOpts {
            course_id: "9".to_owned(),
            pagination: Default::default(),
        };
        let err = list_groups(&courses, &groups, &opts).await.unwrap_err();
        assert_eq!(err, errors::not_found(""));
    }

    #[tokio::test]
    async fn update_checks_merged_window() {
        let mut groups = groups_with(group(Some("5")));
        groups.expect_update_group().never();
        let opts = UpdateOpts {
            enrollment_end_date: Some(Some(now() - chrono::Duration::days(1))),
            ..Default::default()
        };
        let err = update_group(
            &groups,
            &user("5", Role::TeacherExecutor),
            "1",
            "10",
            &opts,
        )
        .await
        .unwrap_err();
        assert_eq!(err, errors::bad_request(""));
    }

    #[tokio::test]
    async fn update_clears_window_and_capacity() {
        let mut groups = groups_with(group(Some("5")));
        groups
            .expect_update_group()
            .withf(|_, opts| {
                opts.enrollment_start_date == Some(None)
                    && opts.max_students == Some(None)
                    && opts.enrollment_key == Some(None)
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let opts: UpdateOpts = serde_json::from_str(
            r#"{"enrollment_start_date":null,"max_students":null,"enrollment_key":null}"#,
        )
        .unwrap();
        update_group(
            &groups,
            &user("5", Role::TeacherExecutor),
            "1",
            "10",
            &opts,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn update_by_assigned_executor() {
        let mut groups = groups_with(group(Some("5")));
        groups
            .expect_update_group()
            .withf(|id, opts| id == "10" && opts.name.as_deref() == Some("B"))
            .times(1)
            .returning(|_, _| Ok(()));
        let opts = UpdateOpts {
            name: Some("B".to_owned()),
            ..Default::default()
        };
        update_group(&groups, &user("5", Role::TeacherExecutor), "1", "10", &opts)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn regenerate_key() {
        let mut groups = groups_with(group(None));
        groups
            .expect_set_enrollment_key()
            .withf(|id, key| {
                id == "10"
                    && key.len() == ENROLLMENT_KEY_LEN
                    && key.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let key = regenerate_enrollment_key(
            &groups,
            &user("1", Role::Admin),
            "1",
            "10",
        )
        .await
        .unwrap();
        assert_eq!(key.len(), ENROLLMENT_KEY_LEN);

        let err = regenerate_enrollment_key(
            &groups,
            &user("9", Role::TeacherExecutor),
            "1",
            "10",
        )
        .await
        .unwrap_err();
        assert_eq!(err, errors::forbidden(""));
    }

    #[tokio::test]
    async fn instructor_must_not_be_student() {
        let mut groups = groups_with(group(None));
        groups
            .expect_assign_instructor()
            .withf(|id, instructor| {
                id == "10" && instructor.as_deref() == Some("5")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut users = MockUserStore::new();
        users.expect_get_user().returning(|id| {
            Ok(user(
                id,
                if id == "5" {
                    Role::TeacherExecutor
                } else {
                    Role::Student
                },
            ))
        });

        assign_instructor(&groups, &users, "1", "10", Some("5".to_owned()))
            .await
            .unwrap();
        let err = assign_instructor(
            &groups,
            &users,
            "1",
            "10",
            Some("6".to_owned()),
        )
        .await
        .unwrap_err();
        assert_eq!(err, errors::bad_request(""));
    }

    #[tokio::test]
    async fn clear_instructor() {
        let mut groups = groups_with(group(Some("5")));
        groups
            .expect_assign_instructor()
            .withf(|_, instructor| instructor.is_none())
            .times(1)
            .returning(|_, _| Ok(()));
        let mut users = MockUserStore::new();
        users.expect_get_user().never();
        assign_instructor(&groups, &users, "1", "10", None)
            .await
            .unwrap();
    }

    // Edition 1 already holds user 3; saved rows land in `saved`.
    fn batch_store(saved: Arc<Mutex<Vec<String>>>) -> MockEnrollmentStore {
        let mut enrollments = MockEnrollmentStore::new();
        enrollments
            .expect_find_enrollment_in_course()
            .returning(|course_id, user_id| {
                assert_eq!(course_id, "1");
                Ok((user_id == "3").then(|| Enrollment {
                    id: "e3".to_owned(),
                    group_id: "12".to_owned(),
                    user_id: user_id.to_owned(),
                    status: EnrollmentStatus::Active,
                    enrolled_by: EnrolledBy::SelfService,
                    enrolled_at: now(),
                }))
            });
        enrollments.expect_create_enrollment().never();
        enrollments
            .expect_create_enrollments()
            .returning(move |course_id, batch| {
                assert_eq!(course_id, "1");
                let mut saved = saved.lock().unwrap();
                Ok(batch
                    .iter()
                    .map(|content| {
                        assert_eq!(content.enrolled_by, EnrolledBy::Admin);
                        saved.push(content.user_id.clone());
                        Enrollment {
                            id: format!("e{}", content.user_id),
                            group_id: content.group_id.clone(),
                            user_id: content.user_id.clone(),
                            status: EnrollmentStatus::Active,
                            enrolled_by: content.enrolled_by,
                            enrolled_at: content.enrolled_at,
                        }
                    })
                    .collect())
            });
        enrollments
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn bulk_enroll_in_one_batch() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let enrollments = batch_store(saved.clone());
        let mut clock = MockClock::new();
        clock.expect_now().return_const(now());

        let ok = enroll_students(
            &groups_with(group(None)),
            &enrollments,
            &clock,
            "1",
            "10",
            &ids(&["1", "2"]),
        )
        .await
        .unwrap();
        assert_eq!(ok.len(), 2);
        assert!(ok.iter().all(|e| e.group_id == "10"));
        assert_eq!(*saved.lock().unwrap(), ids(&["1", "2"]));
    }

    #[tokio::test]
    async fn rejected_batch_saves_nothing() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let enrollments = batch_store(saved.clone());
        let groups = groups_with(group(None));
        let mut clock = MockClock::new();
        clock.expect_now().return_const(now());

        let err = enroll_students(
            &groups,
            &enrollments,
            &clock,
            "1",
            "10",
            &ids(&["1", "3"]),
        )
        .await
        .unwrap_err();
        assert_eq!(err, errors::conflict(""));

        for batch in [ids(&["5", "5"]), ids(&["5", "x"])] {
            let err = enroll_students(
                &groups,
                &enrollments,
                &clock,
                "1",
                "10",
                &batch,
            )
            .await
            .unwrap_err();
            assert_eq!(err, errors::bad_request(""));
        }
        assert!(saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_checks_edition() {
        let groups = groups_with(group(None));
        let mut enrollments = MockEnrollmentStore::new();
        enrollments
            .expect_delete_enrollment()
            .withf(|group_id, user_id| group_id == "10" && user_id == "7")
            .times(1)
            .returning(|_, _| Ok(()));
        remove_enrollment(&groups, &enrollments, "1", "10", "7")
            .await
            .unwrap();
        let err = remove_enrollment(&groups, &enrollments, "2", "10", "7")
            .await
            .unwrap_err();
        assert_eq!(err, errors::not_found(""));
    }
}
