use constant_time_eq::constant_time_eq;
use tracing::{debug, info};

use lms_slo::{errors, Result};
use lms_storage::{
    courses::CourseStatus,
    enrollments::{
        Content as NewEnrollment, EnrolledBy, Enrollment, EnrollmentStore,
        ALREADY_ENROLLED, CAPACITY_REACHED,
    },
    groups::{GroupStore, Roster},
};

use crate::services::clock::Clock;

pub const NOT_STARTED: &str = "enrollment period has not started yet";
pub const ENDED: &str = "enrollment period has ended";
pub const INVALID_KEY: &str = "invalid enrollment key";

/// Self-service admission into a known group, gated by its enrollment key.
pub async fn enroll_with_key<G, E, C>(
    groups: &G,
    enrollments: &E,
    clock: &C,
    user_id: &str,
    group_id: &str,
    key: &str,
) -> Result<Enrollment>
where
    G: GroupStore + Sync,
    E: EnrollmentStore + Sync,
    C: Clock + Sync,
{
    let roster = groups
        .find_group_by_id(group_id)
        .await?
        .ok_or_else(|| errors::not_found("group not found"))?;
    admit(enrollments, clock, user_id, &roster, Some(key)).await
}

/// Self-service admission where the enrollment key alone identifies the
/// group. The stored key must equal the code byte for byte, whatever
/// collation the lookup ran under.
pub async fn enroll_with_code<G, E, C>(
    groups: &G,
    enrollments: &E,
    clock: &C,
    user_id: &str,
    code: &str,
) -> Result<Enrollment>
where
    G: GroupStore + Sync,
    E: EnrollmentStore + Sync,
    C: Clock + Sync,
{
    let roster = groups
        .find_group_by_enrollment_key(code)
        .await?
        .filter(|roster| {
            roster.group.enrollment_key.as_deref().is_some_and(|key| {
                constant_time_eq(key.as_bytes(), code.as_bytes())
            })
        })
        .ok_or_else(|| {
            errors::not_found("no group matches this enrollment code")
        })?;
    admit(enrollments, clock, user_id, &roster, None).await
}

pub async fn my_enrollments<E>(
    enrollments: &E,
    user_id: &str,
) -> Result<Vec<Enrollment>>
where
    E: EnrollmentStore + Sync,
{
    enrollments.list_enrollment_by_user(user_id).await
}

// Checks run in a fixed order and the first failure wins. Nothing is written
// before the final create_enrollment, which repeats the capacity and
// uniqueness checks inside its transaction.
async fn admit<E, C>(
    enrollments: &E,
    clock: &C,
    user_id: &str,
    roster: &Roster,
    key: Option<&str>,
) -> Result<Enrollment>
where
    E: EnrollmentStore + Sync,
    C: Clock + Sync,
{
    let group = &roster.group;
    debug!("admission of user {} into group {}", user_id, group.id);

    let course_active = roster
        .course
        .as_ref()
        .is_some_and(|c| c.status == CourseStatus::Active);
    if !course_active {
        return Err(errors::forbidden("the course is not active"));
    }
    if !group.is_enrollment_open {
        return Err(errors::forbidden("enrollment is closed for this group"));
    }

    let now = clock.now();
    if group.enrollment_start_date.is_some_and(|start| now < start) {
        return Err(errors::bad_request(NOT_STARTED));
    }
    if group.enrollment_end_date.is_some_and(|end| now > end) {
        return Err(errors::bad_request(ENDED));
    }

    if let Some(supplied) = key {
        if let Some(expected) =
            group.enrollment_key.as_deref().filter(|k| !k.is_empty())
        {
            if !constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
                return Err(errors::bad_request(INVALID_KEY));
            }
        }
    }

    if enrollments
        .find_enrollment(&group.id, user_id)
        .await?
        .is_some()
    {
        return Err(errors::bad_request(ALREADY_ENROLLED));
    }

    if let Some(max) = group.max_students {
        if roster.active_count() >= max as usize {
            return Err(errors::bad_request(CAPACITY_REACHED));
        }
    }

    let enrollment = enrollments
        .create_enrollment(
            &NewEnrollment {
                group_id: group.id.clone(),
                user_id: user_id.to_owned(),
                enrolled_by: EnrolledBy::SelfService,
                enrolled_at: now,
            },
            group.max_students,
        )
        .await?;
    info!("user {} enrolled into group {}", user_id, group.id);
    Ok(enrollment)
}
