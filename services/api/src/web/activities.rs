//! services/api/src/web/activities.rs
//!
//! Activity and activity-slot endpoints, filtered by the caller's role.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use reservation_core::domain::role_names;
use reservation_core::permissions::{admin, teacher_or_admin, Predicate};
use reservation_core::visibility::ensure_activity_visible;
use reservation_core::{
    ActivityScope, Failure, FailureKind, NewActivity, NewSlot, PortError, Principal,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::state::AppState;
use crate::web::views::{ActivityView, ActivityWithSlots, SlotSummary, SlotView};

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateSlotRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// The teacher assigned to run the slot.
    pub teacher: Option<Uuid>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateActivityRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub capacity: i64,
    pub time_window: Option<String>,
    /// Name of the role allowed to book the activity.
    pub role: String,
    #[serde(default)]
    pub slots: Vec<CreateSlotRequest>,
}

fn activity_not_found() -> Failure {
    Failure::new(FailureKind::ActivityNotFound, "Activity not found.")
}

fn parse_day(raw: &str) -> Result<NaiveDate, Failure> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        Failure::new(
            FailureKind::InvalidDateFormat,
            format!("Invalid date '{}'. Use YYYY-MM-DD.", raw),
        )
    })
}

/// The inclusive range from the first second of `start` to the last second of `end`.
fn day_bounds(start: NaiveDate, end: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let from = start.and_hms_opt(0, 0, 0)?;
    let to = end.and_hms_opt(23, 59, 59)?;
    Some((Utc.from_utc_datetime(&from), Utc.from_utc_datetime(&to)))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the activities visible to the caller.
#[utoipa::path(
    get,
    path = "/api/activities",
    responses(
        (status = 200, description = "Visible activities", body = [ActivityView]),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Activities"
)]
pub async fn list_activities_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ActivityView>>, ApiError> {
    let scope = ActivityScope::for_principal(&principal);
    let activities = state.db.list_activities(scope).await?;
    Ok(Json(activities.iter().map(ActivityView::from).collect()))
}

/// Create an activity together with its slots. Teacher or admin only.
#[utoipa::path(
    post,
    path = "/api/activities",
    request_body = CreateActivityRequest,
    responses(
        (status = 201, description = "Activity created", body = ActivityWithSlots),
        (status = 400, description = "Invalid activity, unknown role or unknown slot teacher", body = ErrorBody),
        (status = 403, description = "Not a teacher or admin", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Activities"
)]
pub async fn create_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<CreateActivityRequest>,
) -> Result<(StatusCode, Json<ActivityWithSlots>), ApiError> {
    teacher_or_admin().check(&principal)?;

    let capacity = u32::try_from(req.capacity)
        .ok()
        .filter(|capacity| *capacity > 0)
        .ok_or_else(|| Failure::validation("Capacity must be a positive integer."))?;

    let role = match state.db.get_role_by_name(req.role.trim()).await {
        Ok(role) => role,
        Err(PortError::NotFound(_)) => {
            return Err(Failure::new(
                FailureKind::RoleNotFound,
                format!("Role '{}' does not exist.", req.role),
            )
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    let new_activity = NewActivity {
        name: req.name.trim().to_string(),
        description: req.description,
        capacity,
        time_window: req.time_window,
        role_id: role.id,
        created_by: principal.user_id,
        slots: req
            .slots
            .into_iter()
            .map(|slot| NewSlot {
                start_date: slot.start_date,
                end_date: slot.end_date,
                teacher_id: slot.teacher,
            })
            .collect(),
    };
    new_activity.validate()?;
    ensure_assigned_teachers(&state, &new_activity.slots).await?;

    let (activity, slots) = state.db.create_activity(new_activity).await?;
    info!(
        activity_id = %activity.id,
        slots = slots.len(),
        created_by = %principal.user_id,
        "Activity created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ActivityWithSlots {
            activity: ActivityView::from(&activity),
            slots: slots.iter().map(SlotSummary::from).collect(),
        }),
    ))
}

/// Every teacher assigned to a slot must be an existing user holding the
/// teacher role.
async fn ensure_assigned_teachers(state: &AppState, slots: &[NewSlot]) -> Result<(), ApiError> {
    let mut checked: Vec<Uuid> = Vec::new();
    for teacher_id in slots.iter().filter_map(|slot| slot.teacher_id) {
        if checked.contains(&teacher_id) {
            continue;
        }
        let teacher = match state.db.get_user_by_id(teacher_id).await {
            Ok(user) => user,
            Err(PortError::NotFound(_)) => {
                return Err(Failure::validation(format!(
                    "Assigned teacher {} does not exist.",
                    teacher_id
                ))
                .into())
            }
            Err(e) => return Err(e.into()),
        };
        if !teacher
            .role
            .as_ref()
            .is_some_and(|role| role.is(role_names::TEACHER))
        {
            return Err(Failure::validation(format!(
                "User {} is not a teacher and cannot be assigned to a slot.",
                teacher_id
            ))
            .into());
        }
        checked.push(teacher_id);
    }
    Ok(())
}

/// Delete an activity with its slots and reservations. Admin only.
#[utoipa::path(
    delete,
    path = "/api/activities/{id}",
    params(("id" = Uuid, Path, description = "Activity id")),
    responses(
        (status = 204, description = "Activity deleted"),
        (status = 403, description = "Not an admin", body = ErrorBody),
        (status = 404, description = "Activity not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Activities"
)]
pub async fn delete_activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    admin().check(&principal)?;

    match state.db.delete_activity(id).await {
        Ok(()) => {
            info!(activity_id = %id, deleted_by = %principal.user_id, "Activity deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(PortError::NotFound(_)) => Err(activity_not_found().into()),
        Err(e) => Err(e.into()),
    }
}

/// List the slots of an activity starting within an inclusive date range.
#[utoipa::path(
    get,
    path = "/api/activity-slots/{activity_id}/{start_date}/{end_date}",
    params(
        ("activity_id" = Uuid, Path, description = "Activity id"),
        ("start_date" = String, Path, description = "First day, YYYY-MM-DD"),
        ("end_date" = String, Path, description = "Last day, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Slots in range", body = [SlotView]),
        (status = 400, description = "Malformed dates or inverted range", body = ErrorBody),
        (status = 403, description = "Activity not visible to the caller", body = ErrorBody),
        (status = 404, description = "Activity not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Activities"
)]
pub async fn list_slots_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath((activity_id, start_date, end_date)): ApiPath<(Uuid, String, String)>,
) -> Result<Json<Vec<SlotView>>, ApiError> {
    let start = parse_day(&start_date)?;
    let end = parse_day(&end_date)?;
    if start > end {
        return Err(Failure::new(
            FailureKind::InvalidDateRange,
            "start_date must not be after end_date.",
        )
        .into());
    }
    let (from, to) = day_bounds(start, end)
        .ok_or_else(|| ApiError::Internal("Date range is out of bounds".to_string()))?;

    let activity = match state.db.get_activity(activity_id).await {
        Ok(activity) => activity,
        Err(PortError::NotFound(_)) => return Err(activity_not_found().into()),
        Err(e) => return Err(e.into()),
    };
    ensure_activity_visible(&principal, &activity)?;

    let slots = state
        .db
        .list_slots_in_range(activity_id, from, to)
        .await?;
    Ok(Json(
        slots
            .iter()
            .map(|slot| SlotView::new(slot, &activity))
            .collect(),
    ))
}
