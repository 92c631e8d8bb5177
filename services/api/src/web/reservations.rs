//! services/api/src/web/reservations.rs
//!
//! Reservation endpoints. Business rules live in the core's
//! `AdmissionController`; these handlers translate requests and shape the
//! results for the requesting principal.

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::Utc;
use reservation_core::{Principal, ReservationPatch};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::state::AppState;
use crate::web::views::{ReservationView, StatisticsView};

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateReservationRequest {
    pub activity_slot: Uuid,
    pub note: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateReservationRequest {
    pub note: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangeStatusRequest {
    /// One of `pending`, `approved` or `cancelled`.
    pub status: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Book a slot. The reservation starts out pending.
#[utoipa::path(
    post,
    path = "/api/reservations",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReservationView),
        (status = 400, description = "Slot not bookable, full or already booked", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody),
        (status = 403, description = "Activity not available for the user's role", body = ErrorBody),
        (status = 404, description = "Slot not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Reservations"
)]
pub async fn create_reservation_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationView>), ApiError> {
    let reservation = state
        .admissions
        .submit(&principal, req.activity_slot, req.note, Utc::now())
        .await?;

    let details = state.db.get_reservation(reservation.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReservationView::new(&details, &principal)),
    ))
}

/// List the caller's reservations, or for a teacher the reservations on their slots.
/// Slots that have already ended are left out.
#[utoipa::path(
    get,
    path = "/api/reservations",
    responses(
        (status = 200, description = "Visible reservations", body = [ReservationView]),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Reservations"
)]
pub async fn list_reservations_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ReservationView>>, ApiError> {
    let listed = state.admissions.list(&principal, Utc::now()).await?;
    Ok(Json(
        listed
            .iter()
            .map(|details| ReservationView::new(details, &principal))
            .collect(),
    ))
}

#[utoipa::path(
    patch,
    path = "/api/reservations/{id}",
    request_body = UpdateReservationRequest,
    params(("id" = Uuid, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Reservation updated", body = ReservationView),
        (status = 400, description = "Invalid status", body = ErrorBody),
        (status = 403, description = "Not allowed to change this reservation or field", body = ErrorBody),
        (status = 404, description = "Reservation not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Reservations"
)]
pub async fn update_reservation_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateReservationRequest>,
) -> Result<Json<ReservationView>, ApiError> {
    let patch = ReservationPatch {
        note: req.note,
        status: req.status,
    };
    let details = state.admissions.update(&principal, id, patch).await?;
    Ok(Json(ReservationView::new(&details, &principal)))
}

/// Approve, cancel or reopen a reservation. Assigned teacher or admin only.
#[utoipa::path(
    patch,
    path = "/api/reservations/{id}/status",
    request_body = ChangeStatusRequest,
    params(("id" = Uuid, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Status changed", body = ReservationView),
        (status = 400, description = "Invalid status", body = ErrorBody),
        (status = 403, description = "Not the assigned teacher or an admin", body = ErrorBody),
        (status = 404, description = "Reservation not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Reservations"
)]
pub async fn change_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ChangeStatusRequest>,
) -> Result<Json<ReservationView>, ApiError> {
    let requested = req.status.unwrap_or_default();
    let details = state
        .admissions
        .change_status(&principal, id, &requested)
        .await?;
    Ok(Json(ReservationView::new(&details, &principal)))
}

#[utoipa::path(
    delete,
    path = "/api/reservations/{id}",
    params(("id" = Uuid, Path, description = "Reservation id")),
    responses(
        (status = 204, description = "Reservation deleted"),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Reservation not found", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Reservations"
)]
pub async fn delete_reservation_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.admissions.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reservation counts by status. Teacher or admin only.
#[utoipa::path(
    get,
    path = "/api/reservations/statistics",
    responses(
        (status = 200, description = "Reservation counts", body = StatisticsView),
        (status = 403, description = "Not a teacher or admin", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Reservations"
)]
pub async fn statistics_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<StatisticsView>, ApiError> {
    let stats = state.admissions.statistics(&principal).await?;
    Ok(Json(StatisticsView::from(stats)))
}
