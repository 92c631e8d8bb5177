//! services/api/src/web/rest.rs
//!
//! The master definition of the OpenAPI specification. Every handler and
//! payload exposed by the router is registered here.

use crate::error::ErrorBody;
use crate::web::{activities, auth, reservations, views};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::refresh_handler,
        auth::change_password_handler,
        auth::me_handler,
        reservations::create_reservation_handler,
        reservations::list_reservations_handler,
        reservations::update_reservation_handler,
        reservations::change_status_handler,
        reservations::delete_reservation_handler,
        reservations::statistics_handler,
        activities::list_activities_handler,
        activities::create_activity_handler,
        activities::delete_activity_handler,
        activities::list_slots_handler,
    ),
    components(
        schemas(
            ErrorBody,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RefreshRequest,
            auth::RefreshResponse,
            auth::ChangePasswordRequest,
            auth::ProfileResponse,
            reservations::CreateReservationRequest,
            reservations::UpdateReservationRequest,
            reservations::ChangeStatusRequest,
            activities::CreateActivityRequest,
            activities::CreateSlotRequest,
            views::UserSummary,
            views::ActivityView,
            views::SlotView,
            views::SlotSummary,
            views::ActivityWithSlots,
            views::ReservationView,
            views::StatisticsView,
            views::MessageResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Login, token refresh and password management."),
        (name = "Reservations", description = "Booking activity slots and managing reservations."),
        (name = "Activities", description = "Activities and their scheduled slots.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
