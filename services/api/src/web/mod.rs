pub mod activities;
pub mod auth;
pub mod extract;
pub mod middleware;
pub mod reservations;
pub mod rest;
pub mod state;
pub mod token;
pub mod views;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
use state::AppState;

/// Builds the `/api` router. Everything except login and refresh goes through
/// `require_auth`.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/change-password", post(auth::change_password_handler))
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/reservations",
            post(reservations::create_reservation_handler)
                .get(reservations::list_reservations_handler),
        )
        .route(
            "/reservations/statistics",
            get(reservations::statistics_handler),
        )
        .route(
            "/reservations/{id}",
            patch(reservations::update_reservation_handler)
                .delete(reservations::delete_reservation_handler),
        )
        .route(
            "/reservations/{id}/status",
            patch(reservations::change_status_handler),
        )
        .route(
            "/activities",
            get(activities::list_activities_handler).post(activities::create_activity_handler),
        )
        .route("/activities/{id}", delete(activities::delete_activity_handler))
        .route(
            "/activity-slots/{activity_id}/{start_date}/{end_date}",
            get(activities::list_slots_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .with_state(app_state)
}
