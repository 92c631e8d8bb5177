//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: login, token refresh, password change and the
//! current user's profile.

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use reservation_core::{Failure, FailureKind, PortError, Principal, UserCredentials};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::password::{hash_password, verify_password};
use crate::error::{ApiError, ErrorBody};
use crate::web::extract::ApiJson;
use crate::web::state::AppState;
use crate::web::token::{authenticate_refresh, TokenType};
use crate::web::views::{MessageResponse, UserSummary};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// An e-mail address or a username.
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub must_change_password: bool,
    pub user: UserSummary,
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RefreshResponse {
    pub token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub role: Option<String>,
    pub is_superuser: bool,
    pub must_change_password: bool,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn invalid_credentials() -> ApiError {
    Failure::new(FailureKind::InvalidCredentials, "Invalid credentials.").into()
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/login - Exchange credentials for an access and a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing credentials", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // 1. Both fields are required
    let (Some(identifier), Some(password)) = (present(req.email), present(req.password)) else {
        return Err(Failure::new(
            FailureKind::MissingCredentials,
            "Email and password required.",
        )
        .into());
    };

    // 2. Look the user up by e-mail or by username
    let lookup = if identifier.contains('@') {
        state.db.get_credentials_by_email(identifier.trim()).await
    } else {
        state.db.get_credentials_by_username(identifier.trim()).await
    };
    let creds: UserCredentials = match lookup {
        Ok(creds) => creds,
        Err(PortError::NotFound(_)) => return Err(invalid_credentials()),
        Err(e) => return Err(e.into()),
    };

    // 3. Verify the password; inactive accounts cannot log in
    if !verify_password(&password, &creds.hashed_password)? || !creds.user.is_active {
        return Err(invalid_credentials());
    }

    // 4. Issue the token pair
    let tokens = state.jwt.issue_pair(&creds.user, Utc::now())?;
    info!(user_id = %creds.user.id, "User logged in");

    Ok(Json(LoginResponse {
        token: tokens.access,
        refresh_token: tokens.refresh,
        must_change_password: creds.user.must_change_password,
        user: UserSummary::from(&creds.user),
    }))
}

/// POST /api/auth/refresh - Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token issued", body = RefreshResponse),
        (status = 400, description = "Missing refresh token", body = ErrorBody),
        (status = 401, description = "Invalid refresh token", body = ErrorBody)
    ),
    tag = "Auth"
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let refresh_token = present(req.refresh_token).ok_or_else(|| {
        Failure::new(
            FailureKind::MissingRefreshToken,
            "Refresh token is required.",
        )
    })?;

    let now = Utc::now();
    let principal =
        authenticate_refresh(&state.jwt, state.db.as_ref(), refresh_token.trim(), now).await?;

    // Informational claims are rebuilt from the live record.
    let user = state.db.get_user_by_id(principal.user_id).await?;
    let token = state.jwt.issue(&user, TokenType::Access, now)?;
    Ok(Json(RefreshResponse { token }))
}

/// POST /api/auth/change-password - Replace the current user's password
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing, incorrect or unchanged password", body = ErrorBody),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (Some(old_password), Some(new_password)) =
        (present(req.old_password), present(req.new_password))
    else {
        return Err(Failure::new(
            FailureKind::MissingPasswords,
            "Both old_password and new_password are required.",
        )
        .into());
    };

    let creds = state.db.get_credentials_by_id(principal.user_id).await?;
    if !verify_password(&old_password, &creds.hashed_password)? {
        return Err(Failure::new(
            FailureKind::IncorrectOldPassword,
            "Old password is incorrect.",
        )
        .into());
    }
    if old_password == new_password {
        return Err(Failure::new(
            FailureKind::SamePassword,
            "New password must differ from the old one.",
        )
        .into());
    }

    let hashed = hash_password(&new_password)?;
    state.db.update_password(principal.user_id, &hashed).await?;
    info!(user_id = %principal.user_id, "Password changed");

    Ok(Json(MessageResponse {
        detail: "Password changed successfully.".to_string(),
    }))
}

/// GET /api/auth/me - The authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ProfileResponse),
        (status = 401, description = "Not authenticated", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "Auth"
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.db.get_user_by_id(principal.user_id).await?;
    Ok(Json(ProfileResponse {
        id: user.id,
        role: user.role.as_ref().map(|role| role.name.clone()),
        username: user.username,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        is_superuser: user.is_superuser,
        must_change_password: user.must_change_password,
    }))
}
