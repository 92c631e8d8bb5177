//! services/api/src/web/extract.rs
//!
//! Body and path extractors whose rejections use the API's `{detail, code}`
//! error body instead of axum's plain-text responses.

use axum::extract::{
    rejection::{JsonRejection, PathRejection},
    FromRequest, FromRequestParts,
};
use reservation_core::Failure;

use crate::error::ApiError;

/// `axum::Json`, rejected as a 400 `validation_error`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path`, rejected as a 400 `validation_error`.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(Failure::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejected(Failure::validation(rejection.body_text()))
    }
}
