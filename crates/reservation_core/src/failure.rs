//! crates/reservation_core/src/failure.rs
//!
//! The classified failure type returned by every authorization and admission
//! check. A `Failure` carries a stable machine-readable code, a class that the
//! web layer maps to an HTTP status, and a human-readable detail.

use crate::ports::PortError;

//=========================================================================================
// Failure Classes and Kinds
//=========================================================================================

/// Broad category of a failure. Each class maps to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The caller could not be authenticated (401).
    Authentication,
    /// The caller is authenticated but not allowed (403).
    Permission,
    /// The request payload or the business rules rejected it (400).
    Validation,
    /// The referenced entity does not exist (404).
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    // --- Token validation ---
    NoToken,
    InvalidTokenHeader,
    InvalidToken,
    TokenExpired,
    TokenUserMismatch,
    TokenValidationFailed,
    UserNotFound,
    UserInactive,

    // --- Login / refresh / password ---
    MissingCredentials,
    InvalidCredentials,
    MissingRefreshToken,
    InvalidRefreshToken,
    MissingPasswords,
    IncorrectOldPassword,
    SamePassword,

    // --- Role predicates ---
    NoRole,
    NotStudent,
    NotTeacher,
    NotAdmin,
    InsufficientPermissions,
    NotOwner,

    // --- Admission and reservation rules ---
    SlotNotFound,
    SlotNotBookable,
    CapacityReached,
    DuplicateReservation,
    InvalidAction,
    ReservationNotFound,

    // --- Activities ---
    ActivityNotFound,
    RoleNotFound,
    InvalidDateFormat,
    InvalidDateRange,
    ValidationError,
}

impl FailureKind {
    /// The stable code surfaced to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::NoToken => "no_token",
            FailureKind::InvalidTokenHeader => "invalid_token_header",
            FailureKind::InvalidToken => "invalid_token",
            FailureKind::TokenExpired => "token_expired",
            FailureKind::TokenUserMismatch => "token_user_mismatch",
            FailureKind::TokenValidationFailed => "token_validation_failed",
            FailureKind::UserNotFound => "user_not_found",
            FailureKind::UserInactive => "user_inactive",
            FailureKind::MissingCredentials => "missing_credentials",
            FailureKind::InvalidCredentials => "invalid_credentials",
            FailureKind::MissingRefreshToken => "missing_refresh_token",
            FailureKind::InvalidRefreshToken => "invalid_refresh_token",
            FailureKind::MissingPasswords => "missing_passwords",
            FailureKind::IncorrectOldPassword => "incorrect_old_password",
            FailureKind::SamePassword => "same_password",
            FailureKind::NoRole => "no_role",
            FailureKind::NotStudent => "not_student",
            FailureKind::NotTeacher => "not_teacher",
            FailureKind::NotAdmin => "not_admin",
            FailureKind::InsufficientPermissions => "insufficient_permissions",
            FailureKind::NotOwner => "not_owner",
            FailureKind::SlotNotFound => "slot_not_found",
            FailureKind::SlotNotBookable => "slot_not_bookable",
            FailureKind::CapacityReached => "capacity_reached",
            FailureKind::DuplicateReservation => "duplicate_reservation",
            FailureKind::InvalidAction => "invalid_action",
            FailureKind::ReservationNotFound => "reservation_not_found",
            FailureKind::ActivityNotFound => "activity_not_found",
            FailureKind::RoleNotFound => "role_not_found",
            FailureKind::InvalidDateFormat => "invalid_date_format",
            FailureKind::InvalidDateRange => "invalid_date_range",
            FailureKind::ValidationError => "validation_error",
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            FailureKind::NoToken
            | FailureKind::InvalidTokenHeader
            | FailureKind::InvalidToken
            | FailureKind::TokenExpired
            | FailureKind::TokenUserMismatch
            | FailureKind::TokenValidationFailed
            | FailureKind::UserNotFound
            | FailureKind::UserInactive
            | FailureKind::InvalidCredentials
            | FailureKind::InvalidRefreshToken => FailureClass::Authentication,

            FailureKind::NoRole
            | FailureKind::NotStudent
            | FailureKind::NotTeacher
            | FailureKind::NotAdmin
            | FailureKind::InsufficientPermissions
            | FailureKind::NotOwner => FailureClass::Permission,

            FailureKind::SlotNotFound
            | FailureKind::ReservationNotFound
            | FailureKind::ActivityNotFound => FailureClass::NotFound,

            FailureKind::MissingCredentials
            | FailureKind::MissingRefreshToken
            | FailureKind::MissingPasswords
            | FailureKind::IncorrectOldPassword
            | FailureKind::SamePassword
            | FailureKind::SlotNotBookable
            | FailureKind::CapacityReached
            | FailureKind::DuplicateReservation
            | FailureKind::InvalidAction
            | FailureKind::RoleNotFound
            | FailureKind::InvalidDateFormat
            | FailureKind::InvalidDateRange
            | FailureKind::ValidationError => FailureClass::Validation,
        }
    }
}

//=========================================================================================
// The Failure Value
//=========================================================================================

/// A denied or rejected operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn class(&self) -> FailureClass {
        self.kind.class()
    }

    pub fn insufficient_permissions(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InsufficientPermissions, detail)
    }

    pub fn no_role() -> Self {
        Self::new(FailureKind::NoRole, "User does not have a role assigned.")
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ValidationError, detail)
    }
}

//=========================================================================================
// Core Service Error
//=========================================================================================

/// Error returned by the core services: either a classified rejection or a
/// failure of the underlying port.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Rejected(#[from] Failure),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl CoreError {
    /// The rejection, if this error is one.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            CoreError::Rejected(failure) => Some(failure),
            CoreError::Port(_) => None,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
