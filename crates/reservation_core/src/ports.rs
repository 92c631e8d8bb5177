//! crates/reservation_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::admission::{AdmissionGuard, ReservationDraft};
use crate::domain::{
    Activity, ActivitySlot, NewActivity, NewUser, Reservation, ReservationDetails,
    ReservationStatistics, Role, User, UserCredentials,
};
use crate::failure::CoreResult;
use crate::visibility::{ActivityScope, ReservationScope};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Store ---
    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    /// Stores a new password hash and clears the must-change-password flag.
    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()>;

    async fn get_role_by_name(&self, name: &str) -> PortResult<Role>;

    // --- Activities and Slots ---
    async fn list_activities(&self, scope: ActivityScope) -> PortResult<Vec<Activity>>;

    async fn get_activity(&self, activity_id: Uuid) -> PortResult<Activity>;

    async fn create_activity(
        &self,
        activity: NewActivity,
    ) -> PortResult<(Activity, Vec<ActivitySlot>)>;

    /// Deletes the activity together with its slots and their reservations.
    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()>;

    /// Slots of an activity whose start falls within `[from, to]`.
    async fn list_slots_in_range(
        &self,
        activity_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<Vec<ActivitySlot>>;

    // --- Reservations ---

    /// Atomically loads the admission snapshot for the draft's slot, runs the
    /// guard against it and, if the guard allows, inserts a pending reservation.
    /// No other admission for the same slot may interleave between the snapshot
    /// and the insert.
    async fn admit_reservation(
        &self,
        draft: ReservationDraft,
        guard: AdmissionGuard<'_>,
    ) -> CoreResult<Reservation>;

    async fn get_reservation(&self, reservation_id: Uuid) -> PortResult<ReservationDetails>;

    /// Reservations matching the scope whose slot has not yet ended at `now`.
    async fn list_reservations(
        &self,
        scope: ReservationScope,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<ReservationDetails>>;

    /// Persists the mutable fields (`note`, `status`) of a reservation.
    async fn save_reservation(&self, reservation: &Reservation) -> CoreResult<()>;

    /// Brings a cancelled reservation back into the active set. Like
    /// `admit_reservation`, the snapshot for the reservation's slot and owner,
    /// the guard and the save run without interleaving with any admission.
    async fn reactivate_reservation(
        &self,
        reservation: &Reservation,
        guard: AdmissionGuard<'_>,
    ) -> CoreResult<()>;

    async fn delete_reservation(&self, reservation_id: Uuid) -> PortResult<()>;

    async fn reservation_statistics(&self) -> PortResult<ReservationStatistics>;

    /// Inserts a provisioned account. Fails if the e-mail or username is taken.
    async fn create_user(&self, user: NewUser) -> PortResult<User>;
}
