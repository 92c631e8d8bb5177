//! crates/reservation_core/src/admission.rs
//!
//! The reservation admission controller.
//!
//! Admission checks run in a fixed order so callers always receive the same
//! failure for the same state: slot existence, temporal validity, role
//! eligibility, capacity, duplicate booking. The checks are a pure function of
//! an [`AdmissionSnapshot`]; the database port evaluates them inside the same
//! atomic section that inserts the reservation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    role_names, Activity, ActivitySlot, Principal, Reservation, ReservationDetails,
    ReservationStatistics, ReservationStatus,
};
use crate::failure::{CoreResult, Failure, FailureKind};
use crate::permissions::{teacher_or_admin, Predicate, ReservationAccess};
use crate::ports::{DatabaseService, PortError};
use crate::visibility::ReservationScope;

//=========================================================================================
// Admission Types
//=========================================================================================

/// The state of a slot as seen by one admission attempt.
#[derive(Debug, Clone)]
pub struct AdmissionSnapshot {
    pub slot: ActivitySlot,
    pub activity: Activity,
    /// Reservations on the slot that are not cancelled.
    pub active_reservations: u32,
    /// Non-cancelled reservations the submitting user already holds on the slot.
    pub held_by_user: u32,
}

/// Decides whether a reservation may be inserted. `None` means the slot does
/// not exist.
pub type AdmissionGuard<'a> =
    &'a (dyn Fn(Option<&AdmissionSnapshot>) -> Result<(), Failure> + Send + Sync);

/// A reservation that has not been admitted yet.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    pub user_id: Uuid,
    pub activity_slot_id: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Requested changes to an existing reservation. The status stays raw until
/// the caller has been authorized to change it.
#[derive(Debug, Clone, Default)]
pub struct ReservationPatch {
    pub note: Option<String>,
    pub status: Option<String>,
}

impl ReservationPatch {
    pub fn changes_status(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| !status.trim().is_empty())
    }
}

//=========================================================================================
// Admission Rules
//=========================================================================================

/// Runs the ordered admission checks for `principal` at time `now`.
pub fn check_admission(
    principal: &Principal,
    snapshot: Option<&AdmissionSnapshot>,
    now: DateTime<Utc>,
) -> Result<(), Failure> {
    let snapshot = snapshot
        .ok_or_else(|| Failure::new(FailureKind::SlotNotFound, "Activity slot not found."))?;

    if snapshot.slot.start_date <= now {
        return Err(Failure::new(
            FailureKind::SlotNotBookable,
            "This slot has already started or ended and can no longer be booked.",
        ));
    }

    if !principal.is_superuser {
        let role = principal.role.as_ref().ok_or_else(Failure::no_role)?;
        if role.is(role_names::STUDENT) && snapshot.activity.role_id != role.id {
            return Err(Failure::insufficient_permissions(
                "This activity is not available for your role.",
            ));
        }
    }

    check_capacity(snapshot)?;
    check_duplicate(snapshot, "You already have a reservation for this slot.")
}

/// Checks a cancelled reservation being set back to pending or approved.
/// Only seat availability applies: the slot's timing and the booker's role
/// were settled when it was first admitted. A second live reservation of the
/// same booker is reported before a full slot.
pub fn check_reactivation(snapshot: Option<&AdmissionSnapshot>) -> Result<(), Failure> {
    let snapshot = snapshot
        .ok_or_else(|| Failure::new(FailureKind::SlotNotFound, "Activity slot not found."))?;
    check_duplicate(snapshot, "The booker already has another reservation for this slot.")?;
    check_capacity(snapshot)
}

fn check_capacity(snapshot: &AdmissionSnapshot) -> Result<(), Failure> {
    if snapshot.active_reservations >= snapshot.activity.capacity {
        return Err(Failure::new(
            FailureKind::CapacityReached,
            format!(
                "This slot is full ({}/{}).",
                snapshot.active_reservations, snapshot.activity.capacity
            ),
        ));
    }
    Ok(())
}

fn check_duplicate(snapshot: &AdmissionSnapshot, detail: &str) -> Result<(), Failure> {
    if snapshot.held_by_user > 0 {
        return Err(Failure::new(FailureKind::DuplicateReservation, detail));
    }
    Ok(())
}

fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

//=========================================================================================
// The Controller
//=========================================================================================

#[derive(Clone)]
pub struct AdmissionController {
    db: Arc<dyn DatabaseService>,
}

impl AdmissionController {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Validates and persists a new pending reservation.
    pub async fn submit(
        &self,
        principal: &Principal,
        slot_id: Uuid,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Reservation> {
        let draft = ReservationDraft {
            user_id: principal.user_id,
            activity_slot_id: slot_id,
            note: normalize_note(note),
            created_at: now,
        };
        let guard = |snapshot: Option<&AdmissionSnapshot>| check_admission(principal, snapshot, now);

        let reservation = self.db.admit_reservation(draft, &guard).await?;
        info!(
            reservation_id = %reservation.id,
            slot_id = %slot_id,
            user_id = %principal.user_id,
            "Reservation admitted"
        );
        Ok(reservation)
    }

    /// Sets a reservation's status. Only the slot's assigned teacher or an
    /// admin may do this. Transitions are not restricted beyond the status set.
    pub async fn change_status(
        &self,
        principal: &Principal,
        reservation_id: Uuid,
        requested: &str,
    ) -> CoreResult<ReservationDetails> {
        teacher_or_admin().check(principal)?;

        let mut details = self.load(reservation_id).await?;
        let access = ReservationAccess::evaluate(principal, &details.reservation);
        if !access.is_admin && details.slot.teacher_id != Some(principal.user_id) {
            return Err(Failure::insufficient_permissions(
                "Only the slot's assigned teacher or an admin can change this reservation's status.",
            )
            .into());
        }

        let status: ReservationStatus = requested.parse()?;
        let previous = details.reservation.status;
        details.reservation.status = status;
        self.persist(previous, &details.reservation).await?;

        info!(
            reservation_id = %reservation_id,
            status = %status,
            changed_by = %principal.user_id,
            "Reservation status changed"
        );
        Ok(details)
    }

    /// Applies a patch under the field-level rules of [`ReservationAccess`].
    pub async fn update(
        &self,
        principal: &Principal,
        reservation_id: Uuid,
        patch: ReservationPatch,
    ) -> CoreResult<ReservationDetails> {
        let mut details = self.load(reservation_id).await?;
        ReservationAccess::evaluate(principal, &details.reservation).authorize(&patch)?;

        let status = match patch.status.as_deref() {
            Some(raw) if patch.changes_status() => Some(raw.parse::<ReservationStatus>()?),
            _ => None,
        };
        let previous = details.reservation.status;
        if patch.note.is_some() {
            details.reservation.note = normalize_note(patch.note);
        }
        if let Some(status) = status {
            details.reservation.status = status;
        }
        self.persist(previous, &details.reservation).await?;
        Ok(details)
    }

    /// Deletes a reservation. Only its owner may do this.
    pub async fn delete(&self, principal: &Principal, reservation_id: Uuid) -> CoreResult<()> {
        let details = self.load(reservation_id).await?;
        if details.reservation.user_id != principal.user_id {
            return Err(Failure::new(
                FailureKind::NotOwner,
                "You can only delete your own reservations.",
            )
            .into());
        }
        self.db.delete_reservation(reservation_id).await?;
        info!(reservation_id = %reservation_id, "Reservation deleted");
        Ok(())
    }

    /// Reservations visible to the principal on slots that have not ended.
    pub async fn list(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<ReservationDetails>> {
        let scope = ReservationScope::for_principal(principal);
        Ok(self.db.list_reservations(scope, now).await?)
    }

    pub async fn statistics(&self, principal: &Principal) -> CoreResult<ReservationStatistics> {
        teacher_or_admin().check(principal)?;
        Ok(self.db.reservation_statistics().await?)
    }

    /// Saves a modified reservation. Leaving the cancelled state takes a seat
    /// again, so that save goes through the same atomic seat check as
    /// admission.
    async fn persist(
        &self,
        previous: ReservationStatus,
        reservation: &Reservation,
    ) -> CoreResult<()> {
        if !previous.is_active() && reservation.status.is_active() {
            self.db
                .reactivate_reservation(reservation, &check_reactivation)
                .await?;
            info!(reservation_id = %reservation.id, "Cancelled reservation reactivated");
            return Ok(());
        }
        self.db.save_reservation(reservation).await
    }

    async fn load(&self, reservation_id: Uuid) -> CoreResult<ReservationDetails> {
        match self.db.get_reservation(reservation_id).await {
            Ok(details) => Ok(details),
            Err(PortError::NotFound(_)) => Err(Failure::new(
                FailureKind::ReservationNotFound,
                "Reservation not found.",
            )
            .into()),
            Err(e) => Err(e.into()),
        }
    }
}
