//! crates/reservation_core/src/visibility.rs
//!
//! Decides which activities, slots and reservations a principal may see.
//! Scopes are plain values so each database adapter can translate them into
//! its own query while sharing the same `admits` semantics.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{role_names, Activity, Principal, ReservationDetails};
use crate::failure::Failure;
use crate::permissions::is_staff;

//=========================================================================================
// Activities
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityScope {
    All,
    /// Only activities scoped to this role id.
    Role(Uuid),
    Nothing,
}

impl ActivityScope {
    pub fn for_principal(principal: &Principal) -> Self {
        if is_staff(principal) {
            return ActivityScope::All;
        }
        match &principal.role {
            Some(role) => ActivityScope::Role(role.id),
            None => ActivityScope::Nothing,
        }
    }

    pub fn admits(&self, activity: &Activity) -> bool {
        match self {
            ActivityScope::All => true,
            ActivityScope::Role(role_id) => activity.role_id == *role_id,
            ActivityScope::Nothing => false,
        }
    }
}

/// Rejects a principal who may not view the given activity or its slots.
pub fn ensure_activity_visible(principal: &Principal, activity: &Activity) -> Result<(), Failure> {
    if ActivityScope::for_principal(principal).admits(activity) {
        Ok(())
    } else {
        Err(Failure::insufficient_permissions(
            "You don't have permission to view this activity.",
        ))
    }
}

//=========================================================================================
// Reservations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationScope {
    /// Reservations on slots assigned to this teacher.
    AssignedTeacher(Uuid),
    /// Reservations made by this user.
    Owner(Uuid),
}

impl ReservationScope {
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.has_role(role_names::TEACHER) {
            ReservationScope::AssignedTeacher(principal.user_id)
        } else {
            ReservationScope::Owner(principal.user_id)
        }
    }

    /// Whether the reservation belongs to the scope and its slot has not ended.
    pub fn admits(&self, details: &ReservationDetails, now: DateTime<Utc>) -> bool {
        let in_scope = match self {
            ReservationScope::AssignedTeacher(teacher_id) => {
                details.slot.teacher_id == Some(*teacher_id)
            }
            ReservationScope::Owner(user_id) => details.reservation.user_id == *user_id,
        };
        in_scope && details.slot.end_date >= now
    }
}

/// Whose identity is embedded as the `user` of a serialized reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationSubject {
    /// The user who made the booking.
    Booker,
    /// The user making the request.
    Requester,
}

impl ReservationSubject {
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.has_role(role_names::TEACHER) {
            ReservationSubject::Booker
        } else {
            ReservationSubject::Requester
        }
    }
}
