//! crates/reservation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::failure::{Failure, FailureKind};

/// Names of the built-in roles. Role names are compared case-insensitively.
pub mod role_names {
    pub const STUDENT: &str = "student";
    pub const TEACHER: &str = "teacher";
    pub const ADMIN: &str = "admin";
}

//=========================================================================================
// Users and Roles
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

impl Role {
    /// Case-insensitive comparison against a role name.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub must_change_password: bool,
}

// Only used internally for login and password changes - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

/// An account to be provisioned with a temporary password.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub hashed_password: String,
    pub role_id: Option<Uuid>,
    pub must_change_password: bool,
}

/// The authenticated identity of a request, resolved live from the user store.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub is_superuser: bool,
}

impl Principal {
    pub fn has_role(&self, name: &str) -> bool {
        self.role.as_ref().is_some_and(|role| role.is(name))
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role.as_ref().map(|role| role.name.as_str())
    }
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

//=========================================================================================
// Activities and Slots
//=========================================================================================

#[derive(Debug, Clone)]
pub struct Activity {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub capacity: u32,
    /// Free-text hint such as "Mon 14:00-15:30".
    pub time_window: Option<String>,
    /// Only members of this role may see and book the activity.
    pub role_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A concrete bookable occurrence of an `Activity`.
#[derive(Debug, Clone)]
pub struct ActivitySlot {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub teacher_id: Option<Uuid>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSlot {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub name: String,
    pub description: String,
    pub capacity: u32,
    pub time_window: Option<String>,
    pub role_id: Uuid,
    pub created_by: Uuid,
    pub slots: Vec<NewSlot>,
}

impl NewActivity {
    /// Checks the attribute invariants of an activity and its slots.
    pub fn validate(&self) -> Result<(), Failure> {
        if self.name.trim().is_empty() {
            return Err(Failure::validation("Activity name must not be empty."));
        }
        if self.capacity == 0 {
            return Err(Failure::validation("Capacity must be a positive integer."));
        }
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.end_date <= slot.start_date {
                return Err(Failure::validation(format!(
                    "Slot {} must end after it starts.",
                    index
                )));
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Reservations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Approved,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Display label shown next to the status value.
    pub fn label(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Approved => "Approved",
            ReservationStatus::Cancelled => "Cancelled",
        }
    }

    /// Whether the reservation occupies a seat.
    pub fn is_active(&self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = Failure;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "approved" => Ok(ReservationStatus::Approved),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            _ => Err(Failure::new(
                FailureKind::InvalidAction,
                format!(
                    "Invalid status '{}'. Use one of: pending, approved, cancelled.",
                    value
                ),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_slot_id: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

/// A reservation together with everything needed to present it.
#[derive(Debug, Clone)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub slot: ActivitySlot,
    pub activity: Activity,
    pub booker: User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationStatistics {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub cancelled: u64,
}
