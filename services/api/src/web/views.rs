//! services/api/src/web/views.rs
//!
//! JSON representations of the domain types returned by the handlers.

use chrono::{DateTime, Utc};
use reservation_core::{
    Activity, ActivitySlot, Principal, ReservationDetails, ReservationStatistics,
    ReservationSubject, User,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub role: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role.as_ref().map(|role| role.name.clone()),
        }
    }
}

impl From<&Principal> for UserSummary {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.user_id,
            email: principal.email.clone(),
            first_name: principal.first_name.clone(),
            last_name: principal.last_name.clone(),
            role: principal.role_name().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub capacity: u32,
    pub time_window: Option<String>,
    /// The id of the role the activity is scoped to.
    pub role: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<&Activity> for ActivityView {
    fn from(activity: &Activity) -> Self {
        Self {
            id: activity.id,
            name: activity.name.clone(),
            description: activity.description.clone(),
            capacity: activity.capacity,
            time_window: activity.time_window.clone(),
            role: activity.role_id,
            created_by: activity.created_by,
            created_at: activity.created_at,
        }
    }
}

/// A slot with its activity nested.
#[derive(Debug, Serialize, ToSchema)]
pub struct SlotView {
    pub id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub activity: ActivityView,
    pub teacher: Option<Uuid>,
}

impl SlotView {
    pub fn new(slot: &ActivitySlot, activity: &Activity) -> Self {
        Self {
            id: slot.id,
            start_date: slot.start_date,
            end_date: slot.end_date,
            activity: ActivityView::from(activity),
            teacher: slot.teacher_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotSummary {
    pub id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub teacher: Option<Uuid>,
}

impl From<&ActivitySlot> for SlotSummary {
    fn from(slot: &ActivitySlot) -> Self {
        Self {
            id: slot.id,
            start_date: slot.start_date,
            end_date: slot.end_date,
            teacher: slot.teacher_id,
        }
    }
}

/// A newly created activity together with its slots.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityWithSlots {
    #[serde(flatten)]
    pub activity: ActivityView,
    pub slots: Vec<SlotSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationView {
    pub id: Uuid,
    pub user: UserSummary,
    pub activity_slot: SlotView,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub status_label: String,
}

impl ReservationView {
    /// Builds the view for `requester`. Teachers see the booker as `user`;
    /// everyone else sees themselves.
    pub fn new(details: &ReservationDetails, requester: &Principal) -> Self {
        let user = match ReservationSubject::for_principal(requester) {
            ReservationSubject::Booker => UserSummary::from(&details.booker),
            ReservationSubject::Requester => UserSummary::from(requester),
        };
        Self {
            id: details.reservation.id,
            user,
            activity_slot: SlotView::new(&details.slot, &details.activity),
            note: details.reservation.note.clone(),
            created_at: details.reservation.created_at,
            status: details.reservation.status.as_str().to_string(),
            status_label: details.reservation.status.label().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatisticsView {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub cancelled: u64,
}

impl From<ReservationStatistics> for StatisticsView {
    fn from(stats: ReservationStatistics) -> Self {
        Self {
            total: stats.total,
            pending: stats.pending,
            approved: stats.approved,
            cancelled: stats.cancelled,
        }
    }
}

/// A plain confirmation message.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub detail: String,
}
