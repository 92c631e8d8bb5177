//! crates/reservation_core/src/memory.rs
//!
//! An in-memory implementation of the `DatabaseService` port. A single
//! `tokio::sync::Mutex` guards the whole store, so admission is atomic with
//! respect to every other operation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::admission::{AdmissionGuard, AdmissionSnapshot, ReservationDraft};
use crate::domain::{
    Activity, ActivitySlot, NewActivity, NewUser, Reservation, ReservationDetails,
    ReservationStatistics, ReservationStatus, Role, User, UserCredentials,
};
use crate::failure::CoreResult;
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::visibility::{ActivityScope, ReservationScope};

#[derive(Default)]
struct MemoryState {
    roles: HashMap<Uuid, Role>,
    users: HashMap<Uuid, UserCredentials>,
    activities: HashMap<Uuid, Activity>,
    slots: HashMap<Uuid, ActivitySlot>,
    reservations: HashMap<Uuid, Reservation>,
}

impl MemoryState {
    fn details(&self, reservation: &Reservation) -> PortResult<ReservationDetails> {
        let slot = self
            .slots
            .get(&reservation.activity_slot_id)
            .ok_or_else(|| missing("Activity slot", reservation.activity_slot_id))?;
        let activity = self
            .activities
            .get(&slot.activity_id)
            .ok_or_else(|| missing("Activity", slot.activity_id))?;
        let booker = self
            .users
            .get(&reservation.user_id)
            .ok_or_else(|| missing("User", reservation.user_id))?;

        Ok(ReservationDetails {
            reservation: reservation.clone(),
            slot: slot.clone(),
            activity: activity.clone(),
            booker: booker.user.clone(),
        })
    }

    fn snapshot(&self, slot_id: Uuid, user_id: Uuid) -> Option<AdmissionSnapshot> {
        let slot = self.slots.get(&slot_id)?;
        let activity = self.activities.get(&slot.activity_id)?;
        let active: Vec<&Reservation> = self
            .reservations
            .values()
            .filter(|r| r.activity_slot_id == slot.id && r.status.is_active())
            .collect();
        Some(AdmissionSnapshot {
            slot: slot.clone(),
            activity: activity.clone(),
            active_reservations: active.len() as u32,
            held_by_user: active.iter().filter(|r| r.user_id == user_id).count() as u32,
        })
    }

    fn credentials_where(
        &self,
        what: &str,
        matches: impl Fn(&User) -> bool,
    ) -> PortResult<UserCredentials> {
        self.users
            .values()
            .find(|creds| matches(&creds.user))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User with {} not found", what)))
    }
}

fn missing(what: &str, id: Uuid) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

#[derive(Default)]
pub struct InMemoryDatabase {
    state: Mutex<MemoryState>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_role(&self, role: Role) {
        self.state.lock().await.roles.insert(role.id, role);
    }

    pub async fn insert_user(&self, user: User, hashed_password: impl Into<String>) {
        let creds = UserCredentials {
            user,
            hashed_password: hashed_password.into(),
        };
        self.state.lock().await.users.insert(creds.user.id, creds);
    }

    /// Reassigns a user's role, as an administrator would.
    pub async fn set_user_role(&self, user_id: Uuid, role: Option<Role>) {
        if let Some(creds) = self.state.lock().await.users.get_mut(&user_id) {
            creds.user.role = role;
        }
    }

    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) {
        if let Some(creds) = self.state.lock().await.users.get_mut(&user_id) {
            creds.user.is_active = is_active;
        }
    }

    pub async fn insert_activity(&self, activity: Activity) {
        self.state.lock().await.activities.insert(activity.id, activity);
    }

    pub async fn insert_slot(&self, slot: ActivitySlot) {
        self.state.lock().await.slots.insert(slot.id, slot);
    }

    pub async fn insert_reservation(&self, reservation: Reservation) {
        self.state
            .lock()
            .await
            .reservations
            .insert(reservation.id, reservation);
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        Ok(self.get_credentials_by_id(user_id).await?.user)
    }

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        self.state
            .lock()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| missing("User", user_id))
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.state
            .lock()
            .await
            .credentials_where("this email", |user| user.email.eq_ignore_ascii_case(email))
    }

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        self.state
            .lock()
            .await
            .credentials_where("this username", |user| user.username == username)
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let creds = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| missing("User", user_id))?;
        creds.hashed_password = hashed_password.to_string();
        creds.user.must_change_password = false;
        Ok(())
    }

    async fn get_role_by_name(&self, name: &str) -> PortResult<Role> {
        self.state
            .lock()
            .await
            .roles
            .values()
            .find(|role| role.is(name))
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Role {} not found", name)))
    }

    async fn list_activities(&self, scope: ActivityScope) -> PortResult<Vec<Activity>> {
        let state = self.state.lock().await;
        let mut activities: Vec<Activity> = state
            .activities
            .values()
            .filter(|activity| scope.admits(activity))
            .cloned()
            .collect();
        activities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(activities)
    }

    async fn get_activity(&self, activity_id: Uuid) -> PortResult<Activity> {
        self.state
            .lock()
            .await
            .activities
            .get(&activity_id)
            .cloned()
            .ok_or_else(|| missing("Activity", activity_id))
    }

    async fn create_activity(
        &self,
        new: NewActivity,
    ) -> PortResult<(Activity, Vec<ActivitySlot>)> {
        let mut state = self.state.lock().await;
        if !state.roles.contains_key(&new.role_id) {
            return Err(missing("Role", new.role_id));
        }

        let activity = Activity {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            capacity: new.capacity,
            time_window: new.time_window,
            role_id: new.role_id,
            created_by: new.created_by,
            created_at: Utc::now(),
        };
        let slots: Vec<ActivitySlot> = new
            .slots
            .into_iter()
            .map(|slot| ActivitySlot {
                id: Uuid::new_v4(),
                activity_id: activity.id,
                teacher_id: slot.teacher_id,
                start_date: slot.start_date,
                end_date: slot.end_date,
            })
            .collect();

        state.activities.insert(activity.id, activity.clone());
        for slot in &slots {
            state.slots.insert(slot.id, slot.clone());
        }
        Ok((activity, slots))
    }

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().await;
        state
            .activities
            .remove(&activity_id)
            .ok_or_else(|| missing("Activity", activity_id))?;
        state.slots.retain(|_, slot| slot.activity_id != activity_id);
        let MemoryState {
            slots,
            reservations,
            ..
        } = &mut *state;
        reservations.retain(|_, r| slots.contains_key(&r.activity_slot_id));
        Ok(())
    }

    async fn list_slots_in_range(
        &self,
        activity_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<Vec<ActivitySlot>> {
        let state = self.state.lock().await;
        let mut slots: Vec<ActivitySlot> = state
            .slots
            .values()
            .filter(|slot| {
                slot.activity_id == activity_id && slot.start_date >= from && slot.start_date <= to
            })
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.start_date);
        Ok(slots)
    }

    async fn admit_reservation(
        &self,
        draft: ReservationDraft,
        guard: AdmissionGuard<'_>,
    ) -> CoreResult<Reservation> {
        let mut state = self.state.lock().await;

        let snapshot = state.snapshot(draft.activity_slot_id, draft.user_id);
        guard(snapshot.as_ref())?;

        let reservation = Reservation {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            activity_slot_id: draft.activity_slot_id,
            note: draft.note,
            created_at: draft.created_at,
            status: ReservationStatus::Pending,
        };
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> PortResult<ReservationDetails> {
        let state = self.state.lock().await;
        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or_else(|| missing("Reservation", reservation_id))?;
        state.details(reservation)
    }

    async fn list_reservations(
        &self,
        scope: ReservationScope,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<ReservationDetails>> {
        let state = self.state.lock().await;
        let mut listed = Vec::new();
        for reservation in state.reservations.values() {
            let details = state.details(reservation)?;
            if scope.admits(&details, now) {
                listed.push(details);
            }
        }
        listed.sort_by_key(|d| (d.slot.start_date, d.reservation.created_at));
        Ok(listed)
    }

    async fn save_reservation(&self, reservation: &Reservation) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .reservations
            .get_mut(&reservation.id)
            .ok_or_else(|| missing("Reservation", reservation.id))?;
        stored.note = reservation.note.clone();
        stored.status = reservation.status;
        Ok(())
    }

    async fn reactivate_reservation(
        &self,
        reservation: &Reservation,
        guard: AdmissionGuard<'_>,
    ) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.reservations.contains_key(&reservation.id) {
            return Err(missing("Reservation", reservation.id).into());
        }

        let snapshot = state.snapshot(reservation.activity_slot_id, reservation.user_id);
        guard(snapshot.as_ref())?;

        if let Some(stored) = state.reservations.get_mut(&reservation.id) {
            stored.note = reservation.note.clone();
            stored.status = reservation.status;
        }
        Ok(())
    }

    async fn delete_reservation(&self, reservation_id: Uuid) -> PortResult<()> {
        self.state
            .lock()
            .await
            .reservations
            .remove(&reservation_id)
            .map(|_| ())
            .ok_or_else(|| missing("Reservation", reservation_id))
    }

    async fn reservation_statistics(&self) -> PortResult<ReservationStatistics> {
        let state = self.state.lock().await;
        let mut stats = ReservationStatistics::default();
        for reservation in state.reservations.values() {
            stats.total += 1;
            match reservation.status {
                ReservationStatus::Pending => stats.pending += 1,
                ReservationStatus::Approved => stats.approved += 1,
                ReservationStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn create_user(&self, new: NewUser) -> PortResult<User> {
        let mut state = self.state.lock().await;
        let taken = state.users.values().any(|creds| {
            creds.user.email.eq_ignore_ascii_case(&new.email) || creds.user.username == new.username
        });
        if taken {
            return Err(PortError::Unexpected(format!(
                "A user with email {} already exists",
                new.email
            )));
        }
        let role = match new.role_id {
            Some(role_id) => Some(
                state
                    .roles
                    .get(&role_id)
                    .cloned()
                    .ok_or_else(|| missing("Role", role_id))?,
            ),
            None => None,
        };

        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role,
            is_active: true,
            is_superuser: false,
            must_change_password: new.must_change_password,
        };
        state.users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                hashed_password: new.hashed_password,
            },
        );
        Ok(user)
    }
}
