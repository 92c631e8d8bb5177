//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reservation_core::admission::{AdmissionGuard, AdmissionSnapshot, ReservationDraft};
use reservation_core::domain::{
    Activity, ActivitySlot, NewActivity, NewUser, Reservation, ReservationDetails,
    ReservationStatistics, ReservationStatus, Role, User, UserCredentials,
};
use reservation_core::failure::{CoreError, CoreResult, Failure, FailureKind};
use reservation_core::ports::{DatabaseService, PortError, PortResult};
use reservation_core::visibility::{ActivityScope, ReservationScope};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: &str, id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError + '_ {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", what, id)),
        _ => unexpected(e),
    }
}

/// Maps a hit on the one-live-reservation-per-user-and-slot index to its
/// rejection.
fn duplicate_or_unexpected(e: sqlx::Error, slot_id: Uuid, user_id: Uuid) -> CoreError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            warn!(
                slot_id = %slot_id,
                user_id = %user_id,
                "Duplicate reservation caught by unique index"
            );
            Failure::new(
                FailureKind::DuplicateReservation,
                "You already have a reservation for this slot.",
            )
            .into()
        }
        e => unexpected(e).into(),
    }
}

fn parse_status(raw: &str) -> PortResult<ReservationStatus> {
    raw.parse()
        .map_err(|_| PortError::Unexpected(format!("Unknown reservation status '{}' in store", raw)))
}

fn role_from(id: Option<Uuid>, name: Option<String>, description: Option<String>) -> Option<Role> {
    Some(Role {
        id: id?,
        name: name?,
        description: description.unwrap_or_default(),
    })
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.hashed_password,
           u.is_active, u.is_superuser, u.must_change_password,
           r.id AS role_id, r.name AS role_name, r.description AS role_description
    FROM users u
    LEFT JOIN roles r ON r.id = u.role_id
"#;

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    hashed_password: String,
    is_active: bool,
    is_superuser: bool,
    must_change_password: bool,
    role_id: Option<Uuid>,
    role_name: Option<String>,
    role_description: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
                first_name: self.first_name,
                last_name: self.last_name,
                role: role_from(self.role_id, self.role_name, self.role_description),
                is_active: self.is_active,
                is_superuser: self.is_superuser,
                must_change_password: self.must_change_password,
            },
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct RoleRecord {
    id: Uuid,
    name: String,
    description: String,
}
impl RoleRecord {
    fn to_domain(self) -> Role {
        Role {
            id: self.id,
            name: self.name,
            description: self.description,
        }
    }
}

#[derive(FromRow)]
struct ActivityRecord {
    id: Uuid,
    name: String,
    description: String,
    capacity: i32,
    time_window: Option<String>,
    role_id: Uuid,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}
impl ActivityRecord {
    fn to_domain(self) -> Activity {
        Activity {
            id: self.id,
            name: self.name,
            description: self.description,
            capacity: self.capacity.max(0) as u32,
            time_window: self.time_window,
            role_id: self.role_id,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SlotRecord {
    id: Uuid,
    activity_id: Uuid,
    teacher_id: Option<Uuid>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}
impl SlotRecord {
    fn to_domain(self) -> ActivitySlot {
        ActivitySlot {
            id: self.id,
            activity_id: self.activity_id,
            teacher_id: self.teacher_id,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

#[derive(FromRow)]
struct ReservationRecord {
    id: Uuid,
    user_id: Uuid,
    activity_slot_id: Uuid,
    note: Option<String>,
    created_at: DateTime<Utc>,
    status: String,
}
impl ReservationRecord {
    fn to_domain(self) -> PortResult<Reservation> {
        Ok(Reservation {
            id: self.id,
            user_id: self.user_id,
            activity_slot_id: self.activity_slot_id,
            note: self.note,
            created_at: self.created_at,
            status: parse_status(&self.status)?,
        })
    }
}

const RESERVATION_DETAILS_SELECT: &str = r#"
    SELECT r.id, r.user_id, r.activity_slot_id, r.note, r.created_at, r.status,
           s.activity_id, s.teacher_id, s.start_date, s.end_date,
           a.name AS activity_name, a.description AS activity_description, a.capacity,
           a.time_window, a.role_id AS activity_role_id, a.created_by AS activity_created_by,
           a.created_at AS activity_created_at,
           u.username, u.email, u.first_name, u.last_name, u.is_active, u.is_superuser,
           u.must_change_password,
           ur.id AS booker_role_id, ur.name AS booker_role_name,
           ur.description AS booker_role_description
    FROM reservations r
    JOIN activity_slots s ON s.id = r.activity_slot_id
    JOIN activities a ON a.id = s.activity_id
    JOIN users u ON u.id = r.user_id
    LEFT JOIN roles ur ON ur.id = u.role_id
"#;

/// A reservation joined with its slot, activity and booker.
#[derive(FromRow)]
struct ReservationDetailsRecord {
    id: Uuid,
    user_id: Uuid,
    activity_slot_id: Uuid,
    note: Option<String>,
    created_at: DateTime<Utc>,
    status: String,
    activity_id: Uuid,
    teacher_id: Option<Uuid>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    activity_name: String,
    activity_description: String,
    capacity: i32,
    time_window: Option<String>,
    activity_role_id: Uuid,
    activity_created_by: Uuid,
    activity_created_at: DateTime<Utc>,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_superuser: bool,
    must_change_password: bool,
    booker_role_id: Option<Uuid>,
    booker_role_name: Option<String>,
    booker_role_description: Option<String>,
}
impl ReservationDetailsRecord {
    fn to_domain(self) -> PortResult<ReservationDetails> {
        Ok(ReservationDetails {
            reservation: Reservation {
                id: self.id,
                user_id: self.user_id,
                activity_slot_id: self.activity_slot_id,
                note: self.note,
                created_at: self.created_at,
                status: parse_status(&self.status)?,
            },
            slot: ActivitySlot {
                id: self.activity_slot_id,
                activity_id: self.activity_id,
                teacher_id: self.teacher_id,
                start_date: self.start_date,
                end_date: self.end_date,
            },
            activity: Activity {
                id: self.activity_id,
                name: self.activity_name,
                description: self.activity_description,
                capacity: self.capacity.max(0) as u32,
                time_window: self.time_window,
                role_id: self.activity_role_id,
                created_by: self.activity_created_by,
                created_at: self.activity_created_at,
            },
            booker: User {
                id: self.user_id,
                username: self.username,
                email: self.email,
                first_name: self.first_name,
                last_name: self.last_name,
                role: role_from(
                    self.booker_role_id,
                    self.booker_role_name,
                    self.booker_role_description,
                ),
                is_active: self.is_active,
                is_superuser: self.is_superuser,
                must_change_password: self.must_change_password,
            },
        })
    }
}

#[derive(FromRow)]
struct SeatCountRecord {
    active_reservations: i64,
    held_by_user: i64,
}

#[derive(FromRow)]
struct StatisticsRecord {
    total: i64,
    pending: i64,
    approved: i64,
    cancelled: i64,
}
impl StatisticsRecord {
    fn to_domain(self) -> ReservationStatistics {
        ReservationStatistics {
            total: self.total.max(0) as u64,
            pending: self.pending.max(0) as u64,
            approved: self.approved.max(0) as u64,
            cancelled: self.cancelled.max(0) as u64,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        Ok(self.get_credentials_by_id(user_id).await?.user)
    }

    async fn get_credentials_by_id(&self, user_id: Uuid) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(&format!("{} WHERE u.id = $1", USER_SELECT))
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected("User", user_id))?;
        Ok(record.to_domain())
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "{} WHERE lower(u.email) = lower($1)",
            USER_SELECT
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(UserRecord::to_domain)
        .ok_or_else(|| PortError::NotFound("User with this email not found".to_string()))
    }

    async fn get_credentials_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        sqlx::query_as::<_, UserRecord>(&format!("{} WHERE u.username = $1", USER_SELECT))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(UserRecord::to_domain)
            .ok_or_else(|| PortError::NotFound("User with this username not found".to_string()))
    }

    async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET hashed_password = $2, must_change_password = FALSE WHERE id = $1",
        )
        .bind(user_id)
        .bind(hashed_password)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn get_role_by_name(&self, name: &str) -> PortResult<Role> {
        sqlx::query_as::<_, RoleRecord>(
            "SELECT id, name, description FROM roles WHERE lower(name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(RoleRecord::to_domain)
        .ok_or_else(|| PortError::NotFound(format!("Role {} not found", name)))
    }

    async fn list_activities(&self, scope: ActivityScope) -> PortResult<Vec<Activity>> {
        const SELECT: &str = "SELECT id, name, description, capacity, time_window, role_id, created_by, created_at FROM activities";
        let records = match scope {
            ActivityScope::All => {
                sqlx::query_as::<_, ActivityRecord>(&format!("{} ORDER BY created_at, name", SELECT))
                    .fetch_all(&self.pool)
                    .await
            }
            ActivityScope::Role(role_id) => {
                sqlx::query_as::<_, ActivityRecord>(&format!(
                    "{} WHERE role_id = $1 ORDER BY created_at, name",
                    SELECT
                ))
                .bind(role_id)
                .fetch_all(&self.pool)
                .await
            }
            ActivityScope::Nothing => return Ok(Vec::new()),
        }
        .map_err(unexpected)?;

        Ok(records.into_iter().map(ActivityRecord::to_domain).collect())
    }

    async fn get_activity(&self, activity_id: Uuid) -> PortResult<Activity> {
        let record = sqlx::query_as::<_, ActivityRecord>(
            "SELECT id, name, description, capacity, time_window, role_id, created_by, created_at FROM activities WHERE id = $1",
        )
        .bind(activity_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected("Activity", activity_id))?;
        Ok(record.to_domain())
    }

    async fn create_activity(
        &self,
        new: NewActivity,
    ) -> PortResult<(Activity, Vec<ActivitySlot>)> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let activity = sqlx::query_as::<_, ActivityRecord>(
            r#"
            INSERT INTO activities (id, name, description, capacity, time_window, role_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, description, capacity, time_window, role_id, created_by, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.capacity as i32)
        .bind(&new.time_window)
        .bind(new.role_id)
        .bind(new.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?
        .to_domain();

        let mut slots = Vec::with_capacity(new.slots.len());
        for slot in new.slots {
            let record = sqlx::query_as::<_, SlotRecord>(
                r#"
                INSERT INTO activity_slots (id, activity_id, teacher_id, start_date, end_date)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, activity_id, teacher_id, start_date, end_date
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(activity.id)
            .bind(slot.teacher_id)
            .bind(slot.start_date)
            .bind(slot.end_date)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            slots.push(record.to_domain());
        }

        tx.commit().await.map_err(unexpected)?;
        Ok((activity, slots))
    }

    async fn delete_activity(&self, activity_id: Uuid) -> PortResult<()> {
        // Slots and their reservations go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Activity {} not found", activity_id)));
        }
        Ok(())
    }

    async fn list_slots_in_range(
        &self,
        activity_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PortResult<Vec<ActivitySlot>> {
        let records = sqlx::query_as::<_, SlotRecord>(
            r#"
            SELECT id, activity_id, teacher_id, start_date, end_date
            FROM activity_slots
            WHERE activity_id = $1 AND start_date >= $2 AND start_date <= $3
            ORDER BY start_date
            "#,
        )
        .bind(activity_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(SlotRecord::to_domain).collect())
    }

    async fn admit_reservation(
        &self,
        draft: ReservationDraft,
        guard: AdmissionGuard<'_>,
    ) -> CoreResult<Reservation> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let snapshot = lock_snapshot(&mut *tx, draft.activity_slot_id, draft.user_id).await?;

        // Dropping the transaction on rejection rolls it back.
        guard(snapshot.as_ref())?;

        let inserted = sqlx::query_as::<_, ReservationRecord>(
            r#"
            INSERT INTO reservations (id, user_id, activity_slot_id, note, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, activity_slot_id, note, created_at, status
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(draft.user_id)
        .bind(draft.activity_slot_id)
        .bind(&draft.note)
        .bind(draft.created_at)
        .bind(ReservationStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_or_unexpected(e, draft.activity_slot_id, draft.user_id))?;

        tx.commit().await.map_err(unexpected)?;
        Ok(inserted.to_domain()?)
    }

    async fn get_reservation(&self, reservation_id: Uuid) -> PortResult<ReservationDetails> {
        sqlx::query_as::<_, ReservationDetailsRecord>(&format!(
            "{} WHERE r.id = $1",
            RESERVATION_DETAILS_SELECT
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Reservation {} not found", reservation_id)))?
        .to_domain()
    }

    async fn list_reservations(
        &self,
        scope: ReservationScope,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<ReservationDetails>> {
        let (filter, subject) = match scope {
            ReservationScope::AssignedTeacher(teacher_id) => ("s.teacher_id = $1", teacher_id),
            ReservationScope::Owner(user_id) => ("r.user_id = $1", user_id),
        };
        let records = sqlx::query_as::<_, ReservationDetailsRecord>(&format!(
            "{} WHERE {} AND s.end_date >= $2 ORDER BY s.start_date, r.created_at",
            RESERVATION_DETAILS_SELECT, filter
        ))
        .bind(subject)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records
            .into_iter()
            .map(ReservationDetailsRecord::to_domain)
            .collect()
    }

    async fn save_reservation(&self, reservation: &Reservation) -> CoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        write_reservation(&mut *conn, reservation).await
    }

    async fn reactivate_reservation(
        &self,
        reservation: &Reservation,
        guard: AdmissionGuard<'_>,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let snapshot =
            lock_snapshot(&mut *tx, reservation.activity_slot_id, reservation.user_id).await?;
        guard(snapshot.as_ref())?;

        write_reservation(&mut *tx, reservation).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn delete_reservation(&self, reservation_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Reservation {} not found",
                reservation_id
            )));
        }
        Ok(())
    }

    async fn reservation_statistics(&self) -> PortResult<ReservationStatistics> {
        let record = sqlx::query_as::<_, StatisticsRecord>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                   COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled
            FROM reservations
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn create_user(&self, user: NewUser) -> PortResult<User> {
        // E-mails are matched case-insensitively and have no unique index.
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, hashed_password,
                               role_id, must_change_password)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE NOT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($3))
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.hashed_password)
        .bind(user.role_id)
        .bind(user.must_change_password)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        let (user_id,) = inserted.ok_or_else(|| {
            PortError::Unexpected(format!("A user with email {} already exists", user.email))
        })?;
        self.get_user_by_id(user_id).await
    }
}

//=========================================================================================
// Shared Reservation Statements
//=========================================================================================

/// Loads the admission snapshot for a slot and user. The slot row stays
/// locked until the surrounding transaction ends, which serializes every
/// admission and reactivation on that slot.
async fn lock_snapshot(
    conn: &mut PgConnection,
    slot_id: Uuid,
    user_id: Uuid,
) -> PortResult<Option<AdmissionSnapshot>> {
    let slot = sqlx::query_as::<_, SlotRecord>(
        "SELECT id, activity_id, teacher_id, start_date, end_date FROM activity_slots WHERE id = $1 FOR UPDATE",
    )
    .bind(slot_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(unexpected)?;

    let Some(slot) = slot else {
        return Ok(None);
    };

    let activity = sqlx::query_as::<_, ActivityRecord>(
        "SELECT id, name, description, capacity, time_window, role_id, created_by, created_at FROM activities WHERE id = $1",
    )
    .bind(slot.activity_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(unexpected)?;

    let seats = sqlx::query_as::<_, SeatCountRecord>(
        r#"
        SELECT COUNT(*) AS active_reservations,
               COUNT(*) FILTER (WHERE user_id = $2) AS held_by_user
        FROM reservations
        WHERE activity_slot_id = $1 AND status <> 'cancelled'
        "#,
    )
    .bind(slot.id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(unexpected)?;

    Ok(Some(AdmissionSnapshot {
        slot: slot.to_domain(),
        activity: activity.to_domain(),
        active_reservations: seats.active_reservations.max(0) as u32,
        held_by_user: seats.held_by_user.max(0) as u32,
    }))
}

async fn write_reservation(conn: &mut PgConnection, reservation: &Reservation) -> CoreResult<()> {
    let result = sqlx::query("UPDATE reservations SET note = $2, status = $3 WHERE id = $1")
        .bind(reservation.id)
        .bind(&reservation.note)
        .bind(reservation.status.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            duplicate_or_unexpected(e, reservation.activity_slot_id, reservation.user_id)
        })?;

    if result.rows_affected() == 0 {
        return Err(PortError::NotFound(format!("Reservation {} not found", reservation.id)).into());
    }
    Ok(())
}
