//! End-to-end tests that drive the real router over the in-memory database.

use api_lib::adapters::password::hash_password;
use api_lib::config::Config;
use api_lib::web::{build_router, state::AppState, token::JwtManager, token::TokenType};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use reservation_core::{
    Activity, ActivitySlot, InMemoryDatabase, Reservation, ReservationStatus, Role, User,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const PASSWORD: &str = "Temporary#2024";

struct TestApp {
    router: Router,
    db: Arc<InMemoryDatabase>,
    jwt: JwtManager,
    student: Role,
    teacher: Role,
    admin: Role,
}

fn role(name: &str) -> Role {
    Role {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: String::new(),
    }
}

fn config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        database_max_connections: 1,
        log_level: tracing::Level::INFO,
        jwt_secret: "integration-secret".to_string(),
        access_token_ttl_minutes: 60,
        refresh_token_ttl_hours: 24,
        cors_allowed_origin: "http://localhost:3000".to_string(),
    }
}

async fn app() -> TestApp {
    let db = Arc::new(InMemoryDatabase::new());
    let (student, teacher, admin) = (role("student"), role("teacher"), role("admin"));
    for r in [&student, &teacher, &admin] {
        db.insert_role(r.clone()).await;
    }

    let config = Arc::new(config());
    let state = Arc::new(AppState::new(db.clone(), config));
    TestApp {
        router: build_router(state.clone()),
        jwt: state.jwt.clone(),
        db,
        student,
        teacher,
        admin,
    }
}

impl TestApp {
    async fn user_with_hash(&self, role: Option<&Role>, hashed_password: String) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            username: format!("user{}", &id.simple().to_string()[..8]),
            email: format!("{}@school.sk", id.simple()),
            first_name: "Eva".to_string(),
            last_name: "Kovacova".to_string(),
            role: role.cloned(),
            is_active: true,
            is_superuser: false,
            must_change_password: true,
        };
        self.db.insert_user(user.clone(), hashed_password).await;
        user
    }

    async fn user(&self, role: Option<&Role>) -> User {
        self.user_with_hash(role, "not-a-real-hash".to_string()).await
    }

    async fn user_with_password(&self, role: Option<&Role>) -> User {
        self.user_with_hash(role, hash_password(PASSWORD).unwrap()).await
    }

    fn token(&self, user: &User) -> String {
        self.jwt.issue(user, TokenType::Access, Utc::now()).unwrap()
    }

    async fn slot(
        &self,
        scoped_to: &Role,
        capacity: u32,
        starts_in: Duration,
        teacher_id: Option<Uuid>,
    ) -> ActivitySlot {
        let activity = Activity {
            id: Uuid::new_v4(),
            name: format!("{} club", scoped_to.name),
            description: "After-school activity".to_string(),
            capacity,
            time_window: Some("Tue 14:00-15:30".to_string()),
            role_id: scoped_to.id,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let start = Utc::now() + starts_in;
        let slot = ActivitySlot {
            id: Uuid::new_v4(),
            activity_id: activity.id,
            teacher_id,
            start_date: start,
            end_date: start + Duration::minutes(90),
        };
        self.db.insert_activity(activity).await;
        self.db.insert_slot(slot.clone()).await;
        slot
    }

    async fn send_with_header(
        &self,
        method: Method,
        uri: &str,
        authorization: Option<String>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.respond(request).await
    }

    /// Sends `body` verbatim, with a content type only when one is given.
    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        content_type: Option<&str>,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        self.respond(builder.body(Body::from(body)).unwrap()).await
    }

    async fn respond(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.send_with_header(method, uri, token.map(|t| format!("Bearer {}", t)), body)
            .await
    }
}

//=========================================================================================
// Token validation
//=========================================================================================

#[tokio::test]
async fn expired_token_is_reported_before_any_role_check() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let expired = app
        .jwt
        .issue(&student, TokenType::Access, Utc::now() - Duration::hours(3))
        .unwrap();

    for uri in ["/api/reservations/statistics", "/api/reservations", "/api/activities"] {
        let (status, body) = app.send(Method::GET, uri, Some(&expired), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["code"], "token_expired");
    }
}

#[tokio::test]
async fn missing_or_malformed_credentials_are_unauthorized() {
    let app = app().await;

    let (status, body) = app.send(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "no_token");

    let (status, body) = app
        .send_with_header(Method::GET, "/api/auth/me", Some("Token abc".to_string()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_token_header");

    let (status, body) = app
        .send(Method::GET, "/api/auth/me", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn inactive_user_token_is_rejected() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let token = app.token(&student);
    app.db.set_user_active(student.id, false).await;

    let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "user_inactive");
}

#[tokio::test]
async fn role_is_read_live_not_from_the_token() {
    let app = app().await;
    let user = app.user(Some(&app.student)).await;
    let token = app.token(&user);

    let (status, body) = app
        .send(Method::GET, "/api/reservations/statistics", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_permissions");

    app.db.set_user_role(user.id, Some(app.teacher.clone())).await;
    let (status, body) = app
        .send(Method::GET, "/api/reservations/statistics", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

//=========================================================================================
// Role predicates
//=========================================================================================

#[tokio::test]
async fn role_specific_denials_do_not_mutate() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let slot = app.slot(&app.student, 5, Duration::days(2), None).await;

    let uri = format!("/api/activities/{}", slot.activity_id);
    let (status, body) = app
        .send(Method::DELETE, &uri, Some(&app.token(&teacher)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_admin");

    let admin = app.user(Some(&app.admin)).await;
    let (status, _) = app
        .send(Method::DELETE, &uri, Some(&app.token(&admin)), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .send(Method::DELETE, &uri, Some(&app.token(&admin)), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "activity_not_found");
}

#[tokio::test]
async fn roleless_user_cannot_book() {
    let app = app().await;
    let nobody = app.user(None).await;
    let slot = app.slot(&app.student, 5, Duration::days(2), None).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&nobody)),
            Some(json!({ "activity_slot": slot.id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "no_role");
}

//=========================================================================================
// Reservation admission
//=========================================================================================

#[tokio::test]
async fn student_books_a_slot_of_their_role() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let slot = app.slot(&app.student, 5, Duration::days(2), None).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&student)),
            Some(json!({ "activity_slot": slot.id, "note": "Bringing my own racket" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["status_label"], "Pending");
    assert_eq!(body["note"], "Bringing my own racket");
    assert_eq!(body["user"]["id"], student.id.to_string());
    assert_eq!(body["activity_slot"]["id"], slot.id.to_string());
    assert_eq!(body["activity_slot"]["activity"]["capacity"], 5);
}

#[tokio::test]
async fn student_cannot_book_teacher_scoped_activity() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let slot = app.slot(&app.teacher, 5, Duration::days(2), None).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&student)),
            Some(json!({ "activity_slot": slot.id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_permissions");
}

#[tokio::test]
async fn full_slot_cites_count_and_capacity() {
    let app = app().await;
    let slot = app.slot(&app.student, 2, Duration::days(2), None).await;
    for _ in 0..2 {
        let other = app.user(Some(&app.student)).await;
        app.db
            .insert_reservation(Reservation {
                id: Uuid::new_v4(),
                user_id: other.id,
                activity_slot_id: slot.id,
                note: None,
                created_at: Utc::now(),
                status: ReservationStatus::Approved,
            })
            .await;
    }

    let late = app.user(Some(&app.student)).await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&late)),
            Some(json!({ "activity_slot": slot.id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "capacity_reached");
    assert!(body["detail"].as_str().unwrap().contains("2/2"));
}

#[tokio::test]
async fn started_slot_is_not_bookable() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let slot = app.slot(&app.student, 5, -Duration::minutes(10), None).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&student)),
            Some(json!({ "activity_slot": slot.id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "slot_not_bookable");
}

#[tokio::test]
async fn second_booking_of_same_slot_is_a_duplicate() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let token = app.token(&student);
    let slot = app.slot(&app.student, 5, Duration::days(2), None).await;
    let body = json!({ "activity_slot": slot.id });

    let (status, _) = app
        .send(Method::POST, "/api/reservations", Some(&token), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, "/api/reservations", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "duplicate_reservation");
}

//=========================================================================================
// Malformed requests
//=========================================================================================

fn assert_validation_error(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_eq!(body["code"], "validation_error");
    assert!(!body["detail"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn undecodable_body_is_a_validation_error() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&student)),
            Some(json!({ "activity_slot": "not-a-uuid" })),
        )
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send_raw(
            Method::POST,
            "/api/auth/login",
            None,
            Some("application/json"),
            "garbage",
        )
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send_raw(Method::POST, "/api/auth/login", None, None, "garbage")
        .await;
    assert_validation_error(status, &body);
}

#[tokio::test]
async fn non_uuid_path_is_a_validation_error() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let token = app.token(&teacher);

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/reservations/123/status",
            Some(&token),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_validation_error(status, &body);

    let (status, body) = app
        .send(
            Method::GET,
            "/api/activity-slots/123/2025-03-01/2025-03-02",
            Some(&token),
            None,
        )
        .await;
    assert_validation_error(status, &body);
}

//=========================================================================================
// Status changes, updates and deletion
//=========================================================================================

async fn booked(app: &TestApp, teacher: &User) -> (User, Uuid) {
    let student = app.user(Some(&app.student)).await;
    let slot = app
        .slot(&app.student, 5, Duration::days(2), Some(teacher.id))
        .await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(&student)),
            Some(json!({ "activity_slot": slot.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();
    (student, id)
}

#[tokio::test]
async fn assigned_teacher_rejects_unknown_status() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let (_, reservation_id) = booked(&app, &teacher).await;
    let uri = format!("/api/reservations/{}/status", reservation_id);

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&app.token(&teacher)),
            Some(json!({ "status": "invalid_value" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_action");

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&app.token(&teacher)),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["status_label"], "Approved");
}

#[tokio::test]
async fn cancelling_twice_keeps_it_cancelled() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let (_, reservation_id) = booked(&app, &teacher).await;
    let uri = format!("/api/reservations/{}/status", reservation_id);

    for _ in 0..2 {
        let (status, body) = app
            .send(
                Method::PATCH,
                &uri,
                Some(&app.token(&teacher)),
                Some(json!({ "status": "cancelled" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "cancelled");
    }
}

#[tokio::test]
async fn admin_status_change_rejects_unknown_status() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let admin = app.user(Some(&app.admin)).await;
    let (_, reservation_id) = booked(&app, &teacher).await;

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/reservations/{}/status", reservation_id),
            Some(&app.token(&admin)),
            Some(json!({ "status": "invalid_value" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_action");
}

async fn book_slot(app: &TestApp, student: &User, slot_id: Uuid) -> Uuid {
    let (status, body) = app
        .send(
            Method::POST,
            "/api/reservations",
            Some(&app.token(student)),
            Some(json!({ "activity_slot": slot_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    Uuid::parse_str(body["id"].as_str().unwrap()).unwrap()
}

async fn set_status(
    app: &TestApp,
    token: &str,
    reservation_id: Uuid,
    value: &str,
) -> (StatusCode, Value) {
    app.send(
        Method::PATCH,
        &format!("/api/reservations/{}/status", reservation_id),
        Some(token),
        Some(json!({ "status": value })),
    )
    .await
}

#[tokio::test]
async fn reapproving_cancelled_booking_rechecks_seats() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let teacher_token = app.token(&teacher);
    let first_student = app.user(Some(&app.student)).await;
    let second_student = app.user(Some(&app.student)).await;
    let slot = app
        .slot(&app.student, 1, Duration::days(2), Some(teacher.id))
        .await;

    let first = book_slot(&app, &first_student, slot.id).await;
    let (status, _) = set_status(&app, &teacher_token, first, "cancelled").await;
    assert_eq!(status, StatusCode::OK);
    let second = book_slot(&app, &first_student, slot.id).await;

    let (status, body) = set_status(&app, &teacher_token, first, "approved").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "duplicate_reservation");

    let (status, _) = set_status(&app, &teacher_token, second, "cancelled").await;
    assert_eq!(status, StatusCode::OK);
    book_slot(&app, &second_student, slot.id).await;

    let (status, body) = set_status(&app, &teacher_token, second, "approved").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "capacity_reached");
}

#[tokio::test]
async fn owner_edits_note_but_cannot_approve() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let (student, reservation_id) = booked(&app, &teacher).await;
    let uri = format!("/api/reservations/{}", reservation_id);

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&app.token(&student)),
            Some(json!({ "note": "Arriving ten minutes late" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["note"], "Arriving ten minutes late");

    let (status, body) = app
        .send(
            Method::PATCH,
            &uri,
            Some(&app.token(&student)),
            Some(json!({ "status": "approved" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_permissions");

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/reservations/{}", Uuid::new_v4()),
            Some(&app.token(&student)),
            Some(json!({ "note": "?" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "reservation_not_found");
}

#[tokio::test]
async fn only_the_owner_deletes() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let (student, reservation_id) = booked(&app, &teacher).await;
    let uri = format!("/api/reservations/{}", reservation_id);

    let (status, body) = app
        .send(Method::DELETE, &uri, Some(&app.token(&teacher)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "not_owner");

    let (status, _) = app
        .send(Method::DELETE, &uri, Some(&app.token(&student)), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

//=========================================================================================
// Visibility
//=========================================================================================

#[tokio::test]
async fn listing_embeds_booker_for_teachers_and_requester_otherwise() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let (student, _) = booked(&app, &teacher).await;

    let (status, body) = app
        .send(Method::GET, "/api/reservations", Some(&app.token(&teacher)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["user"]["id"], student.id.to_string());

    let (_, body) = app
        .send(Method::GET, "/api/reservations", Some(&app.token(&student)), None)
        .await;
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["user"]["id"], student.id.to_string());

    let other_teacher = app.user(Some(&app.teacher)).await;
    let (_, body) = app
        .send(
            Method::GET,
            "/api/reservations",
            Some(&app.token(&other_teacher)),
            None,
        )
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn activities_are_filtered_by_role() {
    let app = app().await;
    app.slot(&app.student, 5, Duration::days(1), None).await;
    app.slot(&app.teacher, 5, Duration::days(1), None).await;

    let student = app.user(Some(&app.student)).await;
    let (_, body) = app
        .send(Method::GET, "/api/activities", Some(&app.token(&student)), None)
        .await;
    let visible = body.as_array().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["role"], app.student.id.to_string());

    let teacher = app.user(Some(&app.teacher)).await;
    let (_, body) = app
        .send(Method::GET, "/api/activities", Some(&app.token(&teacher)), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let nobody = app.user(None).await;
    let (_, body) = app
        .send(Method::GET, "/api/activities", Some(&app.token(&nobody)), None)
        .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn slot_range_validates_dates_and_visibility() {
    let app = app().await;
    let student = app.user(Some(&app.student)).await;
    let token = app.token(&student);
    let slot = app.slot(&app.student, 5, Duration::days(1), None).await;
    let day = slot.start_date.format("%Y-%m-%d").to_string();

    let uri = format!("/api/activity-slots/{}/{}/{}", slot.activity_id, day, day);
    let (status, body) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let slots = body.as_array().unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0]["activity"]["id"], slot.activity_id.to_string());

    let uri = format!("/api/activity-slots/{}/03-01-2025/{}", slot.activity_id, day);
    let (status, body) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_date_format");

    let uri = format!(
        "/api/activity-slots/{}/2025-03-02/2025-03-01",
        slot.activity_id
    );
    let (status, body) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_date_range");

    let hidden = app.slot(&app.teacher, 5, Duration::days(1), None).await;
    let uri = format!("/api/activity-slots/{}/{}/{}", hidden.activity_id, day, day);
    let (status, body) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_permissions");

    let uri = format!("/api/activity-slots/{}/{}/{}", Uuid::new_v4(), day, day);
    let (status, body) = app.send(Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "activity_not_found");
}

//=========================================================================================
// Activities
//=========================================================================================

#[tokio::test]
async fn teacher_creates_activity_with_slots() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let token = app.token(&teacher);
    let start = Utc::now() + Duration::days(7);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({
                "name": "Robotics",
                "capacity": 12,
                "time_window": "Thu 15:00-16:30",
                "role": "Student",
                "slots": [{
                    "start_date": start,
                    "end_date": start + Duration::minutes(90),
                    "teacher": teacher.id
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Robotics");
    assert_eq!(body["role"], app.student.id.to_string());
    assert_eq!(body["slots"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "name": "Chess", "capacity": 0, "role": "student" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/activities",
            Some(&token),
            Some(json!({ "name": "Chess", "capacity": 8, "role": "parent" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "role_not_found");

    let student = app.user(Some(&app.student)).await;
    let (status, body) = app
        .send(
            Method::POST,
            "/api/activities",
            Some(&app.token(&student)),
            Some(json!({ "name": "Chess", "capacity": 8, "role": "student" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_permissions");
}

#[tokio::test]
async fn slot_teacher_must_be_an_existing_teacher() {
    let app = app().await;
    let teacher = app.user(Some(&app.teacher)).await;
    let student = app.user(Some(&app.student)).await;
    let token = app.token(&teacher);
    let start = Utc::now() + Duration::days(7);

    for assigned in [Uuid::new_v4(), student.id] {
        let (status, body) = app
            .send(
                Method::POST,
                "/api/activities",
                Some(&token),
                Some(json!({
                    "name": "Robotics",
                    "capacity": 12,
                    "role": "student",
                    "slots": [{
                        "start_date": start,
                        "end_date": start + Duration::minutes(90),
                        "teacher": assigned
                    }]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body["code"], "validation_error");
    }

    let (_, listed) = app
        .send(Method::GET, "/api/activities", Some(&token), None)
        .await;
    assert!(listed.as_array().unwrap().is_empty());
}

//=========================================================================================
// Login, refresh and password change
//=========================================================================================

#[tokio::test]
async fn login_accepts_email_or_username() {
    let app = app().await;
    let user = app.user_with_password(Some(&app.student)).await;

    for identifier in [user.email.clone(), user.username.clone()] {
        let (status, body) = app
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": identifier, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["must_change_password"], true);
        assert_eq!(body["user"]["role"], "student");
        assert_eq!(body["user"]["firstName"], "Eva");
        assert!(body["token"].as_str().is_some());
        assert!(body["refresh_token"].as_str().is_some());
    }

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": user.email, "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_credentials");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": user.email })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_credentials");
}

#[tokio::test]
async fn refresh_issues_a_new_access_token() {
    let app = app().await;
    let user = app.user(Some(&app.student)).await;
    let refresh = app
        .jwt
        .issue(&user, TokenType::Refresh, Utc::now())
        .unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["token"].as_str().unwrap().to_string();
    let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": access })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "invalid_refresh_token");

    let (status, body) = app
        .send(Method::POST, "/api/auth/refresh", None, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_refresh_token");
}

#[tokio::test]
async fn password_change_clears_the_flag() {
    let app = app().await;
    let user = app.user_with_password(Some(&app.student)).await;
    let token = app.token(&user);
    let uri = "/api/auth/change-password";

    let (status, body) = app
        .send(
            Method::POST,
            uri,
            Some(&token),
            Some(json!({ "old_password": "nope", "new_password": "Fresh#2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "incorrect_old_password");

    let (status, body) = app
        .send(
            Method::POST,
            uri,
            Some(&token),
            Some(json!({ "old_password": PASSWORD, "new_password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "same_password");

    let (status, body) = app
        .send(Method::POST, uri, Some(&token), Some(json!({ "old_password": PASSWORD })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_passwords");

    let (status, _) = app
        .send(
            Method::POST,
            uri,
            Some(&token),
            Some(json!({ "old_password": PASSWORD, "new_password": "Fresh#2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(body["must_change_password"], false);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": user.email, "password": "Fresh#2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
