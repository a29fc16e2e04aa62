use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::router::appointment_routes;
use shared_config::ReservationGuard;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn bearer(config: &TestConfig, user: &TestUser) -> String {
    format!(
        "Bearer {}",
        JwtTestUtils::create_test_token(user, &config.jwt_secret, Some(1))
    )
}

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn appointment_row(professional_id: Uuid, patient_id: Uuid, time: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "professional_id": professional_id,
        "patient_id": patient_id,
        "patient_name": "Ana Gomez",
        "date": "2026-01-05",
        "time": time,
        "appointment_type": "consultation",
        "status": "reserved",
        "cancellation_reason": null,
        "notes": null,
        "created_at": "2026-01-02T10:00:00Z",
        "updated_at": "2026-01-02T10:00:00Z"
    })
}

fn patient_profile(user_id: &str, professional_id: Uuid) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "user_id": Uuid::parse_str(user_id).unwrap(),
        "assigned_professional_id": professional_id,
        "created_by": professional_id,
        "personal_data": {
            "first_name": "Ana",
            "last_name": "Gomez",
            "email": "ana@example.com"
        }
    })
}

#[tokio::test]
async fn unconfigured_professional_gets_default_weekday_slots() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;

    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::patient("ana@example.com");
    let app = appointment_routes(config.to_arc());

    // 2026-01-05 is a Monday
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/available-slots?date=2026-01-05&professional_id={}",
                    professional_id
                ))
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    let slots = body["data"]["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 10);
    assert!(slots.iter().all(|s| s["available"] == json!(true)));
    assert_eq!(slots[0]["time"], "09:00");
    assert_eq!(slots[9]["time"], "15:30");
}

#[tokio::test]
async fn sunday_has_no_slots_and_skips_the_booking_lookup() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;

    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::patient("ana@example.com");
    let app = appointment_routes(config.to_arc());

    // 2026-01-04 is a Sunday
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/available-slots?date=2026-01-04&professional_id={}",
                    professional_id
                ))
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    assert_eq!(body["data"]["slots"], json!([]));
}

#[tokio::test]
async fn booked_slot_shows_as_unavailable() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "time"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "time": "09:00" }])),
        )
        .mount(&store)
        .await;

    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::patient("ana@example.com");
    let app = appointment_routes(config.to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/available-slots?date=2026-01-05&professional_id={}",
                    professional_id
                ))
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    let slots = body["data"]["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 10);
    for slot in slots {
        let expected = slot["time"] != "09:00";
        assert_eq!(slot["available"], json!(expected));
    }
}

#[tokio::test]
async fn empty_stored_template_falls_back_to_the_default_week() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();

    // A wholesale replace with {} leaves an empty map in the store; reads
    // must still offer the default week.
    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "professional_id": professional_id,
            "week_schedule": {},
            "updated_at": "2026-01-01T00:00:00Z"
        }])))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;

    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::patient("ana@example.com");
    let app = appointment_routes(config.to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/available-slots?date=2026-01-05&professional_id={}",
                    professional_id
                ))
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    let slots = body["data"]["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 10);
    assert_eq!(slots[0]["time"], "09:00");
}

#[tokio::test]
async fn custom_template_replaces_the_default_week() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/availability_templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "professional_id": professional_id,
            "week_schedule": { "1": ["08:00", "08:30"] },
            "updated_at": "2026-01-01T00:00:00Z"
        }])))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;

    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::patient("ana@example.com");
    let app = appointment_routes(config.to_arc());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/available-slots?date=2026-01-05&professional_id={}",
                    professional_id
                ))
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    let times: Vec<&str> = body["data"]["slots"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["time"].as_str().unwrap())
        .collect();
    assert_eq!(times, vec!["08:00", "08:30"]);
}

#[tokio::test]
async fn legacy_guard_lets_concurrent_reservations_collide() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::patient("ana@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([patient_profile(&user.id, professional_id)])),
        )
        .mount(&store)
        .await;

    // The same slot is inserted twice; nothing stops the second write.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(
            professional_id,
            Uuid::new_v4(),
            "09:00"
        )])))
        .expect(2)
        .mount(&store)
        .await;

    let app = appointment_routes(config.to_arc());
    let request_body = json!({ "date": "2026-01-05", "time": "09:00" });

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/reserve")
                    .header(header::AUTHORIZATION, bearer(&config, &user))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(request_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

#[tokio::test]
async fn atomic_guard_reports_taken_slot_as_conflict() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let config = TestConfig::default()
        .with_store_url(&store.uri())
        .with_reservation_guard(ReservationGuard::Atomic);
    let user = TestUser::patient("ana@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([patient_profile(&user.id, professional_id)])),
        )
        .mount(&store)
        .await;

    // The stored procedure returns no row when the slot is already held.
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reserve_appointment_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&store)
        .await;

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reserve")
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "date": "2026-01-05", "time": "09:00" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_body(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn completed_appointment_cannot_be_cancelled() {
    let store = MockServer::start().await;
    let professional_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let config = TestConfig::default().with_store_url(&store.uri());
    let user = TestUser::professional("pro@example.com");

    let mut row = appointment_row(professional_id, Uuid::new_v4(), "09:00");
    row["id"] = json!(appointment_id);
    row["status"] = json!("completed");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&store)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;

    let app = appointment_routes(config.to_arc());
    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/{}/cancel", appointment_id))
                .header(header::AUTHORIZATION, bearer(&config, &user))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "reason": "no show" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
