use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use invitation_cell::router::registration_routes;
use shared_utils::jwt::validate_token;
use shared_utils::test_utils::TestConfig;

async fn read_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn invitation_row(code: &str, status: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "code": code,
        "professional_id": Uuid::new_v4(),
        "patient_data": {
            "first_name": "Ana",
            "last_name": "Gomez",
            "email": "ana@example.com",
            "phone": "+34600111222"
        },
        "channels": ["EMAIL"],
        "status": status,
        "delivery_logs": [],
        "expires_at": "2030-01-01T00:00:00Z",
        "used_at": null,
        "cancelled_at": null,
        "created_at": "2026-01-01T10:00:00Z",
        "updated_at": "2026-01-01T10:00:00Z"
    })
}

fn account_row(email: &str, is_registered: bool) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "email": email,
        "first_name": "Ana",
        "last_name": "Gomez",
        "is_registered": is_registered
    })
}

fn register_request(code: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/register/patient")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "invite_code": code, "password": "long-enough-password" }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn redeeming_a_valid_invitation_creates_account_profile_and_session() {
    let store = MockServer::start().await;
    let sendgrid = MockServer::start().await;
    let config = TestConfig::default()
        .with_store_url(&store.uri())
        .with_sendgrid_url(&sendgrid.uri());

    Mock::given(method("GET"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("code", "eq.CODE1234"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([invitation_row("CODE1234", "pending")])),
        )
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.ana@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([account_row("ana@example.com", true)])),
        )
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{ "id": Uuid::new_v4() }])),
        )
        .expect(1)
        .mount(&store)
        .await;
    // The invitation flips to registered only after both rows exist.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("status", "eq.pending"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([invitation_row("CODE1234", "registered")])),
        )
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&sendgrid)
        .await;

    let app = registration_routes(config.to_arc());
    let response = app.oneshot(register_request("CODE1234")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_body(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["user"]["role"], "patient");

    let token = body["data"]["token"].as_str().unwrap();
    let user = validate_token(token, &config.jwt_secret).unwrap();
    assert_eq!(user.email.as_deref(), Some("ana@example.com"));
    assert_eq!(user.role.as_deref(), Some("patient"));
}

#[tokio::test]
async fn redemption_materializes_the_extended_intake_snapshot() {
    let store = MockServer::start().await;
    let sendgrid = MockServer::start().await;
    let config = TestConfig::default()
        .with_store_url(&store.uri())
        .with_sendgrid_url(&sendgrid.uri());

    let mut row = invitation_row("CODE1234", "pending");
    row["patient_data"] = json!({
        "first_name": "Ana",
        "last_name": "Gomez",
        "email": "ana@example.com",
        "phone": "+34600111222",
        "gender": "female",
        "address": "Calle Mayor 1",
        "emergency_contact": "Luisa Vecina",
        "emergency_phone": "+34600999888",
        "allergies": "penicillin",
        "current_medications": "ibuprofen"
    });

    Mock::given(method("GET"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("code", "eq.CODE1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([account_row("ana@example.com", true)])),
        )
        .mount(&store)
        .await;
    // The profile insert carries the full prefill, not just the name.
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .and(body_string_contains("Luisa Vecina"))
        .and(body_string_contains("+34600999888"))
        .and(body_string_contains("penicillin"))
        .and(body_string_contains("ibuprofen"))
        .and(body_string_contains("Calle Mayor 1"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{ "id": Uuid::new_v4() }])),
        )
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("status", "eq.pending"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([invitation_row("CODE1234", "registered")])),
        )
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&sendgrid)
        .await;

    let app = registration_routes(config.to_arc());
    let response = app.oneshot(register_request("CODE1234")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn fully_registered_email_is_rejected_with_conflict() {
    let store = MockServer::start().await;
    let config = TestConfig::default().with_store_url(&store.uri());

    Mock::given(method("GET"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("code", "eq.CODE1234"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([invitation_row("CODE1234", "pending")])),
        )
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.ana@example.com"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([account_row("ana@example.com", true)])),
        )
        .mount(&store)
        .await;
    // Nothing is written: no account, no profile, no invitation flip.
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/invitations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;

    let app = registration_routes(config.to_arc());
    let response = app.oneshot(register_request("CODE1234")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn profile_failure_rolls_the_account_back() {
    let store = MockServer::start().await;
    let config = TestConfig::default().with_store_url(&store.uri());

    Mock::given(method("GET"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("code", "eq.CODE1234"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([invitation_row("CODE1234", "pending")])),
        )
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.ana@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([account_row("ana@example.com", true)])),
        )
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "message": "insert failed"
        })))
        .expect(1)
        .mount(&store)
        .await;
    // Compensation: the fresh account is deleted, the invitation stays pending.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/invitations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&store)
        .await;

    let app = registration_routes(config.to_arc());
    let response = app.oneshot(register_request("CODE1234")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn losing_the_redemption_race_undoes_both_rows() {
    let store = MockServer::start().await;
    let config = TestConfig::default().with_store_url(&store.uri());

    Mock::given(method("GET"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("code", "eq.CODE1234"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([invitation_row("CODE1234", "pending")])),
        )
        .mount(&store)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("email", "eq.ana@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!([account_row("ana@example.com", true)])),
        )
        .mount(&store)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{ "id": Uuid::new_v4() }])),
        )
        .mount(&store)
        .await;
    // Another redemption already flipped the invitation: the guarded
    // patch matches no rows.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/invitations"))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&store)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&store)
        .await;

    let app = registration_routes(config.to_arc());
    let response = app.oneshot(register_request("CODE1234")).await.unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
