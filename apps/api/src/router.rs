use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::router::{appointment_routes, availability_routes};
use invitation_cell::router::{invitation_routes, registration_routes};
use patient_cell::router::patient_routes;
use shared_config::AppConfig;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/appointments", appointment_routes(config.clone()))
        .nest("/availability", availability_routes(config.clone()))
        .nest("/invitations", invitation_routes(config.clone()))
        .nest("/auth", registration_routes(config.clone()))
        .nest("/patients", patient_routes(config))
}
