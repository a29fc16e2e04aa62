use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

/// Weekly schedule template: read and wholesale replace.
pub fn availability_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(get_schedule))
        .route("/", put(update_schedule))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}

pub fn appointment_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", post(create_appointment))
        .route("/", get(list_appointments))
        .route("/available-slots", get(get_slots))
        .route("/reserve", post(reserve_appointment))
        .route("/{id}", get(get_appointment))
        .route("/{id}/confirm", put(confirm_appointment))
        .route("/{id}/complete", put(complete_appointment))
        .route("/{id}/cancel", put(cancel_appointment))
        .route("/{id}/reschedule", put(reschedule_appointment))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config)
}
