use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

/// Invitation management. Verification is public (the registration form
/// calls it before any account exists); everything else is behind auth.
pub fn invitation_routes(config: Arc<AppConfig>) -> Router {
    let public = Router::new()
        .route("/verify/{code}", get(verify_invitation))
        .with_state(config.clone());

    let protected = Router::new()
        .route("/send", post(send_invitation))
        .route("/", get(list_invitations))
        .route("/stats", get(invitation_stats))
        .route("/{id}", get(get_invitation))
        .route("/{id}/cancel", put(cancel_invitation))
        .route("/{id}/resend", post(resend_invitation))
        .layer(middleware::from_fn_with_state(config.clone(), auth_middleware))
        .with_state(config);

    public.merge(protected)
}

/// Public registration flow: invitation redemption plus phone OTP.
pub fn registration_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/register/patient", post(register_patient))
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .with_state(config)
}
