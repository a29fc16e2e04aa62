use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    DeliveryResult, InvitationListQuery, RegisterPatientRequest, ResendInvitationRequest,
    SendInvitationRequest, SendOtpRequest, VerifyInvitationResponse, VerifyOtpRequest,
};
use crate::services::{DeliveryGateway, InvitationService, RegistrationService};

fn professional_id(user: &User) -> Result<Uuid, AppError> {
    if !user.is_professional() {
        return Err(AppError::Forbidden(
            "Only professionals can manage invitations".to_string(),
        ));
    }
    Uuid::parse_str(user.professional_ref())
        .map_err(|_| AppError::ValidationError("Invalid professional identifier".to_string()))
}

fn delivery_summary(results: &[DeliveryResult]) -> Vec<Value> {
    results
        .iter()
        .map(|r| {
            json!({
                "channel": r.channel,
                "success": r.success,
                "error": r.error
            })
        })
        .collect()
}

#[axum::debug_handler]
pub async fn send_invitation(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SendInvitationRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let professional_id = professional_id(&user)?;
    let service = InvitationService::new(&config);

    let (invitation, results) = service
        .send_invitation(professional_id, request, auth.token())
        .await?;

    let all_failed = !results.is_empty() && results.iter().all(|r| !r.success);
    let mut body = json!({
        "success": true,
        "data": {
            "invitation": invitation,
            "delivery": delivery_summary(&results)
        }
    });
    if all_failed {
        body["warning"] =
            json!("Invitation was created but delivery failed on all channels");
    }

    Ok((StatusCode::CREATED, Json(body)))
}

/// Public endpoint used by the registration form to prefill patient
/// details from a code.
#[axum::debug_handler]
pub async fn verify_invitation(
    State(config): State<Arc<AppConfig>>,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let service = InvitationService::new(&config);

    let invitation = service.find_valid_by_code(&code, None).await?;
    let response = VerifyInvitationResponse::from(&invitation);

    Ok(Json(json!({ "success": true, "data": response })))
}

#[axum::debug_handler]
pub async fn list_invitations(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<InvitationListQuery>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = InvitationService::new(&config);

    let invitations = service
        .list_invitations(professional_id, query, auth.token())
        .await?;

    let total = invitations.len();
    Ok(Json(json!({
        "success": true,
        "data": { "invitations": invitations, "total": total }
    })))
}

#[axum::debug_handler]
pub async fn get_invitation(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = InvitationService::new(&config);

    let invitation = service
        .get_invitation(invitation_id, professional_id, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": invitation })))
}

#[axum::debug_handler]
pub async fn invitation_stats(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = InvitationService::new(&config);

    let stats = service
        .invitation_stats(professional_id, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": stats })))
}

#[axum::debug_handler]
pub async fn cancel_invitation(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invitation_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = InvitationService::new(&config);

    let invitation = service
        .cancel_invitation(invitation_id, professional_id, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Invitation cancelled",
        "data": invitation
    })))
}

#[axum::debug_handler]
pub async fn resend_invitation(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(invitation_id): Path<Uuid>,
    Json(request): Json<ResendInvitationRequest>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = InvitationService::new(&config);

    let (invitation, results) = service
        .resend_invitation(invitation_id, professional_id, request, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "invitation": invitation,
            "delivery": delivery_summary(&results)
        }
    })))
}

/// Public: redeem an invitation code into an account, profile and
/// session token.
#[axum::debug_handler]
pub async fn register_patient(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = RegistrationService::new(&config);

    let outcome = service.register_patient(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Registration complete",
            "data": outcome
        })),
    ))
}

#[axum::debug_handler]
pub async fn send_otp(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let gateway = DeliveryGateway::new(&config);

    let result = gateway.send_otp(&request.phone).await;
    if !result.success {
        return Err(AppError::ExternalService(
            result
                .error
                .unwrap_or_else(|| "Could not send verification code".to_string()),
        ));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Verification code sent"
    })))
}

#[axum::debug_handler]
pub async fn verify_otp(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<Value>, AppError> {
    let gateway = DeliveryGateway::new(&config);

    if !gateway.check_otp(&request.phone, &request.code).await {
        return Err(AppError::BadRequest(
            "Invalid verification code".to_string(),
        ));
    }

    Ok(Json(json!({ "success": true, "data": { "verified": true } })))
}
