use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreatePatientRequest, UpdatePatientRequest};
use crate::services::PatientService;

fn professional_id(user: &User) -> Result<Uuid, AppError> {
    if !user.is_professional() {
        return Err(AppError::Forbidden(
            "Only professionals can manage patients".to_string(),
        ));
    }
    Uuid::parse_str(user.professional_ref())
        .map_err(|_| AppError::ValidationError("Invalid professional identifier".to_string()))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = PatientService::new(&config);

    let patient = service
        .create_patient(professional_id, request, auth.token())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true, "data": patient })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patient = service
        .get_patient(patient_id, auth.token())
        .await
        .map_err(|e| AppError::NotFound(e.to_string()))?;

    Ok(Json(json!({ "success": true, "data": patient })))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    professional_id(&user)?;
    let service = PatientService::new(&config);

    let patient = service
        .update_patient(patient_id, request, auth.token())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true, "data": patient })))
}

#[axum::debug_handler]
pub async fn list_patients(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = PatientService::new(&config);

    let patients = service
        .list_patients(professional_id, auth.token())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let total = patients.len();
    Ok(Json(json!({
        "success": true,
        "data": { "patients": patients, "total": total }
    })))
}

#[axum::debug_handler]
pub async fn patient_count(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = PatientService::new(&config);

    let count = service
        .patient_count(professional_id, auth.token())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true, "data": { "count": count } })))
}
