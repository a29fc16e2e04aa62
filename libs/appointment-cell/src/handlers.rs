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

use patient_cell::services::PatientService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CancelAppointmentRequest, CompleteAppointmentRequest, CreateAppointmentRequest,
    RescheduleAppointmentRequest, ReserveAppointmentRequest, SlotQuery, UpdateScheduleRequest,
};
use crate::services::{AvailabilityService, BookingService, ScheduleService};

fn professional_id(user: &User) -> Result<Uuid, AppError> {
    if !user.is_professional() {
        return Err(AppError::Forbidden(
            "Only professionals can perform this action".to_string(),
        ));
    }
    Uuid::parse_str(user.professional_ref())
        .map_err(|_| AppError::ValidationError("Invalid professional identifier".to_string()))
}

#[axum::debug_handler]
pub async fn get_slots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    // Professionals default to themselves; patients to their assigned
    // professional.
    let professional_id = match query.professional_id {
        Some(id) => id,
        None if user.is_professional() => professional_id(&user)?,
        None => {
            let profile = PatientService::new(&config)
                .get_by_user_id(&user.id, auth.token())
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            profile
                .and_then(|p| p.assigned_professional_id)
                .ok_or_else(|| {
                    AppError::ValidationError(
                        "No professional assigned and none specified".to_string(),
                    )
                })?
        }
    };

    let service = AvailabilityService::new(&config);
    let slots = service
        .available_slots(professional_id, query.date, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "date": query.date, "slots": slots }
    })))
}

#[axum::debug_handler]
pub async fn get_schedule(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = ScheduleService::new(&config);

    let week = service.get_schedule(professional_id, auth.token()).await?;

    Ok(Json(json!({ "success": true, "data": { "week_schedule": week } })))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let professional_id = professional_id(&user)?;
    let service = ScheduleService::new(&config);

    let template = service
        .upsert_schedule(professional_id, request.week_schedule, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": template })))
}

#[axum::debug_handler]
pub async fn reserve_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReserveAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = BookingService::new(&config);

    let appointment = service.reserve(&user, request, auth.token()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": appointment })),
    ))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let professional_id = professional_id(&user)?;
    let service = BookingService::new(&config);

    let appointment = service
        .create_appointment(professional_id, request, auth.token())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": appointment })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&config);

    let appointments = service.list_for(&user, auth.token()).await?;

    let total = appointments.len();
    Ok(Json(json!({
        "success": true,
        "data": { "appointments": appointments, "total": total }
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&config);

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": appointment })))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    professional_id(&user)?;
    let service = BookingService::new(&config);

    let appointment = service.confirm(appointment_id, auth.token()).await?;

    Ok(Json(json!({ "success": true, "data": appointment })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    professional_id(&user)?;
    let service = BookingService::new(&config);

    let appointment = service
        .complete(appointment_id, request, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": appointment })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&config);

    let appointment = service
        .cancel(appointment_id, request, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": appointment })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&config);

    let appointment = service
        .reschedule(appointment_id, request, auth.token())
        .await?;

    Ok(Json(json!({ "success": true, "data": appointment })))
}
