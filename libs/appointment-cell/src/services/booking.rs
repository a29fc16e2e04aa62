use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use patient_cell::services::PatientService;
use shared_config::{AppConfig, ReservationGuard};
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentStatus, CancelAppointmentRequest, CompleteAppointmentRequest,
    CreateAppointmentRequest, RescheduleAppointmentRequest, ReserveAppointmentRequest,
};
use crate::services::lifecycle;

pub struct BookingService {
    supabase: SupabaseClient,
    patients: PatientService,
    guard: ReservationGuard,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
            guard: config.reservation_guard,
        }
    }

    /// Patient-initiated reservation. The professional defaults to the
    /// one assigned on the patient's profile; the request may override it.
    pub async fn reserve(
        &self,
        user: &User,
        request: ReserveAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let profile = self
            .patients
            .get_by_user_id(&user.id, auth_token)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound("Patient profile not found".to_string()))?;

        let professional_id = request
            .professional_id
            .or(profile.assigned_professional_id)
            .ok_or_else(|| {
                AppError::ValidationError(
                    "No professional assigned and none specified".to_string(),
                )
            })?;

        let mut patient_name = format!(
            "{} {}",
            profile.personal_data.first_name, profile.personal_data.last_name
        )
        .trim()
        .to_string();
        if patient_name.is_empty() {
            patient_name = user.full_name();
        }

        debug!(
            "Reserving {} {} for patient {} with professional {}",
            request.date, request.time, profile.id, professional_id
        );

        match self.guard {
            ReservationGuard::Legacy => {
                self.insert_appointment(
                    professional_id,
                    profile.id,
                    &patient_name,
                    &request,
                    auth_token,
                )
                .await
            }
            ReservationGuard::Atomic => {
                self.reserve_atomic(
                    professional_id,
                    profile.id,
                    &patient_name,
                    &request,
                    auth_token,
                )
                .await
            }
        }
    }

    /// Plain insert. Availability was only checked at read time, so two
    /// concurrent reservations of the same slot both succeed.
    async fn insert_appointment(
        &self,
        professional_id: Uuid,
        patient_id: Uuid,
        patient_name: &str,
        request: &ReserveAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let row = json!({
            "professional_id": professional_id,
            "patient_id": patient_id,
            "patient_name": patient_name,
            "date": request.date,
            "time": request.time,
            "appointment_type": request.appointment_type,
            "status": AppointmentStatus::Reserved,
            "notes": request.notes,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let created = self
            .supabase
            .insert_returning("appointments", Some(auth_token), row)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        parse_row(created)
    }

    /// Conditional insert through a stored procedure that checks the slot
    /// inside the database. No row back means another booking won.
    async fn reserve_atomic(
        &self,
        professional_id: Uuid,
        patient_id: Uuid,
        patient_name: &str,
        request: &ReserveAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let args = json!({
            "p_professional_id": professional_id,
            "p_patient_id": patient_id,
            "p_patient_name": patient_name,
            "p_date": request.date,
            "p_time": request.time,
            "p_appointment_type": request.appointment_type,
            "p_notes": request.notes
        });

        let rows: Vec<Value> = self
            .supabase
            .rpc("reserve_appointment_slot", Some(auth_token), args)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.starts_with("Conflict") {
                    AppError::Conflict("Slot is no longer available".to_string())
                } else {
                    AppError::Database(msg)
                }
            })?;

        let row = rows.into_iter().next().ok_or_else(|| {
            AppError::Conflict("Slot is no longer available".to_string())
        })?;

        parse_row(row)
    }

    /// Professional-initiated booking, created directly as scheduled.
    pub async fn create_appointment(
        &self,
        professional_id: Uuid,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let row = json!({
            "professional_id": professional_id,
            "patient_id": request.patient_id,
            "patient_name": request.patient_name,
            "date": request.date,
            "time": request.time,
            "appointment_type": request.appointment_type,
            "status": AppointmentStatus::Scheduled,
            "notes": request.notes,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let created = self
            .supabase
            .insert_returning("appointments", Some(auth_token), row)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        parse_row(created)
    }

    /// Appointments visible to the caller: their book for professionals,
    /// their own bookings for patients.
    pub async fn list_for(&self, user: &User, auth_token: &str) -> Result<Vec<Appointment>, AppError> {
        let path = if user.is_professional() {
            let professional_id = Uuid::parse_str(user.professional_ref()).map_err(|_| {
                AppError::ValidationError("Invalid professional identifier".to_string())
            })?;
            format!(
                "/rest/v1/appointments?professional_id=eq.{}&order=date.asc,time.asc",
                professional_id
            )
        } else {
            let profile = self
                .patients
                .get_by_user_id(&user.id, auth_token)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            let Some(profile) = profile else {
                return Ok(Vec::new());
            };
            format!(
                "/rest/v1/appointments?patient_id=eq.{}&order=date.asc,time.asc",
                profile.id
            )
        };

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(parse_row).collect()
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;
        parse_row(row)
    }

    pub async fn confirm(&self, id: Uuid, auth_token: &str) -> Result<Appointment, AppError> {
        self.transition(id, AppointmentStatus::Confirmed, serde_json::Map::new(), auth_token)
            .await
    }

    pub async fn complete(
        &self,
        id: Uuid,
        request: CompleteAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let mut extra = serde_json::Map::new();
        if let Some(notes) = request.notes {
            extra.insert("notes".to_string(), json!(notes));
        }
        self.transition(id, AppointmentStatus::Completed, extra, auth_token)
            .await
    }

    pub async fn cancel(
        &self,
        id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let mut extra = serde_json::Map::new();
        if let Some(reason) = request.reason {
            extra.insert("cancellation_reason".to_string(), json!(reason));
        }
        self.transition(id, AppointmentStatus::Cancelled, extra, auth_token)
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        to: AppointmentStatus,
        mut patch: serde_json::Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let current = self.get_appointment(id, auth_token).await?;
        lifecycle::ensure_transition(current.status, to)?;

        patch.insert("status".to_string(), json!(to));
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        info!("Appointment {} moving {} -> {}", id, current.status, to);
        self.patch_appointment(id, Value::Object(patch), auth_token)
            .await
    }

    /// Move a live appointment to a new date and time. Status is kept:
    /// a confirmed appointment stays confirmed at its new slot.
    pub async fn reschedule(
        &self,
        id: Uuid,
        request: RescheduleAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let current = self.get_appointment(id, auth_token).await?;
        if !current.status.blocks_slot() {
            return Err(AppError::Conflict(format!(
                "Cannot reschedule a {} appointment",
                current.status
            )));
        }

        let patch = json!({
            "date": request.date,
            "time": request.time,
            "updated_at": Utc::now().to_rfc3339()
        });

        self.patch_appointment(id, patch, auth_token).await
    }

    async fn patch_appointment(
        &self,
        id: Uuid,
        patch: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppError> {
        let filter = format!("id=eq.{}", id);
        let rows = self
            .supabase
            .update_returning("appointments", &filter, Some(auth_token), patch)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;
        parse_row(row)
    }
}

fn parse_row(row: Value) -> Result<Appointment, AppError> {
    serde_json::from_value(row)
        .map_err(|e| AppError::Internal(format!("Malformed appointment row: {}", e)))
}
