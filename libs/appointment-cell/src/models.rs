use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Reserved,
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Whether an appointment in this status keeps its slot unavailable.
    pub fn blocks_slot(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Reserved
                | AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppointmentStatus::Reserved => "reserved",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation,
    FollowUp,
    Therapy,
    Emergency,
}

impl Default for AppointmentType {
    fn default() -> Self {
        AppointmentType::Consultation
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Weekly availability template: weekday key ("0" = Sunday .. "6" =
/// Saturday) to the ordered slot labels offered on that weekday.
pub type WeekSchedule = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub professional_id: Uuid,
    pub week_schedule: WeekSchedule,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A slot label annotated with availability for one professional and date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    pub time: String,
    pub available: bool,
    pub professional_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub professional_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveAppointmentRequest {
    pub professional_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScheduleRequest {
    pub week_schedule: WeekSchedule,
}
