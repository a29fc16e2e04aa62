use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use patient_cell::models::Consents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelKind {
    Sms,
    Email,
    Whatsapp,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelKind::Sms => "SMS",
            ChannelKind::Email => "EMAIL",
            ChannelKind::Whatsapp => "WHATSAPP",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryOutcome {
    Sent,
    Delivered,
    Failed,
    Bounced,
}

/// Append-only record of one delivery attempt, stored on the invitation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub channel: ChannelKind,
    pub status: DeliveryOutcome,
    pub provider_id: Option<String>,
    pub provider_status: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Outcome of a single provider call. Providers report failure through
/// this value rather than an error, so one dead channel never aborts
/// the fan-out.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub channel: ChannelKind,
    pub success: bool,
    pub message_id: Option<String>,
    pub provider_status: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl DeliveryResult {
    pub fn failure(channel: ChannelKind, error: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            message_id: None,
            provider_status: None,
            error: Some(error.into()),
            error_code: None,
        }
    }

    pub fn to_log_entry(&self) -> DeliveryLogEntry {
        DeliveryLogEntry {
            channel: self.channel,
            status: if self.success {
                DeliveryOutcome::Sent
            } else {
                DeliveryOutcome::Failed
            },
            provider_id: self.message_id.clone(),
            provider_status: self.provider_status.clone(),
            error_message: self.error.clone(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Registered,
    Expired,
    Cancelled,
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Registered => "registered",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Patient details captured by the professional when inviting. This
/// snapshot seeds the account and profile at redemption time, including
/// the extended prefill fields (emergency contact, medical background).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientIntake {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub current_medications: Option<String>,
    pub notes: Option<String>,
}

impl PatientIntake {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub code: String,
    pub professional_id: Uuid,
    /// Denormalized contact fields; `patient_data` is the authoritative
    /// snapshot and these are the redemption-time fallback.
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub patient_phone: Option<String>,
    pub custom_message: Option<String>,
    #[serde(default)]
    pub patient_data: PatientIntake,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,
    pub status: InvitationStatus,
    #[serde(default)]
    pub delivery_logs: Vec<DeliveryLogEntry>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Email]
}

impl Invitation {
    /// A pending invitation whose deadline has not passed.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && self.expires_at > now
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendInvitationRequest {
    /// Either a single display name or separate first/last parts.
    pub patient_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Address to deliver to when it differs from the patient's own.
    pub invitation_email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    pub current_medications: Option<String>,
    pub notes: Option<String>,
    pub custom_message: Option<String>,
    pub channels: Option<Vec<ChannelKind>>,
    pub expiration_days: Option<i64>,
}

impl SendInvitationRequest {
    /// Resolve the name fields: explicit first/last win, otherwise the
    /// display name is split on its first space.
    pub fn resolved_names(&self) -> (String, String) {
        if self.first_name.is_some() || self.last_name.is_some() {
            return (
                self.first_name.clone().unwrap_or_default(),
                self.last_name.clone().unwrap_or_default(),
            );
        }
        match &self.patient_name {
            Some(name) => match name.trim().split_once(' ') {
                Some((first, last)) => (first.to_string(), last.trim().to_string()),
                None => (name.trim().to_string(), String::new()),
            },
            None => (String::new(), String::new()),
        }
    }

    /// The address invitations are delivered to.
    pub fn delivery_email(&self) -> Option<&str> {
        self.invitation_email.as_deref().or(self.email.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResendInvitationRequest {
    pub channels: Option<Vec<ChannelKind>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvitationListQuery {
    pub status: Option<InvitationStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPatientRequest {
    pub invite_code: String,
    pub password: String,
    pub phone: Option<String>,
    pub consents: Option<Consents>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendOtpRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: String,
    pub code: String,
}

/// What the public verify endpoint discloses: enough to prefill the
/// registration form, nothing operational (no logs, no channel detail).
#[derive(Debug, Clone, Serialize)]
pub struct VerifyInvitationResponse {
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Invitation> for VerifyInvitationResponse {
    fn from(invitation: &Invitation) -> Self {
        Self {
            code: invitation.code.clone(),
            first_name: invitation.patient_data.first_name.clone(),
            last_name: invitation.patient_data.last_name.clone(),
            email: invitation.patient_data.email.clone(),
            expires_at: invitation.expires_at,
        }
    }
}

/// Per-status tallies, derived from rows at read time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InvitationStats {
    pub total: usize,
    pub pending: usize,
    pub registered: usize,
    pub expired: usize,
    pub cancelled: usize,
}
