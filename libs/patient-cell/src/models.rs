use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assigned_professional_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub personal_data: PersonalData,
    #[serde(default)]
    pub emergency_contact: EmergencyContact,
    #[serde(default)]
    pub medical_history: MedicalHistory,
    #[serde(default)]
    pub consents: Consents,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalData {
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
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicalHistory {
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub previous_surgeries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consents {
    pub terms_and_conditions: bool,
    pub privacy: bool,
    pub communications: bool,
}

impl Default for Consents {
    fn default() -> Self {
        Self {
            terms_and_conditions: true,
            privacy: true,
            communications: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    pub user_id: Uuid,
    pub personal_data: PersonalData,
    #[serde(default)]
    pub emergency_contact: EmergencyContact,
    #[serde(default)]
    pub medical_history: MedicalHistory,
    #[serde(default)]
    pub consents: Consents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub personal_data: Option<PersonalData>,
    pub emergency_contact: Option<EmergencyContact>,
    pub medical_history: Option<MedicalHistory>,
    pub consents: Option<Consents>,
}
