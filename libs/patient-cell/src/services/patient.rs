use anyhow::{anyhow, Result};
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{CreatePatientRequest, Patient, UpdatePatientRequest};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Direct professional-driven profile creation (the invitation path
    /// goes through the registration materializer instead).
    pub async fn create_patient(
        &self,
        professional_id: Uuid,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient> {
        debug!("Creating patient profile for user: {}", request.user_id);

        let row = json!({
            "user_id": request.user_id,
            "assigned_professional_id": professional_id,
            "created_by": professional_id,
            "personal_data": request.personal_data,
            "emergency_contact": request.emergency_contact,
            "medical_history": request.medical_history,
            "consents": request.consents,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let created = self
            .supabase
            .insert_returning("patients", Some(auth_token), row)
            .await?;

        let patient: Patient = serde_json::from_value(created)?;
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Patient not found"))?;
        let patient: Patient = serde_json::from_value(row)?;
        Ok(patient)
    }

    /// Profile lookup by the owning user identity. Used by the booking
    /// path to resolve a patient's assigned professional.
    pub async fn get_by_user_id(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Option<Patient>> {
        let path = format!("/rest/v1/patients?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient> {
        debug!("Updating patient: {}", patient_id);

        let mut patch = serde_json::Map::new();
        if let Some(personal_data) = request.personal_data {
            patch.insert("personal_data".to_string(), json!(personal_data));
        }
        if let Some(emergency_contact) = request.emergency_contact {
            patch.insert("emergency_contact".to_string(), json!(emergency_contact));
        }
        if let Some(medical_history) = request.medical_history {
            patch.insert("medical_history".to_string(), json!(medical_history));
        }
        if let Some(consents) = request.consents {
            patch.insert("consents".to_string(), json!(consents));
        }
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let filter = format!("id=eq.{}", patient_id);
        let result = self
            .supabase
            .update_returning("patients", &filter, Some(auth_token), Value::Object(patch))
            .await?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Patient not found"))?;
        let patient: Patient = serde_json::from_value(row)?;
        Ok(patient)
    }

    pub async fn list_patients(
        &self,
        professional_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Patient>> {
        let path = format!(
            "/rest/v1/patients?assigned_professional_id=eq.{}&order=created_at.desc",
            professional_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let patients: Vec<Patient> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Patient>, _>>()?;

        Ok(patients)
    }

    /// Derived read-time aggregate; the original kept a mutable counter on
    /// the professional record, which drifted.
    pub async fn patient_count(&self, professional_id: Uuid, auth_token: &str) -> Result<usize> {
        let path = format!(
            "/rest/v1/patients?assigned_professional_id=eq.{}&select=id",
            professional_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(result.len())
    }
}
