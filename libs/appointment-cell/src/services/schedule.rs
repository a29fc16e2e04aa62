use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{AvailabilityTemplate, WeekSchedule};
use crate::services::slots;

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Weekly template for a professional. Falls back to the built-in
    /// Monday-to-Friday default when no row exists or the stored map is
    /// empty; the default is never persisted, so new professionals are
    /// bookable without setup.
    pub async fn get_schedule(
        &self,
        professional_id: Uuid,
        auth_token: &str,
    ) -> Result<WeekSchedule, AppError> {
        let path = format!(
            "/rest/v1/availability_templates?professional_id=eq.{}",
            professional_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => {
                let template: AvailabilityTemplate = serde_json::from_value(row)
                    .map_err(|e| AppError::Internal(format!("Malformed template row: {}", e)))?;
                if template.week_schedule.is_empty() {
                    debug!(
                        "Empty availability template for professional {}, using default week",
                        professional_id
                    );
                    return Ok(slots::default_week());
                }
                Ok(template.week_schedule)
            }
            None => {
                debug!(
                    "No availability template for professional {}, using default week",
                    professional_id
                );
                Ok(slots::default_week())
            }
        }
    }

    /// Replace the whole weekly template in one write. Upsert keyed on the
    /// professional so first-time saves and later edits take the same path.
    pub async fn upsert_schedule(
        &self,
        professional_id: Uuid,
        week_schedule: WeekSchedule,
        auth_token: &str,
    ) -> Result<AvailabilityTemplate, AppError> {
        let row = json!({
            "professional_id": professional_id,
            "week_schedule": week_schedule,
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/availability_templates?on_conflict=professional_id",
                Some(auth_token),
                Some(row),
                Some(headers),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Database("Template upsert returned no row".to_string()))?;

        serde_json::from_value(row)
            .map_err(|e| AppError::Internal(format!("Malformed template row: {}", e)))
    }
}
