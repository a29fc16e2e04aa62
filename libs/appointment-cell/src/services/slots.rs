use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{SlotView, WeekSchedule};
use crate::services::schedule::ScheduleService;

/// Slot labels offered on a working day when a professional has not
/// customized their template. Morning and afternoon blocks, 30 minutes.
pub const DEFAULT_DAY_SLOTS: [&str; 10] = [
    "09:00", "09:30", "10:00", "10:30", "11:00", "11:30", "14:00", "14:30", "15:00", "15:30",
];

/// Statuses that keep a slot blocked, in PostgREST `in.(...)` form.
const BLOCKING_STATUSES: &str = "reserved,scheduled,confirmed";

/// Default weekly template: Monday through Friday, weekends closed.
/// Conjured at read time, never written to the store.
pub fn default_week() -> WeekSchedule {
    let day: Vec<String> = DEFAULT_DAY_SLOTS.iter().map(|s| s.to_string()).collect();
    let mut week = WeekSchedule::new();
    for key in ["1", "2", "3", "4", "5"] {
        week.insert(key.to_string(), day.clone());
    }
    week
}

/// Weekday key for a date: "0" = Sunday through "6" = Saturday.
pub fn day_key(date: NaiveDate) -> String {
    date.weekday().num_days_from_sunday().to_string()
}

/// Labels a template offers for a date. A missing or empty entry means
/// the professional does not work that weekday.
pub fn day_labels(schedule: &WeekSchedule, date: NaiveDate) -> Vec<String> {
    schedule.get(&day_key(date)).cloned().unwrap_or_default()
}

/// Annotate template labels against the set of taken labels. Order and
/// duplicates in the template are preserved verbatim.
pub fn annotate(labels: &[String], taken: &HashSet<String>, professional_id: Uuid) -> Vec<SlotView> {
    labels
        .iter()
        .map(|label| SlotView {
            time: label.clone(),
            available: !taken.contains(label),
            professional_id,
        })
        .collect()
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    schedule: ScheduleService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedule: ScheduleService::new(config),
        }
    }

    /// Resolve the bookable slots for one professional and date: template
    /// labels for that weekday, minus labels held by blocking appointments.
    pub async fn available_slots(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotView>, AppError> {
        let week = self
            .schedule
            .get_schedule(professional_id, auth_token)
            .await?;

        let labels = day_labels(&week, date);
        if labels.is_empty() {
            debug!(
                "No working hours for professional {} on {}",
                professional_id, date
            );
            return Ok(Vec::new());
        }

        let taken = self.taken_labels(professional_id, date, auth_token).await?;
        Ok(annotate(&labels, &taken, professional_id))
    }

    async fn taken_labels(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<HashSet<String>, AppError> {
        let path = format!(
            "/rest/v1/appointments?professional_id=eq.{}&date=eq.{}&status=in.({})&select=time",
            professional_id, date, BLOCKING_STATUSES
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.get("time")
                    .and_then(|t| t.as_str())
                    .map(|t| t.to_string())
            })
            .collect())
    }
}
