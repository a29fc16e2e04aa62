use chrono::Utc;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::{jwt, password};

use crate::models::{Invitation, PatientIntake, RegisterPatientRequest};
use crate::services::invitation::InvitationService;

const MIN_PASSWORD_LENGTH: usize = 8;
const SESSION_HOURS: i64 = 24;

/// Account row as stored. `is_registered` distinguishes a real account
/// from a placeholder created ahead of redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountRow {
    id: Uuid,
    email: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    is_registered: bool,
}

#[derive(Debug, Serialize)]
pub struct RegistrationOutcome {
    pub token: String,
    pub user: Value,
    pub patient: Value,
}

/// Turns a valid invitation plus a password into a working account: the
/// materialization step of the invitation lifecycle.
pub struct RegistrationService {
    supabase: SupabaseClient,
    invitations: InvitationService,
    jwt_secret: String,
}

impl RegistrationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            invitations: InvitationService::new(config),
            jwt_secret: config.supabase_jwt_secret.clone(),
        }
    }

    /// Redeem an invitation. The store offers no transactions over REST,
    /// so the sequence compensates on failure: a created account is
    /// deleted (or a completed placeholder reverted) if the profile
    /// insert fails, and the invitation is only flipped to registered
    /// once both rows exist.
    pub async fn register_patient(
        &self,
        request: RegisterPatientRequest,
    ) -> Result<RegistrationOutcome, AppError> {
        if request.password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let invitation = self
            .invitations
            .find_valid_by_code(&request.invite_code, None)
            .await?;

        let intake = effective_intake(&invitation);
        if intake.email.is_empty() {
            return Err(AppError::ValidationError(
                "Invitation carries no email address".to_string(),
            ));
        }

        let password_hash = password::hash_password(&request.password)
            .map_err(|e| AppError::Internal(format!("Could not hash password: {}", e)))?;

        let existing = self.find_account_by_email(&intake.email).await?;

        let (account, created_fresh) = match existing {
            Some(account) if account.is_registered => {
                return Err(AppError::Conflict(
                    "An account with this email already exists".to_string(),
                ));
            }
            Some(placeholder) => {
                let completed = self
                    .complete_placeholder(&placeholder, &intake, &password_hash)
                    .await?;
                (completed, false)
            }
            None => {
                let created = self.create_account(&intake, &password_hash).await?;
                (created, true)
            }
        };

        let phone = request
            .phone
            .clone()
            .or_else(|| intake.phone.clone());

        let patient = match self
            .create_profile(&account, &invitation, &intake, phone, &request)
            .await
        {
            Ok(patient) => patient,
            Err(e) => {
                error!("Profile creation failed for invitation {}: {}", invitation.code, e);
                self.rollback_account(&account, created_fresh).await;
                return Err(AppError::Internal(
                    "Could not complete registration".to_string(),
                ));
            }
        };

        if let Err(e) = self.invitations.mark_registered(invitation.id, None).await {
            // Lost the race against a concurrent redemption of the same
            // code. Undo our rows so exactly one registration stands.
            warn!("Invitation {} flip failed: {}", invitation.code, e);
            self.rollback_profile(&patient).await;
            self.rollback_account(&account, created_fresh).await;
            return Err(e);
        }

        info!("Invitation {} redeemed by {}", invitation.code, intake.email);

        self.invitations
            .gateway()
            .deliver_welcome(&intake.email, &intake.full_name())
            .await;

        let user = User {
            id: account.id.to_string(),
            email: Some(account.email.clone()),
            role: Some("patient".to_string()),
            first_name: Some(intake.first_name.clone()),
            last_name: Some(intake.last_name.clone()),
            professional_id: None,
            created_at: None,
        };
        let token = jwt::sign_token(&user, &self.jwt_secret, SESSION_HOURS)
            .map_err(AppError::Internal)?;

        Ok(RegistrationOutcome {
            token,
            user: json!({
                "id": account.id,
                "email": account.email,
                "first_name": intake.first_name,
                "last_name": intake.last_name,
                "role": "patient"
            }),
            patient,
        })
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRow>, AppError> {
        let path = format!("/rest/v1/users?email=eq.{}", urlencoding::encode(email));
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| AppError::Internal(format!("Malformed account row: {}", e))),
            None => Ok(None),
        }
    }

    async fn create_account(
        &self,
        intake: &PatientIntake,
        password_hash: &str,
    ) -> Result<AccountRow, AppError> {
        let row = json!({
            "email": intake.email,
            "password_hash": password_hash,
            "first_name": intake.first_name,
            "last_name": intake.last_name,
            "role": "patient",
            "is_registered": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let created = self
            .supabase
            .insert_returning("users", None, row)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        serde_json::from_value(created)
            .map_err(|e| AppError::Internal(format!("Malformed account row: {}", e)))
    }

    /// An account that exists but was never registered (for example one
    /// seeded by an earlier partial flow) is completed in place rather
    /// than duplicated.
    async fn complete_placeholder(
        &self,
        placeholder: &AccountRow,
        intake: &PatientIntake,
        password_hash: &str,
    ) -> Result<AccountRow, AppError> {
        let filter = format!("id=eq.{}", placeholder.id);
        let patch = json!({
            "password_hash": password_hash,
            "first_name": intake.first_name,
            "last_name": intake.last_name,
            "role": "patient",
            "is_registered": true,
            "updated_at": Utc::now().to_rfc3339()
        });

        let rows = self
            .supabase
            .update_returning("users", &filter, None, patch)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Database("Account update returned no row".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| AppError::Internal(format!("Malformed account row: {}", e)))
    }

    async fn create_profile(
        &self,
        account: &AccountRow,
        invitation: &Invitation,
        intake: &PatientIntake,
        phone: Option<String>,
        request: &RegisterPatientRequest,
    ) -> Result<Value, AppError> {
        // Single-valued intake entries become one-element history lists.
        fn as_list(entry: &Option<String>) -> Vec<&String> {
            entry.iter().collect()
        }

        let row = json!({
            "user_id": account.id,
            "assigned_professional_id": invitation.professional_id,
            "created_by": invitation.professional_id,
            "personal_data": {
                "first_name": intake.first_name,
                "last_name": intake.last_name,
                "email": intake.email,
                "phone": phone,
                "date_of_birth": intake.date_of_birth,
                "gender": intake.gender,
                "address": intake.address
            },
            "emergency_contact": {
                "name": intake.emergency_contact,
                "phone": intake.emergency_phone
            },
            "medical_history": {
                "allergies": as_list(&intake.allergies),
                "current_medications": as_list(&intake.current_medications),
                "conditions": as_list(&intake.medical_history),
                "previous_surgeries": []
            },
            "consents": request.consents.clone().unwrap_or_default(),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        self.supabase
            .insert_returning("patients", None, row)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Compensation: delete the account we created, or strip the
    /// registered flag off a placeholder we completed.
    async fn rollback_account(&self, account: &AccountRow, created_fresh: bool) {
        if created_fresh {
            let filter = format!("id=eq.{}", account.id);
            if let Err(e) = self.supabase.delete("users", &filter, None).await {
                error!("Rollback failed, orphan account {}: {}", account.id, e);
            }
        } else {
            let filter = format!("id=eq.{}", account.id);
            let patch = json!({
                "password_hash": Value::Null,
                "is_registered": false,
                "updated_at": Utc::now().to_rfc3339()
            });
            if let Err(e) = self
                .supabase
                .update_returning("users", &filter, None, patch)
                .await
            {
                error!("Rollback failed, account {} left completed: {}", account.id, e);
            }
        }
    }

    async fn rollback_profile(&self, patient: &Value) {
        let Some(id) = patient.get("id").and_then(|v| v.as_str()) else {
            return;
        };
        let filter = format!("id=eq.{}", id);
        if let Err(e) = self.supabase.delete("patients", &filter, None).await {
            error!("Rollback failed, orphan profile {}: {}", id, e);
        }
    }
}

/// Identity fields come from the intake snapshot; the invitation's
/// top-level contact columns fill any gaps left by older records.
fn effective_intake(invitation: &Invitation) -> PatientIntake {
    let mut intake = invitation.patient_data.clone();

    if intake.email.is_empty() {
        intake.email = invitation.patient_email.clone().unwrap_or_default();
    }
    if intake.first_name.is_empty() {
        if let Some(name) = invitation.patient_name.as_deref() {
            match name.trim().split_once(' ') {
                Some((first, last)) => {
                    intake.first_name = first.to_string();
                    intake.last_name = last.trim().to_string();
                }
                None => intake.first_name = name.trim().to_string(),
            }
        }
    }
    if intake.phone.is_none() {
        intake.phone = invitation.patient_phone.clone();
    }

    intake
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvitationStatus, PatientIntake};
    use chrono::Utc;
    use uuid::Uuid;

    fn bare_invitation() -> Invitation {
        Invitation {
            id: Uuid::new_v4(),
            code: "AB12CD34".to_string(),
            professional_id: Uuid::new_v4(),
            patient_name: Some("Ana Gomez".to_string()),
            patient_email: Some("ana@example.com".to_string()),
            patient_phone: Some("+34600111222".to_string()),
            custom_message: None,
            patient_data: PatientIntake::default(),
            channels: vec![],
            status: InvitationStatus::Pending,
            delivery_logs: vec![],
            expires_at: Utc::now() + chrono::Duration::days(7),
            used_at: None,
            cancelled_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn empty_snapshot_falls_back_to_top_level_fields() {
        let intake = effective_intake(&bare_invitation());
        assert_eq!(intake.first_name, "Ana");
        assert_eq!(intake.last_name, "Gomez");
        assert_eq!(intake.email, "ana@example.com");
        assert_eq!(intake.phone.as_deref(), Some("+34600111222"));
    }

    #[test]
    fn populated_snapshot_wins_over_top_level_fields() {
        let mut invitation = bare_invitation();
        invitation.patient_data = PatientIntake {
            first_name: "Maria".to_string(),
            last_name: "Lopez".to_string(),
            email: "maria@example.com".to_string(),
            ..PatientIntake::default()
        };

        let intake = effective_intake(&invitation);
        assert_eq!(intake.first_name, "Maria");
        assert_eq!(intake.email, "maria@example.com");
        // Gaps are still filled from the invitation columns.
        assert_eq!(intake.phone.as_deref(), Some("+34600111222"));
    }
}
