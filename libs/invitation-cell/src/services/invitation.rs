use chrono::{Duration, Utc};
use rand::Rng;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    default_channels, ChannelKind, DeliveryResult, Invitation, InvitationListQuery,
    InvitationStats, InvitationStatus, PatientIntake, ResendInvitationRequest,
    SendInvitationRequest,
};
use crate::services::delivery::DeliveryGateway;

const CODE_LENGTH: usize = 8;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 8;
const DEFAULT_EXPIRATION_DAYS: i64 = 7;
const DEFAULT_PAGE_SIZE: u32 = 50;

/// One candidate invitation code. Uniqueness is checked against the
/// store by the caller.
pub fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

pub struct InvitationService {
    supabase: SupabaseClient,
    gateway: DeliveryGateway,
}

impl InvitationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            gateway: DeliveryGateway::new(config),
        }
    }

    /// Issue an invitation: mint a unique code, fan delivery out over the
    /// requested channels, then persist the invitation with its delivery
    /// logs in a single insert. Delivery failure does not block issuance.
    pub async fn send_invitation(
        &self,
        professional_id: Uuid,
        request: SendInvitationRequest,
        auth_token: &str,
    ) -> Result<(Invitation, Vec<DeliveryResult>), AppError> {
        let (first_name, last_name) = request.resolved_names();
        if first_name.is_empty() {
            return Err(AppError::ValidationError(
                "Patient name is required".to_string(),
            ));
        }

        // The email is required regardless of channel: it also seeds the
        // account at redemption.
        if request.delivery_email().is_none() {
            return Err(AppError::ValidationError(
                "A contact email is required".to_string(),
            ));
        }

        let channels = request.channels.clone().unwrap_or_else(default_channels);
        if channels
            .iter()
            .any(|c| matches!(c, ChannelKind::Sms | ChannelKind::Whatsapp))
            && request.phone.is_none()
        {
            return Err(AppError::ValidationError(
                "A phone number is required for SMS or WhatsApp delivery".to_string(),
            ));
        }

        let expiration_days = request
            .expiration_days
            .unwrap_or(DEFAULT_EXPIRATION_DAYS);
        if expiration_days <= 0 {
            return Err(AppError::ValidationError(
                "expiration_days must be positive".to_string(),
            ));
        }

        let code = self.generate_unique_code(auth_token).await?;

        let intake = PatientIntake {
            first_name,
            last_name,
            email: request.email.clone().unwrap_or_default(),
            phone: request.phone.clone(),
            date_of_birth: request.date_of_birth,
            gender: request.gender.clone(),
            address: request.address.clone(),
            emergency_contact: request.emergency_contact.clone(),
            emergency_phone: request.emergency_phone.clone(),
            medical_history: request.medical_history.clone(),
            allergies: request.allergies.clone(),
            current_medications: request.current_medications.clone(),
            notes: request.notes.clone(),
        };

        let results = self
            .gateway
            .deliver_invitation(
                &code,
                &intake,
                request.delivery_email(),
                &channels,
                request.custom_message.as_deref(),
            )
            .await;
        let logs: Vec<_> = results.iter().map(|r| r.to_log_entry()).collect();

        if results.iter().all(|r| !r.success) {
            warn!("Invitation {} failed on every channel", code);
        }

        let row = json!({
            "code": code,
            "professional_id": professional_id,
            "patient_name": intake.full_name(),
            "patient_email": request.delivery_email(),
            "patient_phone": request.phone,
            "custom_message": request.custom_message,
            "patient_data": intake,
            "channels": channels,
            "status": InvitationStatus::Pending,
            "delivery_logs": logs,
            "expires_at": (Utc::now() + Duration::days(expiration_days)).to_rfc3339(),
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let created = self
            .supabase
            .insert_returning("invitations", Some(auth_token), row)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!("Invitation {} issued by professional {}", created["code"], professional_id);
        Ok((parse_invitation(created)?, results))
    }

    async fn generate_unique_code(&self, auth_token: &str) -> Result<String, AppError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = random_code();
            let path = format!("/rest/v1/invitations?code=eq.{}&select=id", code);
            let existing: Vec<Value> = self
                .supabase
                .request(Method::GET, &path, Some(auth_token), None)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

            if existing.is_empty() {
                return Ok(code);
            }
            debug!("Invitation code collision, retrying");
        }

        Err(AppError::Conflict(
            "Could not generate a unique invitation code".to_string(),
        ))
    }

    /// Look an invitation up by code for redemption or verification.
    /// A pending invitation past its deadline is flipped to expired here,
    /// on read; there is no background sweeper.
    pub async fn find_valid_by_code(
        &self,
        code: &str,
        auth_token: Option<&str>,
    ) -> Result<Invitation, AppError> {
        let code = code.trim().to_uppercase();
        let path = format!(
            "/rest/v1/invitations?code=eq.{}",
            urlencoding::encode(&code)
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Invalid invitation code".to_string()))?;
        let invitation = parse_invitation(row)?;

        // One uniform message for anything unusable: the endpoint is
        // public and must not disclose why a code no longer works.
        match invitation.status {
            InvitationStatus::Pending if !invitation.is_valid(Utc::now()) => {
                self.mark_expired(&invitation, auth_token).await;
                Err(AppError::NotFound("Invitation is no longer valid".to_string()))
            }
            InvitationStatus::Pending => Ok(invitation),
            InvitationStatus::Registered
            | InvitationStatus::Expired
            | InvitationStatus::Cancelled => Err(AppError::NotFound(
                "Invitation is no longer valid".to_string(),
            )),
        }
    }

    /// Best-effort status flip; the read path already returned not-found,
    /// so a failed write only delays the flip to the next read.
    async fn mark_expired(&self, invitation: &Invitation, auth_token: Option<&str>) {
        let filter = format!("id=eq.{}&status=eq.pending", invitation.id);
        let patch = json!({
            "status": InvitationStatus::Expired,
            "updated_at": Utc::now().to_rfc3339()
        });
        if let Err(e) = self
            .supabase
            .update_returning("invitations", &filter, auth_token, patch)
            .await
        {
            warn!("Could not mark invitation {} expired: {}", invitation.id, e);
        }
    }

    pub async fn get_invitation(
        &self,
        id: Uuid,
        professional_id: Uuid,
        auth_token: &str,
    ) -> Result<Invitation, AppError> {
        let path = format!(
            "/rest/v1/invitations?id=eq.{}&professional_id=eq.{}",
            id, professional_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;
        parse_invitation(row)
    }

    /// Withdraw a pending invitation. Anything past pending has nothing
    /// left to cancel.
    pub async fn cancel_invitation(
        &self,
        id: Uuid,
        professional_id: Uuid,
        auth_token: &str,
    ) -> Result<Invitation, AppError> {
        let invitation = self.get_invitation(id, professional_id, auth_token).await?;
        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::NotFound(
                "No pending invitation to cancel".to_string(),
            ));
        }

        let filter = format!("id=eq.{}&status=eq.pending", id);
        let patch = json!({
            "status": InvitationStatus::Cancelled,
            "cancelled_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let rows = self
            .supabase
            .update_returning("invitations", &filter, Some(auth_token), patch)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows.into_iter().next().ok_or_else(|| {
            AppError::NotFound("No pending invitation to cancel".to_string())
        })?;
        parse_invitation(row)
    }

    /// Re-deliver a pending invitation over the same channels (or an
    /// override). New delivery attempts are appended to the existing
    /// logs, never overwriting earlier history.
    pub async fn resend_invitation(
        &self,
        id: Uuid,
        professional_id: Uuid,
        request: ResendInvitationRequest,
        auth_token: &str,
    ) -> Result<(Invitation, Vec<DeliveryResult>), AppError> {
        let invitation = self.get_invitation(id, professional_id, auth_token).await?;

        if invitation.status != InvitationStatus::Pending {
            return Err(AppError::Conflict(
                "Only pending invitations can be resent".to_string(),
            ));
        }
        if !invitation.is_valid(Utc::now()) {
            self.mark_expired(&invitation, Some(auth_token)).await;
            return Err(AppError::Conflict("Invitation has expired".to_string()));
        }

        let channels = request.channels.unwrap_or_else(|| invitation.channels.clone());
        let delivery_email = if invitation.patient_data.email.is_empty() {
            invitation.patient_email.clone()
        } else {
            Some(invitation.patient_data.email.clone())
        };

        let results = self
            .gateway
            .deliver_invitation(
                &invitation.code,
                &invitation.patient_data,
                delivery_email.as_deref(),
                &channels,
                invitation.custom_message.as_deref(),
            )
            .await;

        let mut logs = invitation.delivery_logs.clone();
        logs.extend(results.iter().map(|r| r.to_log_entry()));

        let filter = format!("id=eq.{}", id);
        let patch = json!({
            "delivery_logs": logs,
            "updated_at": Utc::now().to_rfc3339()
        });

        let rows = self
            .supabase
            .update_returning("invitations", &filter, Some(auth_token), patch)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Invitation not found".to_string()))?;
        Ok((parse_invitation(row)?, results))
    }

    pub async fn list_invitations(
        &self,
        professional_id: Uuid,
        query: InvitationListQuery,
        auth_token: &str,
    ) -> Result<Vec<Invitation>, AppError> {
        let mut path = format!(
            "/rest/v1/invitations?professional_id=eq.{}&order=created_at.desc&limit={}&offset={}",
            professional_id,
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            query.offset.unwrap_or(0)
        );
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(parse_invitation).collect()
    }

    /// Tallies derived from the rows themselves; nothing is counted
    /// incrementally, so the numbers cannot drift.
    pub async fn invitation_stats(
        &self,
        professional_id: Uuid,
        auth_token: &str,
    ) -> Result<InvitationStats, AppError> {
        let path = format!(
            "/rest/v1/invitations?professional_id=eq.{}&select=status",
            professional_id
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let mut stats = InvitationStats {
            total: rows.len(),
            ..InvitationStats::default()
        };
        for row in &rows {
            match row.get("status").and_then(|s| s.as_str()) {
                Some("pending") => stats.pending += 1,
                Some("registered") => stats.registered += 1,
                Some("expired") => stats.expired += 1,
                Some("cancelled") => stats.cancelled += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Flip a redeemed invitation to registered. Called only after the
    /// account and profile both exist.
    pub async fn mark_registered(
        &self,
        id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Invitation, AppError> {
        let filter = format!("id=eq.{}&status=eq.pending", id);
        let patch = json!({
            "status": InvitationStatus::Registered,
            "used_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let rows = self
            .supabase
            .update_returning("invitations", &filter, auth_token, patch)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let row = rows.into_iter().next().ok_or_else(|| {
            AppError::Conflict("Invitation was redeemed concurrently".to_string())
        })?;
        parse_invitation(row)
    }

    pub fn gateway(&self) -> &DeliveryGateway {
        &self.gateway
    }
}

pub(crate) fn parse_invitation(row: Value) -> Result<Invitation, AppError> {
    serde_json::from_value(row)
        .map_err(|e| AppError::Internal(format!("Malformed invitation row: {}", e)))
}
