use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, ReservationGuard};
use shared_models::auth::User;

/// Test fixture for building an `AppConfig` pointed at mock servers.
pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub twilio_url: String,
    pub sendgrid_url: String,
    pub reservation_guard: ReservationGuard,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            twilio_url: "http://localhost:54322".to_string(),
            sendgrid_url: "http://localhost:54323".to_string(),
            reservation_guard: ReservationGuard::Legacy,
        }
    }
}

impl TestConfig {
    pub fn with_store_url(mut self, url: &str) -> Self {
        self.supabase_url = url.to_string();
        self
    }

    pub fn with_twilio_url(mut self, url: &str) -> Self {
        self.twilio_url = url.to_string();
        self
    }

    pub fn with_sendgrid_url(mut self, url: &str) -> Self {
        self.sendgrid_url = url.to_string();
        self
    }

    pub fn with_reservation_guard(mut self, guard: ReservationGuard) -> Self {
        self.reservation_guard = guard;
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            twilio_account_sid: "ACtest".to_string(),
            twilio_auth_token: "test-twilio-token".to_string(),
            twilio_phone_number: "+15550000001".to_string(),
            twilio_whatsapp_number: "whatsapp:+15550000001".to_string(),
            twilio_verify_service_sid: "VAtest".to_string(),
            twilio_api_base_url: self.twilio_url.clone(),
            twilio_verify_base_url: self.twilio_url.clone(),
            sendgrid_api_key: "SG.test-key".to_string(),
            sendgrid_base_url: self.sendgrid_url.clone(),
            email_from_address: "no-reply@practice.test".to_string(),
            app_url: "http://localhost:5173".to_string(),
            reservation_guard: self.reservation_guard,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub professional_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            professional_id: None,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            email: email.to_string(),
            role: role.to_string(),
            ..Self::default()
        }
    }

    pub fn professional(email: &str) -> Self {
        let mut user = Self::new(email, "professional");
        user.professional_id = Some(Uuid::new_v4().to_string());
        user
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            first_name: Some(self.first_name.clone()),
            last_name: Some(self.last_name.clone()),
            professional_id: self.professional_id.clone(),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "first_name": user.first_name,
            "last_name": user.last_name,
            "professional_id": user.professional_id,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::validate_token;

    #[test]
    fn test_token_validates_against_test_config() {
        let config = TestConfig::default();
        let user = TestUser::professional("pro@example.com");
        let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, Some(1));

        let decoded = validate_token(&token, &config.jwt_secret).unwrap();
        assert_eq!(decoded.id, user.id);
        assert_eq!(decoded.professional_id, user.professional_id);
        assert_eq!(decoded.role.as_deref(), Some("professional"));
    }

    #[test]
    fn expired_test_token_is_rejected() {
        let config = TestConfig::default();
        let user = TestUser::default();
        let token = JwtTestUtils::create_expired_token(&user, &config.jwt_secret);
        assert!(validate_token(&token, &config.jwt_secret).is_err());
    }
}
