use std::env;
use tracing::warn;

/// Conflict policy for appointment reservation (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationGuard {
    /// Advisory availability only: reservation is a plain insert and the
    /// read-then-write race of the original system is preserved.
    Legacy,
    /// Reservation goes through a server-side conditional insert; a taken
    /// slot is reported as a conflict.
    Atomic,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub twilio_whatsapp_number: String,
    pub twilio_verify_service_sid: String,
    pub twilio_api_base_url: String,
    pub twilio_verify_base_url: String,
    pub sendgrid_api_key: String,
    pub sendgrid_base_url: String,
    pub email_from_address: String,
    pub app_url: String,
    pub reservation_guard: ReservationGuard,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY").unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            }),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_else(|_| {
                warn!("TWILIO_ACCOUNT_SID not set, SMS/WhatsApp delivery disabled");
                String::new()
            }),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_phone_number: env::var("TWILIO_PHONE_NUMBER").unwrap_or_default(),
            twilio_whatsapp_number: env::var("TWILIO_WHATSAPP_NUMBER").unwrap_or_default(),
            twilio_verify_service_sid: env::var("TWILIO_VERIFY_SERVICE_SID").unwrap_or_default(),
            twilio_api_base_url: env::var("TWILIO_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            twilio_verify_base_url: env::var("TWILIO_VERIFY_BASE_URL")
                .unwrap_or_else(|_| "https://verify.twilio.com".to_string()),
            sendgrid_api_key: env::var("SENDGRID_API_KEY").unwrap_or_else(|_| {
                warn!("SENDGRID_API_KEY not set, email delivery disabled");
                String::new()
            }),
            sendgrid_base_url: env::var("SENDGRID_BASE_URL")
                .unwrap_or_else(|_| "https://api.sendgrid.com".to_string()),
            email_from_address: env::var("EMAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            app_url: env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            reservation_guard: match env::var("RESERVATION_GUARD").as_deref() {
                Ok("atomic") => ReservationGuard::Atomic,
                Ok("legacy") | Err(_) => ReservationGuard::Legacy,
                Ok(other) => {
                    warn!("Unknown RESERVATION_GUARD '{}', falling back to legacy", other);
                    ReservationGuard::Legacy
                }
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_messaging_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty() && !self.twilio_auth_token.is_empty()
    }

    pub fn is_email_configured(&self) -> bool {
        !self.sendgrid_api_key.is_empty()
    }
}
