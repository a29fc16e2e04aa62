use tracing::info;

use shared_config::AppConfig;

use crate::models::{ChannelKind, DeliveryResult, PatientIntake};
use crate::services::email::EmailClient;
use crate::services::twilio::TwilioClient;

/// Multi-channel fan-out for invitation messages. Every requested
/// channel is attempted; each attempt yields a `DeliveryResult` whether
/// it succeeded or not.
pub struct DeliveryGateway {
    twilio: TwilioClient,
    email: EmailClient,
    app_url: String,
}

impl DeliveryGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            twilio: TwilioClient::new(config),
            email: EmailClient::new(config),
            app_url: config.app_url.clone(),
        }
    }

    pub fn registration_url(&self, code: &str) -> String {
        format!("{}/register?code={}", self.app_url, urlencoding::encode(code))
    }

    /// Send one invitation over every channel requested for it.
    pub async fn deliver_invitation(
        &self,
        code: &str,
        intake: &PatientIntake,
        delivery_email: Option<&str>,
        channels: &[ChannelKind],
        custom_message: Option<&str>,
    ) -> Vec<DeliveryResult> {
        let url = self.registration_url(code);
        let name = intake.full_name();
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let result = match channel {
                ChannelKind::Email => match delivery_email {
                    Some(to) => {
                        self.email
                            .send_invitation_email(to, &name, code, &url, custom_message)
                            .await
                    }
                    None => DeliveryResult::failure(
                        ChannelKind::Email,
                        "No email address on invitation",
                    ),
                },
                ChannelKind::Sms => match intake.phone.as_deref() {
                    Some(phone) => {
                        self.twilio
                            .send_sms(phone, &sms_body(&name, &url, custom_message))
                            .await
                    }
                    None => DeliveryResult::failure(
                        ChannelKind::Sms,
                        "No phone number on invitation",
                    ),
                },
                ChannelKind::Whatsapp => match intake.phone.as_deref() {
                    Some(phone) => {
                        self.twilio
                            .send_whatsapp(phone, &sms_body(&name, &url, custom_message))
                            .await
                    }
                    None => DeliveryResult::failure(
                        ChannelKind::Whatsapp,
                        "No phone number on invitation",
                    ),
                },
            };
            info!(
                "Invitation {} via {}: {}",
                code,
                channel,
                if result.success { "sent" } else { "failed" }
            );
            results.push(result);
        }

        results
    }

    /// Post-registration courtesy email. Failures are logged and dropped.
    pub async fn deliver_welcome(&self, email: &str, name: &str) {
        if email.is_empty() {
            return;
        }
        let result = self.email.send_welcome_email(email, name).await;
        if !result.success {
            info!("Welcome email for {} not delivered: {:?}", email, result.error);
        }
    }

    pub async fn send_otp(&self, phone: &str) -> DeliveryResult {
        self.twilio.send_otp(phone).await
    }

    pub async fn check_otp(&self, phone: &str, code: &str) -> bool {
        self.twilio.check_otp(phone, code).await
    }
}

fn sms_body(name: &str, url: &str, custom_message: Option<&str>) -> String {
    let base = if name.is_empty() {
        format!("Your therapist invited you to register: {}", url)
    } else {
        format!("{}, your therapist invited you to register: {}", name, url)
    };
    match custom_message {
        Some(message) => format!("{} - {}", message, base),
        None => base,
    }
}
