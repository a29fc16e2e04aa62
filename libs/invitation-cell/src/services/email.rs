use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{ChannelKind, DeliveryResult};

/// SendGrid mail client. Like the Twilio client, failure is a value,
/// not an error.
pub struct EmailClient {
    client: Client,
    api_key: String,
    base_url: String,
    from_address: String,
    configured: bool,
}

impl EmailClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.sendgrid_api_key.clone(),
            base_url: config.sendgrid_base_url.clone(),
            from_address: config.email_from_address.clone(),
            configured: config.is_email_configured(),
        }
    }

    pub async fn send_invitation_email(
        &self,
        to: &str,
        patient_name: &str,
        code: &str,
        registration_url: &str,
        custom_message: Option<&str>,
    ) -> DeliveryResult {
        let greeting = if patient_name.is_empty() {
            "Hello".to_string()
        } else {
            format!("Hello {}", patient_name)
        };
        let note = custom_message
            .map(|m| format!("\n\n{}", m))
            .unwrap_or_default();
        let subject = "You have been invited to register".to_string();
        let body = format!(
            "{},\n\nYour therapist has invited you to create an account.{}\n\n\
             Invitation code: {}\n\nComplete your registration here: {}\n\n\
             This invitation expires; please register soon.",
            greeting, note, code, registration_url
        );

        self.send(to, &subject, &body).await
    }

    pub async fn send_welcome_email(&self, to: &str, name: &str) -> DeliveryResult {
        let subject = "Welcome".to_string();
        let body = format!(
            "Hello {},\n\nYour account is ready. You can now book appointments \
             with your therapist online.",
            name
        );

        self.send(to, &subject, &body).await
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> DeliveryResult {
        if !self.configured {
            return DeliveryResult::failure(ChannelKind::Email, "Email is not configured");
        }

        let url = format!("{}/v3/mail/send", self.base_url);
        let payload = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_address },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }]
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let message_id = resp
                    .headers()
                    .get("X-Message-Id")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                debug!("Email accepted for {}", to);
                DeliveryResult {
                    channel: ChannelKind::Email,
                    success: true,
                    message_id,
                    provider_status: Some("accepted".to_string()),
                    error: None,
                    error_code: None,
                }
            }
            Ok(resp) => {
                let status = resp.status();
                let detail = resp.text().await.unwrap_or_default();
                warn!("Email rejected ({}): {}", status, detail);
                DeliveryResult {
                    channel: ChannelKind::Email,
                    success: false,
                    message_id: None,
                    provider_status: Some(status.to_string()),
                    error: Some(if detail.is_empty() {
                        "Provider rejected the email".to_string()
                    } else {
                        detail
                    }),
                    error_code: None,
                }
            }
            Err(e) => {
                warn!("Email delivery failed: {}", e);
                DeliveryResult::failure(ChannelKind::Email, e.to_string())
            }
        }
    }
}
