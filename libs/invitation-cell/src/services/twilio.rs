use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{ChannelKind, DeliveryResult};

/// Thin Twilio REST client for SMS, WhatsApp and Verify OTP. Provider
/// failures come back as failed `DeliveryResult`s, never as `Err`, so
/// callers can keep fanning out.
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    phone_number: String,
    whatsapp_number: String,
    verify_service_sid: String,
    api_base_url: String,
    verify_base_url: String,
    configured: bool,
}

impl TwilioClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            phone_number: config.twilio_phone_number.clone(),
            whatsapp_number: config.twilio_whatsapp_number.clone(),
            verify_service_sid: config.twilio_verify_service_sid.clone(),
            api_base_url: config.twilio_api_base_url.clone(),
            verify_base_url: config.twilio_verify_base_url.clone(),
            configured: config.is_messaging_configured(),
        }
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> DeliveryResult {
        if !self.configured {
            return DeliveryResult::failure(ChannelKind::Sms, "Messaging is not configured");
        }
        let to = format_phone_number(to);
        self.send_message(ChannelKind::Sms, &to, &self.phone_number, body)
            .await
    }

    pub async fn send_whatsapp(&self, to: &str, body: &str) -> DeliveryResult {
        if !self.configured {
            return DeliveryResult::failure(ChannelKind::Whatsapp, "Messaging is not configured");
        }
        let to = format!("whatsapp:{}", format_phone_number(to));
        self.send_message(ChannelKind::Whatsapp, &to, &self.whatsapp_number, body)
            .await
    }

    async fn send_message(
        &self,
        channel: ChannelKind,
        to: &str,
        from: &str,
        body: &str,
    ) -> DeliveryResult {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base_url, self.account_sid
        );

        let params = [("To", to), ("From", from), ("Body", body)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let payload: Value = resp.json().await.unwrap_or_default();
                debug!("{} accepted by provider: {:?}", channel, payload.get("sid"));
                DeliveryResult {
                    channel,
                    success: true,
                    message_id: payload
                        .get("sid")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    provider_status: payload
                        .get("status")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    error: None,
                    error_code: None,
                }
            }
            Ok(resp) => {
                let status = resp.status();
                let payload: Value = resp.json().await.unwrap_or_default();
                let message = payload
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Provider rejected the message")
                    .to_string();
                warn!("{} delivery rejected ({}): {}", channel, status, message);
                DeliveryResult {
                    channel,
                    success: false,
                    message_id: None,
                    provider_status: Some(status.to_string()),
                    error: Some(message),
                    error_code: payload.get("code").map(|c| c.to_string()),
                }
            }
            Err(e) => {
                warn!("{} delivery failed: {}", channel, e);
                DeliveryResult::failure(channel, e.to_string())
            }
        }
    }

    /// Start a Verify OTP challenge for a phone number.
    pub async fn send_otp(&self, phone: &str) -> DeliveryResult {
        if !self.configured || self.verify_service_sid.is_empty() {
            return DeliveryResult::failure(ChannelKind::Sms, "Verification is not configured");
        }

        let url = format!(
            "{}/v2/Services/{}/Verifications",
            self.verify_base_url, self.verify_service_sid
        );
        let to = format_phone_number(phone);
        let params = [("To", to.as_str()), ("Channel", "sms")];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let payload: Value = resp.json().await.unwrap_or_default();
                DeliveryResult {
                    channel: ChannelKind::Sms,
                    success: true,
                    message_id: payload
                        .get("sid")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    provider_status: payload
                        .get("status")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    error: None,
                    error_code: None,
                }
            }
            Ok(resp) => {
                let status = resp.status();
                DeliveryResult {
                    channel: ChannelKind::Sms,
                    success: false,
                    message_id: None,
                    provider_status: Some(status.to_string()),
                    error: Some("Could not start verification".to_string()),
                    error_code: None,
                }
            }
            Err(e) => DeliveryResult::failure(ChannelKind::Sms, e.to_string()),
        }
    }

    /// Check an OTP code. Only an explicit "approved" from the provider
    /// counts as verified.
    pub async fn check_otp(&self, phone: &str, code: &str) -> bool {
        if !self.configured || self.verify_service_sid.is_empty() {
            return false;
        }

        let url = format!(
            "{}/v2/Services/{}/VerificationCheck",
            self.verify_base_url, self.verify_service_sid
        );
        let to = format_phone_number(phone);
        let params = [("To", to.as_str()), ("Code", code)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let payload: Value = resp.json().await.unwrap_or_default();
                payload.get("status").and_then(|v| v.as_str()) == Some("approved")
            }
            _ => false,
        }
    }
}

/// Normalize a phone number to E.164. Numbers without a country prefix
/// are assumed to be Spanish.
pub fn format_phone_number(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if cleaned.starts_with('+') {
        cleaned
    } else if let Some(rest) = cleaned.strip_prefix("00") {
        format!("+{}", rest)
    } else {
        format!("+34{}", cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_formatting() {
        assert_eq!(format_phone_number("+34 600 111 222"), "+34600111222");
        assert_eq!(format_phone_number("600-111-222"), "+34600111222");
        assert_eq!(format_phone_number("0034600111222"), "+34600111222");
        assert_eq!(format_phone_number("+15551234567"), "+15551234567");
    }
}
