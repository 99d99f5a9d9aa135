//! SMS provider: Twilio-compatible Messages REST API over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::{ChannelProvider, Envelope, ProviderId};
use crate::config::env_or;
use crate::error::ChannelError;

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// SMS provider configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Fallback sending number when the identity pool is exhausted.
    pub default_from: Option<String>,
    /// Daily cap applied to the fallback number.
    pub default_daily_limit: u32,
    pub api_base: String,
    pub timeout: Duration,
}

impl SmsConfig {
    /// Returns `None` if `TWILIO_ACCOUNT_SID` is not set (SMS disabled).
    pub fn from_env() -> Option<Self> {
        let account_sid = std::env::var("TWILIO_ACCOUNT_SID").ok()?;
        let auth_token = std::env::var("TWILIO_AUTH_TOKEN").unwrap_or_default();
        let default_from = std::env::var("TWILIO_PHONE_NUMBER")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Some(Self {
            account_sid,
            auth_token: SecretString::from(auth_token),
            default_from,
            default_daily_limit: env_or("OUTREACH_SMS_DEFAULT_LIMIT", 200),
            api_base: std::env::var("TWILIO_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(env_or("OUTREACH_SMS_TIMEOUT_SECS", 25)),
        })
    }
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

/// Twilio-style SMS provider.
pub struct TwilioSmsProvider {
    config: SmsConfig,
    client: reqwest::Client,
}

impl TwilioSmsProvider {
    pub fn new(config: SmsConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl ChannelProvider for TwilioSmsProvider {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(&self, envelope: &Envelope) -> Result<ProviderId, ChannelError> {
        if envelope.to.trim().is_empty() {
            return Err(ChannelError::InvalidAddress {
                name: "sms".into(),
                reason: "empty recipient".into(),
            });
        }

        let form = [
            ("From", envelope.from.as_str()),
            ("To", envelope.to.as_str()),
            ("Body", envelope.body.as_str()),
        ];

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "sms".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited { name: "sms".into() });
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(ApiErrorBody {
                    message: Some(message),
                    code,
                }) => match code {
                    Some(code) => format!("{status} ({code}): {message}"),
                    None => format!("{status}: {message}"),
                },
                _ => format!("{status}: {body}"),
            };
            return Err(ChannelError::SendFailed {
                name: "sms".into(),
                reason,
            });
        }

        let resource: MessageResource = resp.json().await.map_err(|e| {
            ChannelError::SendFailed {
                name: "sms".into(),
                reason: format!("Unreadable provider response: {e}"),
            }
        })?;

        tracing::debug!(to = %envelope.to, sid = %resource.sid, "SMS accepted by provider");
        Ok(ProviderId(resource.sid))
    }
}
