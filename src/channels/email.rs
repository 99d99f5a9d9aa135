//! Email provider: SMTP via lettre.
//!
//! Sender identities for email may be either a full address or a bare sending
//! domain; bare domains are combined with the configured local part.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::channels::{ChannelProvider, Envelope, ProviderId};
use crate::config::env_or;
use crate::error::ChannelError;

// ── Configuration ───────────────────────────────────────────────────

/// Email provider configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Display name on outgoing mail.
    pub from_name: String,
    /// Local part used when an identity is a bare domain.
    pub local_part: String,
    /// Fallback sending address/domain when the identity pool is exhausted.
    pub default_from: Option<String>,
    /// Daily cap applied to the fallback identity.
    pub default_daily_limit: u32,
    pub timeout: Duration,
}

impl EmailConfig {
    /// Returns `None` if `SMTP_HOST` is not set (email disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let default_from = std::env::var("EMAIL_FROM_ADDRESS")
            .ok()
            .or_else(|| (!username.is_empty()).then(|| username.clone()));

        Some(Self {
            smtp_host,
            smtp_port: env_or("SMTP_PORT", 587),
            username,
            password: SecretString::from(password),
            from_name: std::env::var("EMAIL_FROM_NAME").unwrap_or_default(),
            local_part: std::env::var("EMAIL_LOCAL_PART").unwrap_or_else(|_| "hello".into()),
            default_from,
            default_daily_limit: env_or("OUTREACH_EMAIL_DEFAULT_LIMIT", 300),
            timeout: Duration::from_secs(env_or("OUTREACH_SMTP_TIMEOUT_SECS", 25)),
        })
    }

    /// Turn an identity (address or bare domain) into a sending address.
    pub fn sender_address(&self, identity: &str) -> String {
        if identity.contains('@') {
            identity.to_string()
        } else {
            format!("{}@{}", self.local_part, identity)
        }
    }
}

// ── Provider ────────────────────────────────────────────────────────

/// SMTP email provider.
pub struct SmtpEmailProvider {
    config: EmailConfig,
}

impl SmtpEmailProvider {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, envelope: &Envelope) -> Result<(Message, String), ChannelError> {
        let from_address = self.config.sender_address(&envelope.from);
        let message_id = message_id_for(&from_address);

        let from_addr = from_address.parse().map_err(|e| ChannelError::InvalidAddress {
            name: "email".into(),
            reason: format!("Invalid from address: {e}"),
        })?;
        let from_name = (!self.config.from_name.is_empty()).then(|| self.config.from_name.clone());
        let from = Mailbox::new(from_name, from_addr);

        let to: Mailbox = envelope.to.parse().map_err(|e| ChannelError::InvalidAddress {
            name: "email".into(),
            reason: format!("Invalid to address: {e}"),
        })?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(envelope.subject.clone().unwrap_or_default())
            .message_id(Some(message_id.clone()))
            .multipart(MultiPart::alternative_plain_html(
                strip_html(&envelope.body),
                envelope.body.clone(),
            ))
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Failed to build email: {e}"),
            })?;

        Ok((email, message_id))
    }
}

#[async_trait]
impl ChannelProvider for SmtpEmailProvider {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, envelope: &Envelope) -> Result<ProviderId, ChannelError> {
        let (email, message_id) = self.build_message(envelope)?;
        let config = self.config.clone();
        let to = envelope.to.clone();

        tokio::task::spawn_blocking(move || {
            let creds = Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            );
            let transport = SmtpTransport::relay(&config.smtp_host)
                .map_err(|e| ChannelError::SendFailed {
                    name: "email".into(),
                    reason: format!("SMTP relay error: {e}"),
                })?
                .port(config.smtp_port)
                .credentials(creds)
                .timeout(Some(config.timeout))
                .build();

            transport.send(&email).map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP send failed: {e}"),
            })?;
            Ok::<(), ChannelError>(())
        })
        .await
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP task failed: {e}"),
        })??;

        tracing::debug!(to = %to, message_id = %message_id, "Email accepted by SMTP relay");
        Ok(ProviderId(message_id))
    }
}

/// Generate an RFC 5322 Message-ID in the sender's domain.
fn message_id_for(from_address: &str) -> String {
    let domain = from_address
        .rsplit_once('@')
        .map(|(_, d)| d)
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{}>", Uuid::new_v4(), domain)
}

/// Strip HTML tags from content (basic), for the plain-text alternative.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.trim().to_string()
}
