//! Outbound channel abstraction: SMS and email providers behind one trait.

pub mod email;
pub mod sms;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use email::{EmailConfig, SmtpEmailProvider};
pub use sms::{SmsConfig, TwilioSmsProvider};

/// Delivery channel of a message or sender identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Sms, Channel::Email];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

/// A single outbound message as handed to a provider.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub to: String,
    pub from: String,
    /// Email subject; ignored by SMS providers.
    pub subject: Option<String>,
    pub body: String,
}

/// Provider-assigned identifier for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderId(pub String);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Minimal capability every outbound provider exposes.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Submit one message. `Ok` means the provider accepted it.
    async fn send(&self, envelope: &Envelope) -> Result<ProviderId, ChannelError>;
}

/// Providers keyed by channel.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Channel, provider: Arc<dyn ChannelProvider>) -> Self {
        self.providers.insert(channel, provider);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&Arc<dyn ChannelProvider>> {
        self.providers.get(&channel)
    }

    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.providers.contains_key(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullProvider;

    #[async_trait]
    impl ChannelProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn send(&self, _envelope: &Envelope) -> Result<ProviderId, ChannelError> {
            Ok(ProviderId("null-1".into()))
        }
    }

    #[test]
    fn channel_parse_and_display() {
        assert_eq!("sms".parse::<Channel>().unwrap(), Channel::Sms);
        assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
        assert!("fax".parse::<Channel>().is_err());
        assert_eq!(Channel::Email.to_string(), "email");
    }

    #[test]
    fn provider_set_lists_configured_channels_in_order() {
        let set = ProviderSet::new()
            .with(Channel::Email, Arc::new(NullProvider))
            .with(Channel::Sms, Arc::new(NullProvider));
        assert_eq!(set.channels(), vec![Channel::Sms, Channel::Email]);
        assert!(set.get(Channel::Sms).is_some());
    }

    #[test]
    fn empty_provider_set() {
        let set = ProviderSet::new();
        assert!(set.channels().is_empty());
        assert!(set.get(Channel::Email).is_none());
    }
}
