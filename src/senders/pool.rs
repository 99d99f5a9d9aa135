//! Picks the least-used sender identity per channel and tracks daily usage.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::senders::SenderIdentity;
use crate::store::Database;

/// A configured default identity for one channel.
#[derive(Debug, Clone)]
pub struct DefaultIdentity {
    pub address: String,
    pub daily_limit: u32,
}

/// Rotates sends across the identity pool.
///
/// Counting is read-then-write with no lock held across the provider call,
/// so concurrent dispatch runs can overshoot a limit by a few sends.
pub struct SenderPool {
    store: Arc<dyn Database>,
    sms_default: Option<DefaultIdentity>,
    email_default: Option<DefaultIdentity>,
}

impl SenderPool {
    pub fn new(store: Arc<dyn Database>) -> Self {
        Self {
            store,
            sms_default: None,
            email_default: None,
        }
    }

    /// Set the fallback identity for a channel.
    pub fn with_default(mut self, channel: Channel, address: impl Into<String>, daily_limit: u32) -> Self {
        let default = Some(DefaultIdentity {
            address: address.into(),
            daily_limit,
        });
        match channel {
            Channel::Sms => self.sms_default = default,
            Channel::Email => self.email_default = default,
        }
        self
    }

    fn default_for(&self, channel: Channel) -> Option<&DefaultIdentity> {
        match channel {
            Channel::Sms => self.sms_default.as_ref(),
            Channel::Email => self.email_default.as_ref(),
        }
    }

    /// Upsert the configured defaults so they take part in counting and reset.
    pub async fn ensure_default_identities(&self) -> Result<usize, DatabaseError> {
        let mut ensured = 0;
        for channel in Channel::ALL {
            if let Some(default) = self.default_for(channel) {
                let identity = SenderIdentity::new(channel, &default.address, default.daily_limit);
                self.store.upsert_sender_identity(&identity).await?;
                ensured += 1;
                info!(channel = %channel, address = %default.address, "Default sender identity ensured");
            }
        }
        Ok(ensured)
    }

    /// Choose the identity for the next send on `channel`.
    ///
    /// Pool members are tried first, least used then least recently used.
    /// The configured default is the fallback. `None` means every identity
    /// is at its daily limit and the batch should stop.
    pub async fn pick_identity(&self, channel: Channel) -> Result<Option<SenderIdentity>, DatabaseError> {
        let default = self.default_for(channel);
        let candidates = self.store.list_available_identities(channel).await?;

        let pooled = candidates
            .into_iter()
            .filter(|identity| identity.has_capacity())
            .find(|identity| default.is_none_or(|d| d.address != identity.address));
        if let Some(identity) = pooled {
            debug!(channel = %channel, address = %identity.address, sent = identity.daily_sent, "Picked pool identity");
            return Ok(Some(identity));
        }

        let Some(default) = default else {
            warn!(channel = %channel, "Sender pool exhausted and no default identity configured");
            return Ok(None);
        };

        match self.store.get_sender_identity(channel, &default.address).await? {
            Some(identity) if identity.has_capacity() => {
                debug!(channel = %channel, address = %identity.address, "Falling back to default identity");
                Ok(Some(identity))
            }
            Some(_) => {
                warn!(channel = %channel, "All sender identities at daily limit");
                Ok(None)
            }
            None => {
                // Not yet persisted: register it so the send is counted.
                let identity = SenderIdentity::new(channel, &default.address, default.daily_limit);
                if !identity.has_capacity() {
                    return Ok(None);
                }
                self.store.upsert_sender_identity(&identity).await?;
                Ok(self.store.get_sender_identity(channel, &default.address).await?)
            }
        }
    }

    /// Count one send against `identity`.
    pub async fn record_send(&self, identity: &SenderIdentity) -> Result<(), DatabaseError> {
        self.store.increment_identity_sent(identity.id, Utc::now()).await
    }

    /// Zero every active identity's daily counter. Safe to run repeatedly.
    pub async fn reset_daily(&self) -> Result<usize, DatabaseError> {
        let count = self.store.reset_identity_counters().await?;
        info!(count, "Sender identity counters reset");
        Ok(count)
    }
}
