//! Sender identity model: a phone number or sending domain with a daily quota.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;

/// A phone number (SMS) or sending domain/address (email).
///
/// `daily_sent <= daily_limit` is a soft cap: concurrent dispatch runs may
/// overshoot it slightly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub id: Uuid,
    pub channel: Channel,
    pub address: String,
    pub daily_sent: u32,
    pub daily_limit: u32,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SenderIdentity {
    pub fn new(channel: Channel, address: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            address: address.into(),
            daily_sent: 0,
            daily_limit,
            is_active: true,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the identity may be selected for another send today.
    pub fn has_capacity(&self) -> bool {
        self.is_active && self.daily_sent < self.daily_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_respects_limit_and_active_flag() {
        let mut id = SenderIdentity::new(Channel::Sms, "+15550001111", 2);
        assert!(id.has_capacity());
        id.daily_sent = 2;
        assert!(!id.has_capacity());
        id.daily_sent = 0;
        id.is_active = false;
        assert!(!id.has_capacity());
    }

    #[test]
    fn zero_limit_has_no_capacity() {
        let id = SenderIdentity::new(Channel::Email, "mail.example.com", 0);
        assert!(!id.has_capacity());
    }
}
