//! Outbound message model: one timed send of a lead's sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;

/// Delivery status of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Waiting for its `scheduled_at` time.
    Scheduled,
    /// Accepted by the provider.
    Sent,
    Opened,
    Clicked,
    /// Rejected by the provider. Never changes afterwards.
    Failed,
    /// Held back because the lead left the pipeline.
    Paused,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

/// A tracked engagement hit on a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Open,
    Click,
}

impl Engagement {
    /// Counter column bumped by this hit.
    pub fn counter_column(self) -> &'static str {
        match self {
            Self::Open => "opens",
            Self::Click => "clicks",
        }
    }

    /// Statuses this hit promotes, and the status they move to.
    ///
    /// Anything not listed keeps its status, so a scheduled or paused message
    /// stays out of the delivered states and an open never undoes a click.
    pub fn promotion(self) -> (&'static [MessageStatus], MessageStatus) {
        match self {
            Self::Open => (&[MessageStatus::Sent], MessageStatus::Opened),
            Self::Click => (
                &[MessageStatus::Sent, MessageStatus::Opened, MessageStatus::Clicked],
                MessageStatus::Clicked,
            ),
        }
    }

    /// Status a message in `current` ends up with after this hit.
    pub fn apply(self, current: MessageStatus) -> MessageStatus {
        let (from, to) = self.promotion();
        if from.contains(&current) { to } else { current }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "opened" => Ok(Self::Opened),
            "clicked" => Ok(Self::Clicked),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            _ => Err(format!("Unknown message status: {}", s)),
        }
    }
}

/// A single scheduled or delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub channel: Channel,
    /// Index of the sequence step that produced this message.
    pub step: u32,
    pub status: MessageStatus,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Sender identity used, stamped at send time.
    pub from_address: Option<String>,
    pub to_address: String,
    pub subject: Option<String>,
    pub body: String,
    pub provider_message_id: Option<String>,
    /// Provider failure reason.
    pub error: Option<String>,
    pub opens: u32,
    pub clicks: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// A new message in the `scheduled` state.
    #[allow(clippy::too_many_arguments)]
    pub fn scheduled(
        id: Uuid,
        lead_id: Uuid,
        channel: Channel,
        step: u32,
        to_address: impl Into<String>,
        subject: Option<String>,
        body: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            lead_id,
            channel,
            step,
            status: MessageStatus::Scheduled,
            scheduled_at,
            sent_at: None,
            from_address: None,
            to_address: to_address.into(),
            subject,
            body: body.into(),
            provider_message_id: None,
            error: None,
            opens: 0,
            clicks: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
