//! Lead data model: lifecycle statuses and qualification tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::Channel;

/// Lifecycle status of a lead.
///
/// Statuses only move toward the terminal set
/// {converted, unsubscribed, bounced, disqualified}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Ingested, not yet scored.
    New,
    /// Score request in flight.
    Scoring,
    Qualified,
    Disqualified,
    /// Clicked a tracked link.
    Engaged,
    Replied,
    Converted,
    Unsubscribed,
    Bounced,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Scoring => "scoring",
            Self::Qualified => "qualified",
            Self::Disqualified => "disqualified",
            Self::Engaged => "engaged",
            Self::Replied => "replied",
            Self::Converted => "converted",
            Self::Unsubscribed => "unsubscribed",
            Self::Bounced => "bounced",
        }
    }

    /// No further sends are ever scheduled for a terminal lead.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Converted | Self::Unsubscribed | Self::Bounced | Self::Disqualified
        )
    }

    /// Messages owned by a lead in this status are paused instead of sent.
    pub fn suppresses_dispatch(self) -> bool {
        self.is_terminal() || self == Self::Replied
    }

    /// Status after the lead clicks a tracked link.
    pub fn after_click(self) -> Self {
        match self {
            Self::New | Self::Scoring | Self::Qualified | Self::Engaged => Self::Engaged,
            other => other,
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "scoring" => Ok(Self::Scoring),
            "qualified" => Ok(Self::Qualified),
            "disqualified" => Ok(Self::Disqualified),
            "engaged" => Ok(Self::Engaged),
            "replied" => Ok(Self::Replied),
            "converted" => Ok(Self::Converted),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "bounced" => Ok(Self::Bounced),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

/// Qualification tier assigned by the score engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Hot,
    Warm,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Low => "low",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "low" => Ok(Self::Low),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// A prospective customer with a scorable website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub business_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website_url: String,
    pub status: LeadStatus,
    pub priority: Option<Priority>,
    /// 0–100 once scored.
    pub site_score: Option<u8>,
    /// Human-readable findings, most severe first.
    pub site_issues: Vec<String>,
    pub scored_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a freshly ingested lead.
    pub fn new(business_name: impl Into<String>, website_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            business_name: business_name.into(),
            phone: None,
            email: None,
            website_url: website_url.into(),
            status: LeadStatus::New,
            priority: None,
            site_score: None,
            site_issues: Vec::new(),
            scored_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The lead's address on a channel, if it has a usable one.
    pub fn contact_for(&self, channel: Channel) -> Option<&str> {
        let raw = match channel {
            Channel::Sms => self.phone.as_deref(),
            Channel::Email => self.email.as_deref(),
        };
        raw.map(str::trim).filter(|s| !s.is_empty())
    }
}
