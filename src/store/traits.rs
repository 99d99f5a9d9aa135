//! Unified `Database` trait: single async interface for all persistence.
//!
//! Components receive an `Arc<dyn Database>` at construction; there is no
//! global client. Every operation is a row-level read or write; nothing here
//! spans a multi-row transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::leads::{Lead, LeadStatus, Priority};
use crate::messages::{Engagement, OutboundMessage};
use crate::senders::SenderIdentity;

/// Final fields written to a lead after scoring.
#[derive(Debug, Clone)]
pub struct LeadScoreUpdate {
    pub status: LeadStatus,
    pub priority: Priority,
    pub site_score: u8,
    pub site_issues: Vec<String>,
}

/// Fields stamped on a message the provider accepted.
#[derive(Debug, Clone)]
pub struct SentReceipt {
    pub from_address: String,
    pub provider_message_id: String,
    pub sent_at: DateTime<Utc>,
}

/// One day's aggregated pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub emails_sent: u64,
    pub sms_sent: u64,
    pub failed: u64,
    pub leads_scored: u64,
    pub leads_qualified: u64,
}

/// Increments applied to a day's metrics row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsDelta {
    pub emails_sent: u64,
    pub sms_sent: u64,
    pub failed: u64,
    pub leads_scored: u64,
    pub leads_qualified: u64,
}

impl MetricsDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Backend-agnostic database trait covering leads, messages, sender identities and metrics.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a newly ingested lead.
    async fn insert_lead(&self, lead: &Lead) -> Result<(), DatabaseError>;

    /// Get a lead by ID.
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError>;

    /// Leads in `status`, oldest first, up to `limit`.
    async fn list_leads_by_status(
        &self,
        status: LeadStatus,
        limit: usize,
    ) -> Result<Vec<Lead>, DatabaseError>;

    /// Overwrite a lead's status.
    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), DatabaseError>;

    /// Write the outcome of a scoring pass and stamp `scored_at`.
    async fn update_lead_score(
        &self,
        id: Uuid,
        update: &LeadScoreUpdate,
    ) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Insert scheduled messages.
    async fn insert_messages(&self, messages: &[OutboundMessage]) -> Result<(), DatabaseError>;

    /// Get a message by ID.
    async fn get_message(&self, id: Uuid) -> Result<Option<OutboundMessage>, DatabaseError>;

    /// All messages for a lead in schedule order.
    async fn list_messages_for_lead(
        &self,
        lead_id: Uuid,
    ) -> Result<Vec<OutboundMessage>, DatabaseError>;

    /// Scheduled messages on `channel` due at or before `now`, oldest first.
    async fn list_due_messages(
        &self,
        channel: Channel,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboundMessage>, DatabaseError>;

    /// Mark a scheduled message as sent. Returns false if it was no longer scheduled.
    async fn mark_message_sent(
        &self,
        id: Uuid,
        receipt: &SentReceipt,
    ) -> Result<bool, DatabaseError>;

    /// Mark a scheduled message as failed. Returns false if it was no longer scheduled.
    async fn mark_message_failed(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError>;

    /// Pause a single scheduled message. Returns false if it was no longer scheduled.
    async fn pause_message(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Pause every scheduled message of a lead. Returns the number paused.
    async fn pause_scheduled_for_lead(&self, lead_id: Uuid) -> Result<usize, DatabaseError>;

    /// Count an engagement hit and apply its status promotion.
    ///
    /// Counter and status change in one statement against the stored status,
    /// so overlapping hits never lose a count or undo a promotion. Failed
    /// messages are left untouched. Returns false if nothing was updated.
    async fn record_engagement(
        &self,
        id: Uuid,
        engagement: Engagement,
    ) -> Result<bool, DatabaseError>;

    // ── Sender identities ───────────────────────────────────────────

    /// Insert an identity, or refresh limit/active flag if (channel, address) exists.
    async fn upsert_sender_identity(&self, identity: &SenderIdentity)
    -> Result<(), DatabaseError>;

    /// Look up an identity by channel and address.
    async fn get_sender_identity(
        &self,
        channel: Channel,
        address: &str,
    ) -> Result<Option<SenderIdentity>, DatabaseError>;

    /// Active identities under their daily limit, least used first.
    ///
    /// Ordered by `daily_sent` ascending, then never-used, then oldest `last_used_at`.
    async fn list_available_identities(
        &self,
        channel: Channel,
    ) -> Result<Vec<SenderIdentity>, DatabaseError>;

    /// Every identity on a channel.
    async fn list_sender_identities(
        &self,
        channel: Channel,
    ) -> Result<Vec<SenderIdentity>, DatabaseError>;

    /// Increment `daily_sent` and stamp `last_used_at`.
    async fn increment_identity_sent(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    /// Zero `daily_sent` on every active identity. Returns the number of rows touched.
    async fn reset_identity_counters(&self) -> Result<usize, DatabaseError>;

    // ── Daily metrics ───────────────────────────────────────────────

    /// Add `delta` to the row for `date`, creating it if needed.
    async fn increment_daily_metrics(
        &self,
        date: NaiveDate,
        delta: &MetricsDelta,
    ) -> Result<(), DatabaseError>;

    /// Get the metrics row for `date`.
    async fn get_daily_metrics(&self, date: NaiveDate)
    -> Result<Option<DailyMetrics>, DatabaseError>;
}
