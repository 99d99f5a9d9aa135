//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! fixed-width RFC 3339 strings (microseconds, `Z` suffix) so that lexical
//! comparison in SQL matches chronological order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::leads::{Lead, LeadStatus, Priority};
use crate::messages::{Engagement, MessageStatus, OutboundMessage};
use crate::senders::SenderIdentity;
use crate::store::migrations;
use crate::store::traits::{
    DailyMetrics, Database, LeadScoreUpdate, MetricsDelta, SentReceipt,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format for timestamps.
fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn query_err(op: &str) -> impl FnOnce(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

const LEAD_COLUMNS: &str = "id, business_name, phone, email, website_url, status, priority, site_score, site_issues, scored_at, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, lead_id, channel, step, status, scheduled_at, sent_at, from_address, to_address, subject, body, provider_message_id, error, opens, clicks, created_at, updated_at";

const IDENTITY_COLUMNS: &str =
    "id, channel, address, daily_sent, daily_limit, is_active, last_used_at, created_at";

/// Map a libsql Row to a Lead. Column order matches LEAD_COLUMNS.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err("lead.id"))?;
    let status_str: String = row.get(5).map_err(query_err("lead.status"))?;
    let priority_str: Option<String> = row.get::<String>(6).ok();
    let issues_str: String = row.get::<String>(8).unwrap_or_else(|_| "[]".into());
    let scored_str: Option<String> = row.get::<String>(9).ok();
    let created_str: String = row.get(10).map_err(query_err("lead.created_at"))?;
    let updated_str: String = row.get(11).map_err(query_err("lead.updated_at"))?;

    let status = status_str
        .parse::<LeadStatus>()
        .map_err(DatabaseError::Serialization)?;
    let site_issues: Vec<String> = serde_json::from_str(&issues_str)
        .map_err(|e| DatabaseError::Serialization(format!("lead.site_issues: {e}")))?;

    Ok(Lead {
        id: parse_uuid(&id_str),
        business_name: row.get(1).map_err(query_err("lead.business_name"))?,
        phone: row.get::<String>(2).ok(),
        email: row.get::<String>(3).ok(),
        website_url: row.get(4).map_err(query_err("lead.website_url"))?,
        status,
        priority: priority_str.and_then(|p| p.parse::<Priority>().ok()),
        site_score: row
            .get::<i64>(7)
            .ok()
            .map(|s| s.clamp(0, 100) as u8),
        site_issues,
        scored_at: parse_optional_datetime(&scored_str),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to an OutboundMessage. Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<OutboundMessage, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err("message.id"))?;
    let lead_str: String = row.get(1).map_err(query_err("message.lead_id"))?;
    let channel_str: String = row.get(2).map_err(query_err("message.channel"))?;
    let status_str: String = row.get(4).map_err(query_err("message.status"))?;
    let scheduled_str: String = row.get(5).map_err(query_err("message.scheduled_at"))?;
    let sent_str: Option<String> = row.get::<String>(6).ok();
    let created_str: String = row.get(15).map_err(query_err("message.created_at"))?;
    let updated_str: String = row.get(16).map_err(query_err("message.updated_at"))?;

    Ok(OutboundMessage {
        id: parse_uuid(&id_str),
        lead_id: parse_uuid(&lead_str),
        channel: channel_str
            .parse::<Channel>()
            .map_err(DatabaseError::Serialization)?,
        step: row.get::<i64>(3).unwrap_or(0).max(0) as u32,
        status: status_str
            .parse::<MessageStatus>()
            .map_err(DatabaseError::Serialization)?,
        scheduled_at: parse_datetime(&scheduled_str),
        sent_at: parse_optional_datetime(&sent_str),
        from_address: row.get::<String>(7).ok(),
        to_address: row.get(8).map_err(query_err("message.to_address"))?,
        subject: row.get::<String>(9).ok(),
        body: row.get(10).map_err(query_err("message.body"))?,
        provider_message_id: row.get::<String>(11).ok(),
        error: row.get::<String>(12).ok(),
        opens: row.get::<i64>(13).unwrap_or(0).max(0) as u32,
        clicks: row.get::<i64>(14).unwrap_or(0).max(0) as u32,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a SenderIdentity. Column order matches IDENTITY_COLUMNS.
fn row_to_identity(row: &libsql::Row) -> Result<SenderIdentity, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err("identity.id"))?;
    let channel_str: String = row.get(1).map_err(query_err("identity.channel"))?;
    let last_used_str: Option<String> = row.get::<String>(6).ok();
    let created_str: String = row.get(7).map_err(query_err("identity.created_at"))?;

    Ok(SenderIdentity {
        id: parse_uuid(&id_str),
        channel: channel_str
            .parse::<Channel>()
            .map_err(DatabaseError::Serialization)?,
        address: row.get(2).map_err(query_err("identity.address"))?,
        daily_sent: row.get::<i64>(3).unwrap_or(0).max(0) as u32,
        daily_limit: row.get::<i64>(4).unwrap_or(0).max(0) as u32,
        is_active: row.get::<i64>(5).unwrap_or(0) != 0,
        last_used_at: parse_optional_datetime(&last_used_str),
        created_at: parse_datetime(&created_str),
    })
}

/// UPDATE that bumps the hit's counter and promotes the stored status in place.
fn engagement_sql(engagement: Engagement) -> String {
    let (from, to) = engagement.promotion();
    let from = from
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let counter = engagement.counter_column();
    format!(
        "UPDATE messages SET {counter} = {counter} + 1, \
         status = CASE WHEN status IN ({from}) THEN '{to}' ELSE status END, \
         updated_at = ?1 WHERE id = ?2 AND status != 'failed'",
        to = to.as_str(),
    )
}

/// Drain a result set, skipping rows that fail to map.
///
/// A failure fetching the next row is returned rather than cutting the set short.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
    what: &str,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    loop {
        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{what} rows: {e}"))),
        };
        match map(&row) {
            Ok(item) => out.push(item),
            Err(e) => tracing::warn!("Skipping {what} row: {e}"),
        }
    }
    Ok(out)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        let issues = serde_json::to_string(&lead.site_issues)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let site_score: libsql::Value = match lead.site_score {
            Some(s) => libsql::Value::Integer(s as i64),
            None => libsql::Value::Null,
        };

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO leads ({LEAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    lead.id.to_string(),
                    lead.business_name.clone(),
                    opt_text(lead.phone.as_deref()),
                    opt_text(lead.email.as_deref()),
                    lead.website_url.clone(),
                    lead.status.as_str(),
                    opt_text(lead.priority.map(|p| p.as_str())),
                    site_score,
                    issues,
                    opt_text(lead.scored_at.map(fmt_datetime).as_deref()),
                    fmt_datetime(lead.created_at),
                    fmt_datetime(lead.updated_at),
                ],
            )
            .await
            .map_err(query_err("insert_lead"))?;
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_lead"))?;

        match rows.next().await.map_err(query_err("get_lead"))? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_leads_by_status(
        &self,
        status: LeadStatus,
        limit: usize,
    ) -> Result<Vec<Lead>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2"
                ),
                params![status.as_str(), limit as i64],
            )
            .await
            .map_err(query_err("list_leads_by_status"))?;
        collect_rows(rows, row_to_lead, "lead").await
    }

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), fmt_datetime(Utc::now()), id.to_string()],
            )
            .await
            .map_err(query_err("update_lead_status"))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_lead_score(
        &self,
        id: Uuid,
        update: &LeadScoreUpdate,
    ) -> Result<(), DatabaseError> {
        let issues = serde_json::to_string(&update.site_issues)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let now = fmt_datetime(Utc::now());

        let count = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?1, priority = ?2, site_score = ?3, site_issues = ?4, scored_at = ?5, updated_at = ?5 WHERE id = ?6",
                params![
                    update.status.as_str(),
                    update.priority.as_str(),
                    update.site_score as i64,
                    issues,
                    now,
                    id.to_string(),
                ],
            )
            .await
            .map_err(query_err("update_lead_score"))?;
        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn insert_messages(&self, messages: &[OutboundMessage]) -> Result<(), DatabaseError> {
        let conn = self.conn();
        for msg in messages {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    msg.id.to_string(),
                    msg.lead_id.to_string(),
                    msg.channel.as_str(),
                    msg.step as i64,
                    msg.status.as_str(),
                    fmt_datetime(msg.scheduled_at),
                    opt_text(msg.sent_at.map(fmt_datetime).as_deref()),
                    opt_text(msg.from_address.as_deref()),
                    msg.to_address.clone(),
                    opt_text(msg.subject.as_deref()),
                    msg.body.clone(),
                    opt_text(msg.provider_message_id.as_deref()),
                    opt_text(msg.error.as_deref()),
                    msg.opens as i64,
                    msg.clicks as i64,
                    fmt_datetime(msg.created_at),
                    fmt_datetime(msg.updated_at),
                ],
            )
            .await
            .map_err(query_err("insert_messages"))?;
        }
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<OutboundMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_message"))?;

        match rows.next().await.map_err(query_err("get_message"))? {
            Some(row) => Ok(Some(row_to_message(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_messages_for_lead(
        &self,
        lead_id: Uuid,
    ) -> Result<Vec<OutboundMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE lead_id = ?1 ORDER BY scheduled_at ASC, step ASC"
                ),
                params![lead_id.to_string()],
            )
            .await
            .map_err(query_err("list_messages_for_lead"))?;
        collect_rows(rows, row_to_message, "message").await
    }

    async fn list_due_messages(
        &self,
        channel: Channel,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboundMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE channel = ?1 AND status = 'scheduled' AND scheduled_at <= ?2 ORDER BY scheduled_at ASC, created_at ASC, step ASC LIMIT ?3"
                ),
                params![channel.as_str(), fmt_datetime(now), limit as i64],
            )
            .await
            .map_err(query_err("list_due_messages"))?;
        collect_rows(rows, row_to_message, "due message").await
    }

    async fn mark_message_sent(
        &self,
        id: Uuid,
        receipt: &SentReceipt,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE messages SET status = 'sent', sent_at = ?1, from_address = ?2, provider_message_id = ?3, updated_at = ?4 WHERE id = ?5 AND status = 'scheduled'",
                params![
                    fmt_datetime(receipt.sent_at),
                    receipt.from_address.clone(),
                    receipt.provider_message_id.clone(),
                    fmt_datetime(Utc::now()),
                    id.to_string(),
                ],
            )
            .await
            .map_err(query_err("mark_message_sent"))?;
        Ok(count > 0)
    }

    async fn mark_message_failed(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE messages SET status = 'failed', error = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'scheduled'",
                params![reason, fmt_datetime(Utc::now()), id.to_string()],
            )
            .await
            .map_err(query_err("mark_message_failed"))?;
        Ok(count > 0)
    }

    async fn pause_message(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE messages SET status = 'paused', updated_at = ?1 WHERE id = ?2 AND status = 'scheduled'",
                params![fmt_datetime(Utc::now()), id.to_string()],
            )
            .await
            .map_err(query_err("pause_message"))?;
        Ok(count > 0)
    }

    async fn pause_scheduled_for_lead(&self, lead_id: Uuid) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE messages SET status = 'paused', updated_at = ?1 WHERE lead_id = ?2 AND status = 'scheduled'",
                params![fmt_datetime(Utc::now()), lead_id.to_string()],
            )
            .await
            .map_err(query_err("pause_scheduled_for_lead"))?;
        Ok(count as usize)
    }

    async fn record_engagement(
        &self,
        id: Uuid,
        engagement: Engagement,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(&engagement_sql(engagement), params![fmt_datetime(Utc::now()), id.to_string()])
            .await
            .map_err(query_err("record_engagement"))?;
        if count == 0 {
            tracing::debug!(message_id = %id, "Engagement not recorded (missing or failed message)");
        }
        Ok(count > 0)
    }

    // ── Sender identities ───────────────────────────────────────────

    async fn upsert_sender_identity(
        &self,
        identity: &SenderIdentity,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO sender_identities ({IDENTITY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT (channel, address) DO UPDATE SET daily_limit = excluded.daily_limit, is_active = excluded.is_active"
                ),
                params![
                    identity.id.to_string(),
                    identity.channel.as_str(),
                    identity.address.clone(),
                    identity.daily_sent as i64,
                    identity.daily_limit as i64,
                    identity.is_active as i64,
                    opt_text(identity.last_used_at.map(fmt_datetime).as_deref()),
                    fmt_datetime(identity.created_at),
                ],
            )
            .await
            .map_err(query_err("upsert_sender_identity"))?;
        Ok(())
    }

    async fn get_sender_identity(
        &self,
        channel: Channel,
        address: &str,
    ) -> Result<Option<SenderIdentity>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {IDENTITY_COLUMNS} FROM sender_identities WHERE channel = ?1 AND address = ?2"
                ),
                params![channel.as_str(), address],
            )
            .await
            .map_err(query_err("get_sender_identity"))?;

        match rows.next().await.map_err(query_err("get_sender_identity"))? {
            Some(row) => Ok(Some(row_to_identity(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_available_identities(
        &self,
        channel: Channel,
    ) -> Result<Vec<SenderIdentity>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {IDENTITY_COLUMNS} FROM sender_identities
                     WHERE channel = ?1 AND is_active = 1 AND daily_sent < daily_limit
                     ORDER BY daily_sent ASC, last_used_at IS NOT NULL, last_used_at ASC, created_at ASC"
                ),
                params![channel.as_str()],
            )
            .await
            .map_err(query_err("list_available_identities"))?;
        collect_rows(rows, row_to_identity, "sender identity").await
    }

    async fn list_sender_identities(
        &self,
        channel: Channel,
    ) -> Result<Vec<SenderIdentity>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {IDENTITY_COLUMNS} FROM sender_identities WHERE channel = ?1 ORDER BY created_at ASC"
                ),
                params![channel.as_str()],
            )
            .await
            .map_err(query_err("list_sender_identities"))?;
        collect_rows(rows, row_to_identity, "sender identity").await
    }

    async fn increment_identity_sent(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE sender_identities SET daily_sent = daily_sent + 1, last_used_at = ?1 WHERE id = ?2",
                params![fmt_datetime(at), id.to_string()],
            )
            .await
            .map_err(query_err("increment_identity_sent"))?;
        Ok(())
    }

    async fn reset_identity_counters(&self) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE sender_identities SET daily_sent = 0 WHERE is_active = 1",
                (),
            )
            .await
            .map_err(query_err("reset_identity_counters"))?;
        Ok(count as usize)
    }

    // ── Daily metrics ───────────────────────────────────────────────

    async fn increment_daily_metrics(
        &self,
        date: NaiveDate,
        delta: &MetricsDelta,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO daily_metrics (date, emails_sent, sms_sent, failed, leads_scored, leads_qualified, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (date) DO UPDATE SET
                    emails_sent = emails_sent + excluded.emails_sent,
                    sms_sent = sms_sent + excluded.sms_sent,
                    failed = failed + excluded.failed,
                    leads_scored = leads_scored + excluded.leads_scored,
                    leads_qualified = leads_qualified + excluded.leads_qualified,
                    updated_at = excluded.updated_at",
                params![
                    date.to_string(),
                    delta.emails_sent as i64,
                    delta.sms_sent as i64,
                    delta.failed as i64,
                    delta.leads_scored as i64,
                    delta.leads_qualified as i64,
                    fmt_datetime(Utc::now()),
                ],
            )
            .await
            .map_err(query_err("increment_daily_metrics"))?;
        Ok(())
    }

    async fn get_daily_metrics(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailyMetrics>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT emails_sent, sms_sent, failed, leads_scored, leads_qualified FROM daily_metrics WHERE date = ?1",
                params![date.to_string()],
            )
            .await
            .map_err(query_err("get_daily_metrics"))?;

        let Some(row) = rows.next().await.map_err(query_err("get_daily_metrics"))? else {
            return Ok(None);
        };
        let count = |idx: i32| row.get::<i64>(idx).unwrap_or(0).max(0) as u64;
        Ok(Some(DailyMetrics {
            date,
            emails_sent: count(0),
            sms_sent: count(1),
            failed: count(2),
            leads_scored: count(3),
            leads_qualified: count(4),
        }))
    }
}
