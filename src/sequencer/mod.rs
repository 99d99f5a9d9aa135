//! Sequencer: turns a qualified lead into a timed multi-channel schedule.

pub mod template;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::PipelineError;
use crate::leads::{Lead, LeadStatus};
use crate::messages::OutboundMessage;
use crate::store::Database;
use crate::tracking::TrackingLinks;

pub use template::{SequenceConfig, SequenceStep, TemplateContext, render};

pub struct Sequencer {
    store: Arc<dyn Database>,
    config: SequenceConfig,
    links: TrackingLinks,
}

impl Sequencer {
    pub fn new(store: Arc<dyn Database>, config: SequenceConfig, links: TrackingLinks) -> Self {
        Self {
            store,
            config,
            links,
        }
    }

    pub fn links(&self) -> &TrackingLinks {
        &self.links
    }

    /// Build (without persisting) the messages for `lead`, anchored at `start`.
    ///
    /// Terminal leads get nothing; steps on channels the lead has no
    /// contact for are skipped.
    pub fn build_schedule(&self, lead: &Lead, start: DateTime<Utc>) -> Vec<OutboundMessage> {
        if lead.status.is_terminal() {
            return Vec::new();
        }

        self.config
            .steps
            .iter()
            .enumerate()
            .filter_map(|(idx, step)| {
                let to = lead.contact_for(step.channel)?;
                let id = Uuid::new_v4();
                let ctx = TemplateContext::for_lead(lead, &self.links.unsubscribe_url(id));
                let rendered = render(&step.template, &ctx);
                let (subject, body) = match step.channel {
                    Channel::Email => (
                        step.subject.as_deref().map(|s| render(s, &ctx)),
                        self.links.instrument_email(&rendered, id),
                    ),
                    Channel::Sms => (None, rendered),
                };
                Some(OutboundMessage::scheduled(
                    id,
                    lead.id,
                    step.channel,
                    idx as u32,
                    to,
                    subject,
                    body,
                    start + Duration::hours(i64::from(step.delay_hours)),
                ))
            })
            .collect()
    }

    /// Persist a schedule for `lead` unless it already has one.
    ///
    /// Returns the number of messages created.
    pub async fn schedule(&self, lead: &Lead) -> Result<usize, PipelineError> {
        let existing = self.store.list_messages_for_lead(lead.id).await?;
        if !existing.is_empty() {
            debug!(lead_id = %lead.id, existing = existing.len(), "Lead already sequenced");
            return Ok(0);
        }

        let messages = self.build_schedule(lead, Utc::now());
        if messages.is_empty() {
            debug!(lead_id = %lead.id, status = %lead.status, "Nothing to schedule");
            return Ok(0);
        }

        self.store.insert_messages(&messages).await?;
        info!(lead_id = %lead.id, count = messages.len(), "Sequence scheduled");
        Ok(messages.len())
    }

    /// Stop a lead's remaining schedule and move it to `target`.
    ///
    /// `target` must be a status that suppresses dispatch. A lead already in
    /// a terminal status keeps it. Returns the number of messages paused;
    /// repeating the call pauses nothing further.
    pub async fn pause(&self, lead_id: Uuid, target: LeadStatus) -> Result<usize, PipelineError> {
        if !target.suppresses_dispatch() {
            return Err(PipelineError::InvalidPauseTarget {
                id: lead_id,
                target: target.to_string(),
            });
        }

        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or(PipelineError::LeadNotFound(lead_id))?;

        // Status first so a concurrent dispatch run sees the suppression.
        if !lead.status.is_terminal() && lead.status != target {
            self.store.update_lead_status(lead_id, target).await?;
        }
        let paused = self.store.pause_scheduled_for_lead(lead_id).await?;

        info!(lead_id = %lead_id, target = %target, paused, "Lead sequence paused");
        Ok(paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageStatus;
    use crate::store::LibSqlBackend;

    async fn setup() -> (Arc<dyn Database>, Sequencer) {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sequencer = Sequencer::new(
            store.clone(),
            SequenceConfig::default(),
            TrackingLinks::new("https://go.example.com"),
        );
        (store, sequencer)
    }

    fn qualified_lead() -> Lead {
        let mut lead = Lead::new("Corner Bakery", "https://bakery.test")
            .with_phone("+15551230000")
            .with_email("owner@bakery.test");
        lead.status = LeadStatus::Qualified;
        lead.site_score = Some(25);
        lead.site_issues = vec!["Slow page load".into()];
        lead
    }

    #[tokio::test]
    async fn schedule_follows_cadence() {
        let (_store, sequencer) = setup().await;
        let lead = qualified_lead();
        let start = Utc::now();
        let messages = sequencer.build_schedule(&lead, start);

        assert_eq!(messages.len(), 5);
        let offsets: Vec<i64> = messages
            .iter()
            .map(|m| (m.scheduled_at - start).num_hours())
            .collect();
        assert_eq!(offsets, vec![0, 0, 72, 120, 168]);
        assert!(messages.iter().all(|m| m.status == MessageStatus::Scheduled));

        let sms = &messages[0];
        assert_eq!(sms.to_address, "+15551230000");
        assert!(sms.subject.is_none());
        assert!(sms.body.contains("25/100"));
        assert!(sms.body.contains(&format!("/t/u/{}", sms.id)));

        let email = &messages[1];
        assert_eq!(email.to_address, "owner@bakery.test");
        assert!(email.subject.as_deref().unwrap().contains("Corner Bakery"));
        assert!(email.body.contains(&format!("/t/o/{}", email.id)));
        assert!(email.body.contains(&format!("/t/u/{}", email.id)));
        assert_eq!(
            sequencer.links().tracked_destinations(&email.body, email.id),
            vec![reqwest::Url::parse(&lead.website_url).unwrap().to_string()]
        );
    }

    #[tokio::test]
    async fn skips_channels_without_contact() {
        let (_store, sequencer) = setup().await;
        let mut lead = qualified_lead();
        lead.phone = None;
        let messages = sequencer.build_schedule(&lead, Utc::now());
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.channel == Channel::Email));
        let steps: Vec<u32> = messages.iter().map(|m| m.step).collect();
        assert_eq!(steps, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn terminal_lead_gets_no_schedule() {
        let (_store, sequencer) = setup().await;
        let mut lead = qualified_lead();
        lead.status = LeadStatus::Unsubscribed;
        assert!(sequencer.build_schedule(&lead, Utc::now()).is_empty());
    }

    #[tokio::test]
    async fn schedule_is_idempotent() {
        let (store, sequencer) = setup().await;
        let lead = qualified_lead();
        store.insert_lead(&lead).await.unwrap();

        assert_eq!(sequencer.schedule(&lead).await.unwrap(), 5);
        assert_eq!(sequencer.schedule(&lead).await.unwrap(), 0);
        assert_eq!(store.list_messages_for_lead(lead.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn pause_twice_equals_once() {
        let (store, sequencer) = setup().await;
        let lead = qualified_lead();
        store.insert_lead(&lead).await.unwrap();
        sequencer.schedule(&lead).await.unwrap();

        assert_eq!(sequencer.pause(lead.id, LeadStatus::Unsubscribed).await.unwrap(), 5);
        let after_once = store.list_messages_for_lead(lead.id).await.unwrap();

        assert_eq!(sequencer.pause(lead.id, LeadStatus::Unsubscribed).await.unwrap(), 0);
        let after_twice = store.list_messages_for_lead(lead.id).await.unwrap();

        let statuses = |ms: &[OutboundMessage]| ms.iter().map(|m| (m.id, m.status)).collect::<Vec<_>>();
        assert_eq!(statuses(&after_once), statuses(&after_twice));
        let stored = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Unsubscribed);
    }

    #[tokio::test]
    async fn pause_never_downgrades_terminal_status() {
        let (store, sequencer) = setup().await;
        let mut lead = qualified_lead();
        lead.status = LeadStatus::Converted;
        store.insert_lead(&lead).await.unwrap();

        assert_eq!(sequencer.pause(lead.id, LeadStatus::Unsubscribed).await.unwrap(), 0);
        let stored = store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Converted);
    }

    #[tokio::test]
    async fn pause_rejects_non_suppressing_target() {
        let (_store, sequencer) = setup().await;
        let err = sequencer
            .pause(Uuid::new_v4(), LeadStatus::Engaged)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPauseTarget { .. }));
    }

    #[tokio::test]
    async fn pause_unknown_lead() {
        let (_store, sequencer) = setup().await;
        let id = Uuid::new_v4();
        let err = sequencer.pause(id, LeadStatus::Bounced).await.unwrap_err();
        assert!(matches!(err, PipelineError::LeadNotFound(missing) if missing == id));
    }
}
