//! Engagement tracker: opens, clicks and unsubscribes from tracking hits.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::leads::LeadStatus;
use crate::messages::{Engagement, MessageStatus, OutboundMessage};
use crate::sequencer::Sequencer;
use crate::store::Database;
use crate::tracking::links::normalize_destination;

pub struct EngagementTracker {
    store: Arc<dyn Database>,
    sequencer: Arc<Sequencer>,
}

impl EngagementTracker {
    pub fn new(store: Arc<dyn Database>, sequencer: Arc<Sequencer>) -> Self {
        Self { store, sequencer }
    }

    async fn message(&self, message_id: Uuid) -> Result<OutboundMessage, PipelineError> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or(PipelineError::MessageNotFound(message_id))
    }

    /// Count an open. Only a `sent` message moves to `opened`.
    pub async fn record_open(&self, message_id: Uuid) -> Result<(), PipelineError> {
        let message = self.message(message_id).await?;
        if message.status == MessageStatus::Failed {
            debug!(message_id = %message_id, "Ignoring open on failed message");
            return Ok(());
        }

        self.store
            .record_engagement(message_id, Engagement::Open)
            .await?;
        debug!(message_id = %message_id, "Open recorded");
        Ok(())
    }

    /// Count a click and mark the lead engaged.
    ///
    /// Only delivered messages move to `clicked`; a click on a message that
    /// is still scheduled or paused is counted without changing its status.
    /// Returns `requested` when it is one of the message's own tracked links.
    pub async fn record_click(
        &self,
        message_id: Uuid,
        requested: Option<&str>,
    ) -> Result<Option<String>, PipelineError> {
        let message = self.message(message_id).await?;
        let destination = requested.and_then(normalize_destination).filter(|dest| {
            self.sequencer
                .links()
                .tracked_destinations(&message.body, message_id)
                .contains(dest)
        });
        if requested.is_some() && destination.is_none() {
            warn!(message_id = %message_id, "Click destination not linked from message");
        }

        if message.status == MessageStatus::Failed {
            debug!(message_id = %message_id, "Ignoring click on failed message");
            return Ok(destination);
        }

        self.store
            .record_engagement(message_id, Engagement::Click)
            .await?;

        let lead = self
            .store
            .get_lead(message.lead_id)
            .await?
            .ok_or(PipelineError::LeadNotFound(message.lead_id))?;
        let next = lead.status.after_click();
        if next != lead.status {
            self.store.update_lead_status(lead.id, next).await?;
        }

        info!(message_id = %message_id, lead_id = %lead.id, "Click recorded");
        Ok(destination)
    }

    /// Stop the lead's remaining sequence and mark it unsubscribed.
    pub async fn record_unsubscribe(&self, lead_id: Uuid) -> Result<usize, PipelineError> {
        let paused = self.sequencer.pause(lead_id, LeadStatus::Unsubscribed).await?;
        info!(lead_id = %lead_id, paused, "Lead unsubscribed");
        Ok(paused)
    }

    /// The lead a message was sent to.
    pub async fn resolve_lead(&self, message_id: Uuid) -> Result<Uuid, PipelineError> {
        Ok(self.message(message_id).await?.lead_id)
    }
}
