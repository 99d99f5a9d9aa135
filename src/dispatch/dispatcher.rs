//! Dispatcher: pulls due messages per channel and hands them to providers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::channels::{Channel, Envelope, ProviderSet};
use crate::error::PipelineError;
use crate::messages::OutboundMessage;
use crate::senders::SenderPool;
use crate::store::{Database, SentReceipt};
use crate::throttle::Pacer;

/// Counts from one `dispatch_due` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub channel: Option<Channel>,
    pub sent: usize,
    pub failed: usize,
    /// Messages paused because their lead suppresses dispatch.
    pub skipped: usize,
    /// True when the pass stopped early for lack of a sender identity.
    pub halted: bool,
}

pub struct Dispatcher {
    store: Arc<dyn Database>,
    providers: ProviderSet,
    pool: Arc<SenderPool>,
    pacers: HashMap<Channel, Pacer>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn Database>,
        providers: ProviderSet,
        pool: Arc<SenderPool>,
        send_delay: Duration,
    ) -> Self {
        let pacers = Channel::ALL
            .into_iter()
            .map(|c| (c, Pacer::new(send_delay)))
            .collect();
        Self {
            store,
            providers,
            pool,
            pacers,
        }
    }

    /// Channels with a configured provider.
    pub fn channels(&self) -> Vec<Channel> {
        self.providers.channels()
    }

    /// Send up to `batch_size` due messages on `channel`, oldest first.
    ///
    /// Stops early (leaving the rest scheduled) when no sender identity has
    /// capacity. One message's failure never aborts the rest.
    pub async fn dispatch_due(
        &self,
        channel: Channel,
        batch_size: usize,
    ) -> Result<DispatchSummary, PipelineError> {
        let provider = self
            .providers
            .get(channel)
            .ok_or_else(|| PipelineError::ProviderMissing(channel.to_string()))?;

        let due = self
            .store
            .list_due_messages(channel, Utc::now(), batch_size)
            .await?;
        let mut summary = DispatchSummary {
            channel: Some(channel),
            ..Default::default()
        };
        debug!(channel = %channel, due = due.len(), "Dispatch pass starting");

        for message in due {
            match self.store.get_lead(message.lead_id).await {
                Ok(Some(lead)) if !lead.status.suppresses_dispatch() => {}
                Ok(lead) => {
                    self.skip(&message, lead.map(|l| l.status.to_string())).await;
                    summary.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(message_id = %message.id, error = %e, "Lead lookup failed");
                    self.fail(&message, &format!("lead lookup failed: {e}")).await;
                    summary.failed += 1;
                    continue;
                }
            }

            let identity = match self.pool.pick_identity(channel).await {
                Ok(Some(identity)) => identity,
                Ok(None) => {
                    warn!(channel = %channel, "No sender identity available, halting batch");
                    summary.halted = true;
                    break;
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Sender pool lookup failed, halting batch");
                    summary.halted = true;
                    break;
                }
            };

            let envelope = Envelope {
                to: message.to_address.clone(),
                from: identity.address.clone(),
                subject: message.subject.clone(),
                body: message.body.clone(),
            };

            self.pacer(channel).wait().await;
            match provider.send(&envelope).await {
                Ok(provider_id) => {
                    let receipt = SentReceipt {
                        from_address: identity.address.clone(),
                        provider_message_id: provider_id.0,
                        sent_at: Utc::now(),
                    };
                    match self.store.mark_message_sent(message.id, &receipt).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(message_id = %message.id, "Message left scheduled state before it was marked sent");
                        }
                        Err(e) => {
                            error!(message_id = %message.id, error = %e, "Provider accepted message but marking it sent failed");
                        }
                    }
                    if let Err(e) = self.pool.record_send(&identity).await {
                        error!(identity = %identity.address, error = %e, "Failed to count send against identity");
                    }
                    summary.sent += 1;
                    debug!(
                        message_id = %message.id,
                        from = %identity.address,
                        provider = provider.name(),
                        "Message sent"
                    );
                }
                Err(e) => {
                    warn!(message_id = %message.id, provider = provider.name(), error = %e, "Provider rejected message");
                    self.fail(&message, &e.to_string()).await;
                    summary.failed += 1;
                }
            }
        }

        info!(
            channel = %channel,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            halted = summary.halted,
            "Dispatch pass complete"
        );
        Ok(summary)
    }

    fn pacer(&self, channel: Channel) -> &Pacer {
        // Every channel gets a pacer in `new`.
        &self.pacers[&channel]
    }

    async fn skip(&self, message: &OutboundMessage, lead_status: Option<String>) {
        let status = lead_status.as_deref().unwrap_or("missing");
        match self.store.pause_message(message.id).await {
            Ok(_) => debug!(message_id = %message.id, lead_status = status, "Message paused for suppressed lead"),
            Err(e) => error!(message_id = %message.id, error = %e, "Failed to pause message"),
        }
    }

    async fn fail(&self, message: &OutboundMessage, reason: &str) {
        if let Err(e) = self.store.mark_message_failed(message.id, reason).await {
            error!(message_id = %message.id, error = %e, "Failed to mark message failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelProvider, ProviderId};
    use crate::error::ChannelError;
    use crate::leads::{Lead, LeadStatus};
    use crate::messages::MessageStatus;
    use crate::senders::SenderIdentity;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Records every envelope; fails when the body contains "FAIL".
    #[derive(Default)]
    struct RecordingProvider {
        sent: Mutex<Vec<Envelope>>,
        calls: Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl ChannelProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, envelope: &Envelope) -> Result<ProviderId, ChannelError> {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());
            if envelope.body.contains("FAIL") {
                return Err(ChannelError::SendFailed {
                    name: "recording".into(),
                    reason: "carrier rejected".into(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(envelope.clone());
            Ok(ProviderId(format!("SM{}", sent.len())))
        }
    }

    struct Fixture {
        store: Arc<dyn Database>,
        provider: Arc<RecordingProvider>,
        dispatcher: Dispatcher,
    }

    async fn fixture(pool: impl FnOnce(Arc<dyn Database>) -> SenderPool) -> Fixture {
        paced_fixture(pool, Duration::ZERO).await
    }

    async fn paced_fixture(
        pool: impl FnOnce(Arc<dyn Database>) -> SenderPool,
        send_delay: Duration,
    ) -> Fixture {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let provider = Arc::new(RecordingProvider::default());
        let providers = ProviderSet::new().with(Channel::Sms, provider.clone());
        let dispatcher = Dispatcher::new(
            store.clone(),
            providers,
            Arc::new(pool(store.clone())),
            send_delay,
        );
        Fixture {
            store,
            provider,
            dispatcher,
        }
    }

    async fn lead_with(store: &Arc<dyn Database>, status: LeadStatus) -> Lead {
        let mut lead = Lead::new("Corner Bakery", "https://bakery.test").with_phone("+15551230000");
        lead.status = status;
        store.insert_lead(&lead).await.unwrap();
        lead
    }

    async fn schedule_sms(store: &Arc<dyn Database>, lead: &Lead, n: usize, body: &str) -> Vec<Uuid> {
        let base = Utc::now() - ChronoDuration::minutes(10);
        let messages: Vec<OutboundMessage> = (0..n)
            .map(|i| {
                OutboundMessage::scheduled(
                    Uuid::new_v4(),
                    lead.id,
                    Channel::Sms,
                    i as u32,
                    "+15551230000",
                    None,
                    body,
                    base + ChronoDuration::seconds(i as i64),
                )
            })
            .collect();
        store.insert_messages(&messages).await.unwrap();
        messages.iter().map(|m| m.id).collect()
    }

    async fn add_identity(store: &Arc<dyn Database>, address: &str, limit: u32) {
        store
            .upsert_sender_identity(&SenderIdentity::new(Channel::Sms, address, limit))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn provider_calls_are_spaced_by_send_delay() {
        let delay = Duration::from_millis(1500);
        let f = paced_fixture(SenderPool::new, delay).await;
        add_identity(&f.store, "+15550000001", 10).await;
        let lead = lead_with(&f.store, LeadStatus::Qualified).await;
        schedule_sms(&f.store, &lead, 2, "FAIL then hello").await;
        schedule_sms(&f.store, &lead, 1, "hello").await;

        let summary = f.dispatcher.dispatch_due(Channel::Sms, 10).await.unwrap();
        assert_eq!((summary.sent, summary.failed), (1, 2));

        // Failed sends are paced too.
        let calls = f.provider.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1] - pair[0] >= delay, "gap {:?}", pair[1] - pair[0]);
        }
    }

    #[tokio::test]
    async fn limit_two_sends_two_and_leaves_third_scheduled() {
        let f = fixture(SenderPool::new).await;
        add_identity(&f.store, "+15550000001", 2).await;
        let lead = lead_with(&f.store, LeadStatus::Qualified).await;
        let ids = schedule_sms(&f.store, &lead, 3, "hello").await;

        let summary = f.dispatcher.dispatch_due(Channel::Sms, 10).await.unwrap();
        assert_eq!(summary.sent, 2);
        assert!(summary.halted);

        let sent = f.provider.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|e| e.from == "+15550000001"));

        let first = f.store.get_message(ids[0]).await.unwrap().unwrap();
        assert_eq!(first.status, MessageStatus::Sent);
        assert_eq!(first.from_address.as_deref(), Some("+15550000001"));
        assert_eq!(first.provider_message_id.as_deref(), Some("SM1"));
        let third = f.store.get_message(ids[2]).await.unwrap().unwrap();
        assert_eq!(third.status, MessageStatus::Scheduled);

        let identity = f
            .store
            .get_sender_identity(Channel::Sms, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(identity.daily_sent, 2);
    }

    #[tokio::test]
    async fn fallback_identity_sends_the_third() {
        let f = fixture(|store| SenderPool::new(store).with_default(Channel::Sms, "+15559999999", 100)).await;
        add_identity(&f.store, "+15550000001", 2).await;
        let lead = lead_with(&f.store, LeadStatus::Qualified).await;
        schedule_sms(&f.store, &lead, 3, "hello").await;

        let summary = f.dispatcher.dispatch_due(Channel::Sms, 10).await.unwrap();
        assert_eq!(summary.sent, 3);
        assert!(!summary.halted);
        let froms: Vec<String> = f.provider.sent.lock().unwrap().iter().map(|e| e.from.clone()).collect();
        assert_eq!(froms[2], "+15559999999");
    }

    #[tokio::test]
    async fn suppressed_leads_end_paused() {
        for status in [
            LeadStatus::Converted,
            LeadStatus::Unsubscribed,
            LeadStatus::Bounced,
            LeadStatus::Replied,
        ] {
            let f = fixture(SenderPool::new).await;
            add_identity(&f.store, "+15550000001", 10).await;
            let lead = lead_with(&f.store, status).await;
            let ids = schedule_sms(&f.store, &lead, 2, "hello").await;

            let summary = f.dispatcher.dispatch_due(Channel::Sms, 10).await.unwrap();
            assert_eq!(summary.skipped, 2, "status {status}");
            assert_eq!(summary.sent, 0);
            assert!(f.provider.sent.lock().unwrap().is_empty());
            for id in ids {
                let m = f.store.get_message(id).await.unwrap().unwrap();
                assert_eq!(m.status, MessageStatus::Paused);
            }
        }
    }

    #[tokio::test]
    async fn provider_failure_marks_failed_and_continues() {
        let f = fixture(SenderPool::new).await;
        add_identity(&f.store, "+15550000001", 10).await;
        let lead = lead_with(&f.store, LeadStatus::Qualified).await;
        let failing = schedule_sms(&f.store, &lead, 1, "FAIL me").await;
        schedule_sms(&f.store, &lead, 1, "fine").await;

        let summary = f.dispatcher.dispatch_due(Channel::Sms, 10).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 1);

        let m = f.store.get_message(failing[0]).await.unwrap().unwrap();
        assert_eq!(m.status, MessageStatus::Failed);
        assert!(m.error.unwrap().contains("carrier rejected"));
        assert!(m.sent_at.is_none());
    }

    #[tokio::test]
    async fn future_messages_are_not_due() {
        let f = fixture(SenderPool::new).await;
        add_identity(&f.store, "+15550000001", 10).await;
        let lead = lead_with(&f.store, LeadStatus::Qualified).await;
        let later = OutboundMessage::scheduled(
            Uuid::new_v4(),
            lead.id,
            Channel::Sms,
            3,
            "+15551230000",
            None,
            "later",
            Utc::now() + ChronoDuration::hours(120),
        );
        f.store.insert_messages(std::slice::from_ref(&later)).await.unwrap();

        let summary = f.dispatcher.dispatch_due(Channel::Sms, 10).await.unwrap();
        assert_eq!(summary, DispatchSummary { channel: Some(Channel::Sms), ..Default::default() });
    }

    #[tokio::test]
    async fn batch_size_bounds_the_pass() {
        let f = fixture(SenderPool::new).await;
        add_identity(&f.store, "+15550000001", 10).await;
        let lead = lead_with(&f.store, LeadStatus::Qualified).await;
        schedule_sms(&f.store, &lead, 4, "hello").await;

        let summary = f.dispatcher.dispatch_due(Channel::Sms, 3).await.unwrap();
        assert_eq!(summary.sent, 3);
        assert!(!summary.halted);
    }

    #[tokio::test]
    async fn missing_provider_is_error() {
        let f = fixture(SenderPool::new).await;
        let err = f.dispatcher.dispatch_due(Channel::Email, 10).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProviderMissing(_)));
    }
}
