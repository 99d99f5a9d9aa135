//! Batch runner: the three externally triggered pipeline actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::channels::Channel;
use crate::dispatch::{DispatchSummary, Dispatcher};
use crate::error::{Error, PipelineError};
use crate::leads::LeadStatus;
use crate::scoring::ScoreEngine;
use crate::senders::SenderPool;
use crate::sequencer::Sequencer;
use crate::store::{Database, MetricsDelta};

/// A pipeline action selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchAction {
    ScoreAndSequence,
    Dispatch,
    Reset,
}

impl BatchAction {
    pub const ALL: [BatchAction; 3] = [
        BatchAction::ScoreAndSequence,
        BatchAction::Dispatch,
        BatchAction::Reset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScoreAndSequence => "score-and-sequence",
            Self::Dispatch => "dispatch",
            Self::Reset => "reset",
        }
    }
}

impl std::fmt::Display for BatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchAction {
    type Err = PipelineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "score-and-sequence" => Ok(Self::ScoreAndSequence),
            "dispatch" => Ok(Self::Dispatch),
            "reset" => Ok(Self::Reset),
            other => Err(PipelineError::UnknownAction(other.to_string())),
        }
    }
}

/// Counts from a score-and-sequence run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoringSummary {
    pub scored: usize,
    pub qualified: usize,
    pub disqualified: usize,
    pub unreachable: usize,
    pub messages_scheduled: usize,
}

/// Structured result of one action, returned even on partial failure.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub action: BatchAction,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dispatch: Vec<DispatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identities_reset: Option<usize>,
    /// Per-item failures that did not stop the run.
    pub errors: Vec<String>,
}

impl BatchReport {
    fn new(action: BatchAction) -> Self {
        let now = Utc::now();
        Self {
            action,
            started_at: now,
            finished_at: now,
            scoring: None,
            dispatch: Vec::new(),
            identities_reset: None,
            errors: Vec::new(),
        }
    }
}

/// Batch sizes for the runner.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub score_batch_size: usize,
    pub dispatch_batch_size: usize,
}

pub struct BatchRunner {
    store: Arc<dyn Database>,
    engine: ScoreEngine,
    sequencer: Arc<Sequencer>,
    dispatcher: Dispatcher,
    pool: Arc<SenderPool>,
    limits: BatchLimits,
}

impl BatchRunner {
    pub fn new(
        store: Arc<dyn Database>,
        engine: ScoreEngine,
        sequencer: Arc<Sequencer>,
        dispatcher: Dispatcher,
        pool: Arc<SenderPool>,
        limits: BatchLimits,
    ) -> Self {
        Self {
            store,
            engine,
            sequencer,
            dispatcher,
            pool,
            limits,
        }
    }

    /// Run one action to completion.
    ///
    /// `Err` means the action could not start (or reset failed outright);
    /// item-level failures land in `BatchReport::errors`.
    pub async fn run(&self, action: BatchAction) -> Result<BatchReport, Error> {
        info!(action = %action, "Batch run starting");
        let mut report = BatchReport::new(action);

        match action {
            BatchAction::ScoreAndSequence => self.score_and_sequence(&mut report).await?,
            BatchAction::Dispatch => self.dispatch(&mut report).await,
            BatchAction::Reset => {
                report.identities_reset = Some(self.pool.reset_daily().await?);
            }
        }

        report.finished_at = Utc::now();
        info!(action = %action, errors = report.errors.len(), "Batch run complete");
        Ok(report)
    }

    async fn score_and_sequence(&self, report: &mut BatchReport) -> Result<(), Error> {
        let leads = self
            .store
            .list_leads_by_status(LeadStatus::New, self.limits.score_batch_size)
            .await?;
        let mut summary = ScoringSummary::default();

        for mut lead in leads {
            let outcome = match self.engine.score_lead(&lead).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(lead_id = %lead.id, error = %e, "Scoring failed");
                    report.errors.push(format!("score {}: {e}", lead.id));
                    continue;
                }
            };
            summary.scored += 1;
            if !outcome.reachable {
                summary.unreachable += 1;
            }
            if !outcome.is_qualified() {
                summary.disqualified += 1;
                continue;
            }
            summary.qualified += 1;

            lead.status = outcome.status;
            lead.priority = Some(outcome.priority);
            lead.site_score = Some(outcome.score);
            lead.site_issues = outcome.issues;
            match self.sequencer.schedule(&lead).await {
                Ok(count) => summary.messages_scheduled += count,
                Err(e) => {
                    error!(lead_id = %lead.id, error = %e, "Sequencing failed");
                    report.errors.push(format!("sequence {}: {e}", lead.id));
                }
            }
        }

        self.record_metrics(
            MetricsDelta {
                leads_scored: summary.scored as u64,
                leads_qualified: summary.qualified as u64,
                ..Default::default()
            },
            report,
        )
        .await;
        report.scoring = Some(summary);
        Ok(())
    }

    async fn dispatch(&self, report: &mut BatchReport) {
        let mut delta = MetricsDelta::default();

        for channel in self.dispatcher.channels() {
            match self
                .dispatcher
                .dispatch_due(channel, self.limits.dispatch_batch_size)
                .await
            {
                Ok(summary) => {
                    match channel {
                        Channel::Sms => delta.sms_sent += summary.sent as u64,
                        Channel::Email => delta.emails_sent += summary.sent as u64,
                    }
                    delta.failed += summary.failed as u64;
                    report.dispatch.push(summary);
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Dispatch pass failed");
                    report.errors.push(format!("dispatch {channel}: {e}"));
                }
            }
        }

        self.record_metrics(delta, report).await;
    }

    async fn record_metrics(&self, delta: MetricsDelta, report: &mut BatchReport) {
        if delta.is_empty() {
            return;
        }
        let today = Utc::now().date_naive();
        if let Err(e) = self.store.increment_daily_metrics(today, &delta).await {
            warn!(error = %e, "Failed to record daily metrics");
            report.errors.push(format!("metrics: {e}"));
        }
    }
}
