//! Score engine: audits a lead's website and writes qualification fields.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ScoreThresholds;
use crate::error::{DatabaseError, ScoringError};
use crate::leads::{Lead, LeadStatus, Priority};
use crate::scoring::{PerformanceReport, PerformanceScorer};
use crate::store::{Database, LeadScoreUpdate};
use crate::throttle::Pacer;

pub const UNREACHABLE_ISSUE: &str = "Site unreachable";

/// Result of scoring one lead.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreOutcome {
    pub lead_id: Uuid,
    pub score: u8,
    pub priority: Priority,
    pub status: LeadStatus,
    pub issues: Vec<String>,
    /// False when the audit errored or timed out.
    pub reachable: bool,
}

impl ScoreOutcome {
    pub fn is_qualified(&self) -> bool {
        self.status == LeadStatus::Qualified
    }
}

/// Map a score to its tier.
pub fn classify(score: u8, thresholds: &ScoreThresholds) -> (Priority, LeadStatus) {
    if score < thresholds.hot_below {
        (Priority::Hot, LeadStatus::Qualified)
    } else if score < thresholds.qualify_below {
        (Priority::Warm, LeadStatus::Qualified)
    } else {
        (Priority::Low, LeadStatus::Disqualified)
    }
}

/// Human-readable findings for a report, most severe first.
///
/// At most one performance band is reported.
pub fn derive_issues(report: &PerformanceReport, thresholds: &ScoreThresholds) -> Vec<String> {
    let mut issues = Vec::new();

    if report.score < thresholds.extremely_slow_below {
        issues.push(format!(
            "Extremely slow mobile performance (score {}/100)",
            report.score
        ));
    } else if report.score < thresholds.slow_below {
        issues.push(format!("Slow mobile performance (score {}/100)", report.score));
    } else if report.score < thresholds.below_average_below {
        issues.push(format!(
            "Below-average mobile performance (score {}/100)",
            report.score
        ));
    }

    if let Some(ms) = report
        .speed_index_ms
        .filter(|ms| *ms > thresholds.slow_speed_index_ms)
    {
        issues.push(format!("Slow page load ({:.1}s to visually complete)", ms / 1000.0));
    }
    if !report.has_viewport {
        issues.push("Not mobile-friendly (no viewport tag)".to_string());
    }
    if !report.uses_https {
        issues.push("No secure connection (HTTPS)".to_string());
    }

    issues
}

/// Scores leads one at a time with a fixed delay between audit calls.
pub struct ScoreEngine {
    store: Arc<dyn Database>,
    scorer: Arc<dyn PerformanceScorer>,
    thresholds: ScoreThresholds,
    timeout: Duration,
    pacer: Pacer,
}

impl ScoreEngine {
    pub fn new(
        store: Arc<dyn Database>,
        scorer: Arc<dyn PerformanceScorer>,
        thresholds: ScoreThresholds,
        timeout: Duration,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            scorer,
            thresholds,
            timeout,
            pacer: Pacer::new(delay),
        }
    }

    /// Score one lead.
    ///
    /// `scoring` is written before the audit and the final fields after it,
    /// whatever the audit outcome. Only store failures are returned as errors.
    pub async fn score_lead(&self, lead: &Lead) -> Result<ScoreOutcome, DatabaseError> {
        self.store
            .update_lead_status(lead.id, LeadStatus::Scoring)
            .await?;

        self.pacer.wait().await;
        let audit = match tokio::time::timeout(self.timeout, self.scorer.analyze(&lead.website_url))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ScoringError::Timeout(self.timeout)),
        };

        let outcome = match audit {
            Ok(report) => {
                let (priority, status) = classify(report.score, &self.thresholds);
                ScoreOutcome {
                    lead_id: lead.id,
                    score: report.score,
                    priority,
                    status,
                    issues: derive_issues(&report, &self.thresholds),
                    reachable: true,
                }
            }
            Err(e) => {
                warn!(lead_id = %lead.id, url = %lead.website_url, error = %e, "Site audit failed");
                ScoreOutcome {
                    lead_id: lead.id,
                    score: 0,
                    priority: Priority::Hot,
                    status: LeadStatus::Qualified,
                    issues: vec![UNREACHABLE_ISSUE.to_string()],
                    reachable: false,
                }
            }
        };

        self.store
            .update_lead_score(
                lead.id,
                &LeadScoreUpdate {
                    status: outcome.status,
                    priority: outcome.priority,
                    site_score: outcome.score,
                    site_issues: outcome.issues.clone(),
                },
            )
            .await?;

        info!(
            lead_id = %lead.id,
            score = outcome.score,
            priority = %outcome.priority,
            status = %outcome.status,
            "Lead scored"
        );
        Ok(outcome)
    }
}
