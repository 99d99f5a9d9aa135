//! Website scoring: performance audits that qualify and prioritise leads.

pub mod engine;
pub mod pagespeed;

use async_trait::async_trait;

use crate::error::ScoringError;

pub use engine::{ScoreEngine, ScoreOutcome, classify, derive_issues};
pub use pagespeed::{PageSpeedConfig, PageSpeedScorer};

/// What a performance audit found for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    /// Performance category score, 0–100.
    pub score: u8,
    pub speed_index_ms: Option<f64>,
    pub has_viewport: bool,
    pub uses_https: bool,
}

/// An external performance audit service.
#[async_trait]
pub trait PerformanceScorer: Send + Sync {
    async fn analyze(&self, url: &str) -> Result<PerformanceReport, ScoringError>;
}
