//! Google PageSpeed Insights v5 client (mobile strategy, performance category).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::ScoringError;
use crate::scoring::{PerformanceReport, PerformanceScorer};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/pagespeedonline/v5";

/// PageSpeed client configuration.
#[derive(Debug, Clone)]
pub struct PageSpeedConfig {
    pub api_base: String,
    pub api_key: Option<SecretString>,
    /// Client-side timeout; the engine applies its own bound as well.
    pub timeout: Duration,
}

impl Default for PageSpeedConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PageSpeedConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: std::env::var("PAGESPEED_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            api_key: std::env::var("PAGESPEED_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            timeout: defaults.timeout,
        }
    }
}

// Only the fields we read from the (very large) response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunPagespeedResponse {
    lighthouse_result: LighthouseResult,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    categories: Categories,
    #[serde(default)]
    audits: Audits,
}

#[derive(Debug, Deserialize)]
struct Categories {
    performance: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Audits {
    #[serde(rename = "speed-index")]
    speed_index: Option<Audit>,
    viewport: Option<Audit>,
    #[serde(rename = "is-on-https")]
    is_on_https: Option<Audit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Audit {
    score: Option<f64>,
    numeric_value: Option<f64>,
}

impl Audit {
    fn passed(audit: &Option<Audit>) -> bool {
        audit
            .as_ref()
            .and_then(|a| a.score)
            .is_some_and(|s| s >= 1.0)
    }
}

/// PageSpeed Insights implementation of [`PerformanceScorer`].
pub struct PageSpeedScorer {
    client: reqwest::Client,
    config: PageSpeedConfig,
}

impl PageSpeedScorer {
    pub fn new(config: PageSpeedConfig) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ScoringError::RequestFailed(format!("failed to build client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, url: &str) -> Result<reqwest::Url, ScoringError> {
        let base = format!("{}/runPagespeed", self.config.api_base);
        let mut params = vec![
            ("url", url.to_string()),
            ("strategy", "mobile".to_string()),
            ("category", "performance".to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("key", key.expose_secret().to_string()));
        }
        reqwest::Url::parse_with_params(&base, &params)
            .map_err(|e| ScoringError::RequestFailed(format!("invalid endpoint: {e}")))
    }
}

#[async_trait]
impl PerformanceScorer for PageSpeedScorer {
    async fn analyze(&self, url: &str) -> Result<PerformanceReport, ScoringError> {
        let endpoint = self.endpoint(url)?;
        let response = self.client.get(endpoint).send().await.map_err(|e| {
            if e.is_timeout() {
                ScoringError::Timeout(self.config.timeout)
            } else {
                ScoringError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoringError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RunPagespeedResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::InvalidResponse(e.to_string()))?;
        let lighthouse = parsed.lighthouse_result;

        let raw = lighthouse.categories.performance.score.ok_or_else(|| {
            ScoringError::InvalidResponse("performance score missing".into())
        })?;
        let score = (raw.clamp(0.0, 1.0) * 100.0).round() as u8;
        let audits = lighthouse.audits;

        let report = PerformanceReport {
            score,
            speed_index_ms: audits.speed_index.as_ref().and_then(|a| a.numeric_value),
            has_viewport: Audit::passed(&audits.viewport),
            uses_https: url.starts_with("https://") && Audit::passed(&audits.is_on_https),
        };
        debug!(url, score = report.score, "PageSpeed audit complete");
        Ok(report)
    }
}
