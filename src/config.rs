//! Configuration types.
//!
//! Everything is read from `OUTREACH_*` environment variables. Malformed
//! numeric values fall back to their defaults; only the trigger secret is
//! mandatory.

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Parse an environment variable, falling back to `default` when unset or invalid.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Pipeline-wide settings: HTTP surface, batch sizes and pacing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Port the trigger + tracking server listens on.
    pub listen_port: u16,
    /// Public base URL used to build tracking links (no trailing slash).
    pub public_base_url: String,
    /// Shared secret required by the trigger endpoint.
    pub trigger_secret: SecretString,
    /// Where click redirects land when the destination is missing or unsafe.
    pub fallback_redirect_url: String,
    /// Path of the libSQL database file.
    pub db_path: String,
    /// Leads pulled per score-and-sequence run.
    pub score_batch_size: usize,
    /// Messages pulled per channel per dispatch run.
    pub dispatch_batch_size: usize,
    /// Minimum gap between consecutive scoring API calls.
    pub score_delay: Duration,
    /// Minimum gap between consecutive provider calls on one channel.
    pub send_delay: Duration,
    /// Upper bound on a single scoring call.
    pub score_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
            trigger_secret: SecretString::from(""),
            fallback_redirect_url: "https://example.com".to_string(),
            db_path: "./data/outreach.db".to_string(),
            score_batch_size: 10,
            dispatch_batch_size: 25,
            score_delay: Duration::from_millis(1500),
            send_delay: Duration::from_millis(1500),
            score_timeout: Duration::from_secs(25),
        }
    }
}

impl PipelineConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let trigger_secret = std::env::var("OUTREACH_TRIGGER_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("OUTREACH_TRIGGER_SECRET".into()))?;
        if trigger_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_TRIGGER_SECRET".into(),
                message: "must not be empty".into(),
            });
        }

        let public_base_url = std::env::var("OUTREACH_PUBLIC_URL")
            .unwrap_or(defaults.public_base_url)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            listen_port: env_or("OUTREACH_PORT", defaults.listen_port),
            public_base_url,
            trigger_secret: SecretString::from(trigger_secret),
            fallback_redirect_url: std::env::var("OUTREACH_FALLBACK_URL")
                .unwrap_or(defaults.fallback_redirect_url),
            db_path: std::env::var("OUTREACH_DB_PATH").unwrap_or(defaults.db_path),
            score_batch_size: env_or("OUTREACH_SCORE_BATCH_SIZE", defaults.score_batch_size),
            dispatch_batch_size: env_or(
                "OUTREACH_DISPATCH_BATCH_SIZE",
                defaults.dispatch_batch_size,
            ),
            score_delay: Duration::from_millis(env_or("OUTREACH_SCORE_DELAY_MS", 1500)),
            send_delay: Duration::from_millis(env_or("OUTREACH_SEND_DELAY_MS", 1500)),
            score_timeout: Duration::from_secs(env_or("OUTREACH_SCORE_TIMEOUT_SECS", 25)),
        })
    }

    /// Check a presented credential against the trigger secret.
    ///
    /// An empty configured secret never matches.
    pub fn secret_matches(&self, presented: &str) -> bool {
        let expected = self.trigger_secret.expose_secret();
        !expected.is_empty() && expected == presented
    }
}

/// Score bands used by the score engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreThresholds {
    /// Scores below this are `hot`.
    pub hot_below: u8,
    /// Scores below this (and at or above `hot_below`) are `warm`; the rest disqualify.
    pub qualify_below: u8,
    pub extremely_slow_below: u8,
    pub slow_below: u8,
    pub below_average_below: u8,
    /// Speed index (ms) above which a load-time issue is reported.
    pub slow_speed_index_ms: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            hot_below: 40,
            qualify_below: 70,
            extremely_slow_below: 30,
            slow_below: 50,
            below_average_below: 70,
            slow_speed_index_ms: 5000.0,
        }
    }
}

impl ScoreThresholds {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            hot_below: env_or("OUTREACH_HOT_BELOW", d.hot_below),
            qualify_below: env_or("OUTREACH_QUALIFY_BELOW", d.qualify_below),
            extremely_slow_below: env_or("OUTREACH_EXTREMELY_SLOW_BELOW", d.extremely_slow_below),
            slow_below: env_or("OUTREACH_SLOW_BELOW", d.slow_below),
            below_average_below: env_or("OUTREACH_BELOW_AVERAGE_BELOW", d.below_average_below),
            slow_speed_index_ms: env_or("OUTREACH_SLOW_SPEED_INDEX_MS", d.slow_speed_index_ms),
        }
    }
}

/// In-process scheduler for deployments without an external cron trigger.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Cron expressions (seconds field first, as the `cron` crate expects).
    pub score_cron: String,
    pub dispatch_cron: String,
    pub reset_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            score_cron: "0 0 * * * *".to_string(),
            dispatch_cron: "0 */15 * * * *".to_string(),
            reset_cron: "0 0 0 * * *".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("OUTREACH_SCHEDULER_ENABLED", false),
            score_cron: std::env::var("OUTREACH_SCORE_CRON").unwrap_or(defaults.score_cron),
            dispatch_cron: std::env::var("OUTREACH_DISPATCH_CRON")
                .unwrap_or(defaults.dispatch_cron),
            reset_cron: std::env::var("OUTREACH_RESET_CRON").unwrap_or(defaults.reset_cron),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_match_tiers() {
        let t = ScoreThresholds::default();
        assert_eq!(t.hot_below, 40);
        assert_eq!(t.qualify_below, 70);
        assert_eq!(t.slow_speed_index_ms, 5000.0);
    }

    #[test]
    fn empty_secret_never_matches() {
        let config = PipelineConfig::default();
        assert!(!config.secret_matches(""));
        assert!(!config.secret_matches("anything"));
    }

    #[test]
    fn secret_matches_exact_value() {
        let config = PipelineConfig {
            trigger_secret: SecretString::from("s3cret"),
            ..Default::default()
        };
        assert!(config.secret_matches("s3cret"));
        assert!(!config.secret_matches("s3cret "));
        assert!(!config.secret_matches("wrong"));
    }

    #[test]
    fn env_or_uses_default_when_unset() {
        assert_eq!(env_or("OUTREACH_TEST_DEFINITELY_UNSET", 7usize), 7);
    }

    #[test]
    fn scheduler_disabled_by_default() {
        assert!(!SchedulerConfig::default().enabled);
    }
}
