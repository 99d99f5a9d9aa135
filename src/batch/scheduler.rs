//! Optional in-process cron scheduler for the batch actions.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::batch::{BatchAction, BatchRunner};
use crate::config::SchedulerConfig;
use crate::error::ConfigError;

/// Parse a cron expression for `action`.
fn parse_schedule(action: BatchAction, expr: &str) -> Result<cron::Schedule, ConfigError> {
    cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: format!("{action} cron"),
        message: format!("invalid cron expression {expr:?}: {e}"),
    })
}

/// The configured (action, schedule) pairs.
pub fn schedules(config: &SchedulerConfig) -> Result<Vec<(BatchAction, cron::Schedule)>, ConfigError> {
    Ok(vec![
        (
            BatchAction::ScoreAndSequence,
            parse_schedule(BatchAction::ScoreAndSequence, &config.score_cron)?,
        ),
        (
            BatchAction::Dispatch,
            parse_schedule(BatchAction::Dispatch, &config.dispatch_cron)?,
        ),
        (
            BatchAction::Reset,
            parse_schedule(BatchAction::Reset, &config.reset_cron)?,
        ),
    ])
}

/// Spawn one background task per action that runs it on its cron schedule.
///
/// Expressions are validated before anything is spawned.
pub fn spawn_scheduler(
    runner: Arc<BatchRunner>,
    config: &SchedulerConfig,
) -> Result<Vec<tokio::task::JoinHandle<()>>, ConfigError> {
    let schedules = schedules(config)?;

    Ok(schedules
        .into_iter()
        .map(|(action, schedule)| {
            let runner = runner.clone();
            tokio::spawn(async move {
                loop {
                    let Some(next) = schedule.upcoming(Utc).next() else {
                        info!(action = %action, "Cron schedule has no further fire times");
                        return;
                    };
                    let wait = (next - Utc::now()).to_std().unwrap_or_default();
                    tokio::time::sleep(wait).await;

                    match runner.run(action).await {
                        Ok(report) => info!(
                            action = %action,
                            errors = report.errors.len(),
                            "Scheduled run finished"
                        ),
                        Err(e) => error!(action = %action, error = %e, "Scheduled run failed"),
                    }
                }
            })
        })
        .collect())
}
