use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use outreach::batch::spawn_scheduler;
use outreach::channels::{
    Channel, EmailConfig, ProviderSet, SmsConfig, SmtpEmailProvider, TwilioSmsProvider,
};
use outreach::config::{PipelineConfig, SchedulerConfig, ScoreThresholds};
use outreach::scoring::{PageSpeedConfig, PageSpeedScorer};
use outreach::senders::SenderPool;
use outreach::sequencer::SequenceConfig;
use outreach::server::{Pipeline, PipelineDeps};
use outreach::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PipelineConfig::from_env()?;
    let thresholds = ScoreThresholds::from_env();
    let sequence = SequenceConfig::from_env()?;
    let scheduler_config = SchedulerConfig::from_env();

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(Path::new(&config.db_path))
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path))?,
    );

    // ── Providers & sender pool ──────────────────────────────────────────
    let mut providers = ProviderSet::new();
    let mut pool = SenderPool::new(store.clone());

    if let Some(sms) = SmsConfig::from_env() {
        if let Some(from) = &sms.default_from {
            pool = pool.with_default(Channel::Sms, from, sms.default_daily_limit);
        }
        providers = providers.with(Channel::Sms, Arc::new(TwilioSmsProvider::new(sms)?));
    } else {
        tracing::warn!("TWILIO_ACCOUNT_SID not set, SMS dispatch disabled");
    }

    if let Some(email) = EmailConfig::from_env() {
        if let Some(from) = &email.default_from {
            pool = pool.with_default(Channel::Email, from, email.default_daily_limit);
        }
        providers = providers.with(Channel::Email, Arc::new(SmtpEmailProvider::new(email)));
    } else {
        tracing::warn!("SMTP_HOST not set, email dispatch disabled");
    }

    let ensured = pool.ensure_default_identities().await?;
    tracing::info!(defaults = ensured, channels = ?providers.channels(), "Providers configured");

    let scorer = Arc::new(PageSpeedScorer::new(PageSpeedConfig::from_env())?);

    let port = config.listen_port;
    let pipeline = Pipeline::new(
        config,
        PipelineDeps {
            store,
            scorer,
            providers,
            pool,
            thresholds,
            sequence,
        },
    );

    // ── Scheduler ────────────────────────────────────────────────────────
    let _scheduler_handles = if scheduler_config.enabled {
        let handles = spawn_scheduler(pipeline.runner.clone(), &scheduler_config)?;
        tracing::info!(tasks = handles.len(), "In-process scheduler started");
        handles
    } else {
        Vec::new()
    };

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = pipeline.router();
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!(port, "Outreach server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
