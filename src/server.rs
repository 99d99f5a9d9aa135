//! Component wiring and the HTTP surface (trigger, tracking, health).

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::batch::{BatchLimits, BatchRunner, TriggerRouteState, trigger_routes};
use crate::channels::ProviderSet;
use crate::config::{PipelineConfig, ScoreThresholds};
use crate::dispatch::Dispatcher;
use crate::scoring::{PerformanceScorer, ScoreEngine};
use crate::senders::SenderPool;
use crate::sequencer::{SequenceConfig, Sequencer};
use crate::store::Database;
use crate::tracking::{EngagementTracker, TrackingLinks, TrackingRouteState, tracking_routes};

/// Every pipeline component, sharing one store handle.
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    pub store: Arc<dyn Database>,
    pub pool: Arc<SenderPool>,
    pub runner: Arc<BatchRunner>,
    pub tracker: Arc<EngagementTracker>,
}

/// External collaborators the pipeline is built from.
pub struct PipelineDeps {
    pub store: Arc<dyn Database>,
    pub scorer: Arc<dyn PerformanceScorer>,
    pub providers: ProviderSet,
    pub pool: SenderPool,
    pub thresholds: ScoreThresholds,
    pub sequence: SequenceConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Self {
        let config = Arc::new(config);
        let store = deps.store;
        let pool = Arc::new(deps.pool);
        let links = TrackingLinks::new(config.public_base_url.clone());

        let sequencer = Arc::new(Sequencer::new(store.clone(), deps.sequence, links));
        let engine = ScoreEngine::new(
            store.clone(),
            deps.scorer,
            deps.thresholds,
            config.score_timeout,
            config.score_delay,
        );
        let dispatcher = Dispatcher::new(
            store.clone(),
            deps.providers,
            pool.clone(),
            config.send_delay,
        );
        let runner = Arc::new(BatchRunner::new(
            store.clone(),
            engine,
            sequencer.clone(),
            dispatcher,
            pool.clone(),
            BatchLimits {
                score_batch_size: config.score_batch_size,
                dispatch_batch_size: config.dispatch_batch_size,
            },
        ));
        let tracker = Arc::new(EngagementTracker::new(store.clone(), sequencer));

        Self {
            config,
            store,
            pool,
            runner,
            tracker,
        }
    }

    /// The full HTTP router.
    pub fn router(&self) -> Router {
        let trigger = trigger_routes(TriggerRouteState {
            runner: self.runner.clone(),
            config: self.config.clone(),
        });
        let tracking = tracking_routes(TrackingRouteState {
            tracker: self.tracker.clone(),
            fallback_url: self.config.fallback_redirect_url.clone(),
        });

        Router::new()
            .route("/health", get(health))
            .merge(trigger)
            .merge(tracking)
            .layer(TraceLayer::new_for_http())
    }
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Channel, ChannelProvider, Envelope, ProviderId};
    use crate::error::{ChannelError, ScoringError};
    use crate::scoring::PerformanceReport;
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use secrecy::SecretString;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubScorer;

    #[async_trait]
    impl PerformanceScorer for StubScorer {
        async fn analyze(&self, _url: &str) -> Result<PerformanceReport, ScoringError> {
            Ok(PerformanceReport {
                score: 30,
                speed_index_ms: None,
                has_viewport: true,
                uses_https: true,
            })
        }
    }

    struct StubProvider;

    #[async_trait]
    impl ChannelProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn send(&self, _envelope: &Envelope) -> Result<ProviderId, ChannelError> {
            Ok(ProviderId("stub-1".into()))
        }
    }

    async fn app() -> Router {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let config = PipelineConfig {
            trigger_secret: SecretString::from("s3cret"),
            score_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            ..Default::default()
        };
        Pipeline::new(
            config,
            PipelineDeps {
                pool: SenderPool::new(store.clone()),
                store,
                scorer: Arc::new(StubScorer),
                providers: ProviderSet::new().with(Channel::Sms, Arc::new(StubProvider)),
                thresholds: ScoreThresholds::default(),
                sequence: SequenceConfig::default(),
            },
        )
        .router()
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = router.oneshot(req).await.unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn health_ok() {
        let (status, body) = send(
            app().await,
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn trigger_requires_secret_before_action() {
        let (status, _) = send(
            app().await,
            Request::post("/api/trigger?action=nonsense")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            app().await,
            Request::post("/api/trigger?action=reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn trigger_rejects_missing_or_unknown_action() {
        let (status, body) = send(
            app().await,
            Request::post("/api/trigger")
                .header("x-cron-secret", "s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing action");

        let (status, body) = send(
            app().await,
            Request::post("/api/trigger?action=launch-rockets")
                .header("x-cron-secret", "s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("launch-rockets"));
    }

    #[tokio::test]
    async fn trigger_runs_action_from_query_or_body() {
        let (status, body) = send(
            app().await,
            Request::get("/api/trigger?action=reset")
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "reset");
        assert_eq!(body["identities_reset"], 0);

        let (status, body) = send(
            app().await,
            Request::post("/api/trigger")
                .header("authorization", "Bearer s3cret")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"action":"dispatch"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "dispatch");
        assert_eq!(body["dispatch"][0]["channel"], "sms");
        assert!(body["errors"].as_array().unwrap().is_empty());
    }
}
