//! Authenticated trigger endpoint for the batch actions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::batch::{BatchAction, BatchRunner};
use crate::config::PipelineConfig;

/// Shared state for the trigger route.
#[derive(Clone)]
pub struct TriggerRouteState {
    pub runner: Arc<BatchRunner>,
    pub config: Arc<PipelineConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerParams {
    action: Option<String>,
}

/// Credential from `Authorization: Bearer <secret>` or `x-cron-secret`.
fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    bearer.or_else(|| {
        headers
            .get("x-cron-secret")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// POST|GET /api/trigger?action=...
///
/// The action may also come from a JSON body `{"action": "..."}`; the query
/// string wins when both are present.
async fn trigger(
    State(state): State<TriggerRouteState>,
    headers: HeaderMap,
    Query(params): Query<TriggerParams>,
    body: Bytes,
) -> Response {
    let authorized = presented_secret(&headers).is_some_and(|s| state.config.secret_matches(s));
    if !authorized {
        warn!("Trigger rejected: bad or missing credential");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    let body_action = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<TriggerParams>(&body)
            .ok()
            .and_then(|p| p.action)
    };
    let Some(raw) = params.action.or(body_action) else {
        return error_response(StatusCode::BAD_REQUEST, "missing action");
    };
    let action = match raw.parse::<BatchAction>() {
        Ok(action) => action,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.runner.run(action).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(action = %action, error = %e, "Triggered run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "action": action, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Build the trigger route.
pub fn trigger_routes(state: TriggerRouteState) -> Router {
    Router::new()
        .route("/api/trigger", get(trigger).post(trigger))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn bearer_token_extracted() {
        let h = headers(&[("authorization", "Bearer s3cret")]);
        assert_eq!(presented_secret(&h), Some("s3cret"));
    }

    #[test]
    fn cron_header_extracted() {
        let h = headers(&[("x-cron-secret", "s3cret")]);
        assert_eq!(presented_secret(&h), Some("s3cret"));
    }

    #[test]
    fn other_schemes_ignored() {
        let h = headers(&[("authorization", "Basic abc")]);
        assert_eq!(presented_secret(&h), None);
        assert_eq!(presented_secret(&HeaderMap::new()), None);
    }
}
