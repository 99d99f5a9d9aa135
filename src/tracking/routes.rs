//! Public tracking endpoints: click redirect, open pixel, unsubscribe page.
//!
//! These always answer with their success response. Failures are logged at
//! `warn` and otherwise dropped.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::tracker::EngagementTracker;

/// 1x1 transparent GIF.
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const UNSUBSCRIBED_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>Unsubscribed</title></head>
<body style="font-family:sans-serif;max-width:480px;margin:4rem auto;text-align:center">
<h1>You're unsubscribed</h1>
<p>You won't receive any more messages from us.</p>
</body>
</html>"#;

/// Shared state for tracking routes.
#[derive(Clone)]
pub struct TrackingRouteState {
    pub tracker: Arc<EngagementTracker>,
    /// Redirect target when a click carries no usable destination.
    pub fallback_url: String,
}

#[derive(Debug, Deserialize)]
struct ClickQuery {
    url: Option<String>,
}

fn parse_id(raw: &str, endpoint: &str) -> Option<Uuid> {
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(endpoint, id = raw, "Tracking hit with malformed message id");
            None
        }
    }
}

/// GET /t/c/{message_id}?url=...
///
/// Records a click and redirects to the destination when it is one of the
/// message's own tracked links, otherwise to the fallback site.
async fn click(
    State(state): State<TrackingRouteState>,
    Path(raw_id): Path<String>,
    Query(query): Query<ClickQuery>,
) -> Response {
    let mut destination = None;
    if let Some(id) = parse_id(&raw_id, "click") {
        match state.tracker.record_click(id, query.url.as_deref()).await {
            Ok(linked) => destination = linked,
            Err(e) => warn!(message_id = %id, error = %e, "Failed to record click"),
        }
    }

    let location = destination.unwrap_or_else(|| state.fallback_url.clone());
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// GET /t/o/{message_id}
///
/// Records an open and returns a transparent pixel.
async fn open(State(state): State<TrackingRouteState>, Path(raw_id): Path<String>) -> Response {
    if let Some(id) = parse_id(&raw_id, "open")
        && let Err(e) = state.tracker.record_open(id).await
    {
        warn!(message_id = %id, error = %e, "Failed to record open");
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate, max-age=0"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}

/// GET|POST /t/u/{message_id}
///
/// Unsubscribes the lead that received the message.
async fn unsubscribe(
    State(state): State<TrackingRouteState>,
    Path(raw_id): Path<String>,
) -> Html<&'static str> {
    if let Some(id) = parse_id(&raw_id, "unsubscribe") {
        let result = match state.tracker.resolve_lead(id).await {
            Ok(lead_id) => state.tracker.record_unsubscribe(lead_id).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(message_id = %id, error = %e, "Failed to process unsubscribe");
        }
    }
    Html(UNSUBSCRIBED_PAGE)
}

/// Build the tracking routes.
pub fn tracking_routes(state: TrackingRouteState) -> Router {
    Router::new()
        .route("/t/c/{message_id}", get(click))
        .route("/t/o/{message_id}", get(open))
        .route("/t/u/{message_id}", get(unsubscribe).post(unsubscribe))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;
    use crate::leads::{Lead, LeadStatus};
    use crate::messages::{MessageStatus, OutboundMessage};
    use crate::sequencer::{SequenceConfig, Sequencer};
    use crate::store::{Database, LibSqlBackend, SentReceipt};
    use crate::tracking::TrackingLinks;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use tower::ServiceExt;

    async fn setup() -> (Arc<dyn Database>, Router, OutboundMessage) {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sequencer = Arc::new(Sequencer::new(
            store.clone(),
            SequenceConfig::default(),
            TrackingLinks::new("https://go.example.com"),
        ));
        let mut lead = Lead::new("Corner Bakery", "https://bakery.test");
        lead.status = LeadStatus::Qualified;
        store.insert_lead(&lead).await.unwrap();
        let id = Uuid::new_v4();
        let body = sequencer
            .links()
            .instrument_email(r#"<p>hi <a href="https://audit.test/r">report</a></p>"#, id);
        let message = OutboundMessage::scheduled(
            id,
            lead.id,
            Channel::Email,
            1,
            "o@bakery.test",
            None,
            body,
            Utc::now(),
        );
        store.insert_messages(std::slice::from_ref(&message)).await.unwrap();
        store
            .mark_message_sent(
                id,
                &SentReceipt {
                    from_address: "mail.example.com".into(),
                    provider_message_id: "<r@mail.example.com>".into(),
                    sent_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let router = tracking_routes(TrackingRouteState {
            tracker: Arc::new(EngagementTracker::new(store.clone(), sequencer)),
            fallback_url: "https://fallback.test".into(),
        });
        (store, router, message)
    }

    async fn get(router: &Router, uri: &str) -> Response {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn click_redirects_and_records() {
        let (store, router, message) = setup().await;
        let res = get(
            &router,
            &format!("/t/c/{}?url=https%3A%2F%2Faudit.test%2Fr", message.id),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "https://audit.test/r");

        let m = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(m.clicks, 1);
        assert_eq!(m.status, MessageStatus::Clicked);
    }

    #[tokio::test]
    async fn click_with_unsafe_url_uses_fallback() {
        let (_store, router, message) = setup().await;
        let res = get(
            &router,
            &format!("/t/c/{}?url=javascript%3Aalert(1)", message.id),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "https://fallback.test");

        let res = get(&router, &format!("/t/c/{}", message.id)).await;
        assert_eq!(res.headers()[header::LOCATION], "https://fallback.test");
    }

    #[tokio::test]
    async fn click_to_unlinked_url_uses_fallback() {
        let (store, router, message) = setup().await;
        let res = get(
            &router,
            &format!("/t/c/{}?url=https%3A%2F%2Fphish.test%2Flogin", message.id),
        )
        .await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(res.headers()[header::LOCATION], "https://fallback.test");

        let m = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(m.clicks, 1);
    }

    #[tokio::test]
    async fn click_on_unknown_or_malformed_id_still_redirects() {
        let (_store, router, _message) = setup().await;
        let res = get(&router, &format!("/t/c/{}?url=https%3A%2F%2Fa.test", Uuid::new_v4())).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        let res = get(&router, "/t/c/not-a-uuid").await;
        assert_eq!(res.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn open_returns_uncached_gif() {
        let (store, router, message) = setup().await;
        let res = get(&router, &format!("/t/o/{}", message.id)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/gif");
        assert!(res.headers()[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .contains("no-cache"));
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], PIXEL_GIF);

        let m = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(m.opens, 1);

        let res = get(&router, "/t/o/garbage").await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unsubscribe_returns_page_and_updates_lead() {
        let (store, router, message) = setup().await;
        let res = get(&router, &format!("/t/u/{}", message.id)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), 4096).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("unsubscribed"));

        let lead = store.get_lead(message.lead_id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Unsubscribed);
    }
}
