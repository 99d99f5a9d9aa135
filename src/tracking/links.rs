//! Tracking URL construction and email body instrumentation.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use uuid::Uuid;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*"(https?://[^"]+)""#).expect("href pattern is valid")
});

/// Normalised form of `url` if it is an absolute http(s) URL with a host.
pub fn normalize_destination(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .map(String::from)
}

/// Builds click, open and unsubscribe URLs under the public base URL.
#[derive(Debug, Clone)]
pub struct TrackingLinks {
    base: String,
}

impl TrackingLinks {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Redirecting click URL. `destination` is query-encoded.
    pub fn click_url(&self, message_id: Uuid, destination: &str) -> String {
        let endpoint = format!("{}/t/c/{message_id}", self.base);
        reqwest::Url::parse_with_params(&endpoint, &[("url", destination)])
            .map(String::from)
            .unwrap_or(endpoint)
    }

    pub fn open_url(&self, message_id: Uuid) -> String {
        format!("{}/t/o/{message_id}", self.base)
    }

    pub fn unsubscribe_url(&self, message_id: Uuid) -> String {
        format!("{}/t/u/{message_id}", self.base)
    }

    /// Route every external `href` in an HTML body through the click endpoint.
    ///
    /// Links already pointing at this server (unsubscribe, tracking) are left alone.
    pub fn rewrite_links(&self, html: &str, message_id: Uuid) -> String {
        HREF_RE
            .replace_all(html, |caps: &Captures| {
                let url = &caps[1];
                if url.starts_with(&self.base) {
                    caps[0].to_string()
                } else {
                    format!(r#"href="{}""#, self.click_url(message_id, url))
                }
            })
            .into_owned()
    }

    /// Destinations of the click-tracked links in a message body, normalised.
    pub fn tracked_destinations(&self, body: &str, message_id: Uuid) -> Vec<String> {
        let endpoint = format!("{}/t/c/{message_id}?", self.base);
        HREF_RE
            .captures_iter(body)
            .filter(|caps| caps[1].starts_with(&endpoint))
            .filter_map(|caps| reqwest::Url::parse(&caps[1]).ok())
            .filter_map(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "url")
                    .and_then(|(_, dest)| normalize_destination(&dest))
            })
            .collect()
    }

    /// Rewrite links, ensure an unsubscribe link and append the open pixel.
    pub fn instrument_email(&self, html: &str, message_id: Uuid) -> String {
        let unsubscribe = self.unsubscribe_url(message_id);
        let mut body = self.rewrite_links(html, message_id);
        if !body.contains(&unsubscribe) {
            body.push_str(&format!(
                r#"<p style="font-size:12px;color:#888">Not interested? <a href="{unsubscribe}">Unsubscribe</a></p>"#
            ));
        }
        body.push_str(&format!(
            r#"<img src="{}" width="1" height="1" alt="" style="display:none">"#,
            self.open_url(message_id)
        ));
        body
    }
}
