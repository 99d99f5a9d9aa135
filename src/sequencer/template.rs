//! Sequence cadence and `{{placeholder}}` message templates.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::error::ConfigError;
use crate::leads::Lead;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// One timed touch in a lead's sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceStep {
    pub channel: Channel,
    /// Offset from the moment the lead is sequenced.
    pub delay_hours: u32,
    /// Email subject template; ignored for SMS.
    #[serde(default)]
    pub subject: Option<String>,
    pub template: String,
}

impl SequenceStep {
    fn new(channel: Channel, delay_hours: u32, subject: Option<&str>, template: &str) -> Self {
        Self {
            channel,
            delay_hours,
            subject: subject.map(str::to_string),
            template: template.to_string(),
        }
    }
}

/// The ordered cadence applied to every qualified lead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceConfig {
    pub steps: Vec<SequenceStep>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                SequenceStep::new(
                    Channel::Sms,
                    0,
                    None,
                    "Hi {{business_name}}, I ran a free mobile check on {{website_url}} and it scored {{score}}/100. Biggest issue: {{top_issue}}. Want the full report? Opt out: {{unsubscribe_url}}",
                ),
                SequenceStep::new(
                    Channel::Email,
                    0,
                    Some("{{business_name}}: your website scored {{score}}/100 on mobile"),
                    "<p>Hi {{business_name}} team,</p>\
                     <p>I ran <a href=\"{{website_url}}\">{{website_url}}</a> through Google's mobile performance test and it scored <b>{{score}}/100</b>.</p>\
                     <p>What we found: {{issues}}.</p>\
                     <p>Most visitors who hit a slow mobile site leave before it loads. I can send over a short plan to fix it, no cost.</p>",
                ),
                SequenceStep::new(
                    Channel::Email,
                    72,
                    Some("Re: {{business_name}} mobile score"),
                    "<p>Following up on my note about {{website_url}}.</p>\
                     <p>The biggest issue ({{top_issue}}) is usually a quick fix. Happy to walk you through it.</p>",
                ),
                SequenceStep::new(
                    Channel::Sms,
                    120,
                    None,
                    "Quick follow-up for {{business_name}}: {{website_url}} still scores {{score}}/100 on mobile. Want a hand fixing it? Opt out: {{unsubscribe_url}}",
                ),
                SequenceStep::new(
                    Channel::Email,
                    168,
                    Some("Last note about {{website_url}}"),
                    "<p>I won't keep filling your inbox. If improving {{website_url}} ever becomes a priority, just reply and I'll send the report.</p>",
                ),
            ],
        }
    }
}

impl SequenceConfig {
    /// Load the cadence from the JSON file named by `OUTREACH_SEQUENCE_FILE`, if set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let Ok(path) = std::env::var("OUTREACH_SEQUENCE_FILE") else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::InvalidValue {
            key: "OUTREACH_SEQUENCE_FILE".into(),
            message: format!("cannot read {path}: {e}"),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "OUTREACH_SEQUENCE_FILE".into(),
            message: e.to_string(),
        })?;
        if config.steps.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_SEQUENCE_FILE".into(),
                message: "sequence has no steps".into(),
            });
        }
        Ok(config)
    }
}

/// Values available to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    values: HashMap<&'static str, String>,
}

impl TemplateContext {
    pub fn for_lead(lead: &Lead, unsubscribe_url: &str) -> Self {
        let mut values = HashMap::new();
        values.insert("business_name", lead.business_name.clone());
        values.insert("website_url", lead.website_url.clone());
        values.insert(
            "score",
            lead.site_score.map(|s| s.to_string()).unwrap_or_default(),
        );
        values.insert(
            "top_issue",
            lead.site_issues.first().cloned().unwrap_or_default(),
        );
        values.insert("issues", lead.site_issues.join(", "));
        values.insert("unsubscribe_url", unsubscribe_url.to_string());
        Self { values }
    }
}

/// Substitute `{{name}}` placeholders. Unknown names render empty.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            ctx.values.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_lead() -> Lead {
        let mut lead = Lead::new("Corner Bakery", "https://bakery.test");
        lead.site_score = Some(25);
        lead.site_issues = vec!["Slow page load".into(), "No viewport".into()];
        lead
    }

    #[test]
    fn renders_known_placeholders() {
        let ctx = TemplateContext::for_lead(&scored_lead(), "https://go.test/t/u/1");
        let out = render(
            "{{business_name}} scored {{ score }}: {{top_issue}} | {{issues}} | {{unsubscribe_url}}",
            &ctx,
        );
        assert_eq!(
            out,
            "Corner Bakery scored 25: Slow page load | Slow page load, No viewport | https://go.test/t/u/1"
        );
    }

    #[test]
    fn unknown_placeholder_renders_empty() {
        let ctx = TemplateContext::for_lead(&scored_lead(), "");
        assert_eq!(render("a{{nope}}b", &ctx), "ab");
    }

    #[test]
    fn default_cadence() {
        let steps = SequenceConfig::default().steps;
        let cadence: Vec<(Channel, u32)> = steps.iter().map(|s| (s.channel, s.delay_hours)).collect();
        assert_eq!(
            cadence,
            vec![
                (Channel::Sms, 0),
                (Channel::Email, 0),
                (Channel::Email, 72),
                (Channel::Sms, 120),
                (Channel::Email, 168),
            ]
        );
        assert!(steps
            .iter()
            .filter(|s| s.channel == Channel::Email)
            .all(|s| s.subject.is_some()));
    }

    #[test]
    fn sequence_from_json() {
        let config = SequenceConfig::from_json(
            r#"{"steps":[{"channel":"sms","delay_hours":4,"template":"hi {{business_name}}"}]}"#,
        )
        .unwrap();
        assert_eq!(config.steps.len(), 1);
        assert_eq!(config.steps[0].delay_hours, 4);
        assert!(config.steps[0].subject.is_none());

        assert!(SequenceConfig::from_json(r#"{"steps":[]}"#).is_err());
        assert!(SequenceConfig::from_json("not json").is_err());
    }
}
