use async_trait::async_trait;
use chrono::DateTime;
use html_escape::decode_html_entities;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::app::{Result, SluiceError};
use crate::config::{GrabSettings, TwitterSettings};
use crate::domain::CandidateMessage;
use crate::source::{http_client, Source};

const TIMELINE_COUNT: &str = "200";
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// User timeline source. The source identifier is a screen name.
pub struct TimelineSource {
    client: Client,
    api_base: String,
    bearer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Post {
    created_at: String,
    #[serde(alias = "full_text")]
    text: String,
    #[serde(default)]
    entities: Entities,
}

#[derive(Debug, Default, Deserialize)]
struct Entities {
    #[serde(default)]
    urls: Vec<UrlEntity>,
}

#[derive(Debug, Deserialize)]
struct UrlEntity {
    expanded_url: Option<String>,
}

impl TimelineSource {
    pub fn new(grab: &GrabSettings, config: &TwitterSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(grab)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn timeline_url(&self, screen_name: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/statuses/user_timeline.json", self.api_base))?;
        url.query_pairs_mut()
            .append_pair("screen_name", screen_name.trim_start_matches('@'))
            .append_pair("count", TIMELINE_COUNT)
            .append_pair("tweet_mode", "extended");
        Ok(url)
    }

    pub fn parse(body: &[u8]) -> Result<Vec<CandidateMessage>> {
        let posts: Vec<Post> = serde_json::from_slice(body)?;

        Ok(posts
            .into_iter()
            .map(|post| {
                let timestamp = DateTime::parse_from_str(&post.created_at, CREATED_AT_FORMAT)
                    .ok()
                    .map(|dt| dt.timestamp());
                let url = post
                    .entities
                    .urls
                    .into_iter()
                    .find_map(|u| u.expanded_url);

                CandidateMessage::new(timestamp, decode_html_entities(&post.text), url)
            })
            .collect())
    }
}

#[async_trait]
impl Source for TimelineSource {
    async fn fetch(&self, source: &str) -> Result<Vec<CandidateMessage>> {
        let token = self
            .bearer_token
            .as_deref()
            .ok_or_else(|| SluiceError::PluginInactive("twitter settings are not set".into()))?;

        let response = self
            .client
            .get(self.timeline_url(source)?)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;

        let messages = Self::parse(&body)?;
        tracing::debug!("Fetched {} posts from {}", messages.len(), source);
        Ok(messages)
    }

    fn is_active(&self) -> bool {
        self.bearer_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMELINE_SAMPLE: &str = r#"[
        {
            "created_at": "Mon Jan 01 00:00:00 +0000 2024",
            "full_text": "Shipping 2.0 today &amp; more https://t.co/abc",
            "entities": { "urls": [ { "expanded_url": "https://example.com/2.0" } ] }
        },
        {
            "created_at": "garbage",
            "text": "no links here"
        }
    ]"#;

    fn source(token: Option<&str>) -> TimelineSource {
        TimelineSource::new(
            &GrabSettings::default(),
            &TwitterSettings {
                api_base: "https://api.example.com/1.1/".into(),
                bearer_token: token.map(String::from),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_parse_timeline() {
        let messages = TimelineSource::parse(TIMELINE_SAMPLE.as_bytes()).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].timestamp, 1704067200);
        assert_eq!(messages[0].text, "Shipping 2.0 today & more https://t.co/abc");
        assert_eq!(messages[0].url.as_deref(), Some("https://example.com/2.0"));
        assert!(messages[1].url.is_none());
    }

    #[test]
    fn test_timeline_url() {
        let url = source(Some("t")).timeline_url("@rustlang").unwrap();
        assert_eq!(url.path(), "/1.1/statuses/user_timeline.json");
        assert!(url.query().unwrap().contains("screen_name=rustlang"));
        assert!(url.query().unwrap().contains("count=200"));
    }

    #[tokio::test]
    async fn test_inactive_without_token() {
        let inactive = source(None);
        assert!(!inactive.is_active());
        assert!(matches!(
            inactive.fetch("rustlang").await,
            Err(SluiceError::PluginInactive(_))
        ));

        assert!(source(Some("t")).is_active());
        assert!(!source(Some("")).is_active());
    }
}
