use async_trait::async_trait;
use feed_rs::parser;
use html_escape::decode_html_entities;
use reqwest::Client;

use crate::app::{Result, SluiceError};
use crate::config::GrabSettings;
use crate::domain::CandidateMessage;
use crate::source::{http_client, Source};

/// RSS/Atom/JSON Feed source. The source identifier is the feed URL.
pub struct FeedSource {
    client: Client,
}

impl FeedSource {
    pub fn new(config: &GrabSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
        })
    }

    /// Turn a feed document into candidates.
    ///
    /// The published date wins over the updated date; entries with neither
    /// are stamped with the current time. The text is the entry title,
    /// falling back to its summary.
    pub fn parse(body: &[u8]) -> Result<Vec<CandidateMessage>> {
        let feed = parser::parse(body).map_err(|e| SluiceError::FeedParse(e.to_string()))?;

        let messages = feed
            .entries
            .into_iter()
            .map(|entry| {
                let timestamp = entry.published.or(entry.updated).map(|dt| dt.timestamp());
                let text = entry
                    .title
                    .or(entry.summary)
                    .map(|t| decode_html_entities(&t.content).to_string())
                    .unwrap_or_default();
                let url = entry.links.into_iter().next().map(|l| l.href);

                CandidateMessage::new(timestamp, text, url)
            })
            .collect();

        Ok(messages)
    }
}

#[async_trait]
impl Source for FeedSource {
    async fn fetch(&self, source: &str) -> Result<Vec<CandidateMessage>> {
        let response = self.client.get(source).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        let messages = Self::parse(&body)?;
        tracing::debug!("Fetched {} messages from {}", messages.len(), source);
        Ok(messages)
    }
}
