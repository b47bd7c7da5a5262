pub mod feed;
pub mod timeline;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::app::{Result, SluiceError};
use crate::config::GrabSettings;
use crate::domain::{CandidateMessage, SourceKind};

pub use feed::FeedSource;
pub use timeline::TimelineSource;

/// Produces the current candidate messages for a source identifier (a feed
/// URL, a timeline screen name).
#[async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<CandidateMessage>>;

    /// Whether the plugin is usable at all, e.g. has credentials.
    fn is_active(&self) -> bool {
        true
    }
}

/// Source plugins keyed by the kind stored on a configuration.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<SourceKind, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: SourceKind, source: Arc<dyn Source>) -> Self {
        self.sources.insert(kind, source);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Result<&Arc<dyn Source>> {
        self.sources
            .get(&kind)
            .ok_or_else(|| SluiceError::PluginInactive(format!("no {} plugin registered", kind)))
    }
}

/// HTTP client shared by the source plugins.
pub(crate) fn http_client(config: &GrabSettings) -> Result<Client> {
    Ok(Client::builder()
        .timeout(config.timeout())
        .gzip(true)
        .brotli(true)
        .user_agent(config.user_agent.clone())
        .danger_accept_invalid_certs(!config.check_ssl)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Source for Fixed {
        async fn fetch(&self, _source: &str) -> Result<Vec<CandidateMessage>> {
            Ok(vec![CandidateMessage::new(Some(1), "hello", None)])
        }
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = SourceRegistry::new().with(SourceKind::Rss, Arc::new(Fixed));

        let source = registry.get(SourceKind::Rss).unwrap();
        assert!(source.is_active());
        assert_eq!(source.fetch("x").await.unwrap().len(), 1);

        assert!(matches!(
            registry.get(SourceKind::Twitter),
            Err(SluiceError::PluginInactive(_))
        ));
    }
}
