//! Delivery of enriched messages to configured destinations.
//!
//! Mail delivery goes through a per-worker [`MailSession`]; a failed send is
//! archived and replayed at the start of the next run. Exec delivery writes
//! the message to a scratch directory and runs the configured program once.

mod archive;
mod exec;
mod mail;

pub use archive::{replay_archive, ReplaySummary};
pub use exec::{materialize, tag_argument};
pub use mail::{
    build_message, service_headers, MailConnector, MailSession, MailTransport, SmtpConnector,
    SmtpMailer,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::Result;
use crate::domain::{
    ArchivedDelivery, ConfigurationRecord, Destination, EnrichedMessage, OutgoingMail,
};
use crate::store::Store;

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Sent,
    /// The send failed and the mail was archived with this archive id.
    Archived { id: i64, reason: String },
    Executed(PathBuf),
}

/// Delivers messages to the destinations of one worker's configurations.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    session: MailSession,
    scratch_root: PathBuf,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, session: MailSession, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            session,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn session(&self) -> &MailSession {
        &self.session
    }

    pub async fn deliver(
        &self,
        record: &ConfigurationRecord,
        destination: &Destination,
        message: &EnrichedMessage,
    ) -> Result<Delivery> {
        match destination {
            Destination::Mail(address) => {
                let mail = OutgoingMail::from_enriched(
                    address,
                    message,
                    service_headers(record, message),
                );
                self.deliver_mail(record.id, mail).await
            }
            Destination::Exec(executable) => self.deliver_exec(executable, record.id, message).await,
        }
    }

    /// Send `mail`, archiving it when the send fails.
    pub async fn deliver_mail(&self, config_id: i64, mail: OutgoingMail) -> Result<Delivery> {
        match self.session.send(mail.clone()).await {
            Ok(()) => Ok(Delivery::Sent),
            Err(e) => {
                let id = self.store.add_archive(&ArchivedDelivery::new(config_id, mail))?;
                Ok(Delivery::Archived {
                    id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn deliver_exec(
        &self,
        executable: &Path,
        config_id: i64,
        message: &EnrichedMessage,
    ) -> Result<Delivery> {
        let dir = exec::run(executable, &self.scratch_root, config_id, message).await?;
        Ok(Delivery::Executed(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateMessage, SourceKind};
    use crate::store::SqliteStore;

    fn record() -> ConfigurationRecord {
        let mut record = ConfigurationRecord::new(
            SourceKind::Rss,
            "https://example.com/feed.xml",
            vec![Destination::Mail("a@example.com".into())],
        );
        record.id = 1;
        record
    }

    #[tokio::test]
    async fn test_unavailable_session_archives() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let scratch = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(
            store.clone(),
            MailSession::Unavailable("down".into()),
            scratch.path(),
        );

        let candidate =
            CandidateMessage::new(Some(5), "release notes", Some("https://x/y".into()));
        let message = EnrichedMessage::from_candidate(&candidate);
        let record = record();

        let delivery = dispatcher
            .deliver(&record, &record.destinations[0], &message)
            .await
            .unwrap();

        assert!(matches!(delivery, Delivery::Archived { .. }));
        let archived = store.list_archive().unwrap();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].mail.body.contains("release notes"));
        assert_eq!(archived[0].mail.headers[0], ("X-Sluice-Id".into(), "1".into()));
    }
}
