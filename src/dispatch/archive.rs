use crate::app::Result;
use crate::dispatch::MailSession;
use crate::store::Store;

/// Outcome of one archive replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub sent: usize,
    pub failed: usize,
}

/// Retry every archived mail. Sent records are deleted; failed ones stay
/// for the next run.
pub async fn replay_archive(store: &dyn Store, session: &MailSession) -> Result<ReplaySummary> {
    let archived = store.list_archive()?;
    let mut summary = ReplaySummary::default();

    if archived.is_empty() {
        return Ok(summary);
    }
    if let MailSession::Unavailable(ref reason) = session {
        tracing::warn!(
            "Skipping replay of {} archived mails: {}",
            archived.len(),
            reason
        );
        summary.failed = archived.len();
        return Ok(summary);
    }

    for delivery in archived {
        match session.send(delivery.mail.clone()).await {
            Ok(()) => {
                store.delete_archive(delivery.id)?;
                summary.sent += 1;
            }
            Err(e) => {
                tracing::warn!(
                    "Archived mail {} for configuration {} still undeliverable: {}",
                    delivery.id,
                    delivery.config_id,
                    e
                );
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Archive replay: {} sent, {} kept",
        summary.sent,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::app::SluiceError;
    use crate::dispatch::MailTransport;
    use crate::domain::{ArchivedDelivery, OutgoingMail};
    use crate::store::SqliteStore;

    /// Accepts mail to `ok@` recipients only.
    #[derive(Default)]
    struct Selective {
        sent: AtomicUsize,
    }

    impl MailTransport for Selective {
        fn send(&self, mail: &OutgoingMail) -> Result<()> {
            if mail.to.starts_with("ok@") {
                self.sent.fetch_add(1, Ordering::SeqCst);
                Ok(())
            } else {
                Err(SluiceError::Mail("rejected".into()))
            }
        }
    }

    fn seed(store: &SqliteStore) {
        for to in ["ok@example.com", "bad@example.com", "ok@example.org"] {
            store
                .add_archive(&ArchivedDelivery::new(
                    1,
                    OutgoingMail::notice(to, "subject", "body"),
                ))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_replay_deletes_only_sent() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);
        let transport = Arc::new(Selective::default());
        let session = MailSession::Ready(transport.clone());

        let summary = replay_archive(&store, &session).await.unwrap();

        assert_eq!(summary, ReplaySummary { sent: 2, failed: 1 });
        assert_eq!(transport.sent.load(Ordering::SeqCst), 2);
        let remaining = store.list_archive().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mail.to, "bad@example.com");

        // A second replay does not resend what was delivered.
        replay_archive(&store, &session).await.unwrap();
        assert_eq!(transport.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_replay_with_unavailable_session_keeps_everything() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);

        let summary = replay_archive(&store, &MailSession::Unavailable("down".into()))
            .await
            .unwrap();

        assert_eq!(summary.failed, 3);
        assert_eq!(store.list_archive().unwrap().len(), 3);
    }
}
