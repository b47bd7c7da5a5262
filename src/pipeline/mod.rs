//! The fetch, match, enrich and dispatch pipeline.
//!
//! # Architecture
//!
//! ```text
//! Pipeline::run
//!   ├─ worker 0: chunk[0..k]  ─┐
//!   ├─ worker 1: chunk[k..2k] ─┼─ LogEvent ─→ LogAggregator ─→ tracing
//!   └─ ...                    ─┘
//! ```
//!
//! Each worker owns one [`MailSession`] and processes its chunk of
//! configurations strictly in order with a [`ConfigurationProcessor`].

mod lock;
mod log;
mod pool;
mod processor;

pub use lock::RunLock;
pub use log::{Level, LogAggregator, LogEvent, LogSender};
pub use pool::{plan_chunks, RunSummary};
pub use processor::{resolve_subject, ConfigurationProcessor, Outcome};

use std::sync::Arc;

use chrono::Utc;

use crate::app::Result;
use crate::config::Settings;
use crate::dispatch::{self, MailConnector, MailSession, ReplaySummary};
use crate::grabber::Grabber;
use crate::source::SourceRegistry;
use crate::store::Store;

/// Source of the current time, in seconds since epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Everything a run needs, shared read-only by all workers.
pub struct Pipeline {
    settings: Arc<Settings>,
    store: Arc<dyn Store>,
    sources: SourceRegistry,
    grabber: Arc<dyn Grabber>,
    connector: Arc<dyn MailConnector>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(
        settings: Arc<Settings>,
        store: Arc<dyn Store>,
        sources: SourceRegistry,
        grabber: Arc<dyn Grabber>,
        connector: Arc<dyn MailConnector>,
    ) -> Self {
        Self {
            settings,
            store,
            sources,
            grabber,
            connector,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Retry every archived mail before new work begins.
    pub async fn replay_archive(&self) -> Result<ReplaySummary> {
        if self.store.list_archive()?.is_empty() {
            return Ok(ReplaySummary::default());
        }
        let session = self.connector.connect().await;
        dispatch::replay_archive(self.store.as_ref(), &session).await
    }

    async fn session_for(&self, needs_mail: bool) -> MailSession {
        if needs_mail {
            self.connector.connect().await
        } else {
            MailSession::Unavailable("no mail destinations".to_string())
        }
    }
}
