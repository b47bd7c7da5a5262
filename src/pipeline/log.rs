use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        })
    }
}

/// One diagnostic emitted by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub config_id: i64,
    pub level: Level,
    pub message: String,
}

#[derive(Debug)]
enum Envelope {
    Event(LogEvent),
    Shutdown,
}

/// Producer half handed to every worker.
#[derive(Debug, Clone)]
pub struct LogSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl LogSender {
    pub fn emit(&self, config_id: i64, level: Level, message: impl Into<String>) {
        // The aggregator outlives every worker; a closed channel only
        // happens during teardown.
        let _ = self.tx.send(Envelope::Event(LogEvent {
            config_id,
            level,
            message: message.into(),
        }));
    }

    pub fn debug(&self, config_id: i64, message: impl Into<String>) {
        self.emit(config_id, Level::Debug, message);
    }

    pub fn info(&self, config_id: i64, message: impl Into<String>) {
        self.emit(config_id, Level::Info, message);
    }

    pub fn warn(&self, config_id: i64, message: impl Into<String>) {
        self.emit(config_id, Level::Warn, message);
    }

    pub fn error(&self, config_id: i64, message: impl Into<String>) {
        self.emit(config_id, Level::Error, message);
    }
}

/// The single consumer of worker diagnostics.
///
/// Events are rendered through `tracing` in arrival order. The task ends on
/// [`LogAggregator::shutdown`] or once every sender is dropped, and returns
/// every event it rendered.
pub struct LogAggregator {
    tx: mpsc::UnboundedSender<Envelope>,
    handle: JoinHandle<Vec<LogEvent>>,
}

impl LogAggregator {
    pub fn spawn() -> (Self, LogSender) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(envelope) = rx.recv().await {
                match envelope {
                    Envelope::Event(event) => {
                        render(&event);
                        seen.push(event);
                    }
                    Envelope::Shutdown => break,
                }
            }
            seen
        });

        let sender = LogSender { tx: tx.clone() };
        (Self { tx, handle }, sender)
    }

    /// Stop after draining everything sent before this call.
    pub async fn shutdown(self) -> Vec<LogEvent> {
        let _ = self.tx.send(Envelope::Shutdown);
        match self.handle.await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Log aggregator failed: {}", e);
                Vec::new()
            }
        }
    }
}

fn render(event: &LogEvent) {
    let config = event.config_id;
    match event.level {
        Level::Debug => tracing::debug!(config, "{}", event.message),
        Level::Info => tracing::info!(config, "{}", event.message),
        Level::Warn => tracing::warn!(config, "{}", event.message),
        Level::Error => tracing::error!(config, "{}", event.message),
    }
}
