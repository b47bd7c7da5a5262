use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::app::{Result, SluiceError};
use crate::directive::{parse_directives, Actions};
use crate::dispatch::{Delivery, Dispatcher, MailSession};
use crate::domain::{CandidateMessage, ConfigurationRecord, EnrichedMessage, OutgoingMail};
use crate::grabber::grab;
use crate::matcher::RegexMatcher;
use crate::pipeline::{LogSender, Pipeline};

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?|ftp)://\S+|\bwww\.\S+").expect("URL pattern is a valid regex")
});

const ALERT_SUBJECT: &str = "***No new data from the configuration***";

/// How one configuration's processing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Disabled, or its update interval has not elapsed.
    NotDue,
    Processed { matched: usize },
    /// Stopped early; the record was left untouched.
    Failed,
}

/// Subject line: optional prefix plus the first line of the text, bare URLs
/// removed, truncated to `max_len` characters with a ` ...` marker.
pub fn resolve_subject(prefix: Option<&str>, first_line: &str, max_len: usize) -> String {
    let line = match prefix {
        Some(prefix) => format!("{} {}", prefix, first_line),
        None => first_line.to_string(),
    };
    let stripped = URL_RE.replace_all(&line, "");
    let subject = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if subject.chars().count() > max_len {
        let truncated: String = subject.chars().take(max_len).collect();
        format!("{} ...", truncated.trim_end())
    } else {
        subject
    }
}

/// Runs configurations through due-check, fetch, filter, enrich, dispatch
/// and bookkeeping for one worker.
pub struct ConfigurationProcessor {
    pipeline: Arc<Pipeline>,
    dispatcher: Dispatcher,
    log: LogSender,
}

impl ConfigurationProcessor {
    pub fn new(pipeline: Arc<Pipeline>, session: MailSession, log: LogSender) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&pipeline.store),
            session,
            pipeline.settings.exec.scratch_path.clone(),
        );
        Self {
            pipeline,
            dispatcher,
            log,
        }
    }

    pub fn is_due(record: &ConfigurationRecord, now: i64, force: bool) -> bool {
        force || (record.enabled && now - record.last_timestamp > record.update_interval)
    }

    pub async fn process(&self, record: &ConfigurationRecord, force: bool) -> Outcome {
        let id = record.id;
        let now = self.pipeline.clock.now();

        if !Self::is_due(record, now, force) {
            let reason = if record.enabled {
                "update interval has not been reached"
            } else {
                "configuration is disabled"
            };
            self.log.debug(id, format!("Skipping {}: {}", record.label(), reason));
            return Outcome::NotDue;
        }

        self.log.info(id, format!("Processing {}", record.label()));

        let candidates = match self.fetch(record).await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.log.warn(id, format!("Cannot fetch {}: {}", record.label(), e));
                return Outcome::Failed;
            }
        };

        let matched = self.filter(record, candidates);

        let matched_count = if matched.is_empty() {
            0
        } else {
            let actions = match parse_directives(&record.actions, &record.destinations) {
                Ok(directives) => Actions::from_directives(&directives),
                Err(e) => {
                    self.log.error(id, format!("Invalid action for {}: {}", record.label(), e));
                    return Outcome::Failed;
                }
            };

            let mut secured = true;
            for candidate in &matched {
                let message = self.enrich(record, candidate, &actions).await;
                secured &= self.dispatch(record, &message).await;
            }
            if !secured {
                self.log.error(
                    id,
                    format!(
                        "Mail for {} was neither sent nor archived, keeping progress",
                        record.label()
                    ),
                );
                return Outcome::Failed;
            }
            matched.len()
        };

        self.log.info(
            id,
            format!("Processed {}: {} new messages", record.label(), matched_count),
        );

        match self.bookkeeping(record, matched_count, now).await {
            Ok(()) => Outcome::Processed {
                matched: matched_count,
            },
            Err(e) => {
                self.log.error(id, format!("Cannot update {}: {}", record.label(), e));
                Outcome::Failed
            }
        }
    }

    async fn fetch(&self, record: &ConfigurationRecord) -> Result<Vec<CandidateMessage>> {
        let source = self.pipeline.sources.get(record.plugin)?;
        if !source.is_active() {
            return Err(SluiceError::PluginInactive(record.plugin.to_string()));
        }

        let timeout = self.pipeline.settings.grab.timeout();
        tokio::time::timeout(timeout, source.fetch(&record.source))
            .await
            .map_err(|_| SluiceError::Timeout(format!("fetch of {}", record.source)))?
    }

    fn filter(
        &self,
        record: &ConfigurationRecord,
        candidates: Vec<CandidateMessage>,
    ) -> Vec<CandidateMessage> {
        let (matcher, errors) = RegexMatcher::lenient(&record.patterns);
        for e in errors {
            self.log.warn(record.id, e.to_string());
        }

        candidates
            .into_iter()
            .filter(|candidate| {
                if candidate.timestamp <= record.last_timestamp {
                    return false;
                }
                matcher.is_match(&candidate.text)
            })
            .collect()
    }

    async fn enrich(
        &self,
        record: &ConfigurationRecord,
        candidate: &CandidateMessage,
        actions: &Actions,
    ) -> EnrichedMessage {
        let mut message = EnrichedMessage::from_candidate(candidate);

        if let Some(ref url) = candidate.url {
            let timeout = self.pipeline.settings.grab.timeout();
            for kind in &actions.grabs {
                match grab(
                    self.pipeline.grabber.as_ref(),
                    *kind,
                    url,
                    &record.image_bounds,
                    timeout,
                )
                .await
                {
                    Ok(grabbed) => grabbed.apply_to(&mut message),
                    Err(e) => self
                        .log
                        .warn(record.id, format!("Cannot grab {} from {}: {}", kind, url, e)),
                }
            }
        } else if !actions.grabs.is_empty() {
            self.log.debug(record.id, "Nothing to grab, message has no URL");
        }

        message.subject = resolve_subject(
            actions.subject.as_deref(),
            candidate.first_line(),
            self.pipeline.settings.general.subject_length,
        );
        message.priority = actions.priority.map(|p| p.numeric());
        message.tags = actions.tags.clone();
        message
    }

    /// Hand the message to every destination. Returns false when a mail
    /// delivery was neither sent nor archived.
    async fn dispatch(&self, record: &ConfigurationRecord, message: &EnrichedMessage) -> bool {
        let mut secured = true;
        for destination in &record.destinations {
            match self.dispatcher.deliver(record, destination, message).await {
                Ok(Delivery::Sent) => self.log.debug(record.id, format!("Sent to {}", destination)),
                Ok(Delivery::Archived { id, reason }) => self.log.warn(
                    record.id,
                    format!("Cannot send to {}, archived as {}: {}", destination, id, reason),
                ),
                Ok(Delivery::Executed(dir)) => self.log.debug(
                    record.id,
                    format!("Executed {} with {}", destination, dir.display()),
                ),
                Err(e) => {
                    // Exec failures are final; a lost mail is not.
                    secured &= !destination.is_mail();
                    self.log
                        .error(record.id, format!("Delivery to {} failed: {}", destination, e));
                }
            }
        }
        secured
    }

    async fn bookkeeping(&self, record: &ConfigurationRecord, matched: usize, now: i64) -> Result<()> {
        let store = &self.pipeline.store;

        if matched > 0 {
            store.record_progress(record.id, now, matched as i64)?;
            return Ok(());
        }

        let cooldown = self.pipeline.settings.general.alert_cooldown;
        if now <= record.last_timestamp + record.alert_interval || now <= record.last_alert + cooldown
        {
            return Ok(());
        }

        self.log.warn(record.id, format!("No new data for {}", record.label()));

        let Some(to) = record.first_mail_destination() else {
            return Ok(());
        };
        let alert = OutgoingMail::notice(to, ALERT_SUBJECT, &record.label());
        match self.dispatcher.session().send(alert).await {
            Ok(()) => store.update_alert_timestamp(record.id, now)?,
            Err(e) => self.log.warn(record.id, format!("Cannot send alert to {}: {}", to, e)),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;

    #[test]
    fn test_resolve_subject_prefix_and_urls() {
        assert_eq!(
            resolve_subject(Some("[rel]"), "v2 is out https://x/y now", 100),
            "[rel] v2 is out now"
        );
        assert_eq!(resolve_subject(None, "see www.example.com", 100), "see");
    }

    #[test]
    fn test_resolve_subject_truncates() {
        assert_eq!(resolve_subject(None, "abcdefghij", 4), "abcd ...");
        assert_eq!(resolve_subject(None, "abcd", 4), "abcd");
        assert_eq!(resolve_subject(None, "ééééé", 2), "éé ...");
    }

    #[test]
    fn test_is_due() {
        let mut record = ConfigurationRecord::new(SourceKind::Rss, "https://a/feed", vec![]);
        record.update_interval = 900;
        record.last_timestamp = 1000;

        assert!(!ConfigurationProcessor::is_due(&record, 1900, false));
        assert!(ConfigurationProcessor::is_due(&record, 1901, false));
        assert!(ConfigurationProcessor::is_due(&record, 1000, true));

        record.enabled = false;
        assert!(!ConfigurationProcessor::is_due(&record, 5000, false));
        assert!(ConfigurationProcessor::is_due(&record, 5000, true));
    }
}
