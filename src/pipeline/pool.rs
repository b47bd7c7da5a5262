use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::domain::ConfigurationRecord;
use crate::pipeline::{ConfigurationProcessor, LogAggregator, LogEvent, Outcome, Pipeline};

/// Totals for one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    /// Messages matched across all processed configurations
    pub matched: usize,
    pub elapsed: Duration,
    /// Every worker diagnostic, in arrival order
    pub events: Vec<LogEvent>,
}

impl RunSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Processed { matched } => {
                self.processed += 1;
                self.matched += matched;
            }
            Outcome::NotDue | Outcome::Failed => self.skipped += 1,
        }
    }
}

/// Split `n` records into contiguous ranges, one per worker.
///
/// The pool holds `min(max_workers, n)` workers (at least one) and every
/// range but the last spans `ceil(n / pool)` records.
pub fn plan_chunks(n: usize, max_workers: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let pool_size = max_workers.clamp(1, n);
    let chunk_size = n.div_ceil(pool_size);
    (0..n)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(n))
        .collect()
}

impl Pipeline {
    /// Process `records` across a bounded worker pool.
    ///
    /// Records are split into contiguous chunks, one per worker, and each
    /// worker handles its chunk in order. A panic while processing one
    /// configuration counts it as skipped and the worker moves on.
    pub async fn run(self: &Arc<Self>, records: Vec<ConfigurationRecord>, force: bool) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        if records.is_empty() {
            return summary;
        }

        let chunks = plan_chunks(records.len(), self.settings.general.max_workers);
        tracing::debug!(
            "Processing {} configurations with {} workers",
            records.len(),
            chunks.len()
        );

        let (aggregator, log) = LogAggregator::spawn();
        let mut handles = Vec::with_capacity(chunks.len());

        for range in chunks {
            let chunk = records[range].to_vec();
            let chunk_len = chunk.len();
            let pipeline = Arc::clone(self);
            let log = log.clone();

            let handle = tokio::spawn(async move {
                let needs_mail = chunk.iter().any(|r| r.first_mail_destination().is_some());
                let session = pipeline.session_for(needs_mail).await;
                let processor = ConfigurationProcessor::new(pipeline, session, log.clone());

                let mut outcomes = Vec::with_capacity(chunk.len());
                for record in &chunk {
                    let outcome = AssertUnwindSafe(processor.process(record, force))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            log.error(record.id, format!("Processing {} panicked", record.label()));
                            Outcome::Failed
                        });
                    outcomes.push(outcome);
                }
                outcomes
            });

            handles.push((chunk_len, handle));
        }
        drop(log);

        for (chunk_len, handle) in handles {
            match handle.await {
                Ok(outcomes) => outcomes.into_iter().for_each(|o| summary.record(o)),
                Err(e) => {
                    tracing::error!("Worker failed: {}", e);
                    summary.skipped += chunk_len;
                }
            }
        }

        summary.events = aggregator.shutdown().await;
        summary.elapsed = started.elapsed();

        tracing::info!(
            "Run finished in {:.1}s: {} processed, {} skipped, {} messages",
            summary.elapsed.as_secs_f64(),
            summary.processed,
            summary.skipped,
            summary.matched
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tally() {
        let mut summary = RunSummary::default();
        summary.record(Outcome::Processed { matched: 2 });
        summary.record(Outcome::Processed { matched: 0 });
        summary.record(Outcome::NotDue);
        summary.record(Outcome::Failed);

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.matched, 2);
    }

    #[test]
    fn test_plan_chunks_fewer_records_than_workers() {
        assert_eq!(plan_chunks(3, 8), vec![0..1, 1..2, 2..3]);
    }

    #[test]
    fn test_plan_chunks_one_record_per_worker() {
        assert_eq!(plan_chunks(4, 4), vec![0..1, 1..2, 2..3, 3..4]);
    }

    #[test]
    fn test_plan_chunks_uneven_split() {
        // ceil(5 / 4) = 2, so only three workers get work.
        assert_eq!(plan_chunks(5, 4), vec![0..2, 2..4, 4..5]);
        assert_eq!(plan_chunks(10, 3), vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn test_plan_chunks_zero_workers_runs_one() {
        assert_eq!(plan_chunks(3, 0), vec![0..3]);
        assert!(plan_chunks(0, 4).is_empty());
    }

    #[test]
    fn test_plan_chunks_cover_every_record_in_order() {
        for n in 1..40 {
            for max in 0..10 {
                let flat: Vec<usize> = plan_chunks(n, max).into_iter().flatten().collect();
                assert_eq!(flat, (0..n).collect::<Vec<_>>(), "n={} max={}", n, max);
                assert!(plan_chunks(n, max).len() <= max.max(1));
            }
        }
    }
}
