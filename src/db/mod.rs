//! Persistence module for Spectra.
//!
//! Samples go to a [`Sink`]: SQLite via [`SqliteStore`] or InfluxDB via
//! [`InfluxSink`]. Writes are retried on transient failure according to a
//! [`RetryPolicy`].

mod influx;
mod models;
mod store;

pub use influx::*;
pub use models::*;
pub use store::*;

use std::time::Duration;
use thiserror::Error;

/// Sink error types.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Duplicate or constraint failure; retrying cannot help.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// Connection or operational failure that may clear up.
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Durable storage for samples.
pub trait Sink {
    async fn record(&self, sample: &Sample) -> Result<(), SinkError>;
}

/// The configured backend.
pub enum AnySink {
    Sqlite(SqliteStore),
    Influx(InfluxSink),
}

impl Sink for AnySink {
    async fn record(&self, sample: &Sample) -> Result<(), SinkError> {
        match self {
            AnySink::Sqlite(store) => store.record(sample).await,
            AnySink::Influx(influx) => influx.record(sample).await,
        }
    }
}

/// Bounded retry for sink writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Fixed pause before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(5),
        }
    }
}

/// What happened to a sample handed to [`record_with_retry`].
#[derive(Debug)]
pub enum RecordOutcome {
    Recorded { attempts: u32 },
    Dropped { attempts: u32, error: SinkError },
}

/// Record `sample`, retrying transient failures per `policy`.
///
/// Integrity and unexpected errors are not retried. Nothing here is fatal;
/// a dropped sample is logged and reported in the outcome.
pub async fn record_with_retry<S: Sink>(
    sink: &S,
    sample: &Sample,
    policy: &RetryPolicy,
) -> RecordOutcome {
    let mut attempts = 1;
    loop {
        match sink.record(sample).await {
            Ok(()) => {
                if attempts > 1 {
                    tracing::info!("Sample recorded after {} attempts", attempts);
                } else {
                    tracing::debug!("Sample recorded");
                }
                return RecordOutcome::Recorded { attempts };
            }
            Err(e) if e.is_retryable() && attempts < policy.max_attempts => {
                tracing::warn!("{}. Retrying in {:?}...", e, policy.backoff);
                tokio::time::sleep(policy.backoff).await;
                attempts += 1;
            }
            Err(e) => {
                match &e {
                    SinkError::Transient(_) => {
                        tracing::error!("Giving up after {} attempts: {}", attempts, e)
                    }
                    _ => tracing::error!("Failed to record sample: {}", e),
                }
                return RecordOutcome::Dropped { attempts, error: e };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Reachability, Throughput, TracerouteSummary};
    use chrono::Utc;
    use std::sync::Mutex;

    /// Sink that replays scripted results, then succeeds.
    struct ScriptedSink {
        script: Mutex<Vec<SinkError>>,
        calls: Mutex<u32>,
        recorded: Mutex<Vec<Sample>>,
    }

    impl ScriptedSink {
        fn new(mut failures: Vec<SinkError>) -> Self {
            failures.reverse();
            Self {
                script: Mutex::new(failures),
                calls: Mutex::new(0),
                recorded: Mutex::new(Vec::new()),
            }
        }
    }

    impl Sink for ScriptedSink {
        async fn record(&self, sample: &Sample) -> Result<(), SinkError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(err) = self.script.lock().unwrap().pop() {
                return Err(err);
            }
            self.recorded.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    fn sample() -> Sample {
        Sample {
            timestamp: Utc::now(),
            reachability: Reachability::Reachable { latency_ms: 12.0, jitter_ms: 1.0 },
            dns_resolution_ms: Some(30.0),
            throughput: Throughput::none(),
            traceroute: TracerouteSummary::empty("traceroute not available"),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_transient_then_success_records_once() {
        let sink = ScriptedSink::new(vec![SinkError::Transient("connection reset".into())]);
        let outcome = record_with_retry(&sink, &sample(), &fast_policy()).await;

        assert!(matches!(outcome, RecordOutcome::Recorded { attempts: 2 }));
        assert_eq!(*sink.calls.lock().unwrap(), 2);
        assert_eq!(sink.recorded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_twice_gives_up() {
        let sink = ScriptedSink::new(vec![
            SinkError::Transient("down".into()),
            SinkError::Transient("still down".into()),
        ]);
        let outcome = record_with_retry(&sink, &sample(), &fast_policy()).await;

        assert!(matches!(
            outcome,
            RecordOutcome::Dropped { attempts: 2, error: SinkError::Transient(_) }
        ));
        assert!(sink.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_integrity_violation_not_retried() {
        let sink = ScriptedSink::new(vec![SinkError::IntegrityViolation("duplicate".into())]);
        let outcome = record_with_retry(&sink, &sample(), &fast_policy()).await;

        assert!(matches!(outcome, RecordOutcome::Dropped { attempts: 1, .. }));
        assert_eq!(*sink.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_not_retried() {
        let sink = ScriptedSink::new(vec![SinkError::Unexpected("boom".into())]);
        let outcome = record_with_retry(&sink, &sample(), &fast_policy()).await;

        assert!(matches!(outcome, RecordOutcome::Dropped { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_waits_before_retry() {
        let sink = ScriptedSink::new(vec![SinkError::Transient("busy".into())]);
        let start = tokio::time::Instant::now();
        let outcome = record_with_retry(&sink, &sample(), &RetryPolicy::default()).await;

        assert!(matches!(outcome, RecordOutcome::Recorded { attempts: 2 }));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
