//! SQLite database store implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::{Sample, Sink, SinkError};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database setup error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Thread-safe SQLite sample store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| DbError::Migration("connection lock poisoned".to_string()))?;

        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|_| SinkError::Unexpected("connection lock poisoned".to_string()))
    }

    /// Insert one sample row.
    pub fn insert_sample(&self, sample: &Sample) -> Result<(), SinkError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO network_logs (
                timestamp, latency_ms, jitter_ms, packet_loss_pct,
                download_mbps, upload_mbps, dns_resolution_ms, is_downtime,
                traceroute_text, traceroute_hop_count, traceroute_last_hop_address,
                traceroute_max_hop_latency_ms, traceroute_hops
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                format_db_time(sample.timestamp),
                sample.latency_ms(),
                sample.jitter_ms(),
                sample.packet_loss_pct(),
                sample.download_mbps(),
                sample.upload_mbps(),
                sample.dns_resolution_ms,
                sample.is_down(),
                sample.traceroute.raw_text,
                sample.traceroute.hop_count.map(|c| c as i64),
                sample.traceroute.last_hop_address,
                sample.traceroute.max_hop_latency_ms,
                sample.hops_json(),
            ],
        )
        .map_err(classify_error)?;
        Ok(())
    }

    /// Number of stored samples.
    pub fn sample_count(&self) -> Result<i64, SinkError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM network_logs", [], |r| r.get(0))
            .map_err(classify_error)
    }
}

impl Sink for SqliteStore {
    async fn record(&self, sample: &Sample) -> Result<(), SinkError> {
        self.insert_sample(sample)
    }
}

/// Map a SQLite failure onto the sink error taxonomy.
fn classify_error(e: rusqlite::Error) -> SinkError {
    let code = match &e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.code),
        _ => None,
    };

    match code {
        Some(ErrorCode::ConstraintViolation) => SinkError::IntegrityViolation(e.to_string()),
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull,
        ) => SinkError::Transient(e.to_string()),
        _ => SinkError::Unexpected(e.to_string()),
    }
}

fn format_db_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Reachability, Throughput, TracerouteSummary};
    use tempfile::NamedTempFile;

    fn sample_at(timestamp: DateTime<Utc>, reachability: Reachability) -> Sample {
        Sample {
            timestamp,
            reachability,
            dns_resolution_ms: Some(25.5),
            throughput: Throughput::none(),
            traceroute: TracerouteSummary::parse(
                "traceroute to 8.8.8.8\n1  10.0.0.1  1.2 ms  1.3 ms\n2  * * *\n3  8.8.8.8  20.5 ms",
            ),
        }
    }

    #[tokio::test]
    async fn test_record_sample_row() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();

        let sample = sample_at(
            Utc::now(),
            Reachability::Reachable { latency_ms: 14.0, jitter_ms: 3.0 },
        );
        store.record(&sample).await.unwrap();
        assert_eq!(store.sample_count().unwrap(), 1);

        let conn = store.conn.lock().unwrap();
        let (latency, download, is_down, hop_count, last_hop, hops): (
            Option<f64>,
            Option<f64>,
            bool,
            Option<i64>,
            Option<String>,
            String,
        ) = conn
            .query_row(
                "SELECT latency_ms, download_mbps, is_downtime, traceroute_hop_count,
                        traceroute_last_hop_address, traceroute_hops FROM network_logs",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
            )
            .unwrap();

        assert_eq!(latency, Some(14.0));
        assert_eq!(download, None);
        assert!(!is_down);
        assert_eq!(hop_count, Some(2));
        assert_eq!(last_hop.as_deref(), Some("8.8.8.8"));
        assert!(hops.starts_with(r#"[{"hop_number":1"#));
    }

    #[tokio::test]
    async fn test_down_sample_stores_nulls() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();

        store
            .record(&sample_at(Utc::now(), Reachability::Unreachable))
            .await
            .unwrap();

        let conn = store.conn.lock().unwrap();
        let (latency, jitter, loss, is_down): (Option<f64>, Option<f64>, f64, bool) = conn
            .query_row(
                "SELECT latency_ms, jitter_ms, packet_loss_pct, is_downtime FROM network_logs",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();

        assert_eq!(latency, None);
        assert_eq!(jitter, None);
        assert_eq!(loss, 100.0);
        assert!(is_down);
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_is_integrity_violation() {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::new(tmp.path()).unwrap();

        let sample = sample_at(Utc::now(), Reachability::Unreachable);
        store.record(&sample).await.unwrap();
        let err = store.record(&sample).await.unwrap_err();

        assert!(matches!(err, SinkError::IntegrityViolation(_)));
        assert!(!err.is_retryable());
        assert_eq!(store.sample_count().unwrap(), 1);
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let store = SqliteStore::new(tmp.path()).unwrap();
            store
                .insert_sample(&sample_at(Utc::now(), Reachability::Unreachable))
                .unwrap();
        }
        let store = SqliteStore::new(tmp.path()).unwrap();
        assert_eq!(store.sample_count().unwrap(), 1);
    }
}
