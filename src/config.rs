//! Configuration module for Spectra.
//!
//! Loads configuration from environment variables (and an optional `.env`
//! file) with sensible defaults.

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::db::RetryPolicy;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown sink backend: {0}")]
    UnknownSink(String),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Which persistence backend receives samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Sqlite,
    InfluxDb,
}

/// InfluxDB v2 connection settings.
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: String,
}

/// Monitor configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Host pinged and traced every cycle (default: "1.1.1.1")
    pub ping_target: String,
    /// Domain resolved every cycle (default: "one.one.one.one")
    pub dns_test_domain: String,
    /// Cycle period in seconds (default: 60)
    pub ping_interval_seconds: u64,
    /// Scheduled throughput test period in seconds (default: 1800)
    pub speedtest_interval_seconds: u64,
    /// Candidate throughput endpoints, base URLs
    pub speedtest_servers: Vec<String>,
    /// Console log level, a tracing level name (default: "info")
    pub log_level: String,
    /// Directory for the rolling debug log file (default: "logs")
    pub log_dir: String,
    pub sink: SinkKind,
    /// Path to the SQLite database file (default: "spectra.db")
    pub db_path: String,
    pub influx: InfluxConfig,
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_target: "1.1.1.1".to_string(),
            dns_test_domain: "one.one.one.one".to_string(),
            ping_interval_seconds: 60,
            speedtest_interval_seconds: 1800,
            speedtest_servers: vec!["https://speed.cloudflare.com".to_string()],
            log_level: "info".to_string(),
            log_dir: "logs".to_string(),
            sink: SinkKind::Sqlite,
            db_path: "spectra.db".to_string(),
            influx: InfluxConfig {
                url: "http://localhost:8086".to_string(),
                token: None,
                org: None,
                bucket: "network_logs".to_string(),
            },
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first, if present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Environment variables:
    /// - `PING_TARGET`, `DNS_TEST_DOMAIN`
    /// - `PING_INTERVAL`, `SPEEDTEST_INTERVAL` (seconds)
    /// - `SPEEDTEST_SERVERS`: comma-separated base URLs
    /// - `LOG_LEVEL`, `LOG_DIR`
    /// - `SPECTRA_SINK`: "sqlite" or "influxdb"
    /// - `SPECTRA_DB_PATH`
    /// - `INFLUXDB_URL`, `INFLUXDB_TOKEN`, `INFLUXDB_ORG`, `INFLUXDB_BUCKET`
    /// - `SINK_RETRY_ATTEMPTS`, `SINK_RETRY_BACKOFF` (seconds)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(target) = lookup("PING_TARGET") {
            cfg.ping_target = target;
        }
        if let Some(domain) = lookup("DNS_TEST_DOMAIN") {
            cfg.dns_test_domain = domain;
        }
        if let Some(secs) = lookup("PING_INTERVAL").and_then(|s| s.parse().ok()) {
            cfg.ping_interval_seconds = secs;
        }
        if let Some(secs) = lookup("SPEEDTEST_INTERVAL").and_then(|s| s.parse().ok()) {
            cfg.speedtest_interval_seconds = secs;
        }
        if let Some(servers) = lookup("SPEEDTEST_SERVERS") {
            let servers: Vec<String> = servers
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !servers.is_empty() {
                cfg.speedtest_servers = servers;
            }
        }
        if let Some(level) = lookup("LOG_LEVEL").and_then(|l| tracing_level(&l)) {
            cfg.log_level = level.to_string();
        }
        if let Some(dir) = lookup("LOG_DIR") {
            cfg.log_dir = dir;
        }

        if let Some(sink) = lookup("SPECTRA_SINK") {
            cfg.sink = match sink.to_lowercase().as_str() {
                "sqlite" => SinkKind::Sqlite,
                "influxdb" | "influx" => SinkKind::InfluxDb,
                other => return Err(ConfigError::UnknownSink(other.to_string())),
            };
        }
        if let Some(path) = lookup("SPECTRA_DB_PATH") {
            cfg.db_path = path;
        }

        if let Some(url) = lookup("INFLUXDB_URL") {
            cfg.influx.url = url.trim_end_matches('/').to_string();
        }
        if let Some(token) = lookup("INFLUXDB_TOKEN") {
            cfg.influx.token = Some(token);
        }
        if let Some(org) = lookup("INFLUXDB_ORG") {
            cfg.influx.org = Some(org);
        }
        if let Some(bucket) = lookup("INFLUXDB_BUCKET") {
            cfg.influx.bucket = bucket;
        }

        if let Some(attempts) = lookup("SINK_RETRY_ATTEMPTS").and_then(|s| s.parse::<u32>().ok()) {
            cfg.retry.max_attempts = attempts.max(1);
        }
        if let Some(secs) = lookup("SINK_RETRY_BACKOFF").and_then(|s| s.parse().ok()) {
            cfg.retry.backoff = Duration::from_secs(secs);
        }

        if cfg.sink == SinkKind::InfluxDb {
            if cfg.influx.token.is_none() {
                return Err(ConfigError::Missing("INFLUXDB_TOKEN"));
            }
            if cfg.influx.org.is_none() {
                return Err(ConfigError::Missing("INFLUXDB_ORG"));
            }
        }

        Ok(cfg)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    pub fn speedtest_interval(&self) -> Duration {
        Duration::from_secs(self.speedtest_interval_seconds)
    }
}

/// Map a level name onto a tracing level, accepting the Python-style
/// `WARNING` and `CRITICAL` spellings. Unknown names keep the default.
fn tracing_level(name: &str) -> Option<&'static str> {
    match name.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "critical" | "fatal" => Some("error"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.ping_target, "1.1.1.1");
        assert_eq!(cfg.dns_test_domain, "one.one.one.one");
        assert_eq!(cfg.ping_interval_seconds, 60);
        assert_eq!(cfg.speedtest_interval_seconds, 1800);
        assert_eq!(cfg.sink, SinkKind::Sqlite);
        assert_eq!(cfg.retry.max_attempts, 2);
        assert_eq!(cfg.retry.backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let cfg = MonitorConfig::from_lookup(lookup_from(&[
            ("PING_TARGET", "9.9.9.9"),
            ("PING_INTERVAL", "30"),
            ("SPEEDTEST_INTERVAL", "600"),
            ("SPEEDTEST_SERVERS", "https://a.example/, https://b.example"),
            ("SINK_RETRY_BACKOFF", "1"),
        ]))
        .unwrap();

        assert_eq!(cfg.ping_target, "9.9.9.9");
        assert_eq!(cfg.ping_interval(), Duration::from_secs(30));
        assert_eq!(cfg.speedtest_interval(), Duration::from_secs(600));
        assert_eq!(
            cfg.speedtest_servers,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(cfg.retry.backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_bad_number_keeps_default() {
        let cfg = MonitorConfig::from_lookup(lookup_from(&[("PING_INTERVAL", "soon")])).unwrap();
        assert_eq!(cfg.ping_interval_seconds, 60);
    }

    #[test]
    fn test_influx_requires_credentials() {
        let err = MonitorConfig::from_lookup(lookup_from(&[("SPECTRA_SINK", "influxdb")]));
        assert!(matches!(err, Err(ConfigError::Missing("INFLUXDB_TOKEN"))));

        let cfg = MonitorConfig::from_lookup(lookup_from(&[
            ("SPECTRA_SINK", "influxdb"),
            ("INFLUXDB_TOKEN", "secret"),
            ("INFLUXDB_ORG", "home"),
        ]))
        .unwrap();
        assert_eq!(cfg.sink, SinkKind::InfluxDb);
        assert_eq!(cfg.influx.bucket, "network_logs");
    }

    #[test]
    fn test_unknown_sink_rejected() {
        let err = MonitorConfig::from_lookup(lookup_from(&[("SPECTRA_SINK", "csv")]));
        assert!(matches!(err, Err(ConfigError::UnknownSink(_))));
    }

    #[test]
    fn test_python_level_names_map_to_tracing() {
        let cfg = MonitorConfig::from_lookup(lookup_from(&[("LOG_LEVEL", "WARNING")])).unwrap();
        assert_eq!(cfg.log_level, "warn");

        let cfg = MonitorConfig::from_lookup(lookup_from(&[("LOG_LEVEL", "CRITICAL")])).unwrap();
        assert_eq!(cfg.log_level, "error");

        let cfg = MonitorConfig::from_lookup(lookup_from(&[("LOG_LEVEL", "Debug")])).unwrap();
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn test_unknown_level_keeps_default() {
        let cfg = MonitorConfig::from_lookup(lookup_from(&[("LOG_LEVEL", "verbose")])).unwrap();
        assert_eq!(cfg.log_level, "info");
        assert!(format!("spectra={}", cfg.log_level)
            .parse::<tracing_subscriber::filter::Directive>()
            .is_ok());
    }

    #[test]
    fn test_log_dir_override() {
        assert_eq!(MonitorConfig::default().log_dir, "logs");
        let cfg = MonitorConfig::from_lookup(lookup_from(&[("LOG_DIR", "/var/log/spectra")])).unwrap();
        assert_eq!(cfg.log_dir, "/var/log/spectra");
    }
}
