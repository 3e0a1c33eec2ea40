//! Spectra - Network Health Monitor
//!
//! Periodically measures latency, jitter, packet loss, DNS resolution time,
//! path topology and throughput, and records each cycle to SQLite or
//! InfluxDB.

mod config;
mod db;
mod probe;
mod scheduler;

use config::{MonitorConfig, SinkKind};
use db::{AnySink, InfluxSink, SqliteStore};
use probe::{Platform, SpeedTester, SystemProber};
use scheduler::Monitor;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Daily log files kept before the oldest is removed.
const LOG_RETENTION_DAYS: usize = 7;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let cfg = MonitorConfig::load()?;

    // Initialize logging: console at the configured level, rolling file at debug
    std::fs::create_dir_all(&cfg.log_dir)?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("spectra")
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(&cfg.log_dir)?;
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("spectra={}", cfg.log_level).parse()?),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(Targets::new().with_target("spectra", Level::DEBUG)),
        )
        .init();

    tracing::info!("Initializing the Spectra network monitoring service...");
    tracing::debug!("Debug log written under {}", cfg.log_dir);
    tracing::info!(
        "Target {}, DNS test domain {}",
        cfg.ping_target,
        cfg.dns_test_domain
    );

    // Initialize sink
    let sink = match cfg.sink {
        SinkKind::Sqlite => {
            let store = SqliteStore::new(&cfg.db_path)?;
            tracing::info!(
                "Using database at {} ({} samples stored)",
                cfg.db_path,
                store.sample_count()?
            );
            AnySink::Sqlite(store)
        }
        SinkKind::InfluxDb => {
            tracing::info!(
                "Writing to InfluxDB at {} (bucket {})",
                cfg.influx.url,
                cfg.influx.bucket
            );
            AnySink::Influx(InfluxSink::new(&cfg.influx)?)
        }
    };

    let speed = SpeedTester::new(cfg.speedtest_servers.clone())?;
    let prober = SystemProber::new(Platform::current(), speed);
    let monitor = Monitor::new(&cfg, prober, sink);

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = monitor.run() => {}
        _ = interrupted => {
            tracing::warn!("Spectra monitoring service interrupted by user. Exiting...");
        }
    }

    tracing::info!("Spectra monitoring service has stopped.");
    Ok(())
}
