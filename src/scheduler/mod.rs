//! Scheduler module: runs one probe cycle per interval and records samples.

mod downtime;
mod trigger;

pub use downtime::*;
pub use trigger::*;

use crate::config::MonitorConfig;
use crate::db::{record_with_retry, RecordOutcome, RetryPolicy, Sample, Sink};
use crate::probe::{Prober, Reachability, Throughput};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Drives the probe-and-record cycle.
///
/// Cycles run strictly one after another; a slow cycle pushes the next one
/// back rather than being skipped or overlapped.
pub struct Monitor<P, S> {
    prober: P,
    sink: S,
    target: String,
    dns_domain: String,
    ping_interval: Duration,
    speedtest_interval: Duration,
    retry: RetryPolicy,
    downtime: DowntimeTracker,
    last_speedtest: Option<DateTime<Utc>>,
}

impl<P: Prober, S: Sink> Monitor<P, S> {
    pub fn new(cfg: &MonitorConfig, prober: P, sink: S) -> Self {
        Self {
            prober,
            sink,
            target: cfg.ping_target.clone(),
            dns_domain: cfg.dns_test_domain.clone(),
            ping_interval: cfg.ping_interval(),
            speedtest_interval: cfg.speedtest_interval(),
            retry: cfg.retry.clone(),
            downtime: DowntimeTracker::new(),
            last_speedtest: None,
        }
    }

    /// Run cycles forever, sleeping the ping interval after each one.
    pub async fn run(mut self) {
        tracing::info!(
            "Starting network monitoring of {} every {:?}",
            self.target,
            self.ping_interval
        );

        loop {
            if let RecordOutcome::Dropped { attempts, error } = self.run_cycle().await {
                tracing::debug!("Cycle data lost after {} attempt(s): {}", attempts, error);
            }
            tokio::time::sleep(self.ping_interval).await;
        }
    }

    /// Run every probe once, assemble the sample and hand it to the sink.
    pub async fn run_cycle(&mut self) -> RecordOutcome {
        let timestamp = Utc::now();

        let reachability = self.prober.reachability(&self.target).await;
        let dns_resolution_ms = self.prober.resolution(&self.dns_domain).await;
        let throughput = self.maybe_run_throughput(timestamp, &reachability).await;
        let traceroute = self.prober.trace(&self.target).await;

        match self.downtime.observe(reachability.is_down(), timestamp) {
            Some(DowntimeEvent::Started { at }) => {
                tracing::warn!(
                    "Downtime started at {}. Total downtime so far: {}s.",
                    at,
                    self.downtime.cumulative_downtime().num_seconds()
                );
            }
            Some(DowntimeEvent::Ended { duration, total }) => {
                tracing::info!(
                    "Downtime ended. Duration: {}s. Total downtime: {}s.",
                    duration.num_seconds(),
                    total.num_seconds()
                );
            }
            None => {}
        }

        let sample = Sample {
            timestamp,
            reachability,
            dns_resolution_ms,
            throughput,
            traceroute,
        };

        log_sample(&sample);

        record_with_retry(&self.sink, &sample, &self.retry).await
    }

    async fn maybe_run_throughput(
        &mut self,
        now: DateTime<Utc>,
        reachability: &Reachability,
    ) -> Throughput {
        let trigger =
            throughput_trigger(self.last_speedtest, now, self.speedtest_interval, reachability);

        match trigger {
            Some(ThroughputTrigger::Scheduled) => {
                tracing::info!("Scheduled speed test interval reached.");
            }
            Some(ThroughputTrigger::Degraded) => {
                tracing::warn!("High latency or packet loss detected. Triggering speed test.");
            }
            None => return Throughput::none(),
        }

        self.last_speedtest = Some(now);
        let throughput = self.prober.throughput().await;
        if throughput.is_empty() {
            tracing::warn!("Speed test produced no data this cycle.");
        }
        throughput
    }
}

fn log_sample(sample: &Sample) {
    let trace: String = sample.traceroute.raw_text.chars().take(100).collect();
    tracing::info!(
        "[{}] Latency: {} ms, Jitter: {} ms, Packet Loss: {}%, Download: {} Mbps, Upload: {} Mbps, DNS Time: {} ms, Downtime: {}, Hops: {}, Traceroute: {}...",
        sample.timestamp.format("%Y-%m-%d %H:%M:%S"),
        fmt_opt(sample.latency_ms()),
        fmt_opt(sample.jitter_ms()),
        sample.packet_loss_pct(),
        fmt_opt(sample.download_mbps()),
        fmt_opt(sample.upload_mbps()),
        fmt_opt(sample.dns_resolution_ms),
        sample.is_down(),
        sample
            .traceroute
            .hop_count
            .map_or_else(|| "N/A".to_string(), |c| c.to_string()),
        trace.replace('\n', " | "),
    );
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}", v))
}
