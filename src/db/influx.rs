//! InfluxDB v2 sink using the line protocol write API.

use reqwest::StatusCode;
use std::fmt::Write as _;
use std::time::Duration;

use super::{Sample, Sink, SinkError};
use crate::config::InfluxConfig;

const MEASUREMENT: &str = "network_logs";

/// Writes samples as points to an InfluxDB bucket.
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    token: String,
}

impl InfluxSink {
    pub fn new(cfg: &InfluxConfig) -> Result<Self, SinkError> {
        let (Some(token), Some(org)) = (&cfg.token, &cfg.org) else {
            return Err(SinkError::Unexpected(
                "InfluxDB token and org are required".to_string(),
            ));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Unexpected(e.to_string()))?;

        let write_url = reqwest::Url::parse_with_params(
            &format!("{}/api/v2/write", cfg.url),
            &[("org", org.as_str()), ("bucket", cfg.bucket.as_str()), ("precision", "ns")],
        )
        .map_err(|e| SinkError::Unexpected(format!("invalid InfluxDB URL: {}", e)))?;

        Ok(Self {
            client,
            write_url: write_url.to_string(),
            token: token.clone(),
        })
    }
}

impl Sink for InfluxSink {
    async fn record(&self, sample: &Sample) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(to_line_protocol(sample))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    SinkError::Transient(e.to_string())
                } else {
                    SinkError::Unexpected(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body.trim()))
    }
}

/// Map a failed write response onto the sink error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> SinkError {
    let msg = format!("InfluxDB returned {}: {}", status, body);
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SinkError::IntegrityViolation(msg)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => SinkError::Transient(msg),
        s if s.is_server_error() => SinkError::Transient(msg),
        _ => SinkError::Unexpected(msg),
    }
}

/// Render a sample as one line-protocol point. Absent values are omitted.
pub fn to_line_protocol(sample: &Sample) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(13);

    let mut float = |name: &str, value: Option<f64>| {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            fields.push(format!("{}={}", name, v));
        }
    };
    float("latency_ms", sample.latency_ms());
    float("jitter_ms", sample.jitter_ms());
    float("packet_loss_pct", Some(sample.packet_loss_pct()));
    float("download_mbps", sample.download_mbps());
    float("upload_mbps", sample.upload_mbps());
    float("dns_resolution_ms", sample.dns_resolution_ms);
    float("traceroute_max_hop_latency_ms", sample.traceroute.max_hop_latency_ms);

    fields.push(format!("is_downtime={}", sample.is_down()));
    fields.push(format!(
        "traceroute_text={}",
        quote_string(&sample.traceroute.raw_text)
    ));
    if let Some(count) = sample.traceroute.hop_count {
        fields.push(format!("traceroute_hop_count={}i", count));
    }
    if let Some(addr) = &sample.traceroute.last_hop_address {
        fields.push(format!("traceroute_last_hop_address={}", quote_string(addr)));
    }
    fields.push(format!("traceroute_hops={}", quote_string(&sample.hops_json())));

    let mut line = format!("{} {}", MEASUREMENT, fields.join(","));
    if let Some(ns) = sample.timestamp.timestamp_nanos_opt() {
        let _ = write!(line, " {}", ns);
    }
    line
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
