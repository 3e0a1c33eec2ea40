//! Traceroute probe implementation and output parser.

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{run_command, CommandLine, Platform, ProbeError};

/// Bound on the whole trace invocation.
pub const TRACEROUTE_TIMEOUT: Duration = Duration::from_secs(30);

/// One responding probe along the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub hop_number: u32,
    pub address: String,
    pub latency_ms: f64,
}

/// Structured result of one path trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TracerouteSummary {
    /// Every (address, latency) pair in traversal order. A hop probed
    /// several times contributes several entries.
    pub hops: Vec<Hop>,
    /// Distinct hop numbers seen, `None` when nothing parsed.
    pub hop_count: Option<usize>,
    pub last_hop_address: Option<String>,
    pub max_hop_latency_ms: Option<f64>,
    pub raw_text: String,
}

impl TracerouteSummary {
    /// A summary with no hops, carrying `reason` as its text.
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            hops: Vec::new(),
            hop_count: None,
            last_hop_address: None,
            max_hop_latency_ms: None,
            raw_text: reason.into(),
        }
    }

    /// Parse raw traceroute/tracert output.
    ///
    /// The first line is a header. Each following line that starts with a
    /// hop number yields one [`Hop`] per latency on it; a latency takes the
    /// nearest address on the same line (`traceroute` prints the address
    /// before its latencies, `tracert` after).
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::empty("traceroute produced no output");
        }

        let hops: Vec<Hop> = raw.lines().skip(1).flat_map(parse_hop_line).collect();

        let hop_count = if hops.is_empty() {
            None
        } else {
            Some(hops.iter().map(|h| h.hop_number).collect::<BTreeSet<_>>().len())
        };
        let last_hop_address = hops.last().map(|h| h.address.clone());
        let max_hop_latency_ms = hops
            .iter()
            .map(|h| h.latency_ms)
            .fold(None, |max: Option<f64>, l| Some(max.map_or(l, |m| m.max(l))));

        Self {
            hops,
            hop_count,
            last_hop_address,
            max_hop_latency_ms,
            raw_text: raw.to_string(),
        }
    }
}

fn parse_hop_line(line: &str) -> Vec<Hop> {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    let token_re = TOKEN_RE.get_or_init(|| {
        Regex::new(
            r"(?P<addr>\d{1,3}(?:\.\d{1,3}){3}|[0-9A-Fa-f]{0,4}(?::[0-9A-Fa-f]{0,4}){2,7})|(?P<rtt>\d+(?:\.\d+)?)\s*ms\b",
        )
        .unwrap()
    });

    let line = line.trim_start();
    let digits = line.find(|c: char| !c.is_ascii_digit()).unwrap_or(line.len());
    let Ok(hop_number) = line[..digits].parse::<u32>() else {
        return Vec::new();
    };
    let rest = &line[digits..];
    if !rest.starts_with(char::is_whitespace) {
        return Vec::new();
    }

    let mut hops = Vec::new();
    let mut address: Option<&str> = None;
    // tracert prints latencies before the address they belong to
    let mut pending: Vec<f64> = Vec::new();

    for caps in token_re.captures_iter(rest) {
        if let Some(addr) = caps.name("addr") {
            address = Some(addr.as_str());
            for latency_ms in pending.drain(..) {
                hops.push(Hop {
                    hop_number,
                    address: addr.as_str().to_string(),
                    latency_ms,
                });
            }
        } else if let Some(latency_ms) = caps.name("rtt").and_then(|m| m.as_str().parse().ok()) {
            match address {
                Some(addr) => hops.push(Hop {
                    hop_number,
                    address: addr.to_string(),
                    latency_ms,
                }),
                None => pending.push(latency_ms),
            }
        }
    }

    hops
}

/// Trace the path to `target` with the platform's trace utility.
///
/// Never fails: a missing utility, timeout or spawn error produces an
/// empty summary describing what went wrong.
pub async fn run_traceroute(platform: Platform, target: &str) -> TracerouteSummary {
    trace_if_installed(&platform.traceroute_command(target), TRACEROUTE_TIMEOUT).await
}

async fn trace_if_installed(cmd: &CommandLine, timeout: Duration) -> TracerouteSummary {
    if which::which(cmd.program).is_err() {
        tracing::warn!("{} not found on PATH, skipping trace", cmd.program);
        return TracerouteSummary::empty(format!("{} not available", cmd.program));
    }
    trace_with(cmd, timeout).await
}

async fn trace_with(cmd: &CommandLine, timeout: Duration) -> TracerouteSummary {
    match run_command(cmd, timeout).await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let text = stdout.trim();
            if output.status.success() {
                tracing::debug!("{} completed", cmd.program);
            } else {
                tracing::warn!("{} exited with {}", cmd.program, output.status);
                if text.is_empty() {
                    return TracerouteSummary::empty(format!(
                        "{} failed with {}",
                        cmd.program, output.status
                    ));
                }
            }
            TracerouteSummary::parse(text)
        }
        Err(ProbeError::Timeout(d)) => {
            tracing::error!("{} timed out after {:?}", cmd.program, d);
            TracerouteSummary::empty(format!("{} timed out after {:?}", cmd.program, d))
        }
        Err(e) => {
            tracing::error!("{} error: {}", cmd.program, e);
            TracerouteSummary::empty(e.to_string())
        }
    }
}
