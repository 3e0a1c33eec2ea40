//! Ping probe implementation via the system `ping` utility.
//!
//! Sends a fixed burst of echo requests and derives latency and jitter from
//! the summary line.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use super::{run_command, CommandLine, Platform, ProbeError};

/// Echo requests sent per probe.
pub const PING_COUNT: u32 = 4;

/// Bound on the whole ping invocation.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one reachability probe.
///
/// Packet loss is binary: 0% when the target answered, 100% otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reachability {
    Reachable { latency_ms: f64, jitter_ms: f64 },
    Unreachable,
}

impl Reachability {
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Reachability::Reachable { latency_ms, .. } => Some(*latency_ms),
            Reachability::Unreachable => None,
        }
    }

    pub fn jitter_ms(&self) -> Option<f64> {
        match self {
            Reachability::Reachable { jitter_ms, .. } => Some(*jitter_ms),
            Reachability::Unreachable => None,
        }
    }

    pub fn packet_loss_pct(&self) -> f64 {
        match self {
            Reachability::Reachable { .. } => 0.0,
            Reachability::Unreachable => 100.0,
        }
    }

    pub fn is_down(&self) -> bool {
        matches!(self, Reachability::Unreachable)
    }
}

/// Round-trip statistics from a ping summary line, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl From<RttSummary> for Reachability {
    fn from(rtt: RttSummary) -> Self {
        Reachability::Reachable {
            latency_ms: rtt.avg,
            jitter_ms: (rtt.max - rtt.min).max(0.0),
        }
    }
}

/// Run a ping probe against the given target.
pub async fn run_ping_probe(platform: Platform, target: &str) -> Reachability {
    ping_with(&platform.ping_command(target), PING_TIMEOUT).await
}

async fn ping_with(cmd: &CommandLine, timeout: Duration) -> Reachability {
    match ping(cmd, timeout).await {
        Ok(rtt) => rtt.into(),
        Err(e) => {
            tracing::warn!("Ping to {} failed: {}", cmd.args.last().map_or("", String::as_str), e);
            Reachability::Unreachable
        }
    }
}

async fn ping(cmd: &CommandLine, timeout: Duration) -> Result<RttSummary, ProbeError> {
    let output = run_command(cmd, timeout).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        return Err(ProbeError::Command(format!(
            "{} exited with {}: {}",
            cmd.program,
            output.status,
            stdout.trim()
        )));
    }

    parse_ping_summary(&stdout)
}

/// Parse the min/avg/max round-trip summary from ping output.
pub fn parse_ping_summary(output: &str) -> Result<RttSummary, ProbeError> {
    // Linux "rtt min/avg/max/mdev = a/b/c/d ms", BSD/macOS "round-trip min/avg/max/stddev = ...",
    // BusyBox "round-trip min/avg/max = a/b/c ms"
    static UNIX_RE: OnceLock<Regex> = OnceLock::new();
    let unix_re = UNIX_RE.get_or_init(|| {
        Regex::new(r"(?:rtt|round-trip)\s+min/avg/max(?:/\w+)?\s*=\s*([0-9.]+)/([0-9.]+)/([0-9.]+)")
            .unwrap()
    });

    if let Some(caps) = unix_re.captures(output) {
        return Ok(RttSummary {
            min: parse_ms(&caps[1])?,
            avg: parse_ms(&caps[2])?,
            max: parse_ms(&caps[3])?,
        });
    }

    // Windows "Minimum = 10ms, Maximum = 12ms, Average = 11ms"
    static WINDOWS_RE: OnceLock<Regex> = OnceLock::new();
    let windows_re = WINDOWS_RE.get_or_init(|| {
        Regex::new(r"Minimum\s*=\s*(\d+)ms,\s*Maximum\s*=\s*(\d+)ms,\s*Average\s*=\s*(\d+)ms")
            .unwrap()
    });

    if let Some(caps) = windows_re.captures(output) {
        return Ok(RttSummary {
            min: parse_ms(&caps[1])?,
            max: parse_ms(&caps[2])?,
            avg: parse_ms(&caps[3])?,
        });
    }

    Err(ProbeError::Parse("no round-trip summary in ping output".to_string()))
}

fn parse_ms(s: &str) -> Result<f64, ProbeError> {
    s.parse::<f64>()
        .map_err(|e| ProbeError::Parse(format!("bad round-trip value {:?}: {}", s, e)))
}
