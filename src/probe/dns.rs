//! DNS probe implementation via the system resolver utility.
//!
//! The measurement is wall-clock time around the whole `nslookup` call,
//! process spawn included.

use std::time::{Duration, Instant};

use super::{run_command, CommandLine, Platform, ProbeError};

/// Bound on one resolution round trip.
pub const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve `domain` and return the elapsed time in milliseconds.
///
/// Returns `None` on timeout, non-zero exit, or spawn failure.
pub async fn run_dns_probe(platform: Platform, domain: &str) -> Option<f64> {
    resolve_with(&platform.dns_command(domain), DNS_TIMEOUT).await
}

async fn resolve_with(cmd: &CommandLine, timeout: Duration) -> Option<f64> {
    match resolve(cmd, timeout).await {
        Ok(ms) => Some(ms),
        Err(e) => {
            tracing::warn!("DNS resolution of {} failed: {}", cmd.args.join(" "), e);
            None
        }
    }
}

async fn resolve(cmd: &CommandLine, timeout: Duration) -> Result<f64, ProbeError> {
    let start = Instant::now();
    let output = run_command(cmd, timeout).await?;
    let elapsed = start.elapsed();

    if !output.status.success() {
        return Err(ProbeError::Command(format!(
            "{} exited with {}",
            cmd.program, output.status
        )));
    }

    Ok(elapsed.as_secs_f64() * 1000.0)
}
