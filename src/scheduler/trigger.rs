//! Decides when the throughput probe runs.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::probe::Reachability;

/// Average latency above which reachability counts as degraded.
pub const DEGRADED_LATENCY_MS: f64 = 100.0;

/// Packet loss above which reachability counts as degraded.
pub const DEGRADED_PACKET_LOSS_PCT: f64 = 5.0;

/// Why a throughput test was scheduled this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputTrigger {
    /// The configured interval elapsed since the previous test.
    Scheduled,
    /// Reachability looks bad right now.
    Degraded,
}

/// Whether the current cycle should run the throughput probe.
///
/// `last_run` is `None` before the first test, which always triggers.
pub fn throughput_trigger(
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
    reachability: &Reachability,
) -> Option<ThroughputTrigger> {
    let due = match last_run {
        None => true,
        // A clock step backwards yields a negative span: not due.
        Some(last) => (now - last).to_std().map_or(false, |elapsed| elapsed >= interval),
    };
    if due {
        return Some(ThroughputTrigger::Scheduled);
    }

    if is_degraded(reachability) {
        return Some(ThroughputTrigger::Degraded);
    }

    None
}

pub fn is_degraded(reachability: &Reachability) -> bool {
    match reachability.latency_ms() {
        None => true,
        Some(latency) => {
            latency > DEGRADED_LATENCY_MS
                || reachability.packet_loss_pct() > DEGRADED_PACKET_LOSS_PCT
        }
    }
}
