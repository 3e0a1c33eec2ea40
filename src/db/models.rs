//! Database model types.

use chrono::{DateTime, Utc};

use crate::probe::{Reachability, Throughput, TracerouteSummary};

/// One monitoring cycle's result.
///
/// Built once per cycle and handed to a sink; latency, jitter and packet
/// loss all derive from the single [`Reachability`] value so they can never
/// disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Instant the cycle began.
    pub timestamp: DateTime<Utc>,
    pub reachability: Reachability,
    pub dns_resolution_ms: Option<f64>,
    /// Empty unless throughput was tested this cycle.
    pub throughput: Throughput,
    pub traceroute: TracerouteSummary,
}

impl Sample {
    pub fn latency_ms(&self) -> Option<f64> {
        self.reachability.latency_ms()
    }

    pub fn jitter_ms(&self) -> Option<f64> {
        self.reachability.jitter_ms()
    }

    pub fn packet_loss_pct(&self) -> f64 {
        self.reachability.packet_loss_pct()
    }

    pub fn download_mbps(&self) -> Option<f64> {
        self.throughput.download_mbps
    }

    pub fn upload_mbps(&self) -> Option<f64> {
        self.throughput.upload_mbps
    }

    /// True iff the target did not answer this cycle.
    pub fn is_down(&self) -> bool {
        self.reachability.is_down()
    }

    /// Hop list as a JSON array for storage.
    pub fn hops_json(&self) -> String {
        serde_json::to_string(&self.traceroute.hops).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Hop;

    #[test]
    fn test_down_sample_has_no_latency() {
        let sample = Sample {
            timestamp: Utc::now(),
            reachability: Reachability::Unreachable,
            dns_resolution_ms: None,
            throughput: Throughput::none(),
            traceroute: TracerouteSummary::empty("traceroute not available"),
        };
        assert!(sample.is_down());
        assert_eq!(sample.latency_ms(), None);
        assert_eq!(sample.jitter_ms(), None);
        assert_eq!(sample.packet_loss_pct(), 100.0);
        assert_eq!(sample.hops_json(), "[]");
    }

    #[test]
    fn test_hops_json() {
        let mut traceroute = TracerouteSummary::empty("");
        traceroute.hops.push(Hop {
            hop_number: 1,
            address: "10.0.0.1".to_string(),
            latency_ms: 1.5,
        });
        let sample = Sample {
            timestamp: Utc::now(),
            reachability: Reachability::Reachable { latency_ms: 10.0, jitter_ms: 2.0 },
            dns_resolution_ms: Some(20.0),
            throughput: Throughput::none(),
            traceroute,
        };
        assert!(!sample.is_down());
        assert_eq!(
            sample.hops_json(),
            r#"[{"hop_number":1,"address":"10.0.0.1","latency_ms":1.5}]"#
        );
    }
}
