//! Downtime tracking across monitoring cycles.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Transition reported by [`DowntimeTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowntimeEvent {
    Started {
        at: DateTime<Utc>,
    },
    Ended {
        duration: ChronoDuration,
        total: ChronoDuration,
    },
}

/// Turns the per-cycle up/down signal into downtime intervals.
///
/// Lives for the whole process; nothing is persisted across restarts.
#[derive(Debug, Clone)]
pub struct DowntimeTracker {
    started_at: Option<DateTime<Utc>>,
    cumulative: ChronoDuration,
}

impl Default for DowntimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DowntimeTracker {
    pub fn new() -> Self {
        Self {
            started_at: None,
            cumulative: ChronoDuration::zero(),
        }
    }

    /// Feed one cycle's signal. Repeating the current state is a no-op.
    pub fn observe(&mut self, is_down: bool, now: DateTime<Utc>) -> Option<DowntimeEvent> {
        match (is_down, self.started_at) {
            (true, None) => {
                self.started_at = Some(now);
                Some(DowntimeEvent::Started { at: now })
            }
            (false, Some(start)) => {
                let duration = now - start;
                self.cumulative = self.cumulative + duration;
                self.started_at = None;
                Some(DowntimeEvent::Ended {
                    duration,
                    total: self.cumulative,
                })
            }
            _ => None,
        }
    }

    pub fn is_down(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn cumulative_downtime(&self) -> ChronoDuration {
        self.cumulative
    }
}
