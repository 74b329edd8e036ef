//! Interval timers driven by the loop's monotonic uptime

use embassy_time::{Duration, Instant};

use crate::config::NodeConfig;

/// Fires once every `period`, measured from the last time it fired.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimer {
    period: Duration,
    last: Instant,
}

impl IntervalTimer {
    /// Timer whose first firing is one `period` after `start`.
    pub const fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            last: start,
        }
    }

    /// Whether the timer is due at `now`. Firing restarts the period at `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.period {
            self.last = now;
            true
        } else {
            false
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// The three periodic pipeline activities.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub sample: IntervalTimer,
    pub log: IntervalTimer,
    pub aggregate: IntervalTimer,
}

impl Schedule {
    pub fn new(config: &NodeConfig, boot: Instant) -> Self {
        Self {
            sample: IntervalTimer::new(config.sample_interval(), boot),
            log: IntervalTimer::new(config.log_interval(), boot),
            aggregate: IntervalTimer::new(config.aggregate_interval(), boot),
        }
    }
}
