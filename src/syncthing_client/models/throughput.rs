//! Direction of network traffic inferred from the daemon's cumulative byte
//! counters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::syncthing_client::api::ConnectionTotals;

/// Rates at or below this many bytes per second count as idle keepalive noise.
pub const RATE_THRESHOLD: f64 = 10.0;

/// Slack on top of the polling maximum before a sample counts as stale.
pub const STALE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputState {
    None,
    Up,
    Down,
    UpDown,
}

impl ThroughputState {
    pub fn from_rates(in_rate: f64, out_rate: f64) -> Self {
        match (in_rate > RATE_THRESHOLD, out_rate > RATE_THRESHOLD) {
            (true, true) => ThroughputState::UpDown,
            (true, false) => ThroughputState::Down,
            (false, true) => ThroughputState::Up,
            (false, false) => ThroughputState::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThroughputState::None => "none",
            ThroughputState::Up => "up",
            ThroughputState::Down => "down",
            ThroughputState::UpDown => "updown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalsSample {
    pub in_bytes: u64,
    pub out_bytes: u64,
    pub at: DateTime<Utc>,
}

impl From<&ConnectionTotals> for TotalsSample {
    fn from(totals: &ConnectionTotals) -> Self {
        Self {
            in_bytes: totals.in_bytes_total,
            out_bytes: totals.out_bytes_total,
            at: totals.at,
        }
    }
}

/// Classification plus the rates (bytes per second) it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputReading {
    pub state: ThroughputState,
    pub in_rate: f64,
    pub out_rate: f64,
}

impl ThroughputReading {
    pub const IDLE: ThroughputReading = ThroughputReading {
        state: ThroughputState::None,
        in_rate: 0.0,
        out_rate: 0.0,
    };
}

pub struct ThroughputClassifier {
    last: Option<TotalsSample>,
    max_interval: Duration,
}

impl ThroughputClassifier {
    /// `max_interval` is the longest polling interval; samples further apart
    /// than that plus [`STALE_GRACE`] are not rated.
    pub fn new(max_interval: Duration) -> Self {
        Self {
            last: None,
            max_interval,
        }
    }

    pub fn set_max_interval(&mut self, max_interval: Duration) {
        self.max_interval = max_interval;
    }

    /// Forgets the baseline.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn push(&mut self, sample: TotalsSample) -> ThroughputReading {
        let Some(previous) = self.last else {
            self.last = Some(sample);
            return ThroughputReading::IDLE;
        };

        let dt_ms = (sample.at - previous.at).num_milliseconds();
        if dt_ms <= 0 {
            warn!(
                previous = %previous.at,
                current = %sample.at,
                "Connection totals went back in time, ignoring sample"
            );
            return ThroughputReading::IDLE;
        }

        if sample.in_bytes < previous.in_bytes || sample.out_bytes < previous.out_bytes {
            warn!("Connection totals decreased, daemon restarted? Resetting baseline");
            self.last = Some(sample);
            return ThroughputReading::IDLE;
        }

        let stale_after = self.max_interval + STALE_GRACE;
        if dt_ms as u128 > stale_after.as_millis() {
            debug!(dt_ms, "Connection totals sample is stale, resetting baseline");
            self.last = Some(sample);
            return ThroughputReading::IDLE;
        }

        let seconds = dt_ms as f64 / 1000.0;
        let in_rate = (sample.in_bytes - previous.in_bytes) as f64 / seconds;
        let out_rate = (sample.out_bytes - previous.out_bytes) as f64 / seconds;
        self.last = Some(sample);

        ThroughputReading {
            state: ThroughputState::from_rates(in_rate, out_rate),
            in_rate,
            out_rate,
        }
    }
}
