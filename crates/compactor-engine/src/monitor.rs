//! Run timings and throughput

use std::time::{Duration, Instant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Wall time spent in each stage of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunTimings {
    /// Capability probe
    pub probe: Duration,
    /// Directory walk
    pub scan: Duration,
    /// Classification, including content sampling
    pub classify: Duration,
    /// Batch planning
    pub plan: Duration,
    /// XPRESS pool wall time
    pub xpress_pool: Duration,
    /// LZX pool wall time
    pub lzx_pool: Duration,
    /// Both pools, which overlap
    pub execute: Duration,
    /// Verification
    pub verify: Duration,
    /// Whole run
    pub total: Duration,
}

/// Items and bytes per second over some interval
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Throughput {
    /// Files per second
    pub files_per_second: f64,
    /// Bytes per second
    pub bytes_per_second: f64,
}

impl Throughput {
    /// Rates for `files` and `bytes` processed in `elapsed`
    pub fn over(files: usize, bytes: u64, elapsed: Duration) -> Self {
        let seconds = elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return Self::default();
        }
        Self {
            files_per_second: files as f64 / seconds,
            bytes_per_second: bytes as f64 / seconds,
        }
    }
}

/// Measures consecutive stages
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
    lap_started: Instant,
}

impl Stopwatch {
    /// Start measuring
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            lap_started: now,
        }
    }

    /// Time since the previous lap, starting the next one
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let elapsed = now.duration_since(self.lap_started);
        self.lap_started = now;
        elapsed
    }

    /// Time since the stopwatch started
    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }
}
