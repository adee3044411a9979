//! Rate-limited progress reporting for long scans.
//!
//! Logs at most once per interval, with the delta and rate since the last
//! report. Call [`ProgressLogger::update`] from the hot loop; it is cheap
//! when the interval has not elapsed.

use std::time::{Duration, Instant};
use tracing::info;

pub struct ProgressLogger {
    label: &'static str,
    total: Option<u64>,
    interval: Duration,
    last_log: Instant,
    last_value: u64,
}

impl ProgressLogger {
    /// `total` is used for "current/total" reporting when known up front.
    pub fn new(label: &'static str, total: Option<u64>, interval: Duration) -> Self {
        Self {
            label,
            total,
            interval,
            last_log: Instant::now(),
            last_value: 0,
        }
    }

    pub fn update(&mut self, current: u64) {
        if self.last_log.elapsed() >= self.interval {
            self.log(current);
        }
    }

    /// Unconditionally log the final count.
    pub fn finish(&mut self, current: u64) {
        self.log(current);
    }

    fn log(&mut self, current: u64) {
        let elapsed = self.last_log.elapsed().as_secs_f64();
        let delta = current.saturating_sub(self.last_value);
        let rate = if elapsed > 0.0 {
            delta as f64 / elapsed
        } else {
            0.0
        };
        match self.total {
            Some(total) => info!(
                target: "shardpipe::progress",
                label = self.label,
                current,
                total,
                "{delta} in {elapsed:.2}s ({rate:.0}/s)"
            ),
            None => info!(
                target: "shardpipe::progress",
                label = self.label,
                current,
                "{delta} in {elapsed:.2}s ({rate:.0}/s)"
            ),
        }
        self.last_log = Instant::now();
        self.last_value = current;
    }
}
