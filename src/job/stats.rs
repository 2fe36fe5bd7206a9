//! Progress statistics for a running job.

use std::time::{Duration, Instant};

/// Mutable statistics owned by a job's control block.
///
/// Elapsed time excludes every interval spent paused.
#[derive(Debug, Default)]
pub(crate) struct Statistics {
    value: u64,
    max_value: u64,
    current_item: Option<String>,
    started: Option<Instant>,
    finished: Option<Instant>,
    paused_since: Option<Instant>,
    paused_total: Duration,
}

impl Statistics {
    pub(crate) fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub(crate) fn finish(&mut self) {
        self.resume_timing();
        if self.finished.is_none() {
            self.finished = Some(Instant::now());
        }
    }

    pub(crate) fn pause_timing(&mut self) {
        if self.paused_since.is_none() {
            self.paused_since = Some(Instant::now());
        }
    }

    pub(crate) fn resume_timing(&mut self) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += since.elapsed();
        }
    }

    pub(crate) fn add_value(&mut self, delta: u64) {
        self.value = self.value.saturating_add(delta);
    }

    pub(crate) fn set_max_value(&mut self, max: u64) {
        self.max_value = max;
    }

    pub(crate) fn set_current_item(&mut self, name: impl Into<String>) {
        self.current_item = Some(name.into());
    }

    fn elapsed(&self) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let end = self.finished.unwrap_or_else(Instant::now);
        let mut paused = self.paused_total;
        if let Some(since) = self.paused_since {
            paused += end.saturating_duration_since(since);
        }
        end.saturating_duration_since(started).saturating_sub(paused)
    }

    pub(crate) fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            value: self.value,
            max_value: self.max_value,
            current_item: self.current_item.clone(),
            elapsed: self.elapsed(),
        }
    }
}

/// Point-in-time copy of a job's statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    /// Bytes processed so far
    pub value: u64,
    /// Total bytes the job expects to process
    pub max_value: u64,
    /// Name of the entry being processed
    pub current_item: Option<String>,
    /// Running time, excluding pauses
    pub elapsed: Duration,
}

impl StatisticsSnapshot {
    /// Throughput in bytes per second, or 0 before any time has passed.
    pub fn bytes_per_second(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let rate = (self.value as f64 / secs) as u64;
            rate
        } else {
            0
        }
    }
}
