use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::info;

use crate::ChunkPlan;

const DEFAULT_WINDOW: Duration = Duration::from_secs(5);
const DEFAULT_MAX_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
            window_size: window_size.unwrap_or(DEFAULT_WINDOW),
        }
    }

    /// Records `bytes` finished at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&mut self, bytes: u64, now: Instant) {
        self.samples.push_back(SpeedSample {
            bytes,
            timestamp: now,
        });

        while let Some(first) = self.samples.front() {
            let expired = now.duration_since(first.timestamp) > self.window_size;
            if !(expired || self.samples.len() > self.max_samples) {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// The oldest sample only marks the start of the window; its bytes are
    /// not counted. Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }

        let bytes: u64 = self.samples.iter().skip(1).map(|s| s.bytes).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}

/// Logs part completions of one multipart session.
pub(crate) struct PartProgress {
    total_parts: u32,
    total_bytes: u64,
    done_parts: u32,
    done_bytes: u64,
    speed: SpeedCalculator,
}

impl PartProgress {
    pub(crate) fn new(plan: &ChunkPlan) -> Self {
        let mut speed = SpeedCalculator::new(None, None);
        speed.add_sample(0);
        Self {
            total_parts: plan.part_count(),
            total_bytes: plan.total_size(),
            done_parts: 0,
            done_bytes: 0,
            speed,
        }
    }

    pub(crate) fn part_done(&mut self, key: &str, index: u32, length: u64) {
        self.done_parts += 1;
        self.done_bytes += length;
        self.speed.add_sample(length);

        let percent = if self.total_bytes == 0 {
            100.0
        } else {
            self.done_bytes as f64 * 100.0 / self.total_bytes as f64
        };
        let mib_per_sec = self.speed.bytes_per_second() / (1024.0 * 1024.0);
        let eta_secs = self
            .speed
            .eta(self.total_bytes - self.done_bytes)
            .map(|d| d.as_secs());

        info!(
            key,
            part = index,
            "part {}/{} done ({percent:.1}%, {mib_per_sec:.2} MiB/s, eta {eta_secs:?}s)",
            self.done_parts,
            self.total_parts
        );
    }

    #[cfg(test)]
    pub(crate) fn done_parts(&self) -> u32 {
        self.done_parts
    }
}
