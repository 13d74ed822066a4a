//! Aether Net rate monitor module
//! Tracks publisher positions over time and averages throughput per window

use aether_common::{
    ChannelSessionKey, CounterSnapshotListener, RateMonitor, RateSample, SnapshotBatch, TimeWindow,
};
use anyhow::Result;
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::trace;

/// Position observed at a capture time (milliseconds since the epoch)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PositionSample {
    timestamp: i64,
    position: i64,
}

/// Throughput per publisher over a fixed set of windows
///
/// Fed by the snapshot fan-out and read by the view builder, possibly at the
/// same time from different threads.
pub struct WindowedRateMonitor {
    windows: Vec<TimeWindow>,

    // Oldest sample still needed by the longest window
    retention_ms: i64,

    samples: DashMap<ChannelSessionKey, VecDeque<PositionSample>>,
}

impl WindowedRateMonitor {
    pub fn new(windows: Vec<TimeWindow>) -> Self {
        let retention_ms = windows
            .iter()
            .map(|window| window.duration().as_millis() as i64)
            .max()
            .unwrap_or(0);
        Self {
            windows,
            retention_ms,
            samples: DashMap::new(),
        }
    }

    /// Number of publishers with at least one sample
    pub fn tracked(&self) -> usize {
        self.samples.len()
    }

    fn record(&self, key: ChannelSessionKey, sample: PositionSample) {
        let mut history = self.samples.entry(key).or_default();

        // Out-of-order captures would make elapsed time negative
        if history.back().is_some_and(|last| sample.timestamp <= last.timestamp) {
            trace!("Dropping stale position sample at {}", sample.timestamp);
            return;
        }
        history.push_back(sample);

        // Keep one sample at or before the retention boundary so the longest
        // window is fully covered
        let boundary = sample.timestamp - self.retention_ms;
        while history.len() > 2 && history[1].timestamp <= boundary {
            history.pop_front();
        }
    }

    fn rate_over(history: &VecDeque<PositionSample>, window: &TimeWindow) -> Option<i64> {
        let newest = history.back()?;
        let start = newest.timestamp - window.duration().as_millis() as i64;
        let oldest = history.iter().find(|sample| sample.timestamp >= start)?;
        let elapsed_ms = newest.timestamp - oldest.timestamp;
        if elapsed_ms <= 0 {
            return None;
        }
        let bytes = newest.position.saturating_sub(oldest.position).max(0);
        let rate = (bytes as i128 * 1000) / elapsed_ms as i128;
        Some(i64::try_from(rate).unwrap_or(i64::MAX))
    }
}

impl CounterSnapshotListener for WindowedRateMonitor {
    fn on_snapshot(&self, snapshot: &SnapshotBatch) -> Result<()> {
        for counters in &snapshot.publisher_counters {
            self.record(
                counters.key(&snapshot.label),
                PositionSample {
                    timestamp: snapshot.timestamp,
                    position: counters.publisher_position,
                },
            );
        }
        Ok(())
    }
}

impl RateMonitor for WindowedRateMonitor {
    fn rates_for(&self, key: &ChannelSessionKey) -> Vec<RateSample> {
        let Some(history) = self.samples.get(key) else {
            return Vec::new();
        };
        self.windows
            .iter()
            .filter_map(|window| {
                Self::rate_over(&history, window).map(|bytes_per_second| RateSample {
                    window: *window,
                    bytes_per_second,
                })
            })
            .collect()
    }
}
