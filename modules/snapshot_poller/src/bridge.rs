//! Fixed-period bridge from a snapshot source to a listener

use std::sync::Arc;
use std::time::Duration;

use aether_common::CounterSnapshotListener;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::source::SnapshotSource;

/// Drains a source every `period` and forwards each batch to the listener
pub struct PollBridge<S: SnapshotSource> {
    source: S,
    listener: Arc<dyn CounterSnapshotListener>,
    period: Duration,
}

impl<S: SnapshotSource + 'static> PollBridge<S> {
    pub fn new(source: S, listener: Arc<dyn CounterSnapshotListener>, period: Duration) -> Self {
        Self {
            source,
            listener,
            period,
        }
    }

    /// Drain once and deliver in arrival order
    ///
    /// A failing listener is logged and the next batch still delivered.
    /// Returns the number of batches the listener accepted.
    pub fn poll_once(&mut self) -> usize {
        let batches = self.source.drain_available();
        if batches.is_empty() {
            return 0;
        }

        let drained = batches.len();
        let mut delivered = 0;
        for batch in &batches {
            match self.listener.on_snapshot(batch) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(label = %batch.label, "Failed to deliver snapshot: {e:#}"),
            }
        }
        debug!(drained, delivered, "Polled {}", self.source.description());
        delivered
    }

    /// Poll forever at the configured period
    ///
    /// A slow tick delays the following ones rather than bunching them up.
    pub async fn run(mut self) {
        info!(
            "Polling {} every {}ms",
            self.source.description(),
            self.period.as_millis()
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once();
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
