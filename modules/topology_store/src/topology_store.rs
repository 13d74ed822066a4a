//! Aether Net topology store module
//! Keeps the most recently observed topology and raw counters of every endpoint

use aether_common::{
    ChannelSessionKey, CounterSnapshotListener, PublisherCounterSet, SnapshotBatch,
    SubscriberCounterSet, SystemCounters,
};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

mod state;
pub use state::{Connections, StreamBucket, Topology};

/// Single-writer, many-reader store of the latest topology
///
/// Each ingested batch is applied to a private copy of the current state,
/// which is then published with one atomic swap. Readers holding an older
/// snapshot keep seeing it in full.
pub struct TopologyStore {
    current: ArcSwap<Topology>,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Topology::new()),
        }
    }

    /// Apply a batch and publish the resulting state
    pub fn ingest(&self, batch: &SnapshotBatch) {
        let previous = self.current.rcu(|current| {
            let mut next = Topology::clone(current);
            next.apply(batch);
            next
        });

        debug!(
            label = %batch.label,
            timestamp = batch.timestamp,
            publishers = batch.publisher_counters.len(),
            subscribers = batch.subscriber_counters.len(),
            generation = previous.generation() + 1,
            "Ingested snapshot"
        );
    }

    /// The current state as one consistent point in ingestion history
    pub fn snapshot(&self) -> Arc<Topology> {
        self.current.load_full()
    }

    pub fn connections_by_stream(&self) -> Connections {
        self.current.load().connections_by_stream()
    }

    pub fn publisher_counter_set(&self, key: &ChannelSessionKey) -> Option<PublisherCounterSet> {
        self.current.load().publisher_counter_set(key).cloned()
    }

    pub fn subscriber_counter_set(&self, key: &ChannelSessionKey) -> Option<SubscriberCounterSet> {
        self.current.load().subscriber_counter_set(key).cloned()
    }

    pub fn system_counters(&self) -> BTreeMap<String, SystemCounters> {
        self.current.load().system_counters()
    }
}

impl CounterSnapshotListener for TopologyStore {
    fn on_snapshot(&self, snapshot: &SnapshotBatch) -> Result<()> {
        self.ingest(snapshot);
        Ok(())
    }
}
