//! Aether Net topology store: immutable topology state

use aether_common::{
    ChannelSessionKey, PublisherCounterSet, SnapshotBatch, StreamKey, SubscriberCounterSet,
    SystemCounters,
};
use imbl::{HashMap, OrdMap, OrdSet};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping from each stream to its publishers and the subscribers attached to them
pub type Connections =
    BTreeMap<StreamKey, BTreeMap<ChannelSessionKey, BTreeSet<ChannelSessionKey>>>;

/// Endpoints known for one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamBucket {
    publishers: OrdSet<ChannelSessionKey>,
    subscribers: OrdSet<ChannelSessionKey>,
}

impl StreamBucket {
    pub fn publishers(&self) -> impl Iterator<Item = &ChannelSessionKey> {
        self.publishers.iter()
    }

    /// Subscribers of the stream; every publisher of the stream feeds all of them
    pub fn subscribers(&self) -> impl Iterator<Item = &ChannelSessionKey> {
        self.subscribers.iter()
    }

    /// True for a bucket created by a subscriber before any publisher was seen
    pub fn is_publisher_less(&self) -> bool {
        self.publishers.is_empty()
    }
}

/// One consistent point in ingestion history
///
/// Built from persistent maps so that cloning is cheap and the next batch
/// can be applied to a private copy before it is published.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    streams: OrdMap<StreamKey, StreamBucket>,
    publishers: HashMap<ChannelSessionKey, PublisherCounterSet>,
    subscribers: HashMap<ChannelSessionKey, SubscriberCounterSet>,

    // Latest system counters per monitored location
    system_counters: OrdMap<String, SystemCounters>,

    // Number of batches applied
    generation: u64,

    // Label and timestamp of the most recent batch
    last_update: Option<(String, i64)>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a whole batch, overwriting counters for every key it contains
    pub fn apply(&mut self, batch: &SnapshotBatch) {
        for counters in &batch.publisher_counters {
            let key = counters.key(&batch.label);
            self.bucket_mut(counters.stream_key()).publishers.insert(key.clone());
            self.publishers.insert(key, counters.clone());
        }

        for counters in &batch.subscriber_counters {
            let key = counters.key(&batch.label);
            self.bucket_mut(counters.stream_key()).subscribers.insert(key.clone());
            self.subscribers.insert(key, counters.clone());
        }

        self.system_counters.insert(batch.label.clone(), batch.system_counters.clone());
        self.generation += 1;
        self.last_update = Some((batch.label.clone(), batch.timestamp));
    }

    fn bucket_mut(&mut self, stream: StreamKey) -> &mut StreamBucket {
        self.streams.entry(stream).or_default()
    }

    pub fn streams(&self) -> impl Iterator<Item = (&StreamKey, &StreamBucket)> {
        self.streams.iter()
    }

    pub fn connections_by_stream(&self) -> Connections {
        self.streams
            .iter()
            .map(|(stream, bucket)| {
                let subscribers: BTreeSet<ChannelSessionKey> =
                    bucket.subscribers.iter().cloned().collect();
                let publishers = bucket
                    .publishers
                    .iter()
                    .map(|publisher| (publisher.clone(), subscribers.clone()))
                    .collect();
                (stream.clone(), publishers)
            })
            .collect()
    }

    pub fn publisher_counter_set(&self, key: &ChannelSessionKey) -> Option<&PublisherCounterSet> {
        self.publishers.get(key)
    }

    pub fn subscriber_counter_set(
        &self,
        key: &ChannelSessionKey,
    ) -> Option<&SubscriberCounterSet> {
        self.subscribers.get(key)
    }

    pub fn system_counters(&self) -> BTreeMap<String, SystemCounters> {
        self.system_counters
            .iter()
            .map(|(label, counters)| (label.clone(), counters.clone()))
            .collect()
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_update(&self) -> Option<(&str, i64)> {
        self.last_update.as_ref().map(|(label, timestamp)| (label.as_str(), *timestamp))
    }
}
