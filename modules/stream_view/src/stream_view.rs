//! Aether Net stream view module
//! Renders a topology snapshot into the sorted hierarchical monitor view

use aether_common::{ChannelSessionKey, RateMonitor, TimeWindow};
use aether_module_topology_store::Topology;
use std::collections::BTreeMap;
use tracing::debug;

mod view;
pub use view::{
    remaining_buffer, send_backlog, MonitorView, PublisherView, StreamTree, SubscriberView,
};

/// Pure transformation from topology and rates to a [`MonitorView`]
///
/// Holds only the configured rate windows; every call to [`ViewBuilder::build`]
/// starts from scratch, so identical inputs give identical views.
#[derive(Debug, Clone)]
pub struct ViewBuilder {
    rate_windows: Vec<TimeWindow>,
}

impl Default for ViewBuilder {
    fn default() -> Self {
        Self::new(TimeWindow::defaults())
    }
}

impl ViewBuilder {
    pub fn new(rate_windows: Vec<TimeWindow>) -> Self {
        Self { rate_windows }
    }

    pub fn build(&self, topology: &Topology, rates: &dyn RateMonitor) -> MonitorView {
        let mut streams = StreamTree::new();

        for (stream, bucket) in topology.streams() {
            let by_stream = streams.entry(stream.channel.clone()).or_default();
            if bucket.is_publisher_less() {
                by_stream.entry(stream.stream_id).or_default();
                continue;
            }

            // Keyed by identity: sorted by the endpoint comparator, and a
            // repeated identity replaces the earlier entry
            let mut subscribers = BTreeMap::new();
            for key in bucket.subscribers() {
                if let Some(counters) = topology.subscriber_counter_set(key) {
                    subscribers.insert(key.clone(), SubscriberView::new(&key.label, counters));
                }
            }

            let mut publishers = BTreeMap::new();
            for key in bucket.publishers() {
                if let Some(counters) = topology.publisher_counter_set(key) {
                    let mut publisher = PublisherView::new(&key.label, counters);
                    publisher.subscribers = subscribers.values().cloned().collect();
                    publisher.publish_rates = self.publish_rates(key, rates);
                    publishers.insert(key.clone(), publisher);
                }
            }

            by_stream.entry(stream.stream_id).or_default().extend(publishers.into_values());
        }

        debug!(
            streams = streams.len(),
            publishers = topology.publisher_count(),
            subscribers = topology.subscriber_count(),
            generation = topology.generation(),
            "Built monitor view"
        );

        MonitorView {
            streams,
            system_counters: topology.system_counters(),
        }
    }

    fn publish_rates(
        &self,
        key: &ChannelSessionKey,
        rates: &dyn RateMonitor,
    ) -> BTreeMap<String, i64> {
        let samples = rates.rates_for(key);
        let mut publish_rates = BTreeMap::new();
        for window in &self.rate_windows {
            if let Some(sample) = samples.iter().rev().find(|sample| sample.window == *window) {
                publish_rates.insert(window.label(), sample.bytes_per_second);
            }
        }
        publish_rates
    }
}
