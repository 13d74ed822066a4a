//! Presentation projections of the topology, rebuilt on every render

use aether_common::{ChannelSessionKey, PublisherCounterSet, SubscriberCounterSet, SystemCounters};
use serde::Serialize;
use std::collections::BTreeMap;

/// Channel -> stream id -> publishers, each level in ascending order
pub type StreamTree = BTreeMap<String, BTreeMap<i32, Vec<PublisherView>>>;

/// The whole rendered document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorView {
    pub streams: StreamTree,
    pub system_counters: BTreeMap<String, SystemCounters>,
}

impl MonitorView {
    /// Publishers in render order
    pub fn publishers(&self) -> impl Iterator<Item = &PublisherView> {
        self.streams.values().flat_map(|by_stream| by_stream.values()).flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherView {
    pub label: String,
    pub channel: String,
    pub stream_id: i32,
    pub session_id: i32,
    pub publisher_position: i64,
    pub publisher_limit: i64,
    pub sender_position: i64,
    pub sender_limit: i64,
    pub back_pressure_events: i64,

    /// Space left before the publisher is back pressured
    pub remaining_buffer: i64,

    /// Published but not yet sent, never negative
    pub send_backlog: i64,

    pub subscribers: Vec<SubscriberView>,

    /// Bytes per second keyed by window label; absent windows are omitted
    pub publish_rates: BTreeMap<String, i64>,
}

impl PublisherView {
    pub fn new(label: &str, counters: &PublisherCounterSet) -> Self {
        Self {
            label: label.to_string(),
            channel: counters.channel.clone(),
            stream_id: counters.stream_id,
            session_id: counters.session_id,
            publisher_position: counters.publisher_position,
            publisher_limit: counters.publisher_limit,
            sender_position: counters.sender_position,
            sender_limit: counters.sender_limit,
            back_pressure_events: counters.back_pressure_events,
            remaining_buffer: remaining_buffer(counters),
            send_backlog: send_backlog(counters),
            subscribers: Vec::new(),
            publish_rates: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> ChannelSessionKey {
        ChannelSessionKey::new(
            self.label.clone(),
            self.channel.clone(),
            self.stream_id,
            self.session_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberView {
    pub label: String,
    pub channel: String,
    pub stream_id: i32,
    pub session_id: i32,
    pub subscriber_positions: BTreeMap<i64, i64>,
    pub receiver_position: i64,
    pub receiver_high_water_mark: i64,
}

impl SubscriberView {
    pub fn new(label: &str, counters: &SubscriberCounterSet) -> Self {
        Self {
            label: label.to_string(),
            channel: counters.channel.clone(),
            stream_id: counters.stream_id,
            session_id: counters.session_id,
            subscriber_positions: counters.subscriber_positions.clone(),
            receiver_position: counters.receiver_position,
            receiver_high_water_mark: counters.receiver_high_water_mark,
        }
    }

    pub fn identity(&self) -> ChannelSessionKey {
        ChannelSessionKey::new(
            self.label.clone(),
            self.channel.clone(),
            self.stream_id,
            self.session_id,
        )
    }
}

/// `publisher_limit - publisher_position`
pub fn remaining_buffer(counters: &PublisherCounterSet) -> i64 {
    counters.publisher_limit.saturating_sub(counters.publisher_position)
}

/// `max(0, publisher_position - sender_position)`
pub fn send_backlog(counters: &PublisherCounterSet) -> i64 {
    counters.publisher_position.saturating_sub(counters.sender_position).max(0)
}
