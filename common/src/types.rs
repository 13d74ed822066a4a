//! Core type definitions for Aether Net

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a logical publish/subscribe stream
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKey {
    /// Transport channel URI
    pub channel: String,

    /// Stream identifier within the channel
    pub stream_id: i32,
}

impl StreamKey {
    pub fn new(channel: impl Into<String>, stream_id: i32) -> Self {
        Self {
            channel: channel.into(),
            stream_id,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.stream_id)
    }
}

/// Identity of one concrete endpoint (publication or subscription)
///
/// Equality covers channel, label, stream id and session id. Ordering
/// compares the same four fields in that order, so two distinct identities
/// never compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSessionKey {
    /// Transport channel URI
    pub channel: String,

    /// Stream identifier within the channel
    pub stream_id: i32,

    /// Transport session identifier
    pub session_id: i32,

    /// Monitored location the endpoint was observed from
    pub label: String,
}

impl ChannelSessionKey {
    pub fn new(
        label: impl Into<String>,
        channel: impl Into<String>,
        stream_id: i32,
        session_id: i32,
    ) -> Self {
        Self {
            channel: channel.into(),
            stream_id,
            session_id,
            label: label.into(),
        }
    }

    /// The stream this endpoint belongs to
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.channel.clone(), self.stream_id)
    }
}

impl PartialEq for ChannelSessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.stream_id == other.stream_id
            && self.session_id == other.session_id
            && self.channel == other.channel
            && self.label == other.label
    }
}

impl Eq for ChannelSessionKey {}

impl Hash for ChannelSessionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
        self.channel.hash(state);
        self.stream_id.hash(state);
        self.session_id.hash(state);
    }
}

impl Ord for ChannelSessionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.channel
            .cmp(&other.channel)
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.stream_id.cmp(&other.stream_id))
            .then_with(|| self.session_id.cmp(&other.session_id))
    }
}

impl PartialOrd for ChannelSessionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChannelSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}#{}",
            self.label, self.channel, self.stream_id, self.session_id
        )
    }
}

/// Raw per-tick counters for one publication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherCounterSet {
    pub channel: String,
    pub stream_id: i32,
    pub session_id: i32,

    /// Position the application has published up to
    pub publisher_position: i64,

    /// Position the application may publish up to before back pressure
    pub publisher_limit: i64,

    /// Position the sender has transmitted up to
    pub sender_position: i64,

    /// Flow-control limit granted to the sender
    pub sender_limit: i64,

    /// Number of times the publication was back pressured
    pub back_pressure_events: i64,
}

impl PublisherCounterSet {
    /// Endpoint identity under the given monitored-location label
    pub fn key(&self, label: &str) -> ChannelSessionKey {
        ChannelSessionKey::new(label, self.channel.clone(), self.stream_id, self.session_id)
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.channel.clone(), self.stream_id)
    }
}

/// Raw per-tick counters for one subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberCounterSet {
    pub channel: String,
    pub stream_id: i32,
    pub session_id: i32,

    /// Consumed position per contributing source id
    #[serde(default)]
    pub subscriber_positions: BTreeMap<i64, i64>,

    /// Position the receiver has rebuilt up to
    pub receiver_position: i64,

    /// Highest position the receiver has seen
    pub receiver_high_water_mark: i64,
}

impl SubscriberCounterSet {
    /// Endpoint identity under the given monitored-location label
    pub fn key(&self, label: &str) -> ChannelSessionKey {
        ChannelSessionKey::new(label, self.channel.clone(), self.stream_id, self.session_id)
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.channel.clone(), self.stream_id)
    }
}

/// Process-wide counters, passed through untouched
pub type SystemCounters = BTreeMap<String, i64>;

/// One ingested snapshot from a monitored location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotBatch {
    /// Monitored location; becomes the label of every endpoint in the batch
    pub label: String,

    /// Capture time, milliseconds since the Unix epoch
    pub timestamp: i64,

    #[serde(default, rename = "publisherCounterSets")]
    pub publisher_counters: Vec<PublisherCounterSet>,

    #[serde(default, rename = "subscriberCounterSets")]
    pub subscriber_counters: Vec<SubscriberCounterSet>,

    #[serde(default)]
    pub system_counters: SystemCounters,
}
