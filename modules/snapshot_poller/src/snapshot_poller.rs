//! Aether Net snapshot poller module
//! Sources of counter snapshots and the bridge that drains them on a timer

mod bridge;
mod local;
mod network;
mod source;

pub use bridge::PollBridge;
pub use local::{LocalPublisher, LocalSource};
pub use network::{NetworkSource, DEFAULT_MAX_LINE_BYTES};
pub use source::{ModeSource, SnapshotSource, SourceError};
