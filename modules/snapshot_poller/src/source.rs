//! Snapshot sources drained by the poll bridge

use aether_common::{configuration::SourceMode, SnapshotBatch};
use thiserror::Error;

use crate::local::LocalSource;
use crate::network::NetworkSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Local snapshot buffer is full")]
    Full,

    #[error("Snapshot source has shut down")]
    Closed,

    #[error("Failed to bind snapshot listener on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Anything the poll bridge can drain snapshot batches from
pub trait SnapshotSource: Send {
    /// Everything that has arrived since the last call; never blocks
    fn drain_available(&mut self) -> Vec<SnapshotBatch>;

    /// Human readable description of where batches come from
    fn description(&self) -> &str;
}

/// The source selected at startup, fixed for the process lifetime
pub enum ModeSource {
    Local(LocalSource),
    Network(NetworkSource),
}

impl ModeSource {
    pub fn mode(&self) -> SourceMode {
        match self {
            ModeSource::Local(_) => SourceMode::Local,
            ModeSource::Network(_) => SourceMode::Network,
        }
    }
}

impl From<LocalSource> for ModeSource {
    fn from(source: LocalSource) -> Self {
        ModeSource::Local(source)
    }
}

impl From<NetworkSource> for ModeSource {
    fn from(source: NetworkSource) -> Self {
        ModeSource::Network(source)
    }
}

impl SnapshotSource for ModeSource {
    fn drain_available(&mut self) -> Vec<SnapshotBatch> {
        match self {
            ModeSource::Local(source) => source.drain_available(),
            ModeSource::Network(source) => source.drain_available(),
        }
    }

    fn description(&self) -> &str {
        match self {
            ModeSource::Local(source) => source.description(),
            ModeSource::Network(source) => source.description(),
        }
    }
}
