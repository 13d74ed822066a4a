//! In-process snapshot source.
//!
//! Batches are handed over through a bounded channel; nothing crosses a
//! process boundary.

use std::path::Path;

use aether_common::SnapshotBatch;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::source::{SnapshotSource, SourceError};

/// Producer half of a [`LocalSource`]
#[derive(Debug, Clone)]
pub struct LocalPublisher {
    sender: mpsc::Sender<SnapshotBatch>,
}

impl LocalPublisher {
    /// Queue a batch without waiting
    pub fn publish(&self, batch: SnapshotBatch) -> Result<(), SourceError> {
        self.sender.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SourceError::Full,
            mpsc::error::TrySendError::Closed(_) => SourceError::Closed,
        })
    }

    /// Queue a batch, waiting for buffer space
    pub async fn publish_wait(&self, batch: SnapshotBatch) -> Result<(), SourceError> {
        self.sender.send(batch).await.map_err(|_| SourceError::Closed)
    }

    /// Publish every newline-delimited JSON batch in a file
    ///
    /// Lines that fail to parse are logged and skipped. Returns the number
    /// of batches published.
    pub async fn replay_file(&self, path: &Path) -> Result<usize, SourceError> {
        let content =
            tokio::fs::read_to_string(path).await.map_err(|source| SourceError::ReadFile {
                path: path.display().to_string(),
                source,
            })?;

        let mut published = 0;
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<SnapshotBatch>(line) {
                Ok(batch) => {
                    self.publish_wait(batch).await?;
                    published += 1;
                }
                Err(e) => warn!("Skipping line {} of {}: {e}", number + 1, path.display()),
            }
        }
        debug!("Replayed {published} snapshots from {}", path.display());
        Ok(published)
    }
}

/// A source fed by [`LocalPublisher`]s in the same process
#[derive(Debug)]
pub struct LocalSource {
    receiver: mpsc::Receiver<SnapshotBatch>,
    description: String,
    disconnected: bool,
}

impl LocalSource {
    /// Create a connected publisher/source pair buffering up to `capacity` batches
    pub fn create(capacity: usize) -> (LocalPublisher, LocalSource) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            LocalPublisher { sender },
            LocalSource {
                receiver,
                description: format!("local: in-process buffer of {}", capacity.max(1)),
                disconnected: false,
            },
        )
    }
}

impl SnapshotSource for LocalSource {
    fn drain_available(&mut self) -> Vec<SnapshotBatch> {
        let mut batches = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(batch) => batches.push(batch),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        debug!("All local snapshot publishers dropped");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
        batches
    }

    fn description(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn batch(label: &str) -> SnapshotBatch {
        SnapshotBatch {
            label: label.to_string(),
            timestamp: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn drains_everything_published_in_order() {
        let (publisher, mut source) = LocalSource::create(8);
        publisher.publish(batch("a")).unwrap();
        publisher.publish(batch("b")).unwrap();

        let labels: Vec<_> = source.drain_available().into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert!(source.drain_available().is_empty());
    }

    #[tokio::test]
    async fn publish_reports_full_buffer() {
        let (publisher, mut source) = LocalSource::create(1);
        publisher.publish(batch("a")).unwrap();
        assert!(matches!(publisher.publish(batch("b")), Err(SourceError::Full)));

        assert_eq!(source.drain_available().len(), 1);
        publisher.publish(batch("c")).unwrap();
    }

    #[tokio::test]
    async fn publish_after_source_dropped_is_closed() {
        let (publisher, source) = LocalSource::create(4);
        drop(source);
        assert!(matches!(publisher.publish(batch("a")), Err(SourceError::Closed)));
    }

    #[tokio::test]
    async fn drain_after_publishers_dropped_returns_leftovers() {
        let (publisher, mut source) = LocalSource::create(4);
        publisher.publish(batch("a")).unwrap();
        drop(publisher);

        assert_eq!(source.drain_available().len(), 1);
        assert!(source.drain_available().is_empty());
    }

    #[tokio::test]
    async fn replay_file_skips_malformed_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"label": "client", "timestamp": 1}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"label": "server", "timestamp": 2}}"#).unwrap();

        let (publisher, mut source) = LocalSource::create(8);
        let published = publisher.replay_file(file.path()).await.unwrap();
        assert_eq!(published, 2);

        let labels: Vec<_> = source.drain_available().into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["client", "server"]);
    }

    #[tokio::test]
    async fn replay_missing_file_is_an_error() {
        let (publisher, _source) = LocalSource::create(1);
        let result = publisher.replay_file(Path::new("/definitely/not/here.ndjson")).await;
        assert!(matches!(result, Err(SourceError::ReadFile { .. })));
    }
}
