//! Network snapshot source.
//!
//! Accepts TCP connections from monitoring agents and reads newline-delimited
//! JSON snapshot batches from each of them.

use std::io;
use std::net::SocketAddr;

use aether_common::SnapshotBatch;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::source::{SnapshotSource, SourceError};

/// Longest snapshot line accepted from an agent unless configured otherwise
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Batches received over the network, buffered until drained
///
/// Background tasks do the socket reads; [`SnapshotSource::drain_available`]
/// only takes what they have already decoded.
#[derive(Debug)]
pub struct NetworkSource {
    receiver: mpsc::Receiver<SnapshotBatch>,
    description: String,
    local_addr: Option<SocketAddr>,
    acceptor: Option<JoinHandle<()>>,
}

impl NetworkSource {
    /// Listen for agent connections on `address`
    pub async fn bind(
        address: &str,
        capacity: usize,
        max_line_bytes: usize,
    ) -> Result<Self, SourceError> {
        let bind_error = |source| SourceError::Bind {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!("Listening for snapshot agents on {local_addr}");

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let acceptor = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        info!("Snapshot agent connected from {peer}");
                        spawn_reader(stream, peer.to_string(), max_line_bytes, tx.clone());
                    }
                    Err(e) => warn!("Failed to accept snapshot agent: {e}"),
                }
            }
        });

        Ok(Self {
            receiver: rx,
            description: format!("network: tcp://{local_addr}"),
            local_addr: Some(local_addr),
            acceptor: Some(acceptor),
        })
    }

    /// Read batches from a single already-connected async reader
    pub fn from_reader<R>(
        reader: R,
        description: &str,
        capacity: usize,
        max_line_bytes: usize,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        spawn_reader(reader, description.to_string(), max_line_bytes, tx);
        Self {
            receiver: rx,
            description: format!("network: {description}"),
            local_addr: None,
            acceptor: None,
        }
    }

    /// Address actually bound, when listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for NetworkSource {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
    }
}

impl SnapshotSource for NetworkSource {
    fn drain_available(&mut self) -> Vec<SnapshotBatch> {
        let mut batches = Vec::new();
        // Disconnected only once every reader and the acceptor are gone
        while let Ok(batch) = self.receiver.try_recv() {
            batches.push(batch);
        }
        batches
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Outcome of reading one line from an agent
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Complete,
    Oversized,
    Eof,
}

/// Read up to and including the next `\n`, holding at most `max_line_bytes`
///
/// An oversized line is consumed and discarded; `buf` is then empty.
async fn read_line_bounded<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_line_bytes: usize,
) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_line_bytes as u64 + 1;
    buf.clear();
    if (&mut *reader).take(limit).read_until(b'\n', buf).await? == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= max_line_bytes {
        return Ok(Line::Complete);
    }

    loop {
        buf.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
        if read == 0 || buf.last() == Some(&b'\n') {
            buf.clear();
            return Ok(Line::Oversized);
        }
    }
}

/// Decode newline-delimited JSON batches until EOF or a read error
///
/// Lines that are not valid JSON, not UTF-8 or longer than `max_line_bytes`
/// are logged and skipped.
fn spawn_reader<R>(
    reader: R,
    peer: String,
    max_line_bytes: usize,
    tx: mpsc::Sender<SnapshotBatch>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            match read_line_bounded(&mut reader, &mut buf, max_line_bytes).await {
                Ok(Line::Eof) => {
                    info!("Snapshot agent {peer} disconnected");
                    break;
                }
                Ok(Line::Oversized) => {
                    warn!("Skipping snapshot from {peer} longer than {max_line_bytes} bytes");
                }
                Ok(Line::Complete) => {
                    let line = buf.trim_ascii();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<SnapshotBatch>(line) {
                        Ok(batch) => {
                            if tx.send(batch).await.is_err() {
                                debug!("Snapshot source dropped, closing reader for {peer}");
                                break;
                            }
                        }
                        Err(e) => warn!("Malformed snapshot from {peer}: {e}"),
                    }
                }
                Err(e) => {
                    warn!("Read error from snapshot agent {peer}: {e}");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn drain_until(source: &mut NetworkSource, expected: usize) -> Vec<SnapshotBatch> {
        let mut batches = Vec::new();
        for _ in 0..200 {
            batches.extend(source.drain_available());
            if batches.len() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        batches
    }

    #[tokio::test]
    async fn reader_skips_malformed_and_blank_lines() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut source = NetworkSource::from_reader(server, "duplex", 8, DEFAULT_MAX_LINE_BYTES);

        client
            .write_all(
                b"{\"label\":\"client\",\"timestamp\":1}\n\
                  garbage\n\
                  \n\
                  {\"label\":\"server\",\"timestamp\":2}\n",
            )
            .await
            .unwrap();

        let labels: Vec<_> =
            drain_until(&mut source, 2).await.into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["client", "server"]);
        assert_eq!(source.description(), "network: duplex");
        assert!(source.local_addr().is_none());
    }

    #[tokio::test]
    async fn non_utf8_line_is_skipped_and_reading_continues() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut source = NetworkSource::from_reader(server, "duplex", 8, DEFAULT_MAX_LINE_BYTES);

        client.write_all(b"{\"label\":\"a\",\"timestamp\":1}\n").await.unwrap();
        client.write_all(b"\xff\xfe not text at all\n").await.unwrap();
        client.write_all(b"{\"label\":\"b\",\"timestamp\":2}\n").await.unwrap();

        let labels: Vec<_> =
            drain_until(&mut source, 2).await.into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn oversized_line_is_skipped_and_reading_continues() {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut source = NetworkSource::from_reader(server, "duplex", 8, 64);

        let huge = format!("{{\"label\":\"{}\",\"timestamp\":1}}\n", "x".repeat(500));
        client.write_all(b"{\"label\":\"a\",\"timestamp\":1}\n").await.unwrap();
        client.write_all(huge.as_bytes()).await.unwrap();
        client.write_all(b"{\"label\":\"b\",\"timestamp\":2}\n").await.unwrap();

        let labels: Vec<_> =
            drain_until(&mut source, 2).await.into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn bounded_read_reports_each_outcome() {
        let input: &[u8] = b"short\nthis line is far too long\nlast";
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();

        assert_eq!(read_line_bounded(&mut reader, &mut buf, 8).await.unwrap(), Line::Complete);
        assert_eq!(buf, b"short\n");
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 8).await.unwrap(), Line::Oversized);
        assert!(buf.is_empty());
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 8).await.unwrap(), Line::Complete);
        assert_eq!(buf, b"last");
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 8).await.unwrap(), Line::Eof);
    }

    #[tokio::test]
    async fn accepts_batches_from_several_agents() {
        let mut source =
            NetworkSource::bind("127.0.0.1:0", 16, DEFAULT_MAX_LINE_BYTES).await.unwrap();
        let address = source.local_addr().unwrap();

        for label in ["client", "server"] {
            let mut agent = TcpStream::connect(address).await.unwrap();
            let line = format!("{{\"label\":\"{label}\",\"timestamp\":1}}\n");
            agent.write_all(line.as_bytes()).await.unwrap();
            agent.shutdown().await.unwrap();
        }

        let mut labels: Vec<_> =
            drain_until(&mut source, 2).await.into_iter().map(|b| b.label).collect();
        labels.sort();
        assert_eq!(labels, vec!["client", "server"]);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let first = NetworkSource::bind("127.0.0.1:0", 1, DEFAULT_MAX_LINE_BYTES).await.unwrap();
        let taken = first.local_addr().unwrap().to_string();
        let result = NetworkSource::bind(&taken, 1, DEFAULT_MAX_LINE_BYTES).await;
        assert!(matches!(result, Err(SourceError::Bind { .. })));
    }

    #[tokio::test]
    async fn drain_with_nothing_pending_is_empty() {
        let mut source =
            NetworkSource::bind("127.0.0.1:0", 1, DEFAULT_MAX_LINE_BYTES).await.unwrap();
        assert!(source.drain_available().is_empty());
    }
}
