//! The active client connection.

use std::time::{Duration, Instant};

use crate::channel::ByteWriter;
use crate::error::SessionError;
use crate::status::SessionStats;
use crate::worker::{ReadWorker, WorkerId};

/// The single client currently bridged to the serial device.
///
/// Owns the write half of the socket and the worker that owns the read half,
/// so the worker is alive exactly as long as this value.
pub struct ActiveConnection {
    peer: String,
    writer: Box<dyn ByteWriter>,
    worker: ReadWorker,
    stats: SessionStats,
    connected_at: Instant,
}

impl ActiveConnection {
    pub fn new(peer: String, writer: Box<dyn ByteWriter>, worker: ReadWorker) -> Self {
        Self {
            peer,
            writer,
            worker,
            stats: SessionStats::default(),
            connected_at: Instant::now(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker.id()
    }

    /// Write serial bytes to the client, bounded by `timeout`.
    pub async fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), SessionError> {
        match tokio::time::timeout(timeout, self.writer.write_all(data)).await {
            Ok(Ok(())) => {
                self.stats.bytes_to_client += data.len() as u64;
                Ok(())
            }
            Ok(Err(e)) => Err(SessionError::Write(e)),
            Err(_) => Err(SessionError::WriteTimeout(timeout)),
        }
    }

    pub fn record_to_serial(&mut self, n: usize) {
        self.stats.bytes_to_serial += n as u64;
    }

    /// Shut down the socket and stop the read worker.
    pub async fn close(mut self, timeout: Duration) -> SessionStats {
        match tokio::time::timeout(timeout, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(peer = %self.peer, error = %e, "Socket shutdown failed"),
            Err(_) => tracing::debug!(peer = %self.peer, "Socket shutdown timed out"),
        }
        drop(self.writer);
        self.worker.stop().await;

        tracing::debug!(
            peer = %self.peer,
            duration_secs = self.connected_at.elapsed().as_secs_f64(),
            "Client connection closed"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::num::NonZeroU64;

    use async_trait::async_trait;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct StalledWriter;

    #[async_trait]
    impl ByteWriter for StalledWriter {
        async fn write_all(&mut self, _data: &[u8]) -> io::Result<()> {
            std::future::pending().await
        }
    }

    /// A worker whose peer is already gone; it exits after its first read.
    fn idle_worker() -> ReadWorker {
        let (_, reader) = tokio::io::duplex(8);
        let (tx, _) = mpsc::channel(1);
        ReadWorker::spawn(
            WorkerId::client(NonZeroU64::MIN),
            Box::new(reader),
            8,
            Duration::ZERO,
            tx,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn send_counts_bytes() {
        let (writer, mut remote) = tokio::io::duplex(64);
        let mut conn = ActiveConnection::new("peer".into(), Box::new(writer), idle_worker());

        conn.send(b"0123456789", Duration::from_secs(1)).await.unwrap();
        conn.record_to_serial(5);

        let mut buf = [0u8; 10];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0123456789");

        let stats = conn.close(Duration::from_secs(1)).await;
        assert_eq!(
            stats,
            SessionStats {
                bytes_to_client: 10,
                bytes_to_serial: 5,
            }
        );
        assert_eq!(remote.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stalled_client_times_out() {
        let mut conn = ActiveConnection::new("peer".into(), Box::new(StalledWriter), idle_worker());
        let err = conn.send(b"abc", Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, SessionError::WriteTimeout(_)));

        let stats = conn.close(Duration::from_millis(20)).await;
        assert_eq!(stats.bytes_to_client, 0);
    }
}
