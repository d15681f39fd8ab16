//! Read worker: one read in flight at a time, gated by the bridge.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::outcome::{ReadOutcome, WorkerId};
use crate::channel::ByteReader;

/// Handle to a running read worker.
///
/// The worker loops: wait `interval`, read into its buffer, send a
/// [`ReadOutcome`], then wait for the bridge to resume it. It exits when the
/// outcome is dropped without resuming, when the outcome channel closes, or
/// when cancelled. Dropping the handle cancels the worker.
pub struct ReadWorker {
    id: WorkerId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ReadWorker {
    pub fn spawn(
        id: WorkerId,
        reader: Box<dyn ByteReader>,
        buffer_size: usize,
        interval: Duration,
        outcomes: mpsc::Sender<ReadOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        let buf = vec![0u8; buffer_size.max(1)];
        let task = tokio::spawn(run_read_worker(
            id,
            reader,
            buf,
            interval,
            outcomes,
            cancel.clone(),
        ));
        tracing::debug!(worker = %id, buffer_size, ?interval, "Read worker started");
        Self { id, cancel, task }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the worker and wait for its task to exit. The reader is
    /// dropped by the time this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(worker = %self.id, error = %e, "Read worker task failed");
        }
    }
}

impl Drop for ReadWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_read_worker(
    id: WorkerId,
    mut reader: Box<dyn ByteReader>,
    mut buf: Vec<u8>,
    interval: Duration,
    outcomes: mpsc::Sender<ReadOutcome>,
    cancel: CancellationToken,
) {
    loop {
        if !interval.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = reader.read(&mut buf) => result,
        };

        let (resume_tx, resume_rx) = oneshot::channel();
        let outcome = ReadOutcome::new(id, buf, result, resume_tx);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = outcomes.send(outcome) => {
                if sent.is_err() {
                    tracing::trace!(worker = %id, "Outcome channel closed");
                    break;
                }
            }
        }

        buf = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            granted = resume_rx => match granted {
                Ok(buf) => buf,
                Err(_) => break,
            },
        };
    }

    tracing::debug!(worker = %id, "Read worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::num::NonZeroU64;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    /// Reader fed from a channel; a closed channel blocks forever.
    struct ScriptedReader {
        chunks: mpsc::UnboundedReceiver<io::Result<Vec<u8>>>,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ByteReader for ScriptedReader {
        async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.chunks.recv().await {
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Err(e)) => Err(e),
                None => std::future::pending().await,
            }
        }
    }

    struct Fixture {
        feed: mpsc::UnboundedSender<io::Result<Vec<u8>>>,
        reads: Arc<AtomicUsize>,
        outcomes: mpsc::Receiver<ReadOutcome>,
        worker: ReadWorker,
    }

    fn start(interval: Duration) -> Fixture {
        let (feed, chunks) = mpsc::unbounded_channel();
        let reads = Arc::new(AtomicUsize::new(0));
        let reader = ScriptedReader {
            chunks,
            reads: Arc::clone(&reads),
        };
        let (tx, outcomes) = mpsc::channel(1);
        let worker = ReadWorker::spawn(
            WorkerId::client(NonZeroU64::MIN),
            Box::new(reader),
            16,
            interval,
            tx,
            CancellationToken::new(),
        );
        Fixture {
            feed,
            reads,
            outcomes,
            worker,
        }
    }

    async fn next(outcomes: &mut mpsc::Receiver<ReadOutcome>) -> ReadOutcome {
        tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("timed out waiting for outcome")
            .expect("worker closed channel")
    }

    #[tokio::test]
    async fn next_read_waits_for_resume() {
        let mut f = start(Duration::ZERO);
        f.feed.send(Ok(b"one".to_vec())).unwrap();
        f.feed.send(Ok(b"two".to_vec())).unwrap();

        let first = next(&mut f.outcomes).await;
        assert_eq!(first.bytes(), Some(&b"one"[..]));
        assert_eq!(first.worker(), WorkerId::client(NonZeroU64::MIN));

        // Data is waiting, but no second read may start before resume.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.reads.load(Ordering::SeqCst), 1);
        assert!(f.outcomes.try_recv().is_err());

        assert!(first.resume());
        let second = next(&mut f.outcomes).await;
        assert_eq!(second.bytes(), Some(&b"two"[..]));
        assert_eq!(f.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let mut f = start(Duration::ZERO);
        f.feed
            .send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")))
            .unwrap();

        let mut outcome = next(&mut f.outcomes).await;
        let err = outcome.take_error().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(err.to_string(), "unplugged");
    }

    #[tokio::test]
    async fn dropping_outcome_ends_worker() {
        let mut f = start(Duration::ZERO);
        f.feed.send(Ok(b"x".to_vec())).unwrap();

        let outcome = next(&mut f.outcomes).await;
        drop(outcome);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !f.worker.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker should exit");
        assert_eq!(f.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_interrupts_blocked_read() {
        let f = start(Duration::ZERO);
        drop(f.feed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.reads.load(Ordering::SeqCst), 1);

        tokio::time::timeout(Duration::from_secs(5), f.worker.stop())
            .await
            .expect("stop should not hang");
    }

    #[tokio::test]
    async fn interval_delays_each_read() {
        let mut f = start(Duration::from_millis(100));
        f.feed.send(Ok(b"a".to_vec())).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.reads.load(Ordering::SeqCst), 0);

        let outcome = next(&mut f.outcomes).await;
        assert_eq!(outcome.bytes(), Some(&b"a"[..]));
    }
}
