//! Accept worker: hands over one client at a time.
//!
//! While the bridge holds the [`AcceptGate`](super::AcceptGate) of the last
//! outcome, no further client is accepted. New connection attempts wait in the
//! listen backlog instead of being rejected.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::outcome::AcceptOutcome;
use crate::channel::Listener;

pub struct AcceptWorker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AcceptWorker {
    pub fn spawn(
        listener: Box<dyn Listener>,
        outcomes: mpsc::Sender<AcceptOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(run_accept_worker(listener, outcomes, cancel.clone()));
        Self { cancel, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "Accept worker task failed");
        }
    }
}

impl Drop for AcceptWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_accept_worker(
    mut listener: Box<dyn Listener>,
    outcomes: mpsc::Sender<AcceptOutcome>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        let (resume_tx, resume_rx) = oneshot::channel();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = outcomes.send(AcceptOutcome::new(result, resume_tx)) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        tracing::trace!("Waiting for permission to accept the next client");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            granted = resume_rx => {
                if granted.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Accept worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::net::{TcpListener, TcpStream};

    use crate::channel::Connection;

    async fn next(outcomes: &mut mpsc::Receiver<AcceptOutcome>) -> AcceptOutcome {
        tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
            .await
            .expect("timed out waiting for accept")
            .expect("acceptor closed channel")
    }

    #[tokio::test]
    async fn second_client_waits_for_resume() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, mut outcomes) = mpsc::channel(1);
        let worker = AcceptWorker::spawn(Box::new(listener), tx, CancellationToken::new());

        let first = TcpStream::connect(addr).await.unwrap();
        let (conn, gate) = next(&mut outcomes).await.into_parts();
        assert_eq!(conn.unwrap().peer, first.local_addr().unwrap().to_string());

        let second = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(outcomes.try_recv().is_err());

        assert!(gate.resume());
        let (conn, _gate) = next(&mut outcomes).await.into_parts();
        assert_eq!(conn.unwrap().peer, second.local_addr().unwrap().to_string());

        worker.stop().await;
    }

    struct BrokenListener;

    #[async_trait]
    impl Listener for BrokenListener {
        async fn accept(&mut self) -> io::Result<Connection> {
            Err(io::Error::other("listener closed"))
        }
    }

    #[tokio::test]
    async fn accept_errors_are_reported_and_gate_dropped_ends_worker() {
        let (tx, mut outcomes) = mpsc::channel(1);
        let worker = AcceptWorker::spawn(Box::new(BrokenListener), tx, CancellationToken::new());

        let (result, gate) = next(&mut outcomes).await.into_parts();
        assert_eq!(result.unwrap_err().to_string(), "listener closed");
        drop(gate);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !worker.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("worker should exit");
    }
}
