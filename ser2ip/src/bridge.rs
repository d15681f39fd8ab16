//! Bridge - the coordinator between the serial device and one TCP client.
//!
//! Flow:
//! 1. Spawn the serial read worker and the accept worker
//! 2. Run the event loop, handling one outcome at a time
//! 3. On an accept: install the client and spawn its read worker
//! 4. On a client error: close the client, allow the next accept
//! 5. On a serial error: close the client, return the fatal error
//!
//! Session state (active client, pending errors) lives only inside the event
//! loop. Nothing outside it can observe or change it except through the
//! published [`BridgeStatus`].

use std::num::NonZeroU64;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::channel::{ByteWriter, Listener, SerialChannel};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, SessionError};
use crate::session::ActiveConnection;
use crate::status::BridgeStatus;
use crate::worker::{AcceptGate, AcceptOutcome, AcceptWorker, ReadOutcome, ReadWorker, WorkerId};

pub struct Bridge {
    config: BridgeConfig,
    status_tx: watch::Sender<BridgeStatus>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let (status_tx, _) = watch::channel(BridgeStatus::default());
        Self { config, status_tx }
    }

    /// Subscribe to status snapshots.
    pub fn status(&self) -> watch::Receiver<BridgeStatus> {
        self.status_tx.subscribe()
    }

    /// Forward bytes until a fatal error or until `shutdown` is cancelled.
    ///
    /// Returns `Ok(())` only on shutdown. Every worker is stopped before this
    /// returns.
    pub async fn run(
        &self,
        serial: SerialChannel,
        listener: impl Listener,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        let workers = CancellationToken::new();
        let _stop_workers = workers.clone().drop_guard();

        let (serial_tx, serial_rx) = mpsc::channel(1);
        let (client_tx, client_rx) = mpsc::channel(1);
        let (accept_tx, accept_rx) = mpsc::channel(1);

        let serial_worker = ReadWorker::spawn(
            WorkerId::SERIAL,
            serial.reader,
            self.config.buffer_size,
            self.config.read_interval,
            serial_tx,
            workers.child_token(),
        );
        let accept_worker = AcceptWorker::spawn(Box::new(listener), accept_tx, workers.child_token());

        let mut event_loop = EventLoop {
            config: &self.config,
            status: &self.status_tx,
            serial_writer: serial.writer,
            client_tx,
            workers: workers.clone(),
            active: None,
            accept_gate: None,
            pending_serial: None,
            pending_session: None,
            next_client: NonZeroU64::MIN,
        };

        let result = event_loop
            .run(serial_rx, client_rx, accept_rx, shutdown)
            .await;

        serial_worker.stop().await;
        accept_worker.stop().await;
        tracing::info!("Bridge stopped");
        result
    }
}

struct EventLoop<'a> {
    config: &'a BridgeConfig,
    status: &'a watch::Sender<BridgeStatus>,
    serial_writer: Box<dyn ByteWriter>,
    /// Cloned into every client read worker.
    client_tx: mpsc::Sender<ReadOutcome>,
    workers: CancellationToken,
    active: Option<ActiveConnection>,
    /// Held while a client is attached; resuming it accepts the next one.
    accept_gate: Option<AcceptGate>,
    pending_serial: Option<BridgeError>,
    pending_session: Option<SessionError>,
    next_client: NonZeroU64,
}

impl EventLoop<'_> {
    async fn run(
        &mut self,
        mut serial_rx: mpsc::Receiver<ReadOutcome>,
        mut client_rx: mpsc::Receiver<ReadOutcome>,
        mut accept_rx: mpsc::Receiver<AcceptOutcome>,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested");
                    self.close_active("shutdown").await;
                    return Ok(());
                }

                outcome = serial_rx.recv() => match outcome {
                    Some(outcome) => self.on_serial_read(outcome).await,
                    None => return Err(BridgeError::internal("serial read worker stopped")),
                },

                Some(outcome) = client_rx.recv() => self.on_client_read(outcome).await,

                outcome = accept_rx.recv() => match outcome {
                    Some(outcome) => self.on_accept(outcome)?,
                    None => return Err(BridgeError::internal("accept worker stopped")),
                },
            }

            self.resolve_pending().await?;
        }
    }

    async fn on_serial_read(&mut self, mut outcome: ReadOutcome) {
        if let Some(e) = outcome.take_error() {
            self.pending_serial = Some(BridgeError::SerialRead(e));
            return;
        }

        let data = outcome.bytes().unwrap_or_default();
        if data.is_empty() {
            self.pending_serial = Some(BridgeError::SerialRead(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "serial port closed",
            )));
            return;
        }

        let n = data.len();
        match self.active.as_mut() {
            Some(conn) => {
                tracing::trace!(bytes = n, peer = %conn.peer(), "Serial -> client");
                match conn.send(data, self.config.client_write_timeout).await {
                    Ok(()) => self.status.send_modify(|s| s.bytes_to_client += n as u64),
                    Err(e) => self.pending_session = Some(e),
                }
            }
            None => {
                tracing::trace!(bytes = n, "No client attached, dropping serial data");
                self.status.send_modify(|s| s.serial_bytes_dropped += n as u64);
            }
        }

        // Serial reading never stalls, whatever happened to the client.
        outcome.resume();
    }

    async fn on_client_read(&mut self, mut outcome: ReadOutcome) {
        let Some(conn) = self
            .active
            .as_mut()
            .filter(|conn| conn.worker_id() == outcome.worker())
        else {
            tracing::debug!(worker = %outcome.worker(), "Discarding outcome from closed session");
            return;
        };

        if let Some(e) = outcome.take_error() {
            self.pending_session = Some(SessionError::Read(e));
            return;
        }

        let data = outcome.bytes().unwrap_or_default();
        if data.is_empty() {
            self.pending_session = Some(SessionError::Closed);
            return;
        }

        let n = data.len();
        tracing::trace!(bytes = n, peer = %conn.peer(), "Client -> serial");
        match self.serial_writer.write_all(data).await {
            Ok(()) => {
                conn.record_to_serial(n);
                self.status.send_modify(|s| s.bytes_to_serial += n as u64);
                outcome.resume();
            }
            // The client worker stays stalled; the session is about to be torn down.
            Err(e) => self.pending_serial = Some(BridgeError::SerialWrite(e)),
        }
    }

    fn on_accept(&mut self, outcome: AcceptOutcome) -> Result<(), BridgeError> {
        let (result, gate) = outcome.into_parts();
        let conn = result.map_err(BridgeError::Accept)?;
        debug_assert!(self.active.is_none(), "accept while a client is attached");

        let id = WorkerId::client(self.next_client);
        self.next_client = self.next_client.saturating_add(1);
        let worker = ReadWorker::spawn(
            id,
            conn.reader,
            self.config.buffer_size,
            self.config.read_interval,
            self.client_tx.clone(),
            self.workers.child_token(),
        );

        tracing::info!(peer = %conn.peer, "Client connected");
        self.status.send_modify(|s| {
            s.client = Some(conn.peer.clone());
            s.sessions += 1;
        });
        self.active = Some(ActiveConnection::new(conn.peer, conn.writer, worker));
        self.accept_gate = Some(gate);
        Ok(())
    }

    /// Apply pending errors after an event. Serial errors are always fatal.
    async fn resolve_pending(&mut self) -> Result<(), BridgeError> {
        if let Some(err) = self.pending_serial.take() {
            self.close_active("serial failure").await;
            return Err(err);
        }

        if let Some(err) = self.pending_session.take()
            && self.active.is_some()
        {
            self.close_active(&err.to_string()).await;
            if let Some(gate) = self.accept_gate.take() {
                gate.resume();
            }
        }

        Ok(())
    }

    async fn close_active(&mut self, reason: &str) {
        let Some(conn) = self.active.take() else {
            return;
        };

        let peer = conn.peer().to_string();
        let stats = conn.close(self.config.client_write_timeout).await;
        self.status.send_modify(|s| s.client = None);
        tracing::info!(
            %peer,
            reason,
            bytes_to_client = stats.bytes_to_client,
            bytes_to_serial = stats.bytes_to_serial,
            serial_bytes_dropped = self.status.borrow().serial_bytes_dropped,
            "Client disconnected"
        );
    }
}
