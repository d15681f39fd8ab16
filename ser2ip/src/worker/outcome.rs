//! Outcome records passed from workers to the bridge.
//!
//! Every outcome carries a one-shot resume gate. Consuming the outcome with
//! `resume()` grants exactly one further attempt; dropping it ends the worker.
//! A [`ReadOutcome`] also carries the worker's buffer, which travels back with
//! the resume, so the worker can never refill it while the bridge is reading.

use std::io;
use std::num::NonZeroU64;

use tokio::sync::oneshot;

use crate::channel::Connection;

/// Identifies the worker an outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// The serial-side reader.
    pub const SERIAL: WorkerId = WorkerId(0);

    /// A client-side reader. Client ids start at 1 so they never collide
    /// with [`WorkerId::SERIAL`].
    pub fn client(n: NonZeroU64) -> Self {
        Self(n.get())
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::SERIAL {
            write!(f, "serial")
        } else {
            write!(f, "client-{}", self.0)
        }
    }
}

/// Result of one read attempt.
#[derive(Debug)]
pub struct ReadOutcome {
    worker: WorkerId,
    buf: Vec<u8>,
    result: io::Result<usize>,
    resume: oneshot::Sender<Vec<u8>>,
}

impl ReadOutcome {
    pub(crate) fn new(
        worker: WorkerId,
        buf: Vec<u8>,
        result: io::Result<usize>,
        resume: oneshot::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            worker,
            buf,
            result,
            resume,
        }
    }

    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Bytes read, or `None` if the read failed.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self.result {
            Ok(n) => Some(&self.buf[..n]),
            Err(_) => None,
        }
    }

    /// Take the read error out, if there was one.
    pub fn take_error(&mut self) -> Option<io::Error> {
        match std::mem::replace(&mut self.result, Ok(0)) {
            Ok(n) => {
                self.result = Ok(n);
                None
            }
            Err(e) => Some(e),
        }
    }

    /// Hand the buffer back and let the worker read again.
    ///
    /// Returns false if the worker is already gone.
    pub fn resume(self) -> bool {
        self.resume.send(self.buf).is_ok()
    }
}

/// Result of one accept attempt.
#[derive(Debug)]
pub struct AcceptOutcome {
    result: io::Result<Connection>,
    gate: AcceptGate,
}

impl AcceptOutcome {
    pub(crate) fn new(result: io::Result<Connection>, resume: oneshot::Sender<()>) -> Self {
        Self {
            result,
            gate: AcceptGate(resume),
        }
    }

    pub fn into_parts(self) -> (io::Result<Connection>, AcceptGate) {
        (self.result, self.gate)
    }
}

/// Permission for the acceptor to take the next client.
#[derive(Debug)]
pub struct AcceptGate(oneshot::Sender<()>);

impl AcceptGate {
    pub fn resume(self) -> bool {
        self.0.send(()).is_ok()
    }
}
