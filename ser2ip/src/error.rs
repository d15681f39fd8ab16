//! Error classes for the bridge.
//!
//! Two classes exist and the coordinator is the only place that decides which
//! one an I/O failure belongs to:
//! - [`BridgeError`]: fatal. The bridge stops and the process exits.
//! - [`SessionError`]: scoped to the current TCP client. The client is dropped
//!   and a replacement is accepted.

use std::io;
use std::time::Duration;

/// Fatal errors. Any of these ends the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The serial device could not be opened or configured.
    #[error("can not open serial port {port}: {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// The TCP listener could not be created.
    #[error("can not listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The listener failed while accepting a client.
    #[error("can not accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("error reading from serial port: {0}")]
    SerialRead(#[source] io::Error),

    #[error("error writing to serial port: {0}")]
    SerialWrite(#[source] io::Error),

    /// A worker task went away without reporting an outcome.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn serial_open(port: impl Into<String>, source: serialport::Error) -> Self {
        Self::SerialOpen {
            port: port.into(),
            source,
        }
    }

    pub fn listen(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Listen {
            addr: addr.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for failures of the serial device itself (open, read, write).
    pub fn is_serial(&self) -> bool {
        matches!(
            self,
            Self::SerialOpen { .. } | Self::SerialRead(_) | Self::SerialWrite(_)
        )
    }
}

/// Errors that end the current client session only.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("client closed the connection")]
    Closed,

    #[error("error reading from client: {0}")]
    Read(#[source] io::Error),

    #[error("error writing to client: {0}")]
    Write(#[source] io::Error),

    #[error("client write did not complete within {0:?}")]
    WriteTimeout(Duration),
}
