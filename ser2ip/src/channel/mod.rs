//! Byte channels the bridge forwards between.
//!
//! The bridge only sees these traits:
//! - **ByteReader** / **ByteWriter**: one direction of a serial device or socket
//! - **Listener**: source of new TCP clients
//!
//! Concrete implementations live in `serial` (serialport crate) and `tcp`
//! (tokio sockets). Anything that is `AsyncRead`/`AsyncWrite` is a channel too,
//! which is what the tests use.

pub mod serial;
pub mod tcp;

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub use serial::{SerialReader, SerialWriter, list_ports, open_serial};
pub use tcp::bind_listener;

/// Read side of a channel.
#[async_trait]
pub trait ByteReader: Send + 'static {
    /// Read whatever is available into `buf`. `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Write side of a channel.
#[async_trait]
pub trait ByteWriter: Send + 'static {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Close the write direction. The default does nothing.
    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A freshly accepted client, already split into independently owned halves.
pub struct Connection {
    pub peer: String,
    pub reader: Box<dyn ByteReader>,
    pub writer: Box<dyn ByteWriter>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

/// Source of incoming clients.
#[async_trait]
pub trait Listener: Send + 'static {
    async fn accept(&mut self) -> io::Result<Connection>;
}

/// Both directions of the serial device.
pub struct SerialChannel {
    pub reader: Box<dyn ByteReader>,
    pub writer: Box<dyn ByteWriter>,
}

impl SerialChannel {
    pub fn new(reader: impl ByteReader, writer: impl ByteWriter) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

#[async_trait]
impl<R> ByteReader for R
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

#[async_trait]
impl<W> ByteWriter for W
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self, data).await?;
        AsyncWriteExt::flush(self).await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}
