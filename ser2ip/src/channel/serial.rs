//! Serial device channel backed by the `serialport` crate.
//!
//! The driver is blocking, so every read and write runs on the tokio blocking
//! pool. The port is opened with a short timeout and reads retry on timeout:
//! an idle line is not an error. Dropping a reader or writer stops its retry
//! loop at the next timeout, which releases the port.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{DataBits, SerialPort, SerialPortInfo, SerialPortType};

use super::{ByteReader, ByteWriter, SerialChannel};
use crate::config::{Parity, SerialConfig, StopBits};
use crate::error::BridgeError;

/// Device timeout for a single blocking call.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Open and configure the serial device, split into read and write handles.
pub fn open_serial(config: &SerialConfig) -> Result<SerialChannel, BridgeError> {
    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(to_serialport_data_bits(config.data_bits))
        .parity(to_serialport_parity(config.parity))
        .stop_bits(to_serialport_stop_bits(config.stop_bits))
        .timeout(POLL_TIMEOUT)
        .open()
        .map_err(|e| BridgeError::serial_open(&config.port, e))?;

    let write_port = port
        .try_clone()
        .map_err(|e| BridgeError::serial_open(&config.port, e))?;

    tracing::info!(
        port = %config.port,
        settings = %config.line_settings(),
        "Opened serial port"
    );

    Ok(SerialChannel::new(
        SerialReader::new(port),
        SerialWriter::new(write_port),
    ))
}

/// Enumerate the serial ports the driver can see.
pub fn list_ports() -> Result<Vec<SerialPortInfo>, serialport::Error> {
    serialport::available_ports()
}

/// One-line description of a port for `--list-ports`.
pub fn describe_port(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut line = format!("{} (usb {:04x}:{:04x}", info.port_name, usb.vid, usb.pid);
            if let Some(product) = &usb.product {
                line.push(' ');
                line.push_str(product);
            }
            line.push(')');
            line
        }
        SerialPortType::BluetoothPort => format!("{} (bluetooth)", info.port_name),
        SerialPortType::PciPort => format!("{} (pci)", info.port_name),
        SerialPortType::Unknown => info.port_name.clone(),
    }
}

// ============================================================================
// Reader / Writer
// ============================================================================

pub struct SerialReader {
    port: Option<Box<dyn SerialPort>>,
    closed: Arc<AtomicBool>,
}

impl SerialReader {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port: Some(port),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl ByteReader for SerialReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut port = self.port.take().ok_or_else(port_unavailable)?;
        let closed = Arc::clone(&self.closed);
        let mut chunk = vec![0u8; buf.len()];

        let (port, chunk, result) = tokio::task::spawn_blocking(move || {
            let result = read_blocking(port.as_mut(), &mut chunk, &closed);
            (port, chunk, result)
        })
        .await
        .map_err(|e| io::Error::other(format!("serial read task failed: {e}")))?;

        self.port = Some(port);
        let n = result?;
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }
}

pub struct SerialWriter {
    port: Option<Box<dyn SerialPort>>,
    closed: Arc<AtomicBool>,
}

impl SerialWriter {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port: Some(port),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Drop for SerialWriter {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl ByteWriter for SerialWriter {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut port = self.port.take().ok_or_else(port_unavailable)?;
        let closed = Arc::clone(&self.closed);
        let data = data.to_vec();

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = write_blocking(port.as_mut(), &data, &closed);
            (port, result)
        })
        .await
        .map_err(|e| io::Error::other(format!("serial write task failed: {e}")))?;

        self.port = Some(port);
        result
    }
}

fn port_unavailable() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port unavailable")
}

fn read_blocking(
    port: &mut dyn SerialPort,
    buf: &mut [u8],
    closed: &AtomicBool,
) -> io::Result<usize> {
    loop {
        match port.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::Interrupted => {
                if closed.load(Ordering::Relaxed) {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "serial reader closed"));
                }
            }
            other => return other,
        }
    }
}

fn write_blocking(
    port: &mut dyn SerialPort,
    mut data: &[u8],
    closed: &AtomicBool,
) -> io::Result<()> {
    while !data.is_empty() {
        match port.write(data) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "serial port accepted no bytes",
                ));
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::Interrupted => {
                if closed.load(Ordering::Relaxed) {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "serial writer closed"));
                }
            }
            Err(e) => return Err(e),
        }
    }
    port.flush()
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert to the driver's parity. Mark and space parity are not offered by
/// the driver and fall back to even.
pub fn to_serialport_parity(p: Parity) -> serialport::Parity {
    match p {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
        Parity::Mark | Parity::Space => {
            tracing::warn!(parity = ?p, "Parity not supported by serial driver, using even");
            serialport::Parity::Even
        }
    }
}

pub fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert to the driver's stop bits. 1.5 is not offered and falls back to 1.
pub fn to_serialport_stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
        StopBits::OnePointFive => {
            tracing::warn!("1.5 stop bits not supported by serial driver, using 1");
            serialport::StopBits::One
        }
    }
}
