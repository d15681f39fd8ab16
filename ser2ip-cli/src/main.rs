//! ser2ip command line entrypoint.
//!
//! Owns process setup only: argument parsing, logging, signal handling and the
//! exit code. The bridge itself lives in the `ser2ip` library.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ser2ip::channel::serial::describe_port;
use ser2ip::config::{
    DEFAULT_BAUD_RATE, DEFAULT_BIND_HOST, DEFAULT_BUFFER_SIZE, DEFAULT_SERIAL_PORT,
    DEFAULT_TCP_PORT, parse_duration,
};
use ser2ip::{BridgeConfig, Parity, SerialConfig, StopBits};

/// Bridge a serial port to a single TCP client.
#[derive(Parser, Debug)]
#[command(name = "ser2ip", author, version, about)]
struct Args {
    /// Serial device, e.g. COM2 or /dev/ttyUSB0.
    #[arg(long, env = "SER2IP_SERIAL_PORT", default_value = DEFAULT_SERIAL_PORT)]
    serial_port: String,

    #[arg(long, env = "SER2IP_BAUDRATE", default_value_t = DEFAULT_BAUD_RATE)]
    baudrate: u32,

    /// N, E, O, M or S. Mark and space fall back to even.
    #[arg(long, env = "SER2IP_PARITY", default_value = "E")]
    parity: String,

    /// 1, 15 (for 1.5) or 2.
    #[arg(long, env = "SER2IP_STOP_BITS", default_value_t = 1)]
    stop_bits: u8,

    #[arg(long, env = "SER2IP_DATA_BITS", default_value_t = 8)]
    data_bits: u8,

    #[arg(long, env = "SER2IP_TCP_PORT", default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,

    #[arg(long, env = "SER2IP_BIND", default_value = DEFAULT_BIND_HOST)]
    bind: String,

    /// Delay before each read on either side (e.g. 2s, 500ms).
    #[arg(long, env = "SER2IP_RESPONSE_INTERVAL", default_value = "2s", value_parser = parse_duration)]
    response_interval: Duration,

    /// Give up on a client that does not accept data within this time.
    #[arg(long, env = "SER2IP_CLIENT_WRITE_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    client_write_timeout: Duration,

    #[arg(long, env = "SER2IP_BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Print the available serial ports and exit.
    #[arg(long)]
    list_ports: bool,
}

impl Args {
    fn serial_config(&self) -> SerialConfig {
        SerialConfig::new(&self.serial_port)
            .with_baud_rate(self.baudrate)
            .with_data_bits(self.data_bits)
            .with_parity(Parity::from_flag(&self.parity))
            .with_stop_bits(StopBits::from_flag(self.stop_bits))
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig::new(self.tcp_port)
            .with_bind_host(&self.bind)
            .with_read_interval(self.response_interval)
            .with_client_write_timeout(self.client_write_timeout)
            .with_buffer_size(self.buffer_size)
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("SER2IP_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("ser2ip={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init();
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = ctrl_c => {
                res.context("failed to install Ctrl+C handler")?;
                tracing::info!("Received SIGINT, shutting down...");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to install Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

fn print_ports() -> anyhow::Result<()> {
    let ports = ser2ip::list_ports().context("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in &ports {
        println!("{}", describe_port(port));
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let serial = args.serial_config();
    let bridge = args.bridge_config();

    tracing::info!(
        serial = %serde_json::to_string(&serial)?,
        listen = %bridge.listen_addr(),
        interval = ?bridge.read_interval,
        "Starting ser2ip"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            tracing::error!(error = %e, "Signal handling failed");
        }
        signal_token.cancel();
    });

    ser2ip::serve(&serial, bridge, shutdown)
        .await
        .context("bridge stopped")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    let result = if args.list_ports {
        print_ports()
    } else {
        run(args).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            ExitCode::FAILURE
        }
    }
}
