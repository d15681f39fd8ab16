//! ser2ip: bridge a serial port to a single TCP client.

mod session;
mod status;

pub mod bridge;
pub mod channel;
pub mod config;
pub mod error;
pub mod worker;

use tokio_util::sync::CancellationToken;

pub use bridge::Bridge;
pub use channel::{SerialChannel, list_ports, open_serial};
pub use config::{BridgeConfig, Parity, SerialConfig, StopBits};
pub use error::{BridgeError, SessionError};
pub use status::{BridgeState, BridgeStatus, SessionStats};

/// Open the serial port, bind the listener and run the bridge until
/// `shutdown` is cancelled or a fatal error occurs.
///
/// Nothing is spawned if the serial port or the listener cannot be opened.
pub async fn serve(
    serial: &SerialConfig,
    config: BridgeConfig,
    shutdown: CancellationToken,
) -> Result<(), BridgeError> {
    let port = open_serial(serial)?;
    let listener = channel::bind_listener(&config).await?;

    Bridge::new(config).run(port, listener, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serve_fails_before_listening_when_serial_is_missing() {
        let serial = SerialConfig::new("/dev/ser2ip-does-not-exist");
        let config = BridgeConfig::new(0).with_bind_host("127.0.0.1");

        let err = serve(&serial, config, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_serial(), "got {err:?}");
        assert!(matches!(err, BridgeError::SerialOpen { .. }));
    }
}
