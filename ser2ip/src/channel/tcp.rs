//! TCP side of the bridge.

use std::io;

use async_trait::async_trait;
use tokio::net::TcpListener;

use super::{Connection, Listener};
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Bind the client listener on `bind_host:tcp_port`.
pub async fn bind_listener(config: &BridgeConfig) -> Result<TcpListener, BridgeError> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::listen(&addr, e))?;

    let actual_addr = listener
        .local_addr()
        .map_err(|e| BridgeError::listen(&addr, e))?;
    tracing::info!(addr = %actual_addr, "Listening for TCP clients");

    Ok(listener)
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&mut self) -> io::Result<Connection> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        Ok(Connection {
            peer: peer.to_string(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}
