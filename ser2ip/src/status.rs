//! Observable bridge status.

use serde::Serialize;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeState {
    NoClient,
    HasClient,
}

/// Snapshot published by the bridge after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    /// Peer address of the active client, if any.
    pub client: Option<String>,
    /// Clients accepted since start.
    pub sessions: u64,
    pub bytes_to_client: u64,
    pub bytes_to_serial: u64,
    /// Serial bytes read while no client was attached.
    pub serial_bytes_dropped: u64,
}

impl BridgeStatus {
    pub fn state(&self) -> BridgeState {
        if self.client.is_some() {
            BridgeState::HasClient
        } else {
            BridgeState::NoClient
        }
    }
}

/// Per-client counters, reported when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub bytes_to_client: u64,
    pub bytes_to_serial: u64,
}
