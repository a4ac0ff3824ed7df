//! Transport traits for outbound peer communication
//!
//! Relay and gossip talk to peers through [`PeerConnector`] so they can be
//! exercised without sockets.
use async_trait::async_trait;

use crate::error::Result;
use crate::registry::Peer;

/// One request/response exchange with another server
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Send `request` as a single frame to `peer` and collect every frame it
    /// answers with before closing the connection.
    ///
    /// Errors only when nothing could be read back; a peer that closes
    /// without answering yields an empty list.
    async fn send_request(&self, peer: &Peer, request: &str) -> Result<Vec<String>>;
}
