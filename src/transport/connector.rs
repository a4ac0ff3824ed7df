//! TCP client side of the protocol
//!
//! Used for QUERY relay, gossip EXCHANGE and by anything acting as a client.
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::traits::PeerConnector;
use crate::error::Result;
use crate::{protocol_error, transport_error};
use crate::protocol::{is_success, read_bytes, read_frame, write_frame};
use crate::registry::{Peer, Resource};

/// Dials a fresh connection per request; connections are never reused
#[derive(Clone, Debug)]
pub struct TcpConnector {
    io_timeout: Duration,
}

/// Everything a FETCH returned
#[derive(Clone, Debug, Default)]
pub struct FetchedResource {
    /// Every text frame in order, description frame included
    pub frames: Vec<String>,
    /// The description frame, when the fetch succeeded
    pub resource: Option<Resource>,
    /// The raw file bytes
    pub bytes: Vec<u8>,
}

impl TcpConnector {
    pub fn new(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    async fn connect(&self, peer: &Peer) -> Result<TcpStream> {
        let target = peer.dial_target();
        match timeout(self.io_timeout, TcpStream::connect(&target)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(transport_error!("Failed to connect to {}: {}", peer, e)),
            Err(_) => Err(transport_error!("Connection timeout to {}", peer)),
        }
    }

    async fn read_remaining(&self, stream: &mut TcpStream, frames: &mut Vec<String>) -> Result<()> {
        loop {
            match read_frame(stream, self.io_timeout).await {
                Ok(Some(frame)) => {
                    debug!("Received: {}", frame);
                    frames.push(frame);
                }
                Ok(None) => return Ok(()),
                Err(e) if !frames.is_empty() => {
                    debug!("Stopped reading after {} frames: {}", frames.len(), e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Issue a FETCH and reassemble the file bytes using the advertised size
    pub async fn fetch(&self, peer: &Peer, request: &str) -> Result<FetchedResource> {
        let mut stream = self.connect(peer).await?;
        write_frame(&mut stream, request, self.io_timeout).await?;

        let mut fetched = FetchedResource::default();
        let first = match read_frame(&mut stream, self.io_timeout).await? {
            Some(frame) => frame,
            None => return Ok(fetched),
        };
        let succeeded = is_success(&first);
        fetched.frames.push(first);
        if !succeeded {
            return Ok(fetched);
        }

        let description = read_frame(&mut stream, self.io_timeout)
            .await?
            .ok_or_else(|| protocol_error!("Missing resource frame"))?;
        let resource = Resource::from_peer_frame(&description)
            .ok_or_else(|| protocol_error!("Bad resource frame: {}", description))?;
        fetched.frames.push(description);

        let size = resource.size.unwrap_or(0);
        fetched.bytes = read_bytes(&mut stream, size, self.io_timeout).await?;
        fetched.resource = Some(resource);

        self.read_remaining(&mut stream, &mut fetched.frames).await?;
        Ok(fetched)
    }
}

#[async_trait]
impl PeerConnector for TcpConnector {
    async fn send_request(&self, peer: &Peer, request: &str) -> Result<Vec<String>> {
        let mut stream = self.connect(peer).await?;
        debug!("Sending to {}: {}", peer, request);
        write_frame(&mut stream, request, self.io_timeout).await?;

        let mut frames = Vec::new();
        self.read_remaining(&mut stream, &mut frames).await?;
        Ok(frames)
    }
}
