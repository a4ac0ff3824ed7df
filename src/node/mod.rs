//! A running server: listener, command processor and gossip loop wired together
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

pub mod commands;
pub mod gossip;

use crate::error::{MagpieError, Result};
use crate::registry::{Peer, PeerRegistry, PeerSelector, RandomSelector, ResourceRegistry};
use crate::settings::Settings;
use crate::transport::{
    ConnectionHandler, ConnectionLimiter, PeerConnector, TcpConnector, TcpReceiver,
};
pub use commands::CommandProcessor;
pub use gossip::{GossipLoop, GossipOutcome};

/// A bound but not yet running server.
///
/// Binding happens first so the advertised identity carries the port
/// actually in use (relevant when binding port 0).
pub struct Node {
    receiver: TcpReceiver,
    gossip: GossipLoop,
    processor: Arc<CommandProcessor>,
}

impl Node {
    pub async fn bind(settings: Settings) -> Result<Self> {
        let connector = Arc::new(TcpConnector::new(settings.socket_timeout()));
        Self::bind_with(settings, connector, Arc::new(RandomSelector)).await
    }

    pub async fn bind_with(
        settings: Settings,
        connector: Arc<dyn PeerConnector>,
        selector: Arc<dyn PeerSelector>,
    ) -> Result<Self> {
        let bind_address = settings.bind_address()?;
        let listener = TcpListener::bind(bind_address).await.map_err(|e| {
            MagpieError::Transport(format!("Failed to bind {}: {}", bind_address, e))
        })?;
        let local_addr = listener.local_addr()?;

        let this_server = Peer::new(settings.advertised_hostname.clone(), local_addr.port());
        let peers = PeerRegistry::new(this_server);
        let processor = Arc::new(CommandProcessor::new(
            settings.secret.clone(),
            ResourceRegistry::new(),
            peers.clone(),
            Arc::clone(&connector),
        ));

        let handler = ConnectionHandler::new(Arc::clone(&processor), settings.socket_timeout());
        let limiter = ConnectionLimiter::new(settings.connection_interval());
        let receiver = TcpReceiver::new(listener, limiter, handler, settings.max_workers)?;
        let gossip = GossipLoop::new(peers, connector, selector, settings.exchange_interval());

        info!(
            "[{}] Bound to {} with {} workers",
            processor.peers().this_server(),
            local_addr,
            settings.max_workers
        );
        Ok(Self {
            receiver,
            gossip,
            processor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.receiver.local_addr()
    }

    pub fn this_server(&self) -> &Peer {
        self.processor.peers().this_server()
    }

    pub fn resources(&self) -> ResourceRegistry {
        self.processor.resources().clone()
    }

    pub fn peers(&self) -> PeerRegistry {
        self.processor.peers().clone()
    }

    pub fn processor(&self) -> Arc<CommandProcessor> {
        Arc::clone(&self.processor)
    }

    pub fn gossip(&self) -> &GossipLoop {
        &self.gossip
    }

    /// Serve connections and gossip until the task is dropped
    pub async fn run(self) {
        let Node {
            receiver, gossip, ..
        } = self;
        tokio::select! {
            _ = receiver.run() => {}
            _ = gossip.run() => {}
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
