//! Periodic peer-list exchange with dead-peer eviction
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{is_success, Request};
use crate::registry::{Peer, PeerRegistry, PeerSelector};
use crate::transport::PeerConnector;

const MIN_EXCHANGE_INTERVAL: Duration = Duration::from_secs(1);

/// What one gossip round did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipOutcome {
    /// The peer acknowledged our server list
    Exchanged(Peer),
    /// The peer failed to answer with success and was removed
    Evicted(Peer),
}

#[derive(Clone)]
pub struct GossipLoop {
    peers: PeerRegistry,
    connector: Arc<dyn PeerConnector>,
    selector: Arc<dyn PeerSelector>,
    interval: Duration,
}

impl std::fmt::Debug for GossipLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipLoop")
            .field("this_server", self.peers.this_server())
            .field("interval", &self.interval)
            .finish()
    }
}

impl GossipLoop {
    pub fn new(
        peers: PeerRegistry,
        connector: Arc<dyn PeerConnector>,
        selector: Arc<dyn PeerSelector>,
        interval: Duration,
    ) -> Self {
        Self {
            peers,
            connector,
            selector,
            interval: interval.max(MIN_EXCHANGE_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep one interval, exchange, repeat. Never returns.
    pub async fn run(self) {
        info!(
            "[{}] Starting gossip loop with {}s exchange interval",
            self.peers.this_server(),
            self.interval.as_secs()
        );
        let mut timer = time::interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut round: u64 = 0;

        loop {
            timer.tick().await;
            round += 1;
            if let Err(e) = self.exchange_round().await {
                warn!("Gossip round {} failed: {}", round, e);
            }
        }
    }

    /// Send the whole peer list to one randomly chosen other server.
    ///
    /// Any failure to get a success frame back evicts that server. Returns
    /// `None` when no other server is known.
    pub async fn exchange_round(&self) -> Result<Option<GossipOutcome>> {
        let Some((server_list, target)) = self.peers.select_for_exchange(self.selector.as_ref())?
        else {
            debug!("No peers to exchange with");
            return Ok(None);
        };
        let request = Request::Exchange { server_list }.to_json()?;

        let acknowledged = match self.connector.send_request(&target, &request).await {
            Ok(frames) => frames.first().is_some_and(|frame| is_success(frame)),
            Err(e) => {
                debug!("Exchange with {} failed: {}", target, e);
                false
            }
        };

        if acknowledged {
            debug!("Exchanged server list with {}", target);
            return Ok(Some(GossipOutcome::Exchanged(target)));
        }

        self.peers.remove(&target)?;
        info!("Evicted unresponsive peer {}", target);
        Ok(Some(GossipOutcome::Evicted(target)))
    }
}
