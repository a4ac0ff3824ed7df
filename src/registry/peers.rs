//! Shared set of known servers
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexSet;
use rand::Rng;
use tracing::debug;

use super::resource::Peer;
use crate::concurrency_error;
use crate::error::Result;

/// Chooses an index in `0..len` for the next gossip target
pub trait PeerSelector: Send + Sync {
    fn select(&self, len: usize) -> usize;
}

/// Uniformly random peer selection
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelector;

impl PeerSelector for RandomSelector {
    fn select(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Known servers in insertion order, always including this server.
///
/// Clones share the same underlying set.
#[derive(Clone, Debug)]
pub struct PeerRegistry {
    this_server: Peer,
    peers: Arc<RwLock<IndexSet<Peer>>>,
}

impl PeerRegistry {
    pub fn new(this_server: Peer) -> Self {
        let mut peers = IndexSet::new();
        peers.insert(this_server.clone());
        Self {
            this_server,
            peers: Arc::new(RwLock::new(peers)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexSet<Peer>>> {
        self.peers
            .read()
            .map_err(|e| concurrency_error!("RwLock read fail {}", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexSet<Peer>>> {
        self.peers
            .write()
            .map_err(|e| concurrency_error!("RwLock write fail {}", e))
    }

    pub fn this_server(&self) -> &Peer {
        &self.this_server
    }

    /// Snapshot of every known server, this server included
    pub fn list(&self) -> Result<Vec<Peer>> {
        Ok(self.read()?.iter().cloned().collect())
    }

    /// Snapshot of every known server except this one
    pub fn others(&self) -> Result<Vec<Peer>> {
        Ok(self
            .read()?
            .iter()
            .filter(|peer| **peer != self.this_server)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    pub fn contains(&self, peer: &Peer) -> Result<bool> {
        Ok(self.read()?.contains(peer))
    }

    /// Add a peer unless it is already known or is this server
    pub fn add(&self, peer: Peer) -> Result<bool> {
        if peer == self.this_server {
            return Ok(false);
        }
        let added = self.write()?.insert(peer.clone());
        if added {
            debug!("Added peer {}", peer);
        }
        Ok(added)
    }

    /// Remove a peer. This server is never removed.
    pub fn remove(&self, peer: &Peer) -> Result<bool> {
        if *peer == self.this_server {
            return Ok(false);
        }
        let removed = self.write()?.shift_remove(peer);
        if removed {
            debug!("Removed peer {}", peer);
        }
        Ok(removed)
    }

    /// Snapshot the full registry and pick one gossip target among the other
    /// servers, both under the same guard. `None` when no other server is known.
    pub fn select_for_exchange(
        &self,
        selector: &dyn PeerSelector,
    ) -> Result<Option<(Vec<Peer>, Peer)>> {
        let peers = self.read()?;
        let candidates: Vec<&Peer> = peers
            .iter()
            .filter(|peer| **peer != self.this_server)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = selector.select(candidates.len()).min(candidates.len() - 1);
        let target = candidates[index].clone();
        Ok(Some((peers.iter().cloned().collect(), target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FirstSelector;

    impl PeerSelector for FirstSelector {
        fn select(&self, _len: usize) -> usize {
            0
        }
    }

    #[test]
    fn test_self_always_present() {
        let registry = PeerRegistry::new(Peer::new("me", 3000));
        assert_eq!(registry.len().unwrap(), 1);
        assert!(!registry.add(Peer::new("me", 3000)).unwrap());
        assert!(!registry.remove(&Peer::new("me", 3000)).unwrap());
        assert_eq!(registry.list().unwrap(), vec![Peer::new("me", 3000)]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let registry = PeerRegistry::new(Peer::new("me", 3000));
        assert!(registry.add(Peer::new("a", 1)).unwrap());
        assert!(!registry.add(Peer::new("a", 1)).unwrap());
        assert!(registry.add(Peer::new("a", 2)).unwrap());
        assert_eq!(registry.others().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_keeps_order() {
        let registry = PeerRegistry::new(Peer::new("me", 3000));
        registry.add(Peer::new("a", 1)).unwrap();
        registry.add(Peer::new("b", 1)).unwrap();
        registry.add(Peer::new("c", 1)).unwrap();

        assert!(registry.remove(&Peer::new("b", 1)).unwrap());
        let names: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|p| p.hostname)
            .collect();
        assert_eq!(names, vec!["me", "a", "c"]);
    }

    #[test]
    fn test_select_for_exchange_skips_self() {
        let registry = PeerRegistry::new(Peer::new("me", 3000));
        assert!(registry
            .select_for_exchange(&FirstSelector)
            .unwrap()
            .is_none());

        registry.add(Peer::new("a", 1)).unwrap();
        let (snapshot, target) = registry
            .select_for_exchange(&FirstSelector)
            .unwrap()
            .unwrap();
        assert_eq!(target, Peer::new("a", 1));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_random_selector_in_range() {
        for len in 1..10 {
            assert!(RandomSelector.select(len) < len);
        }
    }
}
