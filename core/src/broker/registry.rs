//! Live connection registry shared by the accept loop and the per-connection
//! supervisors.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use super::peer::{Peer, PeerId};

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerId, Arc<Peer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: Arc<Peer>) {
        debug!(peer = peer.id(), "Registering peer {}", peer.remote_addr());
        self.peers.insert(peer.id(), peer);
    }

    /// Remove a peer. Returns `None` if it was already removed, so exactly one
    /// caller gets to close it.
    pub fn unregister(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.peers.remove(&id).map(|(_, peer)| peer)
    }

    pub fn get(&self, id: PeerId) -> Option<Arc<Peer>> {
        self.peers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Remove and close every registered peer, returning how many were closed.
    pub async fn shutdown_all(&self) -> usize {
        let ids: Vec<PeerId> = self.peers.iter().map(|entry| *entry.key()).collect();
        let peers: Vec<Arc<Peer>> = ids.into_iter().filter_map(|id| self.unregister(id)).collect();
        let count = peers.len();

        let results = join_all(peers.iter().map(|peer| peer.close())).await;
        for (peer, result) in peers.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to close peer {}: {}", peer.remote_addr(), e);
            }
        }

        count
    }
}
