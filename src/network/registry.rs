//! Live-connection registry
//!
//! The single authoritative view of "who am I connected to right now".
//! Every access is an atomic map operation; the registry is never iterated
//! from outside, so connection tasks and the session controller cannot
//! observe it mid-mutation.

use crate::network::PeerConnection;
use dashmap::DashMap;
use std::sync::Arc;

/// Mapping from friend username to its one live connection
#[derive(Default)]
pub struct PeerRegistry {
    peers: DashMap<String, Arc<PeerConnection>>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Register a connection unless the peer already has one
    ///
    /// Returns `true` if the connection was inserted. A username appears at
    /// most once; callers decide what to do with the losing connection.
    pub fn register(&self, conn: &Arc<PeerConnection>) -> bool {
        match self.peers.entry(conn.peer().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(conn));
                true
            }
        }
    }

    /// Look up the live connection for a peer
    pub fn get(&self, peer: &str) -> Option<Arc<PeerConnection>> {
        self.peers.get(peer).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove whatever connection is registered for a peer
    pub fn deregister(&self, peer: &str) -> Option<Arc<PeerConnection>> {
        self.peers.remove(peer).map(|(_, conn)| conn)
    }

    /// Remove a peer's entry only if it is this exact connection
    ///
    /// A router tearing down a replaced connection must not evict the
    /// replacement that now holds the slot, so removal is pointer-compared.
    pub fn deregister_if_same(&self, conn: &Arc<PeerConnection>) -> Option<Arc<PeerConnection>> {
        self.peers
            .remove_if(conn.peer(), |_, existing| Arc::ptr_eq(existing, conn))
            .map(|(_, removed)| removed)
    }

    /// Remove and return every registered connection
    pub fn drain(&self) -> Vec<Arc<PeerConnection>> {
        let names = self.peer_names();
        names
            .iter()
            .filter_map(|name| self.deregister(name))
            .collect()
    }

    /// Usernames of all currently connected peers
    pub fn peer_names(&self) -> Vec<String> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is connected
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    /// Build a real loopback connection wrapped as an inbound PeerConnection
    async fn loopback_conn(peer: &str) -> Arc<PeerConnection> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_client, accepted) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await });
        let (stream, peer_addr) = accepted.unwrap();
        let (conn, _read_half) = PeerConnection::accepted(peer.to_string(), stream, peer_addr);
        conn
    }

    #[tokio::test]
    async fn test_register_is_first_wins() {
        let registry = PeerRegistry::new();
        let first = loopback_conn("bob").await;
        let second = loopback_conn("bob").await;

        assert!(registry.register(&first));
        assert!(!registry.register(&second));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get("bob").unwrap(), &first));
    }

    #[tokio::test]
    async fn test_deregister_removes_entry() {
        let registry = PeerRegistry::new();
        let conn = loopback_conn("bob").await;

        registry.register(&conn);
        assert!(registry.deregister("bob").is_some());
        assert!(registry.deregister("bob").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_deregister_if_same_spares_replacement() {
        let registry = PeerRegistry::new();
        let stale = loopback_conn("bob").await;
        let replacement = loopback_conn("bob").await;

        registry.register(&replacement);

        // The stale connection's teardown must not evict the replacement
        assert!(registry.deregister_if_same(&stale).is_none());
        assert_eq!(registry.len(), 1);

        assert!(registry.deregister_if_same(&replacement).is_some());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = PeerRegistry::new();
        registry.register(&loopback_conn("bob").await);
        registry.register(&loopback_conn("carol").await);
        registry.register(&loopback_conn("dave").await);

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert!(registry.is_empty());
        assert!(registry.drain().is_empty());
    }

    #[tokio::test]
    async fn test_peer_names() {
        let registry = PeerRegistry::new();
        registry.register(&loopback_conn("bob").await);
        registry.register(&loopback_conn("carol").await);

        let mut names = registry.peer_names();
        names.sort();
        assert_eq!(names, vec!["bob", "carol"]);
    }
}
