//! Peer information discovered during a lookup.
use std::net::SocketAddr;

use crate::common::Id;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A peer as reported by other peers: its Id and any known addresses.
pub struct PeerInfo {
    pub id: Id,
    pub addresses: Vec<SocketAddr>,
}

impl PeerInfo {
    /// Creates a new PeerInfo with no known addresses.
    pub fn new(id: Id) -> PeerInfo {
        PeerInfo {
            id,
            addresses: Vec::new(),
        }
    }

    pub fn with_addresses(mut self, addresses: Vec<SocketAddr>) -> PeerInfo {
        self.addresses = addresses;
        self
    }
}
