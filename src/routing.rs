//! Collaborator traits supplied by the surrounding DHT.

use crate::common::{Id, PeerInfo};

/// Source of the initial candidate set for a lookup.
pub trait RoutingTable: Send + Sync {
    /// Known peers closest to `target`, closest first. May be empty, in
    /// which case a run completes immediately without yielding events.
    fn closest_peers(&self, target: &Id) -> Vec<PeerInfo>;
}

/// Dialability precondition for candidate peers.
///
/// An undialable peer fails fast as a
/// [QueryEvent::QueryError](crate::QueryEvent::QueryError) instead of
/// blocking its path.
pub trait ConnectionManager: Send + Sync {
    /// Whether `peer` can be dialed. Runs on the invocation's worker thread,
    /// so it may block on I/O.
    fn is_dialable(&self, peer: &Id) -> bool;
}
