//! Events produced while traversing the network, and the query capability
//! surface they come from.

use std::sync::Arc;

use bytes::Bytes;

use crate::common::{Id, PeerInfo};
use crate::error::QueryFuncError;
use crate::signal::CancelToken;

/// The DHT message kind a peer responded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Ping,
    FindNode,
    GetValue,
    PutValue,
    GetProviders,
    AddProvider,
}

/// One outcome of querying a single peer.
///
/// The set is closed on purpose; consumers are expected to match
/// exhaustively. Every event carries the producing peer, its path index in
/// `[0, num_paths)`, and the run's configured disjoint-path count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryEvent {
    /// The peer responded, possibly with closer peers and provider records.
    PeerResponse {
        from: Id,
        message_type: MessageKind,
        closer: Vec<PeerInfo>,
        providers: Vec<PeerInfo>,
        path: usize,
        num_paths: usize,
    },
    /// The peer returned a record value.
    Value {
        from: Id,
        value: Bytes,
        path: usize,
        num_paths: usize,
    },
    /// The peer's query failed, timed out, or the peer was not dialable.
    /// Local to that peer; sibling queries and paths keep going.
    QueryError {
        from: Id,
        error: QueryFuncError,
        path: usize,
        num_paths: usize,
    },
}

impl QueryEvent {
    /// The peer this event was produced from.
    pub fn from_peer(&self) -> &Id {
        match self {
            QueryEvent::PeerResponse { from, .. } => from,
            QueryEvent::Value { from, .. } => from,
            QueryEvent::QueryError { from, .. } => from,
        }
    }

    /// Index of the disjoint path that produced this event.
    pub fn path(&self) -> usize {
        match self {
            QueryEvent::PeerResponse { path, .. } => *path,
            QueryEvent::Value { path, .. } => *path,
            QueryEvent::QueryError { path, .. } => *path,
        }
    }

    /// The run's configured disjoint-path count.
    pub fn num_paths(&self) -> usize {
        match self {
            QueryEvent::PeerResponse { num_paths, .. } => *num_paths,
            QueryEvent::Value { num_paths, .. } => *num_paths,
            QueryEvent::QueryError { num_paths, .. } => *num_paths,
        }
    }
}

/// Context handed to the query capability for one peer invocation.
///
/// Owned by that invocation and discarded when it completes.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// What we are trying to find.
    pub key: Id,
    /// The peer being queried.
    pub peer: Id,
    /// Fires when the run is cancelled, the invocation times out, or the
    /// consumer walks away from the sequence.
    pub token: CancelToken,
    /// Index of the disjoint path this invocation belongs to.
    pub path: usize,
    /// The run's configured disjoint-path count.
    pub num_paths: usize,
}

/// What a query capability yields for one peer.
///
/// The invoker stamps `from`, `path` and `num_paths` when turning replies
/// into [QueryEvent]s.
#[derive(Debug, Clone)]
pub enum QueryReply {
    /// Closer peers (and possibly provider records) for the key.
    Peers {
        message_type: MessageKind,
        closer: Vec<PeerInfo>,
        providers: Vec<PeerInfo>,
    },
    /// A record value for the key.
    Value(Bytes),
}

/// Lazy reply sequence returned by a [QueryFunc] for one peer.
pub type QueryReplies = Box<dyn Iterator<Item = Result<QueryReply, QueryFuncError>> + Send>;

/// Caller-supplied per-peer query capability.
///
/// May perform arbitrary I/O and yield zero, one, or many replies for one
/// peer (e.g. closer peers and a value). Each invocation runs on a dedicated
/// worker thread; well-behaved implementations check `ctx.token` between
/// blocking operations. Retry policy belongs to the capability, the
/// scheduler never retries.
pub type QueryFunc = Arc<dyn Fn(QueryContext) -> QueryReplies + Send + Sync>;
