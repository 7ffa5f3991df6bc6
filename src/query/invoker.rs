//! Dispatches single-peer queries on worker threads and converts their
//! outcomes into reports for the owning path runner.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flume::Sender;
use tracing::{debug, trace};

use crate::common::{Id, PeerInfo};
use crate::error::QueryFuncError;
use crate::query::events::{QueryContext, QueryFunc};
use crate::query::events::QueryReply;
use crate::routing::ConnectionManager;
use crate::signal::CancelToken;

/// A single dispatched peer query, as tracked by its path runner.
#[derive(Debug)]
pub(crate) struct Invocation {
    pub peer: PeerInfo,
    /// Xor distance from the peer to the lookup key; reported closer peers
    /// must beat this to be folded into the frontier.
    pub distance: Id,
    /// The invocation's context token. The path runner cancels it on run
    /// cancellation, shutdown, or deadline expiry, so the context observably
    /// combines the run's cancellation with the per-invocation timer.
    pub token: CancelToken,
    pub deadline: Option<Instant>,
}

/// Report sent from a worker thread to its path runner.
#[derive(Debug)]
pub(crate) enum WorkerReport {
    /// The capability yielded a reply; more may follow.
    Reply(QueryReply),
    /// Terminal: the capability failed and the branch is abandoned.
    Failed(QueryFuncError),
    /// Terminal: the capability completed.
    Done,
}

/// Runs the caller-supplied capability against one peer at a time, each on
/// its own detached worker thread, and never lets a failure escape that
/// peer's branch.
pub(crate) struct Invoker {
    pub key: Id,
    pub path: usize,
    pub num_paths: usize,
    pub query_fn: QueryFunc,
    pub connection_manager: Arc<dyn ConnectionManager>,
    pub query_timeout: Option<Duration>,
}

impl Invoker {
    /// Dispatch a query to `peer`. Reports arrive on `reports` tagged with
    /// `slot`; the worker is detached so nothing waits on its teardown.
    pub fn dispatch(
        &self,
        slot: u64,
        peer: PeerInfo,
        reports: Sender<(u64, WorkerReport)>,
    ) -> Invocation {
        let token = CancelToken::new();
        let deadline = self.query_timeout.map(|timeout| Instant::now() + timeout);

        let ctx = QueryContext {
            key: self.key,
            peer: peer.id,
            token: token.clone(),
            path: self.path,
            num_paths: self.num_paths,
        };

        trace!(peer = ?peer.id, path = self.path, "Dispatching peer query");

        let query_fn = self.query_fn.clone();
        let connection_manager = self.connection_manager.clone();

        thread::spawn(move || worker(query_fn, connection_manager, ctx, slot, reports));

        Invocation {
            distance: peer.id.xor(&self.key),
            peer,
            token,
            deadline,
        }
    }
}

/// Pulls the capability's replies, forwarding each one as it settles.
fn worker(
    query_fn: QueryFunc,
    connection_manager: Arc<dyn ConnectionManager>,
    ctx: QueryContext,
    slot: u64,
    reports: Sender<(u64, WorkerReport)>,
) {
    if !connection_manager.is_dialable(&ctx.peer) {
        debug!(peer = ?ctx.peer, "Peer is not dialable");
        let _ = reports.send((slot, WorkerReport::Failed(QueryFuncError::Undialable)));
        return;
    }

    let forward = reports.clone();
    let peer = ctx.peer;

    let run = panic::catch_unwind(AssertUnwindSafe(move || {
        for reply in query_fn(ctx.clone()) {
            if ctx.token.is_cancelled() {
                return Ok(());
            }

            match reply {
                Ok(reply) => {
                    if forward.send((slot, WorkerReport::Reply(reply))).is_err() {
                        // The path runner is gone, stop pulling.
                        return Ok(());
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Ok(())
    }));

    let report = match run {
        Ok(Ok(())) => WorkerReport::Done,
        Ok(Err(error)) => {
            debug!(?peer, ?error, "Peer query failed");
            WorkerReport::Failed(error)
        }
        Err(_) => WorkerReport::Failed(QueryFuncError::Other(
            "query function panicked".to_string(),
        )),
    };

    let _ = reports.send((slot, report));
}
