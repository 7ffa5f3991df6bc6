//! Iterative lookup scheduling: the query manager, its per-run supervisor,
//! and the consumer-facing event sequence.

mod events;
mod frontier;
mod invoker;
mod path;

pub use events::{MessageKind, QueryContext, QueryEvent, QueryFunc, QueryReplies, QueryReply};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use flume::{Receiver, Selector, Sender};
use tracing::{debug, trace};

use crate::common::{Id, PeerInfo};
use crate::error::Error;
use crate::query::frontier::Frontier;
use crate::query::invoker::Invoker;
use crate::query::path::PathRunner;
use crate::routing::{ConnectionManager, RoutingTable};
use crate::signal::{CancelToken, Gate};

/// Default number of disjoint paths, `ceil(k / 2)` per the S/Kademlia paper.
pub const DEFAULT_DISJOINT_PATHS: usize = 10;

/// Default bound on concurrent outstanding queries per path.
pub const DEFAULT_ALPHA: usize = 3;

#[derive(Debug, Clone)]
/// Query manager configuration.
pub struct Config {
    /// How many independent lookup paths each run traverses.
    ///
    /// Defaults to [DEFAULT_DISJOINT_PATHS].
    pub disjoint_paths: usize,
    /// How many peer queries each path may have outstanding at once.
    ///
    /// Bounds the whole run at `disjoint_paths * alpha` outstanding
    /// operations. Defaults to [DEFAULT_ALPHA].
    pub alpha: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disjoint_paths: DEFAULT_DISJOINT_PATHS,
            alpha: DEFAULT_ALPHA,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Per-run options.
pub struct RunOptions {
    /// Caller-supplied cancellation; firing it terminates the sequence with
    /// [Error::Cancelled] and signals all outstanding sub-queries to stop.
    pub cancel: Option<CancelToken>,
    /// Timeout for a single invocation of the query capability. Expiry
    /// abandons only that peer's branch, the path continues.
    pub query_timeout: Option<Duration>,
    /// Marks the bootstrap self-lookup, which must not wait on the gate it
    /// is about to open.
    pub is_self_query: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NotStarted,
    Started,
    Stopped,
}

/// Runs iterative lookups: recursively queries peers that are progressively
/// closer to a target key, over several disjoint paths at once, streaming
/// events back to the caller as they settle.
///
/// The routing table, dialability check and per-peer query capability are
/// supplied by the surrounding DHT; the manager only schedules them.
pub struct QueryManager {
    our_id: Id,
    routing_table: Arc<dyn RoutingTable>,
    connection_manager: Arc<dyn ConnectionManager>,
    self_query_gate: Gate,
    disjoint_paths: usize,
    alpha: usize,
    state: Mutex<State>,
    shutdown: CancelToken,
}

impl QueryManager {
    pub fn new(
        our_id: Id,
        routing_table: Arc<dyn RoutingTable>,
        connection_manager: Arc<dyn ConnectionManager>,
        self_query_gate: Gate,
        config: Config,
    ) -> Self {
        Self {
            our_id,
            routing_table,
            connection_manager,
            self_query_gate,
            disjoint_paths: config.disjoint_paths.max(1),
            alpha: config.alpha.max(1),
            state: Mutex::new(State::NotStarted),
            shutdown: CancelToken::new(),
        }
    }

    // === Getters ===

    /// Number of disjoint paths every run traverses; callers can use it to
    /// reason about the expected maximum result cardinality.
    pub fn disjoint_paths(&self) -> usize {
        self.disjoint_paths
    }

    /// Bound on concurrent outstanding queries per path.
    pub fn alpha(&self) -> usize {
        self.alpha
    }

    // === Public Methods ===

    /// Accept queries. Idempotent.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if *state == State::NotStarted {
            *state = State::Started;
        }
    }

    /// Stop accepting queries and drain in-flight runs: their consumers
    /// observe the end of the sequence, never an error. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = State::Stopped;

        self.shutdown.cancel();
    }

    /// Run an iterative lookup for `key`, returning a lazy, single-use
    /// sequence of [QueryEvent]s.
    ///
    /// Events stream in as any path produces them. Per-peer failures arrive
    /// as [QueryEvent::QueryError] items; only run-level cancellation ends
    /// the sequence with an `Err`. Dropping the sequence before it ends
    /// cancels every sub-query the run still has in flight.
    pub fn run(&self, key: Id, query_fn: QueryFunc, options: RunOptions) -> QueryRun {
        let (events_tx, events_rx) = flume::unbounded();
        let run_token = CancelToken::new();

        if self.state() != State::Started {
            // Deliver the failure on the first pull, not here.
            let _ = events_tx.send(Err(Error::NotStarted));

            return QueryRun {
                events: events_rx,
                run_token,
            };
        }

        debug!(?key, paths = self.disjoint_paths, alpha = self.alpha, "Starting query");

        let supervisor = Supervisor {
            key,
            our_id: self.our_id,
            routing_table: self.routing_table.clone(),
            connection_manager: self.connection_manager.clone(),
            gate: self.self_query_gate.clone(),
            disjoint_paths: self.disjoint_paths,
            alpha: self.alpha,
            query_fn,
            options,
            events: events_tx,
            run_token: run_token.clone(),
            shutdown: self.shutdown.clone(),
        };

        thread::spawn(move || supervisor.run());

        QueryRun {
            events: events_rx,
            run_token,
        }
    }

    // === Private Methods ===

    fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one run: waits for the self-query gate, seeds the paths from the
/// routing table, and settles how the sequence ends.
struct Supervisor {
    key: Id,
    our_id: Id,
    routing_table: Arc<dyn RoutingTable>,
    connection_manager: Arc<dyn ConnectionManager>,
    gate: Gate,
    disjoint_paths: usize,
    alpha: usize,
    query_fn: QueryFunc,
    options: RunOptions,
    events: Sender<Result<QueryEvent, Error>>,
    run_token: CancelToken,
    shutdown: CancelToken,
}

impl Supervisor {
    fn run(self) {
        if !self.options.is_self_query && !self.wait_for_gate() {
            self.finish();
            return;
        }

        let initial = self.routing_table.closest_peers(&self.key);

        if initial.is_empty() {
            // Nothing to traverse; the sequence completes empty.
            debug!(key = ?self.key, "No initial peers for query");
            self.finish();
            return;
        }

        // Round-robin by ascending distance, so every path starts as near
        // the key as the seed set allows.
        let mut shares: Vec<Vec<PeerInfo>> = vec![Vec::new(); self.disjoint_paths];
        for (i, peer) in initial.into_iter().enumerate() {
            shares[i % self.disjoint_paths].push(peer);
        }

        let visited: Arc<Mutex<HashSet<Id>>> = Arc::new(Mutex::new(HashSet::new()));
        let mut paths = Vec::new();

        for (index, share) in shares.into_iter().enumerate() {
            if share.is_empty() {
                continue;
            }

            let mut frontier = Frontier::new(self.key);
            for peer in share {
                frontier.insert(peer);
            }

            let runner = PathRunner {
                index,
                our_id: self.our_id,
                alpha: self.alpha,
                frontier,
                invoker: Invoker {
                    key: self.key,
                    path: index,
                    num_paths: self.disjoint_paths,
                    query_fn: self.query_fn.clone(),
                    connection_manager: self.connection_manager.clone(),
                    query_timeout: self.options.query_timeout,
                },
                visited: visited.clone(),
                events: self.events.clone(),
                run_token: self.run_token.clone(),
                shutdown: self.shutdown.clone(),
                caller_token: self.options.cancel.clone(),
            };

            paths.push(thread::spawn(move || runner.run()));
        }

        for path in paths {
            let _ = path.join();
        }

        self.finish();
    }

    /// Wait until the initial self-query has completed. Returns false if the
    /// run should not proceed because it was cancelled or shut down while
    /// waiting.
    fn wait_for_gate(&self) -> bool {
        if self.gate.is_open() {
            return true;
        }

        trace!(key = ?self.key, "Waiting for initial self query");

        let mut selector = Selector::new()
            .recv(self.gate.signal(), |_| true)
            .recv(self.shutdown.signal(), |_| false)
            .recv(self.run_token.signal(), |_| false);

        if let Some(cancel) = &self.options.cancel {
            selector = selector.recv(cancel.signal(), |_| false);
        }

        selector.wait()
    }

    /// Settle the sequence: a cancelled run rejects with [Error::Cancelled],
    /// administrative shutdown and normal completion end it cleanly.
    fn finish(self) {
        let cancelled = self.run_token.is_cancelled()
            || self
                .options
                .cancel
                .as_ref()
                .map_or(false, |token| token.is_cancelled());

        if cancelled && !self.shutdown.is_cancelled() {
            let _ = self.events.send(Err(Error::Cancelled));
        }

        debug!(key = ?self.key, cancelled, "Query done");

        // Dropping self.events disconnects the sequence now that every path
        // runner's sender is gone.
    }
}

/// Lazy, single-use sequence of events for one run.
///
/// Yields each event as soon as any path produces it. Ends with
/// `Err(Error::Cancelled)` if the run was cancelled, or cleanly on
/// completion and on manager shutdown. Dropping it early cancels the whole
/// run, including every in-flight sub-query.
pub struct QueryRun {
    events: Receiver<Result<QueryEvent, Error>>,
    run_token: CancelToken,
}

impl Iterator for QueryRun {
    type Item = Result<QueryEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.recv().ok()
    }
}

impl Drop for QueryRun {
    fn drop(&mut self) {
        self.run_token.cancel();
    }
}
