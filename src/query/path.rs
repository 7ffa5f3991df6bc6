//! A single disjoint lookup path.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use flume::{Receiver, Selector, Sender};
use tracing::{debug, trace};

use crate::common::{Id, PeerInfo};
use crate::error::{Error, QueryFuncError};
use crate::query::events::{QueryEvent, QueryReply};
use crate::query::frontier::Frontier;
use crate::query::invoker::{Invocation, Invoker, WorkerReport};
use crate::signal::CancelToken;

/// What a blocked path runner can wake up to.
enum Wake {
    Report((u64, WorkerReport)),
    /// The earliest in-flight invocation deadline passed.
    Deadline,
    /// Run cancellation, caller cancellation, or manager shutdown.
    Stop,
}

/// Drives one disjoint path: dequeues frontier peers under the `alpha`
/// bound, folds discovered closer peers back in, and forwards every event to
/// the fan-in the moment it settles.
pub(crate) struct PathRunner {
    pub index: usize,
    pub our_id: Id,
    pub alpha: usize,
    pub frontier: Frontier,
    pub invoker: Invoker,
    /// Shared across all paths of the run; the check-and-insert at dequeue
    /// time is what makes visitation exactly-once run-wide.
    pub visited: Arc<Mutex<HashSet<Id>>>,
    pub events: Sender<Result<QueryEvent, Error>>,
    pub run_token: CancelToken,
    pub shutdown: CancelToken,
    pub caller_token: Option<CancelToken>,
}

impl PathRunner {
    pub fn run(mut self) {
        let (reports_tx, reports_rx) = flume::unbounded();
        let mut in_flight: HashMap<u64, Invocation> = HashMap::new();
        let mut next_slot: u64 = 0;

        loop {
            // Fill free slots with the closest unvisited candidates.
            while in_flight.len() < self.alpha {
                match self.next_candidate() {
                    Some(peer) => {
                        let invocation = self.invoker.dispatch(next_slot, peer, reports_tx.clone());
                        in_flight.insert(next_slot, invocation);
                        next_slot += 1;
                    }
                    None => break,
                }
            }

            if in_flight.is_empty() {
                // Nothing queued and nothing outstanding, the path is done.
                debug!(path = self.index, "Path exhausted");
                return;
            }

            match self.wait(&reports_rx, &in_flight) {
                Wake::Report((slot, report)) => {
                    // A report from a slot we already retired (timed out) is stale.
                    let (reporter, reporter_distance) = match in_flight.get(&slot) {
                        Some(invocation) => (invocation.peer.id, invocation.distance),
                        None => continue,
                    };

                    match report {
                        WorkerReport::Reply(QueryReply::Peers {
                            message_type,
                            closer,
                            providers,
                        }) => {
                            let event = QueryEvent::PeerResponse {
                                from: reporter,
                                message_type,
                                closer: closer.clone(),
                                providers,
                                path: self.index,
                                num_paths: self.invoker.num_paths,
                            };

                            if !self.emit(event) {
                                self.abandon(&in_flight);
                                return;
                            }

                            self.fold(closer, reporter_distance);
                        }
                        WorkerReport::Reply(QueryReply::Value(value)) => {
                            // A value does not end the path; only the consumer
                            // decides to stop pulling.
                            let event = QueryEvent::Value {
                                from: reporter,
                                value,
                                path: self.index,
                                num_paths: self.invoker.num_paths,
                            };

                            if !self.emit(event) {
                                self.abandon(&in_flight);
                                return;
                            }
                        }
                        WorkerReport::Failed(error) => {
                            in_flight.remove(&slot);

                            let event = QueryEvent::QueryError {
                                from: reporter,
                                error,
                                path: self.index,
                                num_paths: self.invoker.num_paths,
                            };

                            if !self.emit(event) {
                                self.abandon(&in_flight);
                                return;
                            }
                        }
                        WorkerReport::Done => {
                            in_flight.remove(&slot);
                        }
                    }
                }
                Wake::Deadline => {
                    if !self.expire(&mut in_flight) {
                        self.abandon(&in_flight);
                        return;
                    }
                }
                Wake::Stop => {
                    trace!(path = self.index, "Path stopping");
                    self.abandon(&in_flight);
                    return;
                }
            }
        }
    }

    /// Dequeue the closest frontier candidate no path has visited yet, and
    /// mark it visited so no other path (or later dequeue) redispatches it.
    fn next_candidate(&mut self) -> Option<PeerInfo> {
        while let Some(candidate) = self.frontier.pop() {
            let inserted = self
                .visited
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(candidate.info.id);

            if inserted {
                return Some(candidate.info);
            }

            trace!(peer = ?candidate.info.id, path = self.index, "Already queried in this run");
        }

        None
    }

    /// Block until a worker reports, a stop signal fires, or the earliest
    /// in-flight deadline passes.
    fn wait(
        &self,
        reports: &Receiver<(u64, WorkerReport)>,
        in_flight: &HashMap<u64, Invocation>,
    ) -> Wake {
        let deadline = in_flight.values().filter_map(|i| i.deadline).min();

        let mut selector = Selector::new()
            .recv(reports, |report| match report {
                Ok(report) => Wake::Report(report),
                Err(_) => Wake::Stop,
            })
            .recv(self.run_token.signal(), |_| Wake::Stop)
            .recv(self.shutdown.signal(), |_| Wake::Stop);

        if let Some(caller_token) = &self.caller_token {
            selector = selector.recv(caller_token.signal(), |_| Wake::Stop);
        }

        match deadline {
            Some(deadline) => selector.wait_deadline(deadline).unwrap_or(Wake::Deadline),
            None => selector.wait(),
        }
    }

    /// Fold closer peers into the frontier, keeping only peers that are not
    /// us, not globally visited, not already queued, and strictly closer to
    /// the key than the peer that reported them.
    fn fold(&mut self, closer: Vec<PeerInfo>, reporter_distance: Id) {
        for peer in closer {
            if peer.id == self.our_id {
                trace!(path = self.index, "Not querying ourselves");
                continue;
            }

            if peer.id.xor(&self.invoker.key) >= reporter_distance {
                trace!(peer = ?peer.id, path = self.index, "Skipping peer not closer than its reporter");
                continue;
            }

            let seen = self
                .visited
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&peer.id);

            if seen {
                trace!(peer = ?peer.id, path = self.index, "Already seen in query");
                continue;
            }

            if self.frontier.insert(peer) {
                trace!(path = self.index, queued = self.frontier.len(), "Queued closer peer");
            }
        }
    }

    /// Cancel and report every invocation past its deadline. Returns false
    /// if the consumer went away while emitting.
    fn expire(&mut self, in_flight: &mut HashMap<u64, Invocation>) -> bool {
        let now = Instant::now();
        let expired: Vec<u64> = in_flight
            .iter()
            .filter(|(_, invocation)| invocation.deadline.map_or(false, |d| d <= now))
            .map(|(slot, _)| *slot)
            .collect();

        for slot in expired {
            if let Some(invocation) = in_flight.remove(&slot) {
                invocation.token.cancel();
                debug!(peer = ?invocation.peer.id, path = self.index, "Peer query timed out");

                let event = QueryEvent::QueryError {
                    from: invocation.peer.id,
                    error: QueryFuncError::Timeout,
                    path: self.index,
                    num_paths: self.invoker.num_paths,
                };

                if !self.emit(event) {
                    return false;
                }
            }
        }

        true
    }

    /// Forward an event to the fan-in. Returns false if the consumer dropped
    /// the run.
    fn emit(&self, event: QueryEvent) -> bool {
        if self.events.send(Ok(event)).is_err() {
            self.run_token.cancel();
            return false;
        }

        true
    }

    /// Signal every in-flight invocation to stop, without waiting for the
    /// worker threads to tear down.
    fn abandon(&self, in_flight: &HashMap<u64, Invocation>) {
        for invocation in in_flight.values() {
            invocation.token.cancel();
        }
    }
}
