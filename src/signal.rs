//! One-shot broadcast signals built on channel disconnection.
//!
//! Dropping the only sender of a flume channel wakes every receiver clone at
//! once, so a disconnected channel doubles as a broadcast-once flag: blocked
//! actors put the receiver in a `flume::Selector` arm and are woken the
//! moment the signal trips, and `is_disconnected` reads the flag without
//! blocking.

use std::sync::{Arc, Mutex, PoisonError};

use flume::{Receiver, Sender};

#[derive(Debug, Clone)]
struct Flag {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Flag {
    fn new() -> Flag {
        let (trigger, signal) = flume::bounded::<()>(1);

        Flag {
            trigger: Arc::new(Mutex::new(Some(trigger))),
            signal,
        }
    }

    fn trip(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_tripped(&self) -> bool {
        self.signal.is_disconnected()
    }
}

/// Cancellation token shared by a run and its sub-queries.
///
/// Clones observe the same signal. Once fired it stays fired.
#[derive(Debug, Clone)]
pub struct CancelToken(Flag);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken(Flag::new())
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.0.trip()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_tripped()
    }

    /// Receiver that disconnects when the token fires; usable as a
    /// `flume::Selector` arm.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.0.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}

/// One-shot latch marking that the initial self-query has completed.
///
/// Non-bootstrap runs wait on it before traversing the network, which keeps
/// them from racing an empty routing table at startup. The component driving
/// the self-lookup keeps a clone and calls [Gate::open] exactly once.
#[derive(Debug, Clone)]
pub struct Gate(Flag);

impl Gate {
    pub fn new() -> Gate {
        Gate(Flag::new())
    }

    /// Open the gate, waking everyone waiting on it. Idempotent.
    pub fn open(&self) {
        self.0.trip()
    }

    pub fn is_open(&self) -> bool {
        self.0.is_tripped()
    }

    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.0.signal
    }
}

impl Default for Gate {
    fn default() -> Self {
        Gate::new()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(!token.is_cancelled());

        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn cancel_wakes_a_blocked_receiver() {
        let token = CancelToken::new();

        let clone = token.clone();
        let handle = thread::spawn(move || {
            // Blocks until the token fires.
            let _ = clone.signal().recv();
        });

        thread::sleep(Duration::from_millis(50));
        token.cancel();

        handle.join().unwrap();
    }

    #[test]
    fn gate_opens_once() {
        let gate = Gate::new();
        let waiter = gate.clone();

        assert!(!gate.is_open());

        gate.open();

        assert!(waiter.is_open());
    }
}
