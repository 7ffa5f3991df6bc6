//! Per-path queue of candidate peers, ordered by distance to the lookup key.

use std::collections::VecDeque;

use crate::common::{Id, PeerInfo};

/// Not-yet-queried peers for one path, ascending by xor distance to the key,
/// stable on equal distances by discovery order.
///
/// Mutated only by its owning path runner.
#[derive(Debug)]
pub(crate) struct Frontier {
    key: Id,
    candidates: VecDeque<Candidate>,
}

#[derive(Debug)]
pub(crate) struct Candidate {
    /// Xor distance from the peer to the lookup key.
    pub distance: Id,
    pub info: PeerInfo,
}

impl Frontier {
    pub fn new(key: Id) -> Frontier {
        Frontier {
            key,
            candidates: VecDeque::new(),
        }
    }

    /// Queue a peer unless it is already queued. Returns whether it was added.
    pub fn insert(&mut self, info: PeerInfo) -> bool {
        if self.candidates.iter().any(|c| c.info.id == info.id) {
            return false;
        }

        let distance = info.id.xor(&self.key);
        let at = self.candidates.partition_point(|c| c.distance <= distance);
        self.candidates.insert(at, Candidate { distance, info });

        true
    }

    /// Dequeue the closest candidate.
    pub fn pop(&mut self) -> Option<Candidate> {
        self.candidates.pop_front()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ID_SIZE;

    fn peer(n: u8) -> PeerInfo {
        let mut bytes = [0u8; ID_SIZE];
        bytes[ID_SIZE - 1] = n;
        PeerInfo::new(Id(bytes))
    }

    #[test]
    fn pops_in_distance_order() {
        let mut frontier = Frontier::new(Id([0; ID_SIZE]));

        for n in [9u8, 3, 7, 1, 5] {
            frontier.insert(peer(n));
        }

        let order: Vec<u8> = std::iter::from_fn(|| frontier.pop())
            .map(|c| c.info.id.0[ID_SIZE - 1])
            .collect();

        assert_eq!(order, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn deduplicates_by_id() {
        let mut frontier = Frontier::new(Id([0; ID_SIZE]));

        assert!(frontier.insert(peer(4)));
        assert!(!frontier.insert(peer(4)));

        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn empty_after_draining() {
        let mut frontier = Frontier::new(Id([0; ID_SIZE]));

        frontier.insert(peer(2));
        frontier.pop();

        assert_eq!(frontier.len(), 0);
        assert!(frontier.pop().is_none());
    }
}
