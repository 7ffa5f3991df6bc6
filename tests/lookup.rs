//! End to end lookup over a simulated static network, exercising multiple
//! disjoint paths through the public API only.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use kad_lookup::{
    Bytes, Config, ConnectionManager, Gate, Id, MessageKind, PeerInfo, QueryContext, QueryEvent,
    QueryManager, QueryReplies, QueryReply, RoutingTable, RunOptions, ID_SIZE,
};

fn pid(n: u8) -> Id {
    let mut bytes = [0u8; ID_SIZE];
    bytes[ID_SIZE - 1] = n;
    Id(bytes)
}

struct StaticTable(Vec<PeerInfo>);

impl RoutingTable for StaticTable {
    fn closest_peers(&self, _target: &Id) -> Vec<PeerInfo> {
        self.0.clone()
    }
}

struct AlwaysDialable;

impl ConnectionManager for AlwaysDialable {
    fn is_dialable(&self, _peer: &Id) -> bool {
        true
    }
}

struct Network {
    closer: HashMap<Id, Vec<Id>>,
    values: HashMap<Id, Bytes>,
    visited: Mutex<Vec<Id>>,
}

impl Network {
    fn new(edges: &[(u8, &[u8])], values: &[(u8, &'static [u8])]) -> Arc<Self> {
        Arc::new(Self {
            closer: edges
                .iter()
                .map(|(from, to)| (pid(*from), to.iter().map(|n| pid(*n)).collect()))
                .collect(),
            values: values
                .iter()
                .map(|(at, value)| (pid(*at), Bytes::from_static(value)))
                .collect(),
            visited: Mutex::new(Vec::new()),
        })
    }

    fn query_fn(self: &Arc<Self>) -> kad_lookup::QueryFunc {
        let network = Arc::clone(self);

        Arc::new(move |ctx: QueryContext| -> QueryReplies {
            network.visited.lock().unwrap().push(ctx.peer);

            let closer: Vec<PeerInfo> = network
                .closer
                .get(&ctx.peer)
                .map(|ids| ids.iter().map(|id| PeerInfo::new(*id)).collect())
                .unwrap_or_default();

            let mut replies = vec![Ok(QueryReply::Peers {
                message_type: MessageKind::GetValue,
                closer,
                providers: Vec::new(),
            })];

            if let Some(value) = network.values.get(&ctx.peer) {
                replies.push(Ok(QueryReply::Value(value.clone())));
            }

            Box::new(replies.into_iter())
        })
    }
}

#[test]
fn multi_path_lookup_converges_on_the_value() {
    let network = Network::new(
        &[
            (30, &[24, 18]),
            (25, &[19, 12]),
            (20, &[15, 9]),
            (24, &[16]),
            (18, &[10]),
            (19, &[11]),
            (12, &[6]),
            (15, &[8]),
            (9, &[4]),
            (16, &[7]),
            (10, &[5]),
            (11, &[5]),
            (6, &[2]),
            (8, &[3]),
            (4, &[1]),
        ],
        &[(1, b"near"), (2, b"nearer")],
    );

    let seeds = vec![
        PeerInfo::new(pid(30)),
        PeerInfo::new(pid(25)),
        PeerInfo::new(pid(20)),
    ];

    let gate = Gate::new();
    gate.open();

    let manager = QueryManager::new(
        Id([0xff; ID_SIZE]),
        Arc::new(StaticTable(seeds)),
        Arc::new(AlwaysDialable),
        gate,
        Config {
            disjoint_paths: 3,
            alpha: 2,
        },
    );
    manager.start();

    let events: Vec<_> = manager
        .run(pid(0), network.query_fn(), RunOptions::default())
        .collect();

    // Every event settled, no run-level failure.
    let events: Vec<QueryEvent> = events
        .into_iter()
        .map(|event| event.expect("run should not be cancelled"))
        .collect();

    // Events are well formed for the configured paths.
    for event in &events {
        assert!(event.path() < 3);
        assert_eq!(event.num_paths(), 3);
    }

    // At least one value surfaced.
    assert!(events
        .iter()
        .any(|event| matches!(event, QueryEvent::Value { .. })));

    // No peer was queried twice, across all paths.
    let visited = network.visited.lock().unwrap().clone();
    let unique: HashSet<Id> = visited.iter().copied().collect();
    assert_eq!(unique.len(), visited.len());

    // Only peers the topology actually knows about were queried.
    let known: HashSet<Id> = network
        .closer
        .keys()
        .copied()
        .chain(network.closer.values().flatten().copied())
        .collect();
    assert!(visited.iter().all(|id| known.contains(id)));

    // Peer 5 is reported by both 10 and 11, possibly on different paths.
    assert_eq!(visited.iter().filter(|id| **id == pid(5)).count(), 1);
}
