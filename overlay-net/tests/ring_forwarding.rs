//! Exercises `Network` the way an overlay actually will: each node's
//! endpoint either answers locally or forwards one hop around a ring.

use std::sync::Arc;

use overlay_core::identifier::{Identifier, NodeId};
use overlay_net::{HopScope, Network};

fn node(n: u64) -> NodeId {
    NodeId::new(Identifier::new(n))
}

#[test]
fn forwarding_around_a_three_node_ring_counts_one_hop_per_send() {
    let net: Arc<Network<u64, String>> = Arc::new(Network::new());
    let ring = [node(0), node(1), node(2)];

    for (i, &id) in ring.iter().enumerate() {
        let successor = ring[(i + 1) % ring.len()];
        let net_for_endpoint = net.clone();
        net.register(id, move |_from, target: u64| {
            if target == id.id().as_u64() {
                format!("owned by {id}")
            } else {
                net_for_endpoint.send(id, successor, target).unwrap()
            }
        });
    }

    let scope = HopScope::start();
    let result = net.send(node(0), node(1), 2).unwrap();
    assert_eq!(result, "owned by 2");
    // node(0) -> node(1) (miss, forwards) -> node(2) (owns it): two sends.
    assert_eq!(scope.hops(), 2);
}

#[test]
fn unknown_peer_is_reported_without_panicking() {
    let net: Network<u64, String> = Network::new();
    net.register(node(0), |_from, _req: u64| "ok".to_string());
    assert!(net.send(node(0), node(99), 1).is_err());
}
