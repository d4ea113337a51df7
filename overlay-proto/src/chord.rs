//! Chord overlay: an `m`-bit ring, successor lists, and a finger table per
//! node.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use overlay_core::error::{OverlayError, Result};
use overlay_core::hash::{normalize_key, KeyHasher};
use overlay_core::identifier::{Identifier, KeyId, NodeId, Width};
use overlay_core::record::Record;
use overlay_index::LocalIndex;
use overlay_net::{HopScope, Network};

use crate::api::{OpResult, OperationApi};
use crate::config::OverlayConfig;
use crate::message::FindOwnerRequest;

struct ChordNodeState {
    successor_list: Vec<NodeId>,
    predecessor: NodeId,
    fingers: Vec<NodeId>,
    index: Mutex<LocalIndex<Record>>,
}

struct ChordTopology {
    ring: Vec<NodeId>,
    nodes: BTreeMap<NodeId, ChordNodeState>,
}

/// Smallest ring member strictly greater than `target`, wrapping
/// greater than `target`, modulo `2^m`. `ring` must be sorted and non-empty.
fn successor_of(ring: &[NodeId], target: Identifier) -> NodeId {
    match ring.binary_search_by(|n| n.id().as_u64().cmp(&target.as_u64())) {
        Ok(i) => ring[(i + 1) % ring.len()],
        Err(i) => ring[i % ring.len()],
    }
}

fn rebuild_topology(
    ring: Vec<NodeId>,
    config: &OverlayConfig,
    mut reuse: BTreeMap<NodeId, LocalIndex<Record>>,
) -> ChordTopology {
    let n = ring.len();
    let mut nodes = BTreeMap::new();
    for (i, &id) in ring.iter().enumerate() {
        let successor_list = (1..=config.r.min(n))
            .map(|off| ring[(i + off) % n])
            .collect();
        let predecessor = ring[(i + n - 1) % n];
        let fingers = (0..config.m)
            .map(|k| successor_of(&ring, id.id().add_pow2(k, config.m)))
            .collect();
        let index = reuse
            .remove(&id)
            .unwrap_or_else(|| LocalIndex::new(config.t));
        nodes.insert(
            id,
            ChordNodeState { successor_list, predecessor, fingers, index: Mutex::new(index) },
        );
    }
    ChordTopology { ring, nodes }
}

enum RouteDecision {
    Owner(NodeId),
    Forward(NodeId),
}

fn decide(topology: &ChordTopology, m: Width, current: NodeId, key_id: KeyId) -> RouteDecision {
    let node = topology.nodes.get(&current).expect("current is a live node");
    let succ = node.successor_list[0];
    if key_id.id().in_open_closed_range(current.id(), succ.id(), m) {
        return RouteDecision::Owner(succ);
    }
    for finger in node.fingers.iter().rev() {
        if finger.id().in_open_open_range(current.id(), key_id.id(), m) {
            return RouteDecision::Forward(*finger);
        }
    }
    RouteDecision::Forward(succ)
}

/// `ChordOverlay<H>`: shared, thread-safe overlay state plus the
/// `Network` every node's routing endpoint forwards through. Cloning is
/// cheap (`Arc` handles throughout) and all clones see the same topology.
pub struct ChordOverlay<H: KeyHasher> {
    config: OverlayConfig,
    hasher: Arc<H>,
    network: Arc<Network<FindOwnerRequest, NodeId>>,
    topology: Arc<RwLock<ChordTopology>>,
}

impl<H: KeyHasher> fmt::Debug for ChordOverlay<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChordOverlay").finish_non_exhaustive()
    }
}

impl<H: KeyHasher + 'static> Clone for ChordOverlay<H> {
    fn clone(&self) -> Self {
        ChordOverlay {
            config: self.config,
            hasher: self.hasher.clone(),
            network: self.network.clone(),
            topology: self.topology.clone(),
        }
    }
}

impl<H: KeyHasher + 'static> ChordOverlay<H> {
    /// `build(node_ids)`: constructs the ring, successor lists and finger
    /// tables, and registers every node's routing endpoint.
    pub fn build(config: OverlayConfig, hasher: H, mut node_ids: Vec<NodeId>) -> Result<Self> {
        config.validate().map_err(OverlayError::InvalidConfig)?;
        node_ids.sort();
        node_ids.dedup();
        let topology = rebuild_topology(node_ids, &config, BTreeMap::new());
        let overlay = ChordOverlay {
            config,
            hasher: Arc::new(hasher),
            network: Arc::new(Network::new()),
            topology: Arc::new(RwLock::new(topology)),
        };
        overlay.register_all();
        Ok(overlay)
    }

    fn register_all(&self) {
        let ring: Vec<NodeId> = self.topology.read().unwrap().ring.clone();
        for id in ring {
            self.register_endpoint(id);
        }
    }

    fn register_endpoint(&self, id: NodeId) {
        let topology = self.topology.clone();
        let network = self.network.clone();
        let m = self.config.m;
        self.network.register(id, move |_from, req: FindOwnerRequest| {
            let decision = {
                let topo = topology.read().unwrap();
                decide(&topo, m, id, req.key_id)
            };
            match decision {
                RouteDecision::Owner(owner) => owner,
                RouteDecision::Forward(next) => network
                    .send(id, next, req)
                    .expect("forwarding target is always a live, registered node"),
            }
        });
    }

    /// Resolve `key_id`'s owner starting from an arbitrary live seed node,
    /// counting hops on the calling thread.
    pub fn find_owner(&self, key_id: KeyId) -> Result<(NodeId, u32)> {
        let seed = {
            let topo = self.topology.read().unwrap();
            *topo.ring.first().ok_or(OverlayError::EmptyOverlayForbidden)?
        };
        let scope = HopScope::start();
        let decision = {
            let topo = self.topology.read().unwrap();
            decide(&topo, self.config.m, seed, key_id)
        };
        let owner = match decision {
            RouteDecision::Owner(owner) => owner,
            RouteDecision::Forward(next) => self.network.send(seed, next, FindOwnerRequest::new(key_id))?,
        };
        Ok((owner, scope.hops()))
    }

    fn key_id(&self, key: &str) -> KeyId {
        self.hasher.hash(&normalize_key(key))
    }
}

impl<H: KeyHasher + 'static> OperationApi for ChordOverlay<H> {
    fn insert(&self, key: &str, value: Record) -> Result<OpResult<()>> {
        let (owner, hops) = self.find_owner(self.key_id(key))?;
        let topo = self.topology.read().unwrap();
        let node = topo.nodes.get(&owner).expect("resolved owner is live");
        node.index.lock().unwrap().insert(key, value);
        Ok(OpResult::new((), hops, owner))
    }

    fn lookup(&self, key: &str) -> Result<OpResult<Option<Vec<Record>>>> {
        let (owner, hops) = self.find_owner(self.key_id(key))?;
        let topo = self.topology.read().unwrap();
        let node = topo.nodes.get(&owner).expect("resolved owner is live");
        let values = node.index.lock().unwrap().lookup(key).map(|s| s.to_vec());
        Ok(OpResult::new(values, hops, owner))
    }

    fn delete(&self, key: &str) -> Result<OpResult<bool>> {
        let (owner, hops) = self.find_owner(self.key_id(key))?;
        let topo = self.topology.read().unwrap();
        let node = topo.nodes.get(&owner).expect("resolved owner is live");
        let removed = node.index.lock().unwrap().delete(key);
        Ok(OpResult::new(removed, hops, owner))
    }

    fn update(&self, key: &str, value: Record) -> Result<OpResult<bool>> {
        let (owner, hops) = self.find_owner(self.key_id(key))?;
        let topo = self.topology.read().unwrap();
        let node = topo.nodes.get(&owner).expect("resolved owner is live");
        let updated = node.index.lock().unwrap().update(key, value);
        Ok(OpResult::new(updated, hops, owner))
    }

    fn join(&self, new_id: NodeId) -> Result<OpResult<()>> {
        let mut topo = self.topology.write().unwrap();
        if topo.nodes.contains_key(&new_id) {
            return Err(OverlayError::DuplicateId(new_id));
        }
        let seed = *topo.ring.first().ok_or(OverlayError::EmptyOverlayForbidden)?;
        let scope = HopScope::start();
        let new_successor = match decide(&topo, self.config.m, seed, KeyId(new_id.id())) {
            RouteDecision::Owner(owner) => owner,
            RouteDecision::Forward(next) => {
                drop(topo);
                let owner = self.network.send(seed, next, FindOwnerRequest::new(KeyId(new_id.id())))?;
                topo = self.topology.write().unwrap();
                owner
            }
        };
        let hops = scope.hops();
        let new_predecessor = topo.nodes.get(&new_successor).expect("live").predecessor;

        let mut new_ring = topo.ring.clone();
        new_ring.push(new_id);
        new_ring.sort();

        let mut reuse: BTreeMap<NodeId, LocalIndex<Record>> = BTreeMap::new();
        for (id, state) in std::mem::take(&mut topo.nodes) {
            reuse.insert(id, state.index.into_inner().unwrap());
        }

        let mut new_index = LocalIndex::new(self.config.t);
        if let Some(successor_index) = reuse.get_mut(&new_successor) {
            let moved_keys: Vec<String> = successor_index
                .scan()
                .filter(|(k, _)| {
                    let key_id = self.hasher.hash(k);
                    key_id.id().in_open_closed_range(new_predecessor.id(), new_id.id(), self.config.m)
                })
                .map(|(k, _)| k.to_string())
                .collect();
            for k in moved_keys {
                if let Some(values) = successor_index.lookup(&k).map(|s| s.to_vec()) {
                    for v in values {
                        new_index.insert(&k, v);
                    }
                    successor_index.delete(&k);
                }
            }
        }
        reuse.insert(new_id, new_index);

        *topo = rebuild_topology(new_ring, &self.config, reuse);
        drop(topo);
        self.register_endpoint(new_id);

        Ok(OpResult::new((), hops, new_id))
    }

    fn leave(&self, id: NodeId) -> Result<OpResult<()>> {
        let mut topo = self.topology.write().unwrap();
        if !topo.nodes.contains_key(&id) {
            return Err(OverlayError::UnknownNode(id));
        }
        if topo.ring.len() <= 1 {
            return Err(OverlayError::EmptyOverlayForbidden);
        }
        let successor = topo.nodes.get(&id).unwrap().successor_list[0];
        let new_ring: Vec<NodeId> = topo.ring.iter().copied().filter(|&n| n != id).collect();

        let mut reuse: BTreeMap<NodeId, LocalIndex<Record>> = BTreeMap::new();
        for (node_id, state) in std::mem::take(&mut topo.nodes) {
            reuse.insert(node_id, state.index.into_inner().unwrap());
        }
        if let Some(departing) = reuse.remove(&id) {
            let entries: Vec<(String, Vec<Record>)> = departing
                .scan()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect();
            if let Some(successor_index) = reuse.get_mut(&successor) {
                for (k, values) in entries {
                    for v in values {
                        successor_index.insert(&k, v);
                    }
                }
            }
        }

        *topo = rebuild_topology(new_ring, &self.config, reuse);
        self.network.unregister(id);

        Ok(OpResult::new((), 0, id))
    }

    fn node_count(&self) -> usize {
        self.topology.read().unwrap().ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::hash::FixedHasher;

    fn ring_config() -> OverlayConfig {
        OverlayConfig { m: 16, b: 4, l: 4, r: 4, t: 4 }
    }

    fn node(n: u64) -> NodeId {
        NodeId::new(Identifier::new(n))
    }

    fn s1_overlay() -> ChordOverlay<FixedHasher> {
        let hasher = FixedHasher::new(16, [("alpha", 12345), ("bravo", 55000)]);
        ChordOverlay::build(
            ring_config(),
            hasher,
            vec![node(100), node(20000), node(40000), node(60000)],
        )
        .unwrap()
    }

    #[test]
    fn build_rejects_an_invalid_config_instead_of_panicking() {
        let bad = OverlayConfig { r: 0, ..ring_config() };
        let hasher = FixedHasher::new(16, Vec::<(&str, u64)>::new());
        let err = ChordOverlay::build(bad, hasher, vec![node(1), node(2)]).unwrap_err();
        assert!(matches!(err, OverlayError::InvalidConfig(_)));
    }

    #[test]
    fn s1_places_alpha_and_bravo_per_successor_rule() {
        let overlay = s1_overlay();
        overlay.insert("alpha", Record::new().with("id", 1i64)).unwrap();
        overlay.insert("bravo", Record::new().with("id", 2i64)).unwrap();

        let alpha = overlay.lookup("alpha").unwrap();
        assert_eq!(alpha.owner, node(20000));
        let bravo = overlay.lookup("bravo").unwrap();
        assert_eq!(bravo.owner, node(100));
    }

    #[test]
    fn s2_lookup_from_far_node_hops_in_expected_range() {
        let overlay = s1_overlay();
        overlay.insert("alpha", Record::new().with("id", 1i64)).unwrap();
        let result = overlay.lookup("alpha").unwrap();
        assert_eq!(result.value, Some(vec![Record::new().with("id", 1i64)]));
        assert!((1..=4).contains(&result.hops));
    }

    #[test]
    fn s3_update_then_lookup_returns_singleton_list() {
        let overlay = s1_overlay();
        overlay.insert("alpha", Record::new().with("id", 1i64)).unwrap();
        overlay.update("alpha", Record::new().with("id", 9i64)).unwrap();
        let result = overlay.lookup("alpha").unwrap();
        assert_eq!(result.value, Some(vec![Record::new().with("id", 9i64)]));
    }

    #[test]
    fn s4_delete_of_absent_key_returns_false() {
        let overlay = s1_overlay();
        let result = overlay.delete("charlie").unwrap();
        assert!(!result.value);
    }

    #[test]
    fn s5_join_preserves_alpha_ownership() {
        let overlay = s1_overlay();
        overlay.insert("alpha", Record::new().with("id", 1i64)).unwrap();
        overlay.join(node(30000)).unwrap();
        let result = overlay.lookup("alpha").unwrap();
        assert_eq!(result.owner, node(20000));
        assert_eq!(result.value, Some(vec![Record::new().with("id", 1i64)]));
        assert_eq!(overlay.node_count(), 5);
    }

    #[test]
    fn s6_leave_reassigns_alpha_to_new_owner() {
        let overlay = s1_overlay();
        overlay.insert("alpha", Record::new().with("id", 1i64)).unwrap();
        overlay.join(node(30000)).unwrap();
        overlay.leave(node(20000)).unwrap();
        let result = overlay.lookup("alpha").unwrap();
        assert_eq!(result.owner, node(30000));
        assert_eq!(result.value, Some(vec![Record::new().with("id", 1i64)]));
    }

    #[test]
    fn join_of_existing_id_fails() {
        let overlay = s1_overlay();
        assert_eq!(overlay.join(node(100)).unwrap_err(), OverlayError::DuplicateId(node(100)));
    }

    #[test]
    fn leave_of_unknown_id_fails() {
        let overlay = s1_overlay();
        assert_eq!(overlay.leave(node(1)).unwrap_err(), OverlayError::UnknownNode(node(1)));
    }

    #[test]
    fn leave_down_to_one_node_is_rejected() {
        let hasher = FixedHasher::new(16, Vec::<(&str, u64)>::new());
        let overlay = ChordOverlay::build(ring_config(), hasher, vec![node(100), node(200)]).unwrap();
        overlay.leave(node(100)).unwrap();
        assert_eq!(
            overlay.leave(node(200)).unwrap_err(),
            OverlayError::EmptyOverlayForbidden
        );
    }

    #[test]
    fn conservation_under_join_and_leave() {
        let overlay = s1_overlay();
        for (k, v) in [("alpha", 1i64), ("bravo", 2i64)] {
            overlay.insert(k, Record::new().with("id", v)).unwrap();
        }
        overlay.join(node(30000)).unwrap();
        overlay.leave(node(60000)).unwrap();
        assert_eq!(
            overlay.lookup("alpha").unwrap().value,
            Some(vec![Record::new().with("id", 1i64)])
        );
        assert_eq!(
            overlay.lookup("bravo").unwrap().value,
            Some(vec![Record::new().with("id", 2i64)])
        );
    }
}
