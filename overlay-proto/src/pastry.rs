//! Pastry overlay: a base-`2^b` routing matrix plus a leaf set per node.

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

struct PastryNodeState {
    leaf_set: Vec<NodeId>,
    matrix: Vec<Vec<Option<NodeId>>>,
    index: Mutex<LocalIndex<Record>>,
}

struct PastryTopology {
    ring: Vec<NodeId>,
    nodes: BTreeMap<NodeId, PastryNodeState>,
}

/// The live node numerically closest to `target`:
/// `owner(k) = argmin |n - HashFn(k)| mod 2^m`.
fn closest_in_ring(ring: &[NodeId], target: Identifier, m: Width) -> NodeId {
    *ring
        .iter()
        .min_by_key(|n| n.id().ring_distance(target, m))
        .expect("ring is non-empty")
}

/// `L/2` nearest strictly-less and `L/2` nearest strictly-greater ring
/// members of `ring[i]`, capped so small rings never double-count a node
/// from both directions.
fn leaf_set_for(ring: &[NodeId], i: usize, l: usize) -> Vec<NodeId> {
    let n = ring.len();
    if n <= 1 {
        return Vec::new();
    }
    let total = l.min(n - 1);
    let lower_count = total / 2;
    let upper_count = total - lower_count;
    let mut members = Vec::with_capacity(total);
    for off in (1..=lower_count).rev() {
        members.push(ring[(i + n - off) % n]);
    }
    for off in 1..=upper_count {
        members.push(ring[(i + off) % n]);
    }
    members
}

fn build_matrix(ring: &[NodeId], n: NodeId, config: &OverlayConfig) -> Vec<Vec<Option<NodeId>>> {
    let rows = config.pastry_rows();
    let cols = config.pastry_cols();
    let mut matrix: Vec<Vec<Option<NodeId>>> = vec![vec![None; cols]; rows as usize];
    for other in ring {
        if *other == n {
            continue;
        }
        for r in 0..rows {
            if other.id().shared_prefix_len(n.id(), config.b, rows) >= r {
                let c = other.id().digit(r, config.b, rows) as usize;
                let replace = match matrix[r as usize][c] {
                    None => true,
                    Some(existing) => {
                        other.id().ring_distance(n.id(), config.m)
                            < existing.id().ring_distance(n.id(), config.m)
                    }
                };
                if replace {
                    matrix[r as usize][c] = Some(*other);
                }
            }
        }
    }
    for r in 0..rows {
        let c = n.id().digit(r, config.b, rows) as usize;
        matrix[r as usize][c] = Some(n);
    }
    matrix
}

fn rebuild_topology(
    ring: Vec<NodeId>,
    config: &OverlayConfig,
    mut reuse: BTreeMap<NodeId, LocalIndex<Record>>,
) -> PastryTopology {
    let mut nodes = BTreeMap::new();
    for (i, &id) in ring.iter().enumerate() {
        let leaf_set = leaf_set_for(&ring, i, config.l);
        let matrix = build_matrix(&ring, id, config);
        let index = reuse.remove(&id).unwrap_or_else(|| LocalIndex::new(config.t));
        nodes.insert(id, PastryNodeState { leaf_set, matrix, index: Mutex::new(index) });
    }
    PastryTopology { ring, nodes }
}

enum RouteDecision {
    Owner(NodeId),
    Forward(NodeId),
}

fn decide(
    topology: &PastryTopology,
    config: &OverlayConfig,
    current: NodeId,
    key_id: KeyId,
    visited: &[NodeId],
) -> RouteDecision {
    let node = topology.nodes.get(&current).expect("current is a live node");
    let rows = config.pastry_rows();

    let mut leaf_candidates = node.leaf_set.clone();
    leaf_candidates.push(current);
    let min = leaf_candidates.iter().min_by_key(|n| n.id().as_u64()).copied();
    let max = leaf_candidates.iter().max_by_key(|n| n.id().as_u64()).copied();
    if let (Some(min), Some(max)) = (min, max) {
        let target = key_id.id().as_u64();
        if target >= min.id().as_u64() && target <= max.id().as_u64() {
            let owner = *leaf_candidates
                .iter()
                .min_by_key(|n| n.id().ring_distance(key_id.id(), config.m))
                .expect("non-empty");
            return RouteDecision::Owner(owner);
        }
    }

    let l = current.id().shared_prefix_len(key_id.id(), config.b, rows);
    if l < rows {
        let c = key_id.id().digit(l, config.b, rows) as usize;
        if let Some(next) = node.matrix[l as usize][c] {
            if next != current && !visited.contains(&next) {
                return RouteDecision::Forward(next);
            }
        }
    }

    let mut candidates: Vec<NodeId> = node.leaf_set.clone();
    for row in &node.matrix {
        candidates.extend(row.iter().flatten().copied());
    }
    candidates.sort();
    candidates.dedup();
    let current_dist = current.id().ring_distance(key_id.id(), config.m);
    let best = candidates
        .into_iter()
        .filter(|c| *c != current && !visited.contains(c))
        .filter(|c| c.id().shared_prefix_len(key_id.id(), config.b, rows) >= l)
        .filter(|c| c.id().ring_distance(key_id.id(), config.m) < current_dist)
        .min_by_key(|c| c.id().ring_distance(key_id.id(), config.m));

    match best {
        Some(next) => RouteDecision::Forward(next),
        // Cycle guard: no improving, unvisited
        // candidate exists, so this operation terminates here.
        None => RouteDecision::Owner(current),
    }
}

pub struct PastryOverlay<H: KeyHasher> {
    config: OverlayConfig,
    hasher: Arc<H>,
    network: Arc<Network<FindOwnerRequest, NodeId>>,
    topology: Arc<RwLock<PastryTopology>>,
}

impl<H: KeyHasher> fmt::Debug for PastryOverlay<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PastryOverlay").finish_non_exhaustive()
    }
}

impl<H: KeyHasher + 'static> Clone for PastryOverlay<H> {
    fn clone(&self) -> Self {
        PastryOverlay {
            config: self.config,
            hasher: self.hasher.clone(),
            network: self.network.clone(),
            topology: self.topology.clone(),
        }
    }
}

impl<H: KeyHasher + 'static> PastryOverlay<H> {
    pub fn build(config: OverlayConfig, hasher: H, mut node_ids: Vec<NodeId>) -> Result<Self> {
        config.validate().map_err(OverlayError::InvalidConfig)?;
        node_ids.sort();
        node_ids.dedup();
        let topology = rebuild_topology(node_ids, &config, BTreeMap::new());
        let overlay = PastryOverlay {
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
        let config = self.config;
        self.network.register(id, move |_from, req: FindOwnerRequest| {
            let req = req.visiting(id);
            let decision = {
                let topo = topology.read().unwrap();
                decide(&topo, &config, id, req.key_id, &req.visited)
            };
            match decision {
                RouteDecision::Owner(owner) => owner,
                RouteDecision::Forward(next) => network
                    .send(id, next, req)
                    .expect("forwarding target is always a live, registered node"),
            }
        });
    }

    pub fn find_owner(&self, key_id: KeyId) -> Result<(NodeId, u32)> {
        let seed = {
            let topo = self.topology.read().unwrap();
            *topo.ring.first().ok_or(OverlayError::EmptyOverlayForbidden)?
        };
        let scope = HopScope::start();
        let req = FindOwnerRequest::new(key_id).visiting(seed);
        let decision = {
            let topo = self.topology.read().unwrap();
            decide(&topo, &self.config, seed, req.key_id, &req.visited)
        };
        let owner = match decision {
            RouteDecision::Owner(o) => o,
            RouteDecision::Forward(next) => self.network.send(seed, next, req)?,
        };
        Ok((owner, scope.hops()))
    }

    fn key_id(&self, key: &str) -> KeyId {
        self.hasher.hash(&normalize_key(key))
    }
}

impl<H: KeyHasher + 'static> OperationApi for PastryOverlay<H> {
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
        let req = FindOwnerRequest::new(KeyId(new_id.id())).visiting(seed);
        let decision = decide(&topo, &self.config, seed, req.key_id, &req.visited);
        match decision {
            RouteDecision::Owner(_) => {}
            RouteDecision::Forward(next) => {
                drop(topo);
                self.network.send(seed, next, req)?;
                topo = self.topology.write().unwrap();
            }
        };
        let hops = scope.hops();

        let mut new_ring = topo.ring.clone();
        new_ring.push(new_id);
        new_ring.sort();

        let mut reuse: BTreeMap<NodeId, LocalIndex<Record>> = BTreeMap::new();
        for (id, state) in std::mem::take(&mut topo.nodes) {
            reuse.insert(id, state.index.into_inner().unwrap());
        }
        reuse.insert(new_id, LocalIndex::new(self.config.t));

        let mut moves: Vec<(NodeId, String, Vec<Record>)> = Vec::new();
        for (&owner, index) in reuse.iter() {
            if owner == new_id {
                continue;
            }
            for (k, values) in index.scan() {
                let key_id = self.hasher.hash(k);
                if closest_in_ring(&new_ring, key_id.id(), self.config.m) == new_id {
                    moves.push((owner, k.to_string(), values.to_vec()));
                }
            }
        }
        for (owner, k, values) in moves {
            if let Some(idx) = reuse.get_mut(&owner) {
                idx.delete(&k);
            }
            if let Some(idx) = reuse.get_mut(&new_id) {
                for v in values {
                    idx.insert(&k, v);
                }
            }
        }

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
            for (k, values) in entries {
                let key_id = self.hasher.hash(&k);
                let new_owner = closest_in_ring(&new_ring, key_id.id(), self.config.m);
                if let Some(idx) = reuse.get_mut(&new_owner) {
                    for v in values {
                        idx.insert(&k, v);
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
