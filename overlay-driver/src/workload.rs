//! A finite, typed sequence of operations run against an overlay, plus the
//! two ways this crate drives one through: a plain sequential pass, and a
//! fixed-worker-count concurrent lookup pass.

use std::sync::atomic::{AtomicUsize, Ordering};

use overlay_core::hash::KeyHasher;
use overlay_core::identifier::NodeId;
use overlay_core::record::Record;
use overlay_proto::prelude::{OperationApi, Overlay};

use crate::observer::AggregationObserver;

/// One workload step. The driver never parses these from a file — a
/// workload is always built in code.
#[derive(Debug, Clone)]
pub enum Operation {
    Insert { key: String, value: Record },
    Lookup { key: String },
    Delete { key: String },
    Update { key: String, value: Record },
    Join { id: NodeId },
    Leave { id: NodeId },
}

impl Operation {
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Lookup { .. } => "lookup",
            Operation::Delete { .. } => "delete",
            Operation::Update { .. } => "update",
            Operation::Join { .. } => "join",
            Operation::Leave { .. } => "leave",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workload {
    pub operations: Vec<Operation>,
}

impl Workload {
    pub fn new(operations: Vec<Operation>) -> Self {
        Workload { operations }
    }
}

/// Run every step of `workload` against `overlay` in order, reporting each
/// completed operation's hop count to `observer`. Operations that return
/// an overlay error (e.g. `join` of an id already live) are skipped rather
/// than aborting the rest of the workload.
#[tracing::instrument(skip(overlay, workload, observer))]
pub fn run_sequential<H: KeyHasher + 'static>(
    overlay: &Overlay<H>,
    workload: &Workload,
    observer: &dyn AggregationObserver,
) {
    let protocol = overlay.protocol().tag();
    for op in &workload.operations {
        let n_nodes = overlay.node_count();
        let report = |hops: u32, n_items: usize| {
            observer.on_operation(protocol, op.tag(), hops, n_nodes, n_items);
        };
        match op {
            Operation::Insert { key, value } => {
                if let Ok(r) = overlay.insert(key, value.clone()) {
                    report(r.hops, 1);
                }
            }
            Operation::Lookup { key } => {
                if let Ok(r) = overlay.lookup(key) {
                    let n_items = r.value.as_ref().map_or(0, Vec::len);
                    report(r.hops, n_items);
                }
            }
            Operation::Delete { key } => {
                if let Ok(r) = overlay.delete(key) {
                    report(r.hops, r.value as usize);
                }
            }
            Operation::Update { key, value } => {
                if let Ok(r) = overlay.update(key, value.clone()) {
                    report(r.hops, r.value as usize);
                }
            }
            Operation::Join { id } => {
                if let Ok(r) = overlay.join(*id) {
                    report(r.hops, 0);
                }
            }
            Operation::Leave { id } => {
                if let Ok(r) = overlay.leave(*id) {
                    report(r.hops, 0);
                }
            }
        }
    }
}

/// The "K concurrent popularity lookups" workload: `worker_count` OS
/// threads pull from a shared index into `keys` until it is exhausted,
/// each issuing plain `lookup` calls. Plain threads rather than an async
/// runtime, since `Network::send` never suspends.
pub fn run_concurrent_lookups<H>(
    overlay: &Overlay<H>,
    keys: &[String],
    worker_count: usize,
    observer: &(dyn AggregationObserver + Sync),
) where
    H: KeyHasher + 'static,
{
    let protocol = overlay.protocol().tag();
    let n_nodes = overlay.node_count();
    let next = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..worker_count.max(1) {
            scope.spawn(|| loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                let Some(key) = keys.get(i) else { break };
                if let Ok(r) = overlay.lookup(key) {
                    let n_items = r.value.as_ref().map_or(0, Vec::len);
                    observer.on_operation(protocol, "lookup", r.hops, n_nodes, n_items);
                }
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_core::hash::HashFn;
    use overlay_core::identifier::Identifier;
    use overlay_proto::prelude::new_chord;

    fn node(n: u64) -> NodeId {
        NodeId::new(Identifier::new(n))
    }

    fn demo_overlay() -> Overlay<HashFn> {
        new_chord(16, 4, HashFn::new(16), vec![node(1), node(2), node(3), node(4)]).unwrap()
    }

    #[test]
    fn sequential_workload_reports_every_operation() {
        let overlay = demo_overlay();
        let collector = crate::observer::HopStatsCollector::new();
        let workload = Workload::new(vec![
            Operation::Insert { key: "widget".into(), value: Record::new().with("id", 1i64) },
            Operation::Lookup { key: "widget".into() },
            Operation::Update { key: "widget".into(), value: Record::new().with("id", 2i64) },
            Operation::Delete { key: "widget".into() },
            Operation::Lookup { key: "widget".into() },
        ]);
        run_sequential(&overlay, &workload, &collector);

        let summary = collector.summary();
        let total: u64 = summary.iter().map(|s| s.count).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn concurrent_lookups_cover_every_key_exactly_once() {
        let overlay = demo_overlay();
        for i in 0..20 {
            overlay.insert(&format!("key{i}"), Record::new().with("id", i as i64)).unwrap();
        }
        let keys: Vec<String> = (0..20).map(|i| format!("key{i}")).collect();
        let collector = crate::observer::HopStatsCollector::new();
        run_concurrent_lookups(&overlay, &keys, 4, &collector);

        let summary = collector.summary();
        let lookup = summary.iter().find(|s| s.operation == "lookup").unwrap();
        assert_eq!(lookup.count, 20);
    }
}
