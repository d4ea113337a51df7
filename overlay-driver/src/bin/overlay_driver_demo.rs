//! Builds a small Chord overlay and a small Pastry overlay over the same
//! node ids, runs the same fixed workload against both, and prints the
//! per-operation hop statistics each collected. The one place in this
//! workspace that installs a global `tracing` subscriber.

use overlay_core::hash::HashFn;
use overlay_core::identifier::{Identifier, NodeId};
use overlay_core::record::Record;
use overlay_driver::prelude::*;
use overlay_proto::prelude::{new_chord, new_pastry, OperationApi};

const BIT_WIDTH: u32 = 16;
const ITEM_COUNT: usize = 64;
const LOOKUP_WORKER_COUNT: usize = 4;

fn node(n: u64) -> NodeId {
    NodeId::new(Identifier::new(n))
}

fn seed_node_ids() -> Vec<NodeId> {
    (0..8).map(|i| node(i * 8191 % (1 << BIT_WIDTH))).collect()
}

fn build_workload() -> (Workload, Vec<String>) {
    let mut ops = Vec::new();
    let keys: Vec<String> = (0..ITEM_COUNT).map(|i| format!("item-{i}")).collect();
    for (i, key) in keys.iter().enumerate() {
        ops.push(Operation::Insert { key: key.clone(), value: Record::new().with("id", i as i64) });
    }
    for key in &keys {
        ops.push(Operation::Lookup { key: key.clone() });
    }
    for key in keys.iter().step_by(4) {
        ops.push(Operation::Update { key: key.clone(), value: Record::new().with("touched", true) });
    }
    for key in keys.iter().step_by(8) {
        ops.push(Operation::Delete { key: key.clone() });
    }
    ops.push(Operation::Join { id: node(12345) });
    ops.push(Operation::Leave { id: node(12345) });
    (Workload::new(ops), keys)
}

fn print_summary(label: &str, collector: &HopStatsCollector) {
    println!("-- {label} --");
    for s in collector.summary() {
        println!(
            "  {:<8} {:<8} count={:<5} min={:<3} max={:<3} mean={:.2}",
            s.protocol, s.operation, s.count, s.min_hops, s.max_hops, s.mean_hops
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let node_ids = seed_node_ids();
    let (workload, keys) = build_workload();

    let chord = new_chord(BIT_WIDTH, 4, HashFn::new(BIT_WIDTH), node_ids.clone()).unwrap();
    let chord_stats = HopStatsCollector::new();
    run_sequential(&chord, &workload, &chord_stats);
    run_concurrent_lookups(&chord, &keys, LOOKUP_WORKER_COUNT, &chord_stats);
    print_summary("chord", &chord_stats);

    let pastry = new_pastry(BIT_WIDTH, 4, 8, HashFn::new(BIT_WIDTH), node_ids).unwrap();
    let pastry_stats = HopStatsCollector::new();
    run_sequential(&pastry, &workload, &pastry_stats);
    run_concurrent_lookups(&pastry, &keys, LOOKUP_WORKER_COUNT, &pastry_stats);
    print_summary("pastry", &pastry_stats);
}
