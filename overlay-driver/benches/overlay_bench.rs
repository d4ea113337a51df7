use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use overlay_core::hash::HashFn;
use overlay_core::identifier::{Identifier, NodeId};
use overlay_core::record::Record;
use overlay_proto::prelude::{new_chord, new_pastry, OperationApi};

const BIT_WIDTH: u32 = 16;

fn node(n: u64) -> NodeId {
    NodeId::new(Identifier::new(n))
}

fn node_ids(n: usize) -> Vec<NodeId> {
    (0..n as u64).map(|i| node(i * 8191 % (1 << BIT_WIDTH))).collect()
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_hops");
    for &n in &[8usize, 32, 128] {
        let chord = new_chord(BIT_WIDTH, 4, HashFn::new(BIT_WIDTH), node_ids(n)).unwrap();
        let pastry = new_pastry(BIT_WIDTH, 4, 8, HashFn::new(BIT_WIDTH), node_ids(n)).unwrap();
        for i in 0..256 {
            let key = format!("item-{i}");
            chord.insert(&key, Record::new().with("id", i as i64)).unwrap();
            pastry.insert(&key, Record::new().with("id", i as i64)).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("chord", n), &n, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % 256;
                chord.lookup(&format!("item-{i}")).unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("pastry", n), &n, |b, _| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % 256;
                pastry.lookup(&format!("item-{i}")).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lookup);
criterion_main!(benches);
