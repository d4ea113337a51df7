use criterion::{black_box, criterion_group, criterion_main, Criterion};
use overlay_index::LocalIndex;

fn bench_insert(c: &mut Criterion) {
    c.bench_function("local_index_insert_10k", |b| {
        b.iter(|| {
            let mut idx: LocalIndex<i64> = LocalIndex::new(LocalIndex::<i64>::DEFAULT_T);
            for i in 0..10_000i64 {
                idx.insert(black_box(&format!("key-{i}")), i);
            }
            idx
        })
    });
}

fn bench_lookup(c: &mut Criterion) {
    let mut idx: LocalIndex<i64> = LocalIndex::new(LocalIndex::<i64>::DEFAULT_T);
    for i in 0..10_000i64 {
        idx.insert(&format!("key-{i}"), i);
    }
    c.bench_function("local_index_lookup_10k", |b| {
        b.iter(|| idx.lookup(black_box("key-5000")))
    });
}

criterion_group!(benches, bench_insert, bench_lookup);
criterion_main!(benches);
