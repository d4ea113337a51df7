use criterion::{black_box, criterion_group, criterion_main, Criterion};
use overlay_core::hash::HashFn;

fn bench_hash(c: &mut Criterion) {
    let hasher = HashFn::new(16);
    c.bench_function("hash_fn_16bit", |b| {
        b.iter(|| hasher.hash(black_box("the shawshank redemption")))
    });
}

criterion_group!(benches, bench_hash);
criterion_main!(benches);
