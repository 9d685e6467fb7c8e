use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use staticd::cache::Cache;

fn bench_hit(c: &mut Criterion) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![b'x'; 64 * 1024]).unwrap();
    let cache = Cache::new(16 * 1024 * 1024);
    cache.pin_or_load("k", file.path()).unwrap();

    c.bench_function("cache_hit", |b| {
        b.iter(|| {
            let handle = cache.pin_or_load(black_box("k"), file.path()).unwrap();
            black_box(handle.len());
        })
    });
}

fn bench_miss(c: &mut Criterion) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![b'x'; 64 * 1024]).unwrap();

    c.bench_function("cache_miss_then_evict", |b| {
        b.iter(|| {
            let cache = Cache::new(64 * 1024);
            let handle = cache.pin_or_load(black_box("k"), file.path()).unwrap();
            black_box(handle.len());
        })
    });
}

criterion_group!(benches, bench_hit, bench_miss);
criterion_main!(benches);
