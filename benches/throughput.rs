//! Throughput Benchmark for StashKV
//!
//! Measures the cached facade over the in-memory backend and over the index
//! engine, plus field search on a document index.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stashkv::{
    CachedStore, DocStore, Document, FieldMatch, IndexConfig, IndexDocStore, IndexKvStore,
    KvStore, MemoryBackend, MemoryCache, StoreConfig,
};
use std::sync::Arc;
use std::time::Duration;

fn memory_store() -> KvStore<MemoryBackend<Bytes>> {
    CachedStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryCache::new()),
        StoreConfig::default(),
    )
}

/// Benchmark facade writes
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    let store = memory_store();
    group.bench_function("memory_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store
                .put("bench", &format!("key:{}", i), Bytes::from("small_value"), None)
                .unwrap();
            i += 1;
        });
    });

    let value = Bytes::from("x".repeat(1024)); // 1KB value
    group.bench_function("memory_1kb", |b| {
        let mut i = 0u64;
        b.iter(|| {
            store
                .put("bench", &format!("key:{}", i), value.clone(), None)
                .unwrap();
            i += 1;
        });
    });

    // Sync commits are disk-bound even in RAM; keep the sample small
    group.sample_size(10);
    let index: KvStore<IndexKvStore> = CachedStore::new(
        Arc::new(IndexKvStore::open(&IndexConfig::in_memory()).unwrap()),
        Arc::new(MemoryCache::new()),
        StoreConfig::default(),
    );
    group.bench_function("index_sync_commit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            index
                .put("bench", &format!("key:{}", i), Bytes::from("value"), None)
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark facade reads
fn bench_get(c: &mut Criterion) {
    let store = memory_store();

    // Pre-populate with data
    for i in 0..100_000 {
        store
            .put(
                "bench",
                &format!("key:{}", i),
                Bytes::from(format!("value:{}", i)),
                None,
            )
            .unwrap();
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cache_hit", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get("bench", &format!("key:{}", i % 100_000)).unwrap());
            i += 1;
        });
    });

    group.bench_function("missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(store.get("bench", &format!("missing:{}", i)).unwrap());
            i += 1;
        });
    });

    // Reads straight from the index, bypassing the cache
    let index = IndexKvStore::open(&IndexConfig::in_memory()).unwrap();
    for i in 0..10_000 {
        stashkv::Backend::put(
            &index,
            "bench",
            &format!("key:{}", i),
            Bytes::from("value"),
            None,
        )
        .unwrap();
    }
    group.bench_function("index_lookup", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(stashkv::Backend::get(&index, "bench", &format!("key:{}", i % 10_000)).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let store = memory_store();

    for i in 0..10_000 {
        store
            .put("bench", &format!("key:{}", i), Bytes::from("value"), None)
            .unwrap();
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            if i % 5 == 0 {
                // 20% writes
                store.put("bench", &key, Bytes::from("value"), None).unwrap();
            } else {
                // 80% reads
                black_box(store.get("bench", &key).unwrap());
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(memory_store());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            store.put("bench", &key, Bytes::from("value"), None).unwrap();
                            store.get("bench", &key).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.stats());
        });
    });

    group.finish();
}

/// Benchmark document field search
fn bench_find(c: &mut Criterion) {
    let engine = Arc::new(IndexDocStore::open(&IndexConfig::in_memory()).unwrap());
    let store: DocStore<IndexDocStore> = CachedStore::new(
        Arc::clone(&engine),
        Arc::new(MemoryCache::new()),
        StoreConfig::default(),
    );

    for i in 0..1_000 {
        let doc = Document::new()
            .with("name", format!("user number {}", i))
            .with("group", format!("g{}", i % 10))
            .with("age", i % 90);
        store.put("users", &format!("{}", i), doc, None).unwrap();
    }

    let mut group = c.benchmark_group("find");

    group.bench_function("exact", |b| {
        let matcher = FieldMatch::Exact("g3".into());
        b.iter(|| black_box(engine.find_keys("users", "group", &matcher, 100).unwrap()));
    });

    group.bench_function("token", |b| {
        let matcher = FieldMatch::Token("number".into());
        b.iter(|| black_box(engine.find_keys("users", "name", &matcher, 100).unwrap()));
    });

    group.bench_function("long", |b| {
        let matcher = FieldMatch::Long(42);
        b.iter(|| black_box(engine.find_keys("users", "age", &matcher, 100).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_find,
);

criterion_main!(benches);
