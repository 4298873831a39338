use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pricejoin::core::config::Config;
use pricejoin::core::types::{encode_pair, RECORD_SIZE};
use pricejoin::ingest::ingester::store_block;
use pricejoin::storage::kv_store::{DuplicatePolicy, KeyMode, KvStore};
use pricejoin::storage::wal::SyncMode;
use pricejoin::Pipeline;
use tempfile::TempDir;

fn bench_config(dir: &std::path::Path, workers: usize) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        file_size: 16 * 64 * 1024,   // 1MB per file
        block_size: 16 * 4 * 1024,   // 64KB blocks
        workers,
        num_users: 10_000,
        num_items: 10_000,
        item_duplicates: DuplicatePolicy::KeepFirst,
        sync_mode: SyncMode::None,
        seed: Some(42),
    }
}

/// Benchmark generate + process end to end
fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for workers in [1usize, 2, 4, 8].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(workers), workers, |b, &workers| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let pipeline = Pipeline::new(bench_config(dir.path(), workers)).unwrap();
                pipeline.generate().unwrap();
                pipeline.process().unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark a single block commit into each store mode
fn bench_block_commit(c: &mut Criterion) {
    let records = 4096;
    let mut block = vec![0u8; records * RECORD_SIZE];
    for (i, slot) in block.chunks_exact_mut(RECORD_SIZE).enumerate() {
        encode_pair((i % 512) as u64, i as u64, slot);
    }

    let mut group = c.benchmark_group("block_commit");
    for (name, mode) in [
        ("multi", KeyMode::Multi),
        ("unique", KeyMode::Unique(DuplicatePolicy::KeepFirst)),
    ] {
        group.bench_function(format!("{}/logged", name), |b| {
            let dir = TempDir::new().unwrap();
            let store = KvStore::open(dir.path().join(name), name, mode, SyncMode::None).unwrap();
            b.iter(|| store_block(&store, 0, &block).unwrap());
        });
        group.bench_function(format!("{}/scratch", name), |b| {
            let dir = TempDir::new().unwrap();
            let store = KvStore::open_scratch(dir.path().join(name), name, mode).unwrap();
            b.iter(|| store_block(&store, 0, &block).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_block_commit);
criterion_main!(benches);
