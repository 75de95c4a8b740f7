//! Dictionary transaction benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use isodict_bench::{generate_entries, key, Profile};
use isodict_core::{DictionaryContext, IsolatedDictionary, StoreConfig};
use isodict_replication::{LoopbackTransport, ReplicationConfig, Replicator};
use std::sync::Arc;

fn dictionary() -> Arc<IsolatedDictionary<Profile>> {
    Arc::new(IsolatedDictionary::new(StoreConfig::default()))
}

fn seeded(count: usize) -> Arc<IsolatedDictionary<Profile>> {
    let dict = dictionary();
    let mut ctx = DictionaryContext::new(Arc::clone(&dict));
    ctx.add_or_update_range(generate_entries(count, 128)).unwrap();
    ctx.commit().unwrap();
    dict
}

/// Benchmark a single-key write and commit.
fn bench_single_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_commit");

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dict = dictionary();
            let profile = Profile::random(size);
            let mut ctx = DictionaryContext::new(Arc::clone(&dict));

            b.iter(|| {
                ctx.declare_intent(["hot"], false).unwrap();
                ctx.add_or_update("hot", black_box(profile.clone())).unwrap();
                ctx.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark commits of many buffered writes.
fn bench_batch_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_commit");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let dict = dictionary();
                let entries = generate_entries(batch_size, 128);
                let mut ctx = DictionaryContext::new(Arc::clone(&dict));

                b.iter(|| {
                    ctx.add_or_update_range(black_box(entries.clone())).unwrap();
                    ctx.commit().unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark a scoped read of one key from a populated store.
fn bench_scoped_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped_read");

    for count in [100, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let dict = seeded(count);
            let target = key(count / 2);
            let mut ctx = DictionaryContext::new(Arc::clone(&dict));

            b.iter(|| {
                ctx.declare_intent([target.as_str()], true).unwrap();
                black_box(ctx.get(&target).unwrap());
                ctx.rollback().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark a whole-store snapshot followed by a full scan.
fn bench_snapshot_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_scan");

    for count in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let dict = seeded(count);
            let mut ctx = DictionaryContext::new(Arc::clone(&dict));

            b.iter(|| {
                black_box(ctx.get_all().unwrap());
                ctx.rollback().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark shipping commits to a follower over the loopback transport.
fn bench_replicated_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("replicated_commit");

    for followers in [1, 3].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(followers),
            followers,
            |b, &followers| {
                let transport = LoopbackTransport::new();
                for _ in 0..followers {
                    transport.attach(dictionary());
                }
                let leader = Replicator::new(ReplicationConfig::leader(), dictionary(), transport);
                let profile = Profile::random(256);
                let mut ctx = DictionaryContext::new(Arc::clone(leader.dictionary()));

                b.iter(|| {
                    ctx.add_or_update("hot", black_box(profile.clone())).unwrap();
                    ctx.commit().unwrap();
                    leader.pump().unwrap();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_commit,
    bench_batch_commit,
    bench_scoped_read,
    bench_snapshot_scan,
    bench_replicated_commit,
);
criterion_main!(benches);
