use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use docseq::{
    ConflictPolicy, DateKey, FixedDate, GenerationConfig, MemoryStore, SequenceGenerator,
    SequenceGeneratorAsyncTokioExt, SequenceStore,
};
use futures::future::try_join_all;
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};
use tokio::runtime::Builder;

// Number of identifiers generated per benchmark iteration (per-thread for
// multi-threaded).
const TOTAL_IDS: usize = 1024;

fn day() -> FixedDate {
    FixedDate::new(DateKey::from_ymd(2025, 1, 19).unwrap())
}

/// Large enough that `TOTAL_IDS * iters` never overflows the tail.
fn config() -> GenerationConfig {
    GenerationConfig::new("SO", 12, "sales_order").unwrap()
}

/// Benchmarks one caller issuing identifiers one at a time.
fn bench_single<S>(c: &mut Criterion, group_name: &str, store_factory: impl Fn() -> S)
where
    S: SequenceStore,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{}", TOTAL_IDS), |b| {
        b.iter_custom(|iters| {
            let config = config();
            let start = Instant::now();

            for _ in 0..iters {
                let generator = SequenceGenerator::with_date_source(store_factory(), day());
                for _ in 0..TOTAL_IDS {
                    black_box(generator.generate(&config).unwrap());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks one caller reserving identifiers in batches of `batch`.
fn bench_batch<S>(
    c: &mut Criterion,
    group_name: &str,
    batch: usize,
    store_factory: impl Fn() -> S,
) where
    S: SequenceStore,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{}/batch/{}", TOTAL_IDS, batch), |b| {
        b.iter_custom(|iters| {
            let config = config();
            let start = Instant::now();

            for _ in 0..iters {
                let generator = SequenceGenerator::with_date_source(store_factory(), day());
                for _ in 0..TOTAL_IDS / batch {
                    black_box(generator.generate_batch(&config, batch).unwrap());
                }
            }

            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmarks many threads contending on the same counter row.
fn bench_contended<S>(c: &mut Criterion, group_name: &str, store_factory: impl Fn() -> S)
where
    S: SequenceStore + Sync,
{
    let mut group = c.benchmark_group(group_name);

    for thread_count in [1, 2, 4, 8] {
        let total = TOTAL_IDS * thread_count;
        group.throughput(Throughput::Elements(total as u64));

        group.bench_function(format!("elems/{}/threads/{}", total, thread_count), |b| {
            b.iter_custom(|iters| {
                let config = config();
                let mut elapsed = core::time::Duration::ZERO;

                for _ in 0..iters {
                    let generator = SequenceGenerator::with_date_source(store_factory(), day())
                        .with_policy(ConflictPolicy::immediate(5));
                    let barrier = Barrier::new(thread_count + 1);

                    let start = scope(|s| {
                        for _ in 0..thread_count {
                            s.spawn(|| {
                                barrier.wait();
                                for _ in 0..TOTAL_IDS {
                                    black_box(generator.generate(&config).unwrap());
                                }
                            });
                        }
                        barrier.wait();
                        Instant::now()
                    });
                    elapsed += start.elapsed();
                }

                elapsed
            });
        });
    }

    group.finish();
}

/// Benchmarks concurrent Tokio tasks sharing one generator.
fn bench_async_tokio(c: &mut Criterion, group_name: &str) {
    let mut group = c.benchmark_group(group_name);

    for task_count in [8, 64, 256] {
        group.throughput(Throughput::Elements(task_count as u64));

        group.bench_function(format!("tasks/{}", task_count), |b| {
            let rt = Builder::new_multi_thread().enable_all().build().unwrap();

            b.to_async(&rt).iter_custom(|iters| async move {
                let config = config();
                let start = Instant::now();

                for _ in 0..iters {
                    let generator = Arc::new(SequenceGenerator::with_date_source(
                        MemoryStore::new(),
                        day(),
                    ));
                    let tasks = (0..task_count).map(|_| {
                        let generator = Arc::clone(&generator);
                        let config = config.clone();
                        tokio::spawn(async move { generator.generate_async(&config).await })
                    });
                    for id in try_join_all(tasks).await.unwrap() {
                        black_box(id.unwrap());
                    }
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_memory_single(c: &mut Criterion) {
    bench_single(c, "memory/single", MemoryStore::new);
}

fn benchmark_memory_batch(c: &mut Criterion) {
    bench_batch(c, "memory/batch", 16, MemoryStore::new);
    bench_batch(c, "memory/batch", 64, MemoryStore::new);
}

fn benchmark_memory_contended(c: &mut Criterion) {
    bench_contended(c, "memory/contended", MemoryStore::new);
}

fn benchmark_memory_tokio(c: &mut Criterion) {
    bench_async_tokio(c, "memory/tokio");
}

fn benchmark_sqlite_single(c: &mut Criterion) {
    bench_single(c, "sqlite/single", sqlite_store);
}

fn benchmark_sqlite_batch(c: &mut Criterion) {
    bench_batch(c, "sqlite/batch", 64, sqlite_store);
}

fn sqlite_store() -> docseq::SqliteStore {
    docseq::SqliteStore::open_in_memory().unwrap()
}

criterion_group!(
    benches,
    // In-process store
    benchmark_memory_single,
    benchmark_memory_batch,
    benchmark_memory_contended,
    benchmark_memory_tokio,
    // SQLite, in-memory database
    benchmark_sqlite_single,
    benchmark_sqlite_batch,
);
criterion_main!(benches);
