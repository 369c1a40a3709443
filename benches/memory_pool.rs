//! Pipelined pool benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use netmem::context::{LoopbackContext, NetworkContext};
use netmem::memory::{MemoryStrategy, NetworkBuffer, PipelinedPool};
use std::sync::Arc;

fn bench_pool_next(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_next");
    let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());

    for depth in [2, 4, 16, 64] {
        let pool = PipelinedPool::new(1024, depth, &ctx, MemoryStrategy::Host).unwrap();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &pool, |b, pool| {
            b.iter(|| std::hint::black_box(pool.next().span()));
        });
    }

    group.finish();
}

fn bench_pool_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_concurrent");
    let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());
    let pool = Arc::new(PipelinedPool::new(1024, 16, &ctx, MemoryStrategy::Host).unwrap());

    group.throughput(Throughput::Elements(400));
    group.bench_function("4_threads_100_ops_each", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    std::thread::spawn(move || {
                        for _ in 0..100 {
                            std::hint::black_box(pool.next().addr());
                        }
                    })
                })
                .collect();

            for h in handles {
                h.join().unwrap();
            }
        });
    });

    group.finish();
}

fn bench_pool_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_construction");
    let ctx: Arc<dyn NetworkContext> = Arc::new(LoopbackContext::new());

    for strategy in [MemoryStrategy::Host, MemoryStrategy::Device] {
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, &strategy| {
                b.iter(|| PipelinedPool::new(4096, 4, &ctx, strategy).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pool_next,
    bench_pool_concurrent,
    bench_pool_construction
);
criterion_main!(benches);
