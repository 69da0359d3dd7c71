// benches/workload_throughput.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

// Cost of producing workload steps and of one locked shard operation,
// the two pieces every iteration of the measurement loop pays for.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use numa_shard_bench::alloc::HeapAllocator;
use numa_shard_bench::locks::ShardTable;
use numa_shard_bench::pool::ShardPool;
use numa_shard_bench::{Shard, StructureKind, WorkloadGenerator};

const SHARDS: usize = 16;
const KEY_RANGE: u64 = 1024;

fn bench_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator");

    for kind in StructureKind::ALL {
        let mut gen = WorkloadGenerator::with_params(kind, 123, SHARDS, 0, 10, KEY_RANGE)
            .expect("valid generator parameters");
        group.bench_function(BenchmarkId::new("next_step", kind), |bencher| {
            bencher.iter(|| black_box(gen.next_step()));
        });
    }
    group.finish();
}

fn bench_locked_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("locked_dispatch");

    for kind in StructureKind::ALL {
        let pools = [0, 1].map(|node| {
            ShardPool::create(node, SHARDS, kind, &HeapAllocator).expect("heap pool")
        });
        let table = ShardTable::from_pools(pools).expect("matching pools");
        let mut gen = WorkloadGenerator::with_params(kind, 123, SHARDS, 0, 0, KEY_RANGE)
            .expect("valid generator parameters");

        group.bench_function(BenchmarkId::new("apply", kind), |bencher| {
            bencher.iter(|| {
                let step = gen.next_step();
                black_box(
                    table
                        .with_shard(step.node, step.shard, |shard| {
                            shard.apply(step.op, step.value)
                        })
                        .expect("unpoisoned shard"),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_generator, bench_locked_dispatch);
criterion_main!(benches);
