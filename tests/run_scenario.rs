// tests/run_scenario.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

// End-to-end runs through the public API

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use numa_shard_bench::alloc::HeapAllocator;
use numa_shard_bench::{
    run_benchmark, run_with_context, AllocationPolicy, BenchConfig, BenchError,
    BenchmarkContext, OpOutcome, Operation, Prefill, Shard, StructureKind, ThreadPlacement,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[test]
fn test_stack_scenario_end_to_end() {
    init_tracing();
    let config = BenchConfig {
        structure_kind: StructureKind::Stack,
        allocation_policy: AllocationPolicy::Default,
        shard_count: 4,
        worker_count: 2,
        duration_secs: 1,
        ..Default::default()
    };

    let report = run_benchmark(&config).expect("stack scenario runs");
    let [node0, node1] = report.counts.per_node;
    assert_eq!(node0 + node1, report.total());
    assert_eq!(report.total(), report.worker_sum());
    assert!(node0 > 0 && node1 > 0);
    assert_eq!(report.teardown.shards_destroyed, [4, 4]);
    assert_eq!(report.teardown.locks_released, 8);
    assert!(report.elapsed >= Duration::from_secs(1));

    let line = report.to_string();
    assert!(line.starts_with("stack, 4, 2, unpinned, default, 1, 0, "), "{}", line);
}

#[test]
fn test_pinned_bst_with_prefill_and_crossover() {
    init_tracing();
    let config = BenchConfig {
        structure_kind: StructureKind::Bst,
        thread_placement: ThreadPlacement::Pinned,
        shard_count: 8,
        worker_count: 4,
        crossover_percent: 25,
        prefill: Some(Prefill {
            shard_percent: 50,
            values_per_shard: 1024,
        }),
        ..Default::default()
    };

    let report = run_benchmark(&config).expect("pinning is advisory");
    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.total(), report.worker_sum());
    assert_eq!(report.counts.workers, [2, 2]);
    assert_eq!(report.teardown.total_shards(), 16);
}

#[test]
fn test_invalid_configuration_is_rejected_before_setup() {
    let config = BenchConfig {
        shard_count: 0,
        ..Default::default()
    };
    assert!(matches!(
        run_benchmark(&config),
        Err(BenchError::InvalidConfig(_))
    ));
}

#[cfg(not(feature = "numa"))]
#[test]
fn test_affine_requires_numa_support() {
    let config = BenchConfig {
        allocation_policy: AllocationPolicy::Affine,
        ..Default::default()
    };
    assert!(matches!(
        run_benchmark(&config),
        Err(BenchError::Topology(_))
    ));
}

/// Counts every operation applied to any shard of the run
struct Touches(Arc<AtomicU64>);

impl Shard for Touches {
    fn apply(&mut self, _op: Operation, _value: u64) -> OpOutcome {
        self.0.fetch_add(1, Ordering::Relaxed);
        OpOutcome::Inserted
    }

    fn len(&self) -> usize {
        0
    }
}

#[test]
fn test_every_counted_operation_reached_a_shard() {
    init_tracing();
    let applied = Arc::new(AtomicU64::new(0));
    let config = BenchConfig {
        shard_count: 3,
        worker_count: 3,
        crossover_percent: 50,
        ..Default::default()
    };
    let ctx = BenchmarkContext::build(&config, &HeapAllocator, |_, _| {
        Touches(Arc::clone(&applied))
    })
    .expect("heap-backed context");

    let report = run_with_context(ctx).expect("run completes");
    assert!(report.total() > 0);
    assert_eq!(report.total(), report.worker_sum());
    assert_eq!(report.total(), applied.load(Ordering::SeqCst));
}
