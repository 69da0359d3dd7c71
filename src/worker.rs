// src/worker.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker entry point
//!
//! A worker optionally pins itself to a CPU of its node, waits for the setup
//! barrier, applies generated steps until the deadline, merges its tally into
//! the global counters and waits at the final barrier. The measurement loop
//! neither logs nor allocates.

use crate::config::BenchConfig;
use crate::containers::Shard;
use crate::coordinator::{AbortOnPanic, MeasurementWindow};
use crate::error::Result;
use crate::lifecycle::BenchmarkContext;
use crate::locks::ShardTable;
use crate::numa::{pin_current_thread, NodeCpuMap};
use crate::workload::WorkloadGenerator;

/// State owned by one worker for the duration of a run
#[derive(Debug)]
pub struct WorkerContext {
    pub worker_id: usize,
    /// Node the worker is placed on
    pub node: usize,
    /// Position among the workers of the same node
    pub local_index: usize,
    /// Node whose shards the worker drives when it does not cross over
    pub home_node: usize,
    generator: WorkloadGenerator,
    tally: u64,
}

/// What a worker reports after the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTally {
    pub worker_id: usize,
    pub node: usize,
    /// Completed operations
    pub ops: u64,
    /// CPU the worker was pinned to, if pinning took effect
    pub pinned_cpu: Option<usize>,
}

impl WorkerContext {
    pub fn new(config: &BenchConfig, worker_id: usize) -> Result<Self> {
        let home_node = config.home_node_for_worker(worker_id);
        Ok(Self {
            worker_id,
            node: config.node_for_worker(worker_id),
            local_index: config.local_index(worker_id),
            home_node,
            generator: WorkloadGenerator::new(config, home_node)?,
            tally: 0,
        })
    }

    pub fn tally(&self) -> u64 {
        self.tally
    }

    /// Apply generated steps until `window` closes.
    ///
    /// Each step takes the target shard's lock, applies one operation and
    /// releases it. The outcome is discarded; only completions are counted.
    pub fn measure<S: Shard>(
        &mut self,
        table: &ShardTable<S>,
        window: &MeasurementWindow,
    ) -> Result<()> {
        while window.is_open() {
            let step = self.generator.next_step();
            let outcome =
                table.with_shard(step.node, step.shard, |shard| shard.apply(step.op, step.value))?;
            std::hint::black_box(outcome);
            self.tally += 1;
        }
        Ok(())
    }
}

fn pin_worker(cpus: &NodeCpuMap, worker: &WorkerContext) -> Option<usize> {
    let Some(cpu) = cpus.cpu_for(worker.node, worker.local_index) else {
        tracing::warn!(
            "Worker {}: node {} has no CPUs to pin to",
            worker.worker_id,
            worker.node
        );
        return None;
    };
    if pin_current_thread(cpu) {
        tracing::debug!(
            "Worker {} pinned to CPU {} (node {})",
            worker.worker_id,
            cpu,
            worker.node
        );
        Some(cpu)
    } else {
        tracing::warn!(
            "Worker {}: could not pin to CPU {}, continuing unpinned",
            worker.worker_id,
            cpu
        );
        None
    }
}

/// Run worker `worker_id` against `ctx`.
///
/// `cpus` is consulted only when the placement pins threads. Every path that
/// returns after setup has passed both barriers, or aborted the coordinator,
/// so the remaining workers are never left waiting.
pub fn run_worker<S: Shard>(
    ctx: &BenchmarkContext<S>,
    worker_id: usize,
    cpus: Option<&NodeCpuMap>,
) -> Result<WorkerTally> {
    let coordinator = ctx.coordinator();
    let _abort_guard = AbortOnPanic::new(coordinator, worker_id);

    let mut worker = match WorkerContext::new(ctx.config(), worker_id) {
        Ok(worker) => worker,
        Err(e) => {
            coordinator.abort(format!("worker {} setup failed: {}", worker_id, e));
            return Err(e);
        }
    };

    let pinned_cpu = match cpus {
        Some(cpus) if ctx.config().thread_placement.pins_threads() => pin_worker(cpus, &worker),
        _ => None,
    };

    ctx.counters().register(worker.node);
    coordinator.wait()?;

    let window = coordinator.open_window();
    let measured = worker.measure(ctx.table(), &window);

    ctx.counters().record(worker.node, worker.tally);
    if coordinator.wait()? {
        let counts = ctx.counters().snapshot();
        tracing::info!(
            "All {} workers done after {:?}: {}",
            coordinator.participants(),
            window.elapsed(),
            counts
        );
    }
    measured?;

    tracing::debug!(
        "Worker {} (node {}) completed {} operations",
        worker.worker_id,
        worker.node,
        worker.tally
    );

    Ok(WorkerTally {
        worker_id,
        node: worker.node,
        ops: worker.tally,
        pinned_cpu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HeapAllocator;
    use crate::containers::{OpOutcome, Operation};
    use crate::config::ThreadPlacement;
    use crate::error::BenchError;
    use std::time::{Duration, Instant};

    #[test]
    fn test_worker_node_assignment() {
        let config = BenchConfig {
            worker_count: 3,
            ..Default::default()
        };
        let nodes: Vec<(usize, usize)> = (0..3)
            .map(|id| {
                let w = WorkerContext::new(&config, id).unwrap();
                (w.node, w.local_index)
            })
            .collect();
        assert_eq!(nodes, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_interleaved_placement_alternates_home_node() {
        let config = BenchConfig {
            worker_count: 4,
            thread_placement: ThreadPlacement::Interleaved,
            ..Default::default()
        };
        let pairs: Vec<(usize, usize)> = (0..4)
            .map(|id| {
                let w = WorkerContext::new(&config, id).unwrap();
                (w.node, w.home_node)
            })
            .collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        // Without crossover every step of worker 1 lands on node 1's shards
        let ctx = BenchmarkContext::setup(&config).unwrap();
        let mut worker = WorkerContext::new(&config, 1).unwrap();
        let window = MeasurementWindow::starting_at(Instant::now(), Duration::from_millis(20));
        worker.measure(ctx.table(), &window).unwrap();
        let stored = |node: usize| -> usize {
            (0..config.shard_count)
                .map(|i| ctx.table().with_shard(node, i, |s| s.len()).unwrap())
                .sum()
        };
        assert!(worker.tally() > 0);
        assert_eq!(stored(0), 0);
    }

    #[test]
    fn test_pinned_placement_keeps_home_node() {
        let config = BenchConfig {
            worker_count: 4,
            thread_placement: ThreadPlacement::Pinned,
            ..Default::default()
        };
        let homes: Vec<usize> = (0..4)
            .map(|id| WorkerContext::new(&config, id).unwrap().home_node)
            .collect();
        assert_eq!(homes, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_measure_counts_completed_operations() {
        let config = BenchConfig {
            shard_count: 2,
            ..Default::default()
        };
        let ctx = BenchmarkContext::setup(&config).unwrap();
        let mut worker = WorkerContext::new(&config, 0).unwrap();

        let window = MeasurementWindow::starting_at(Instant::now(), Duration::from_millis(50));
        worker.measure(ctx.table(), &window).unwrap();
        assert!(worker.tally() > 0);
        assert!(!window.is_open());

        // Net pushes can never exceed completed operations
        let stored: usize = (0..2)
            .flat_map(|node| (0..2).map(move |i| (node, i)))
            .map(|(node, i)| ctx.table().with_shard(node, i, |s| s.len()).unwrap())
            .sum();
        assert!(stored as u64 <= worker.tally());
    }

    #[test]
    fn test_closed_window_runs_nothing() {
        let config = BenchConfig::default();
        let ctx = BenchmarkContext::setup(&config).unwrap();
        let mut worker = WorkerContext::new(&config, 1).unwrap();
        let window = MeasurementWindow::starting_at(Instant::now(), Duration::ZERO);
        worker.measure(ctx.table(), &window).unwrap();
        assert_eq!(worker.tally(), 0);
    }

    #[test]
    fn test_single_worker_run() {
        let config = BenchConfig {
            worker_count: 1,
            duration_secs: 1,
            ..Default::default()
        };
        let ctx = BenchmarkContext::setup(&config).unwrap();
        let tally = run_worker(&ctx, 0, None).unwrap();
        assert_eq!(tally.node, 0);
        assert_eq!(tally.pinned_cpu, None);
        assert_eq!(ctx.counters().snapshot().per_node, [tally.ops, 0]);
        assert_eq!(ctx.counters().snapshot().workers, [1, 0]);
    }

    #[test]
    fn test_poisoned_shard_still_reaches_barrier() {
        struct Fragile;
        impl Shard for Fragile {
            fn apply(&mut self, _op: Operation, _value: u64) -> OpOutcome {
                OpOutcome::Inserted
            }
            fn len(&self) -> usize {
                0
            }
        }

        let config = BenchConfig {
            shard_count: 1,
            worker_count: 1,
            ..Default::default()
        };
        let ctx = BenchmarkContext::build(&config, &HeapAllocator, |_, _| Fragile).unwrap();
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| ctx.table().with_shard(0, 0, |_| panic!("poison node 0")))
                .join();
        });

        let result = run_worker(&ctx, 0, None);
        assert!(matches!(
            result,
            Err(BenchError::ShardPoisoned { node: 0, index: 0 })
        ));
        assert_eq!(ctx.counters().snapshot().merged, [1, 0]);
    }
}
