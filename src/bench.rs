// src/bench.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run driver and report
//!
//! [`run_benchmark`] sets up a [`BenchmarkContext`], runs `worker_count`
//! scoped worker threads against it, joins them and tears the context down.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::BenchConfig;
use crate::containers::Shard;
use crate::counters::OpCounts;
use crate::error::{BenchError, Result};
use crate::lifecycle::{teardown, BenchmarkContext, TeardownReport};
use crate::numa::NodeCpuMap;
use crate::worker::{run_worker, WorkerTally};

/// Results of one run
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub config: BenchConfig,
    /// Aggregated per-node counters
    pub counts: OpCounts,
    /// Per-worker tallies, ordered by worker id
    pub workers: Vec<WorkerTally>,
    /// Wall-clock time from spawning the first worker to the last join
    pub elapsed: Duration,
    pub teardown: TeardownReport,
}

impl BenchReport {
    pub fn total(&self) -> u64 {
        self.counts.total()
    }

    /// Aggregate throughput over the configured measurement window
    pub fn ops_per_sec(&self) -> f64 {
        self.total() as f64 / self.config.duration().as_secs_f64()
    }

    /// Sum of the worker tallies; equals [`total`](Self::total) for a complete run
    pub fn worker_sum(&self) -> u64 {
        self.workers.iter().map(|w| w.ops).sum()
    }
}

/// One CSV record:
/// `kind, shard_count, worker_count, placement, policy, duration, crossover, ops_node0, ops_node1, total`
impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.config;
        write!(
            f,
            "{}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
            c.structure_kind,
            c.shard_count,
            c.worker_count,
            c.thread_placement,
            c.allocation_policy,
            c.duration_secs,
            c.crossover_percent,
            self.counts.per_node[0],
            self.counts.per_node[1],
            self.total()
        )
    }
}

/// Header matching the [`BenchReport`] CSV record
pub const REPORT_HEADER: &str =
    "kind, shard_count, worker_count, placement, policy, duration, crossover, ops_node0, ops_node1, total";

/// Set up, run and tear down one benchmark described by `config`
pub fn run_benchmark(config: &BenchConfig) -> Result<BenchReport> {
    let ctx = BenchmarkContext::setup(config)?;
    run_with_context(ctx)
}

/// Run the workers against a prepared context and tear it down afterwards
pub fn run_with_context<S: Shard>(ctx: BenchmarkContext<S>) -> Result<BenchReport> {
    let placement = ctx.config().thread_placement;
    let cpus = if placement.pins_threads() {
        if cfg!(not(feature = "thread-pinning")) {
            tracing::warn!("{} placement requested without thread-pinning support", placement);
        }
        Some(NodeCpuMap::detect())
    } else {
        None
    };

    tracing::info!(
        "Starting run: {} workers, {} shards per node, {}s",
        ctx.config().worker_count,
        ctx.config().shard_count,
        ctx.config().duration_secs
    );

    let start = Instant::now();
    let workers = run_workers(&ctx, cpus.as_ref());
    let elapsed = start.elapsed();

    let counts = ctx.counters().snapshot();
    let config = ctx.config().clone();
    let torn_down = teardown(ctx);

    let workers = workers?;
    let teardown = torn_down?;

    let report = BenchReport {
        config,
        counts,
        workers,
        elapsed,
        teardown,
    };
    tracing::info!(
        "Run finished in {:?}: {} ({:.0} ops/s)",
        report.elapsed,
        report.counts,
        report.ops_per_sec()
    );
    Ok(report)
}

/// Spawn one scoped thread per worker and join them all
fn run_workers<S: Shard>(
    ctx: &BenchmarkContext<S>,
    cpus: Option<&NodeCpuMap>,
) -> Result<Vec<WorkerTally>> {
    let worker_count = ctx.config().worker_count;

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(worker_count);
        let mut errors = Vec::new();

        for worker_id in 0..worker_count {
            let spawned = thread::Builder::new()
                .name(format!("shard-worker-{}", worker_id))
                .spawn_scoped(scope, move || run_worker(ctx, worker_id, cpus));
            match spawned {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(e) => {
                    let reason = format!("failed to spawn worker {}: {}", worker_id, e);
                    ctx.coordinator().abort(reason.clone());
                    errors.push(BenchError::RunAborted(reason));
                    break;
                }
            }
        }

        let mut tallies = Vec::with_capacity(handles.len());
        for (worker_id, handle) in handles {
            match handle.join() {
                Ok(Ok(tally)) => tallies.push(tally),
                Ok(Err(e)) => errors.push(e),
                Err(_) => {
                    tracing::error!("Worker {} panicked", worker_id);
                    errors.push(BenchError::WorkerPanicked(worker_id));
                }
            }
        }

        match first_cause(errors) {
            Some(e) => Err(e),
            None => Ok(tallies),
        }
    })
}

/// Prefer the root cause over the `RunAborted` it triggered in other workers
fn first_cause(errors: Vec<BenchError>) -> Option<BenchError> {
    let position = errors
        .iter()
        .position(|e| !matches!(e, BenchError::RunAborted(_)))
        .unwrap_or(0);
    errors.into_iter().nth(position)
}
