// src/lifecycle.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run context construction and ordered teardown
//!
//! [`BenchmarkContext`] owns everything a run shares: the lock table with both
//! node pools, the coordinator and the global counters. Workers only borrow it.
//! [`teardown`] consumes it, which cannot happen until every scoped worker has
//! been joined, and destroys shards in pool order (node 0 then node 1), each
//! together with its lock, then the coordinator.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::alloc::{allocator_for, NodeAllocator};
use crate::config::{BenchConfig, Prefill};
use crate::constants::NODE_COUNT;
use crate::containers::{Container, Operation, Shard};
use crate::coordinator::RunCoordinator;
use crate::counters::GlobalCounters;
use crate::error::{BenchError, Result};
use crate::locks::ShardTable;
use crate::pool::ShardPool;

/// Shared state of one run
#[derive(Debug)]
pub struct BenchmarkContext<S> {
    config: BenchConfig,
    table: ShardTable<S>,
    coordinator: RunCoordinator,
    counters: GlobalCounters,
}

/// What teardown released
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Shards destroyed per node
    pub shards_destroyed: [usize; NODE_COUNT],
    /// Shard locks released, one per shard
    pub locks_released: usize,
    /// Capacity of the coordinator that was torn down
    pub coordinator_participants: usize,
}

impl TeardownReport {
    pub fn total_shards(&self) -> usize {
        self.shards_destroyed.iter().sum()
    }
}

impl BenchmarkContext<Container> {
    /// Validate `config`, build both pools with the configured policy and
    /// apply the optional prefill
    pub fn setup(config: &BenchConfig) -> Result<Self> {
        config.validate()?;
        let allocator = allocator_for(config.allocation_policy, NODE_COUNT)?;
        let kind = config.structure_kind;
        let ctx = Self::build(config, allocator.as_ref(), |_, _| Container::new(kind))?;

        if let Some(prefill) = &config.prefill {
            ctx.prefill(prefill)?;
        }
        Ok(ctx)
    }
}

impl<S: Shard> BenchmarkContext<S> {
    /// Build the pools for node 0 then node 1 with `make(node, index)` and
    /// wrap them into the lock table
    pub fn build<F>(config: &BenchConfig, allocator: &dyn NodeAllocator, mut make: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> S,
    {
        tracing::info!(
            "Setting up {} x {} {} shards ({} allocation) for {} workers",
            NODE_COUNT,
            config.shard_count,
            config.structure_kind,
            config.allocation_policy,
            config.worker_count
        );

        let node0 = ShardPool::create_with(0, config.shard_count, allocator, |i| make(0, i))?;
        let node1 = ShardPool::create_with(1, config.shard_count, allocator, |i| make(1, i))?;
        let table = ShardTable::from_pools([node0, node1])?;
        Ok(Self::from_table(config.clone(), table))
    }

    /// Context around an existing table. The coordinator is sized from
    /// `config.worker_count`, the same value that decides how many workers run.
    pub fn from_table(config: BenchConfig, table: ShardTable<S>) -> Self {
        let coordinator = RunCoordinator::new(config.worker_count, config.duration());
        Self {
            config,
            table,
            coordinator,
            counters: GlobalCounters::new(),
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn table(&self) -> &ShardTable<S> {
        &self.table
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    pub fn counters(&self) -> &GlobalCounters {
        &self.counters
    }

    /// Fill `prefill.shard_percent`% of each node's shards before the run.
    ///
    /// The shard selection derives from the run seed and each shard's values
    /// from `seed + index`, so repeated runs start from the same state.
    /// Returns the number of shards filled.
    pub fn prefill(&self, prefill: &Prefill) -> Result<usize> {
        let shard_count = self.config.shard_count;
        let amount = prefill.shards_for(shard_count);
        if amount == 0 || prefill.values_per_shard == 0 {
            tracing::debug!("Prefill selects no shards, skipping");
            return Ok(0);
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        let selected = index::sample(&mut rng, shard_count, amount).into_vec();
        let targets: Vec<(usize, usize)> = (0..NODE_COUNT)
            .flat_map(|node| selected.iter().map(move |&i| (node, i)))
            .collect();

        tracing::info!(
            "Prefilling {} shards per node with {} values each",
            amount,
            prefill.values_per_shard
        );

        let seed = self.config.seed;
        let key_range = self.config.key_range;
        targets.par_iter().try_for_each(|&(node, shard)| {
            self.table.with_shard(node, shard, |target| {
                let mut values = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(shard as u64));
                for _ in 0..prefill.values_per_shard {
                    target.apply(Operation::Insert, values.random_range(0..key_range));
                }
            })
        })?;

        Ok(targets.len())
    }
}

/// Destroy every shard (pool order, each with its lock), then the coordinator.
///
/// All shards are released even when some were poisoned by a panicking
/// worker; the first poisoned shard is then returned as the error.
pub fn teardown<S: Shard>(ctx: BenchmarkContext<S>) -> Result<TeardownReport> {
    let BenchmarkContext {
        config,
        table,
        coordinator,
        counters,
    } = ctx;

    let release = table.destroy();
    let report = TeardownReport {
        shards_destroyed: release.destroyed,
        locks_released: release.destroyed.iter().sum(),
        coordinator_participants: coordinator.participants(),
    };
    drop(coordinator);
    drop(counters);

    tracing::info!(
        "Teardown complete: {} {} shards destroyed (node0={}, node1={})",
        report.total_shards(),
        config.structure_kind,
        report.shards_destroyed[0],
        report.shards_destroyed[1]
    );

    if let Some(&(node, index)) = release.poisoned.first() {
        for &(node, index) in &release.poisoned {
            tracing::error!("Shard {} on node {} was poisoned", index, node);
        }
        return Err(BenchError::ShardPoisoned { node, index });
    }
    Ok(report)
}
