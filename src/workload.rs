// src/workload.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic per-worker workload streams
//!
//! Every worker owns one generator for the whole run, seeded with the shared
//! run seed, so workers of a node replay the same sequence of shard indices and
//! operation kinds. The seed is split into three Xoshiro256++ streams (one jump
//! apart) for operation choice, placement and values. Changing `shard_count`
//! therefore reshapes the index range without perturbing the operation mix.

use rand::distr::Uniform;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::{BenchConfig, StructureKind};
use crate::constants::*;
use crate::containers::Operation;
use crate::error::{BenchError, Result};

/// How a structure kind picks its next operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMix {
    /// Insert-like or remove-like with equal probability (stack, queue)
    Binary,
    /// Append, remove-head or lookup with equal probability (linked list)
    Ternary,
    /// Lookup 40%, update 40%, insert 10%, remove 10% (BST)
    Weighted,
}

impl OperationMix {
    pub fn for_kind(kind: StructureKind) -> Self {
        match kind {
            StructureKind::Stack | StructureKind::Queue => OperationMix::Binary,
            StructureKind::LinkedList => OperationMix::Ternary,
            StructureKind::Bst => OperationMix::Weighted,
        }
    }

    fn draw<R: Rng>(&self, rng: &mut R) -> Operation {
        match self {
            OperationMix::Binary => match rng.random_range(0..2u32) {
                0 => Operation::Insert,
                _ => Operation::Remove,
            },
            OperationMix::Ternary => match rng.random_range(0..3u32) {
                0 => Operation::Insert,
                1 => Operation::Remove,
                _ => Operation::Lookup,
            },
            OperationMix::Weighted => bst_operation(rng.random_range(1..=PERCENT_MAX)),
        }
    }
}

/// Map a percentage draw in `1..=100` onto the BST mix.
///
/// Thresholds are inclusive: 40 is still a lookup, 41 the first update.
pub fn bst_operation(draw: u32) -> Operation {
    if draw <= BST_LOOKUP_THRESHOLD {
        Operation::Lookup
    } else if draw <= BST_UPDATE_THRESHOLD {
        Operation::Update
    } else if draw <= BST_INSERT_THRESHOLD {
        Operation::Insert
    } else {
        Operation::Remove
    }
}

/// One unit of work: which shard, what to do, with which value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Node owning the target shard
    pub node: usize,
    /// Shard index within that node
    pub shard: usize,
    pub op: Operation,
    pub value: u64,
}

/// Infinite, reproducible stream of [`Step`]s for one worker
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    op_rng: Xoshiro256PlusPlus,
    placement_rng: Xoshiro256PlusPlus,
    value_rng: Xoshiro256PlusPlus,
    mix: OperationMix,
    home_node: usize,
    crossover_percent: u32,
    shard_dist: Uniform<usize>,
    percent_dist: Uniform<u32>,
    value_dist: Uniform<u64>,
}

impl WorkloadGenerator {
    /// Generator for a worker bound to `home_node` under `config`
    pub fn new(config: &BenchConfig, home_node: usize) -> Result<Self> {
        Self::with_params(
            config.structure_kind,
            config.seed,
            config.shard_count,
            home_node,
            config.crossover_percent,
            config.key_range,
        )
    }

    /// Generator from explicit parameters
    ///
    /// # Parameters
    /// - `shard_count`: shards per node, indices are drawn from `0..shard_count`
    /// - `crossover_percent`: chance (0..=100) of targeting the other node
    /// - `key_range`: values are drawn from `0..key_range`
    pub fn with_params(
        kind: StructureKind,
        seed: u64,
        shard_count: usize,
        home_node: usize,
        crossover_percent: u32,
        key_range: u64,
    ) -> Result<Self> {
        if home_node >= NODE_COUNT {
            return Err(BenchError::InvalidConfig(format!(
                "node {} out of range (harness uses {} nodes)",
                home_node, NODE_COUNT
            )));
        }
        let shard_dist = Uniform::new(0, shard_count).map_err(|e| {
            BenchError::InvalidConfig(format!("shard_count {}: {}", shard_count, e))
        })?;
        let value_dist = Uniform::new(0, key_range)
            .map_err(|e| BenchError::InvalidConfig(format!("key_range {}: {}", key_range, e)))?;
        let percent_dist = Uniform::new_inclusive(1, PERCENT_MAX)
            .map_err(|e| BenchError::InvalidConfig(format!("percent range: {}", e)))?;

        // Three non-overlapping streams from one seed
        let op_rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut placement_rng = op_rng.clone();
        placement_rng.jump();
        let mut value_rng = placement_rng.clone();
        value_rng.jump();

        tracing::trace!(
            "Workload generator: kind={}, seed={}, shards={}, node={}, crossover={}%",
            kind,
            seed,
            shard_count,
            home_node,
            crossover_percent
        );

        Ok(Self {
            op_rng,
            placement_rng,
            value_rng,
            mix: OperationMix::for_kind(kind),
            home_node,
            crossover_percent,
            shard_dist,
            percent_dist,
            value_dist,
        })
    }

    /// Draw the next step: shard index, operation, crossover roll, value
    #[inline]
    pub fn next_step(&mut self) -> Step {
        let shard = self.placement_rng.sample(&self.shard_dist);
        let op = self.mix.draw(&mut self.op_rng);
        let roll = self.placement_rng.sample(&self.percent_dist);
        let value = self.value_rng.sample(&self.value_dist);

        let node = if roll < self.crossover_percent {
            NODE_COUNT - 1 - self.home_node
        } else {
            self.home_node
        };

        Step {
            node,
            shard,
            op,
            value,
        }
    }
}

impl Iterator for WorkloadGenerator {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        Some(self.next_step())
    }
}
