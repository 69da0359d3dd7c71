// src/config.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run configuration
//!
//! `BenchConfig` is the single source of truth for a run. In particular
//! `worker_count` sizes both the barrier and the set of spawned threads, so the
//! two can never disagree.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::error::{BenchError, Result};

/// Data-structure kind driven by the workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StructureKind {
    #[default]
    Stack,
    Queue,
    Bst,
    LinkedList,
}

impl StructureKind {
    /// All kinds, in reporting order
    pub const ALL: [StructureKind; 4] = [
        StructureKind::Stack,
        StructureKind::Queue,
        StructureKind::Bst,
        StructureKind::LinkedList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureKind::Stack => "stack",
            StructureKind::Queue => "queue",
            StructureKind::Bst => "bst",
            StructureKind::LinkedList => "linked_list",
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StructureKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stack" => Ok(StructureKind::Stack),
            "queue" => Ok(StructureKind::Queue),
            "bst" | "binary_search_tree" => Ok(StructureKind::Bst),
            "linked_list" | "linkedlist" | "ll" => Ok(StructureKind::LinkedList),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown structure kind '{}' (expected stack, queue, bst or linked_list)",
                other
            ))),
        }
    }
}

/// Where each shard's backing memory comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// Bind every shard to the memory of its node
    Affine,
    /// Global allocator, no binding
    #[default]
    Default,
}

impl AllocationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationPolicy::Affine => "affine",
            AllocationPolicy::Default => "default",
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationPolicy {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "affine" | "numa" => Ok(AllocationPolicy::Affine),
            "default" | "regular" => Ok(AllocationPolicy::Default),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown allocation policy '{}' (expected affine or default)",
                other
            ))),
        }
    }
}

/// Whether workers are bound to the CPUs of their node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPlacement {
    /// Pin each worker to one CPU of its node
    Pinned,
    /// Leave scheduling to the OS
    #[default]
    Unpinned,
    /// Pin like `Pinned`, but every other worker of a node drives the other
    /// node's shards, alternating local and remote workers
    Interleaved,
}

impl ThreadPlacement {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadPlacement::Pinned => "pinned",
            ThreadPlacement::Unpinned => "unpinned",
            ThreadPlacement::Interleaved => "interleaved",
        }
    }

    /// Whether workers are bound to CPUs of their node
    pub fn pins_threads(&self) -> bool {
        matches!(self, ThreadPlacement::Pinned | ThreadPlacement::Interleaved)
    }
}

impl fmt::Display for ThreadPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadPlacement {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pinned" | "numa" => Ok(ThreadPlacement::Pinned),
            "unpinned" | "regular" => Ok(ThreadPlacement::Unpinned),
            "interleaved" | "reverse" => Ok(ThreadPlacement::Interleaved),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown thread placement '{}' (expected pinned, unpinned or interleaved)",
                other
            ))),
        }
    }
}

/// Shards to fill before the measurement window opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefill {
    /// Share of each node's shards that get filled (0..=100)
    pub shard_percent: u32,
    /// Insert operations applied to every selected shard
    pub values_per_shard: usize,
}

impl Default for Prefill {
    fn default() -> Self {
        Self {
            shard_percent: DEFAULT_PREFILL_PERCENT,
            values_per_shard: DEFAULT_PREFILL_VALUES,
        }
    }
}

impl Prefill {
    /// Number of shards out of `shard_count` this prefill touches
    pub fn shards_for(&self, shard_count: usize) -> usize {
        shard_count * self.shard_percent as usize / PERCENT_MAX as usize
    }
}

/// Configuration for one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Data-structure kind every shard holds
    pub structure_kind: StructureKind,
    /// Affine (node-bound) or default allocation of shard instances
    pub allocation_policy: AllocationPolicy,
    /// Pin workers to their node's CPUs or not
    pub thread_placement: ThreadPlacement,
    /// Shards per node
    pub shard_count: usize,
    /// Total workers across both nodes; also the barrier capacity
    pub worker_count: usize,
    /// Measurement window in whole seconds
    pub duration_secs: u64,
    /// Seed shared by every worker's generator
    pub seed: u64,
    /// Percent chance (per step) of targeting the other node's shard
    pub crossover_percent: u32,
    /// Operation values are drawn from `0..key_range`
    pub key_range: u64,
    /// Optional prefill of shards before the run
    pub prefill: Option<Prefill>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            structure_kind: StructureKind::Stack,
            allocation_policy: AllocationPolicy::Default,
            thread_placement: ThreadPlacement::Unpinned,
            shard_count: DEFAULT_SHARD_COUNT,
            worker_count: DEFAULT_WORKER_COUNT,
            duration_secs: DEFAULT_DURATION_SECS,
            seed: DEFAULT_SEED,
            crossover_percent: 0,
            key_range: DEFAULT_KEY_RANGE,
            prefill: None,
        }
    }
}

impl BenchConfig {
    /// Reject configurations that cannot produce a valid run
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(BenchError::InvalidConfig(
                "shard_count must be a positive integer".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(BenchError::InvalidConfig(
                "worker_count must be a positive integer".to_string(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(BenchError::InvalidConfig(
                "duration_secs must be a positive integer".to_string(),
            ));
        }
        if self.crossover_percent > PERCENT_MAX {
            return Err(BenchError::InvalidConfig(format!(
                "crossover_percent must be within 0..={}, got {}",
                PERCENT_MAX, self.crossover_percent
            )));
        }
        if self.key_range == 0 {
            return Err(BenchError::InvalidConfig(
                "key_range must be a positive integer".to_string(),
            ));
        }
        if let Some(prefill) = &self.prefill {
            if prefill.shard_percent > PERCENT_MAX {
                return Err(BenchError::InvalidConfig(format!(
                    "prefill shard_percent must be within 0..={}, got {}",
                    PERCENT_MAX, prefill.shard_percent
                )));
            }
        }
        Ok(())
    }

    /// Measurement window
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Workers bound to node 0; the first half, rounded up
    pub fn workers_on_node0(&self) -> usize {
        self.worker_count.div_ceil(NODE_COUNT)
    }

    /// Node a worker is bound to
    pub fn node_for_worker(&self, worker_id: usize) -> usize {
        if worker_id < self.workers_on_node0() {
            0
        } else {
            1
        }
    }

    /// Position of a worker among the workers of its node
    pub fn local_index(&self, worker_id: usize) -> usize {
        match self.node_for_worker(worker_id) {
            0 => worker_id,
            _ => worker_id - self.workers_on_node0(),
        }
    }

    /// Node whose shards a worker drives. Equal to its own node except under
    /// interleaved placement, where it alternates with the local index.
    pub fn home_node_for_worker(&self, worker_id: usize) -> usize {
        match self.thread_placement {
            ThreadPlacement::Interleaved => self.local_index(worker_id) % NODE_COUNT,
            ThreadPlacement::Pinned | ThreadPlacement::Unpinned => self.node_for_worker(worker_id),
        }
    }
}
