// src/constants.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Number of memory-affinity domains the harness splits shards across
pub const NODE_COUNT: usize = 2;

/// Fixed seed every worker's workload stream starts from.
/// All workers share it so their operation sequences are reproducible run to run.
pub const DEFAULT_SEED: u64 = 123;

/// Default number of shards per node
pub const DEFAULT_SHARD_COUNT: usize = 4;

/// Default total worker count (one per node)
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default measurement window in seconds
pub const DEFAULT_DURATION_SECS: u64 = 1;

/// Default size of the value space operations draw from
pub const DEFAULT_KEY_RANGE: u64 = 1024;

/// Percentage draws are taken from `1..=PERCENT_MAX`
pub const PERCENT_MAX: u32 = 100;

/// BST mix: draws at or below this select lookup (40%)
pub const BST_LOOKUP_THRESHOLD: u32 = 40;

/// BST mix: draws at or below this (and above lookup) select update (40%)
pub const BST_UPDATE_THRESHOLD: u32 = 80;

/// BST mix: draws at or below this (and above update) select insert (10%); the rest remove
pub const BST_INSERT_THRESHOLD: u32 = 90;

/// Default number of values pushed into each prefilled shard (200 Ki entries)
pub const DEFAULT_PREFILL_VALUES: usize = 200 * 1024;

/// Default share of shards per node that get prefilled
pub const DEFAULT_PREFILL_PERCENT: u32 = 50;

/// Largest alignment the node-bound provider can satisfy (one page)
pub const MAX_NODE_ALIGN: usize = 4096;
