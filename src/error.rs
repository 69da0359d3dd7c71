// src/error.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy for the harness
//!
//! Only setup and teardown failures are errors. Steady-state operation outcomes
//! (popping an empty stack, a lookup miss) are reported through
//! [`OpOutcome`](crate::containers::OpOutcome) and never escalate.

use thiserror::Error;

/// Fatal harness errors. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Configuration rejected before any resource was created
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The memory provider could not back a shard
    #[error("failed to allocate {size} bytes on node {node}: {reason}")]
    Allocation {
        node: usize,
        size: usize,
        reason: String,
    },

    /// NUMA topology is missing something the requested policy needs
    #[error("NUMA topology unavailable: {0}")]
    Topology(String),

    /// A worker panicked while it held the lock of this shard
    #[error("shard {index} on node {node} was poisoned by a panicking worker")]
    ShardPoisoned { node: usize, index: usize },

    /// A worker thread panicked
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// The run was abandoned before every worker reached the barrier
    #[error("run aborted: {0}")]
    RunAborted(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, BenchError>;
