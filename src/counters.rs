// src/counters.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-node operation counters behind one global lock
//!
//! Workers count into a private tally and touch this lock only twice per
//! run: once to register before measuring and once to merge their tally
//! after the deadline.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::constants::NODE_COUNT;

#[derive(Debug, Default)]
struct CounterState {
    ops: [u64; NODE_COUNT],
    workers: [usize; NODE_COUNT],
    merged: [usize; NODE_COUNT],
}

/// Global per-node aggregates
#[derive(Debug, Default)]
pub struct GlobalCounters {
    state: Mutex<CounterState>,
}

/// Snapshot of the aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// Completed operations by workers of each node
    pub per_node: [u64; NODE_COUNT],
    /// Workers that registered on each node
    pub workers: [usize; NODE_COUNT],
    /// Workers whose tally has been merged, per node
    pub merged: [usize; NODE_COUNT],
}

impl OpCounts {
    pub fn total(&self) -> u64 {
        self.per_node.iter().sum()
    }
}

impl fmt::Display for OpCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node0={} node1={} total={}",
            self.per_node[0],
            self.per_node[1],
            self.total()
        )
    }
}

impl GlobalCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CounterState> {
        // Plain integers, a panic mid-update cannot leave them torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Note a worker of `node` entering the measurement phase
    pub fn register(&self, node: usize) {
        let mut state = self.state();
        if let Some(workers) = state.workers.get_mut(node) {
            *workers += 1;
        }
    }

    /// Add a worker's final tally to its node's aggregate
    pub fn record(&self, node: usize, ops: u64) {
        let mut state = self.state();
        let state = &mut *state;
        if let (Some(total), Some(merged)) = (state.ops.get_mut(node), state.merged.get_mut(node))
        {
            *total += ops;
            *merged += 1;
        }
    }

    pub fn snapshot(&self) -> OpCounts {
        let state = self.state();
        OpCounts {
            per_node: state.ops,
            workers: state.workers,
            merged: state.merged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_total() {
        let counters = GlobalCounters::new();
        counters.register(0);
        counters.register(1);
        counters.record(0, 10);
        counters.record(1, 32);
        counters.record(7, 1000);

        let counts = counters.snapshot();
        assert_eq!(counts.per_node, [10, 32]);
        assert_eq!(counts.total(), 42);
        assert_eq!(counts.workers, [1, 1]);
        assert_eq!(counts.merged, [1, 1]);
        assert_eq!(counts.to_string(), "node0=10 node1=32 total=42");
    }

    #[test]
    fn test_concurrent_merges_are_not_lost() {
        let counters = GlobalCounters::new();
        let threads = 16u64;
        std::thread::scope(|s| {
            for t in 0..threads {
                let counters = &counters;
                s.spawn(move || {
                    for _ in 0..1_000 {
                        counters.record((t % 2) as usize, t + 1);
                    }
                });
            }
        });

        let expected_node0: u64 = (0..threads).filter(|t| t % 2 == 0).map(|t| (t + 1) * 1_000).sum();
        let expected_node1: u64 = (0..threads).filter(|t| t % 2 == 1).map(|t| (t + 1) * 1_000).sum();
        let counts = counters.snapshot();
        assert_eq!(counts.per_node, [expected_node0, expected_node1]);
        assert_eq!(counts.merged, [8_000, 8_000]);
    }
}
