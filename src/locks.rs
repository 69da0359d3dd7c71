// src/locks.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shard lock table
//!
//! Pairs every shard with exactly one mutex. Each shard is moved into its
//! `Mutex`, so the lock for `(node, index)` is the only way to reach the shard
//! and always the same lock for the whole run.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::alloc::NodeBox;
use crate::constants::NODE_COUNT;
use crate::containers::Shard;
use crate::error::{BenchError, Result};
use crate::pool::ShardPool;

type Slot<S> = Mutex<NodeBox<S>>;

/// Both node pools, each shard behind its own lock
#[derive(Debug)]
pub struct ShardTable<S> {
    nodes: [Vec<Slot<S>>; NODE_COUNT],
}

/// Outcome of destroying a table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRelease {
    /// Shards destroyed per node
    pub destroyed: [usize; NODE_COUNT],
    /// `(node, index)` of shards whose lock was poisoned
    pub poisoned: Vec<(usize, usize)>,
}

impl<S: Shard> ShardTable<S> {
    /// Wrap the pools of node 0 and node 1
    pub fn from_pools(pools: [ShardPool<S>; NODE_COUNT]) -> Result<Self> {
        for (expected, pool) in pools.iter().enumerate() {
            if pool.node() != expected {
                return Err(BenchError::InvalidConfig(format!(
                    "pool for node {} supplied in slot {}",
                    pool.node(),
                    expected
                )));
            }
        }
        let nodes = pools.map(|pool| pool.into_shards().into_iter().map(Mutex::new).collect());
        Ok(Self { nodes })
    }

    /// Shards on `node`
    pub fn shard_count(&self, node: usize) -> usize {
        self.nodes.get(node).map_or(0, Vec::len)
    }

    /// The lock guarding shard `index` of `node`
    pub fn lock_for(&self, node: usize, index: usize) -> Option<&Mutex<NodeBox<S>>> {
        self.nodes.get(node)?.get(index)
    }

    /// Run `f` on the shard with its lock held; the lock is released on return
    #[inline]
    pub fn with_shard<R>(
        &self,
        node: usize,
        index: usize,
        f: impl FnOnce(&mut S) -> R,
    ) -> Result<R> {
        let slot = self
            .lock_for(node, index)
            .ok_or_else(|| {
                BenchError::InvalidConfig(format!("no shard {} on node {}", index, node))
            })?;
        let mut guard: MutexGuard<'_, NodeBox<S>> = slot
            .lock()
            .map_err(|_| BenchError::ShardPoisoned { node, index })?;
        Ok(f(&mut guard))
    }

    /// Destroy every shard in pool order (node 0 first), each with its lock.
    ///
    /// Poisoned shards are still destroyed; they are listed in the result.
    pub fn destroy(self) -> TableRelease {
        let mut release = TableRelease::default();
        for (node, slots) in self.nodes.into_iter().enumerate() {
            for (index, slot) in slots.into_iter().enumerate() {
                let shard = slot.into_inner().unwrap_or_else(|poisoned| {
                    release.poisoned.push((node, index));
                    PoisonError::into_inner(poisoned)
                });
                drop(shard);
                release.destroyed[node] += 1;
            }
            tracing::debug!("Destroyed {} shards on node {}", release.destroyed[node], node);
        }
        release
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::HeapAllocator;
    use crate::config::StructureKind;
    use crate::containers::{Container, OpOutcome, Operation};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn table(count: usize, kind: StructureKind) -> ShardTable<Container> {
        let pools = [
            ShardPool::create(0, count, kind, &HeapAllocator).unwrap(),
            ShardPool::create(1, count, kind, &HeapAllocator).unwrap(),
        ];
        ShardTable::from_pools(pools).unwrap()
    }

    /// Flags overlapping calls to `apply`
    struct ProbeShard {
        inside: AtomicBool,
        overlaps: Arc<AtomicUsize>,
        calls: usize,
    }

    impl Shard for ProbeShard {
        fn apply(&mut self, _op: Operation, _value: u64) -> OpOutcome {
            if self.inside.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.calls += 1;
            std::hint::spin_loop();
            self.inside.store(false, Ordering::SeqCst);
            OpOutcome::Inserted
        }

        fn len(&self) -> usize {
            self.calls
        }
    }

    #[test]
    fn test_lock_identity_is_stable() {
        let table = table(3, StructureKind::Stack);
        assert_eq!(table.shard_count(0), 3);
        assert_eq!(table.shard_count(1), 3);
        let first = table.lock_for(1, 2).unwrap() as *const _;
        let second = table.lock_for(1, 2).unwrap() as *const _;
        assert_eq!(first, second);
        assert!(table.lock_for(0, 3).is_none());
        assert!(table.lock_for(2, 0).is_none());
    }

    #[test]
    fn test_with_shard_applies_operation() {
        let table = table(2, StructureKind::Stack);
        table
            .with_shard(0, 1, |s| s.apply(Operation::Insert, 5))
            .unwrap();
        let popped = table
            .with_shard(0, 1, |s| s.apply(Operation::Remove, 0))
            .unwrap();
        assert_eq!(popped, OpOutcome::Removed(Some(5)));
        assert!(table.with_shard(1, 9, |s| s.len()).is_err());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let overlaps = Arc::new(AtomicUsize::new(0));
        let pools = [0, 1].map(|node| {
            ShardPool::create_with(node, 1, &HeapAllocator, |_| ProbeShard {
                inside: AtomicBool::new(false),
                overlaps: Arc::clone(&overlaps),
                calls: 0,
            })
            .unwrap()
        });
        let table = ShardTable::from_pools(pools).unwrap();

        let threads = 8;
        let per_thread = 5_000;
        std::thread::scope(|s| {
            for _ in 0..threads {
                s.spawn(|| {
                    for i in 0..per_thread {
                        table
                            .with_shard(0, 0, |shard| shard.apply(Operation::Insert, i))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(
            table.with_shard(0, 0, |shard| shard.len()).unwrap(),
            threads * per_thread as usize
        );
    }

    #[test]
    fn test_poisoned_shard_is_reported_and_destroyed() {
        let table = table(2, StructureKind::Queue);
        std::thread::scope(|s| {
            let handle = s.spawn(|| {
                let _ = table.with_shard(1, 0, |_| panic!("worker died holding the lock"));
            });
            assert!(handle.join().is_err());
        });

        assert!(matches!(
            table.with_shard(1, 0, |s| s.len()),
            Err(BenchError::ShardPoisoned { node: 1, index: 0 })
        ));

        let release = table.destroy();
        assert_eq!(release.destroyed, [2, 2]);
        assert_eq!(release.poisoned, vec![(1, 0)]);
    }

    #[test]
    fn test_pools_must_match_nodes() {
        let pools = [
            ShardPool::create(1, 1, StructureKind::Stack, &HeapAllocator).unwrap(),
            ShardPool::create(0, 1, StructureKind::Stack, &HeapAllocator).unwrap(),
        ];
        assert!(ShardTable::from_pools(pools).is_err());
    }
}
