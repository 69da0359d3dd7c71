// src/pool.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Node-affine instance pools
//!
//! A pool is the fixed set of shards owned by one NUMA node. Creation is
//! all-or-nothing: if the provider fails part way, the shards already placed
//! are dropped (and their memory released) before the error is returned.

use crate::alloc::{NodeAllocator, NodeBox};
use crate::config::StructureKind;
use crate::constants::NODE_COUNT;
use crate::containers::{Container, Shard};
use crate::error::{BenchError, Result};

/// Fixed-size sequence of shards placed on one node
#[derive(Debug)]
pub struct ShardPool<S> {
    node: usize,
    shards: Vec<NodeBox<S>>,
}

impl ShardPool<Container> {
    /// Pool of `count` empty containers of `kind` on `node`
    pub fn create(
        node: usize,
        count: usize,
        kind: StructureKind,
        allocator: &dyn NodeAllocator,
    ) -> Result<Self> {
        Self::create_with(node, count, allocator, |_| Container::new(kind))
    }
}

impl<S: Shard> ShardPool<S> {
    /// Pool of `count` shards built by `make(index)` on `node`
    pub fn create_with<F>(
        node: usize,
        count: usize,
        allocator: &dyn NodeAllocator,
        mut make: F,
    ) -> Result<Self>
    where
        F: FnMut(usize) -> S,
    {
        if node >= NODE_COUNT {
            return Err(BenchError::InvalidConfig(format!(
                "node {} out of range (harness uses {} nodes)",
                node, NODE_COUNT
            )));
        }

        tracing::debug!(
            "Creating pool on node {}: {} shards via {} allocator",
            node,
            count,
            allocator.name()
        );

        let mut shards = Vec::with_capacity(count);
        for index in 0..count {
            match NodeBox::new_in(make(index), node, allocator) {
                Ok(shard) => shards.push(shard),
                Err(e) => {
                    tracing::error!(
                        "Pool creation on node {} failed at shard {}/{}: {}",
                        node,
                        index,
                        count,
                        e
                    );
                    // `shards` drops here, releasing everything placed so far
                    return Err(e);
                }
            }
        }

        Ok(Self { node, shards })
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Hand the shards over in index order
    pub fn into_shards(self) -> Vec<NodeBox<S>> {
        self.shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{HeapAllocator, NodeMemory};
    use crate::containers::{OpOutcome, Operation};
    use std::alloc::Layout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails every allocation after the first `limit`
    #[derive(Debug)]
    struct FlakyAllocator {
        limit: usize,
        served: AtomicUsize,
    }

    impl NodeAllocator for FlakyAllocator {
        fn allocate(&self, node: usize, layout: Layout) -> Result<NodeMemory> {
            if self.served.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(BenchError::Allocation {
                    node,
                    size: layout.size(),
                    reason: "test limit reached".to_string(),
                });
            }
            HeapAllocator.allocate(node, layout)
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    struct Tracked {
        live: Arc<AtomicUsize>,
    }

    impl Tracked {
        fn new(live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Self {
                live: Arc::clone(live),
            }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Shard for Tracked {
        fn apply(&mut self, _op: Operation, _value: u64) -> OpOutcome {
            OpOutcome::Unsupported
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_create_pool() {
        let pool = ShardPool::create(1, 4, StructureKind::Queue, &HeapAllocator).unwrap();
        assert_eq!(pool.node(), 1);
        assert_eq!(pool.len(), 4);
        let shards = pool.into_shards();
        assert!(shards
            .iter()
            .all(|shard| shard.kind() == StructureKind::Queue && shard.is_empty() && shard.node() == 1));
    }

    #[test]
    fn test_empty_pool() {
        let pool = ShardPool::create(0, 0, StructureKind::Bst, &HeapAllocator).unwrap();
        assert!(pool.is_empty());
        assert!(pool.into_shards().is_empty());
    }

    #[test]
    fn test_partial_pool_is_released_on_failure() {
        let live = Arc::new(AtomicUsize::new(0));
        let allocator = FlakyAllocator {
            limit: 3,
            served: AtomicUsize::new(0),
        };

        let result = ShardPool::create_with(0, 8, &allocator, |_| Tracked::new(&live));
        assert!(matches!(
            result,
            Err(BenchError::Allocation { node: 0, .. })
        ));
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(allocator.served.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_rejects_unknown_node() {
        let result = ShardPool::create(NODE_COUNT, 1, StructureKind::Stack, &HeapAllocator);
        assert!(matches!(result, Err(BenchError::InvalidConfig(_))));
    }
}
