// src/alloc.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory-affinity provider
//!
//! Shard instances live in memory handed out by a [`NodeAllocator`]. The
//! affine provider binds that memory to a NUMA node through hwlocality; the
//! default provider uses the global allocator. Allocation only happens while a
//! pool is built and release only when it is torn down, never per operation.

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

#[cfg(feature = "numa")]
use std::sync::Arc;

#[cfg(feature = "numa")]
use hwlocality::{
    memory::binding::{MemoryBindingFlags, MemoryBindingPolicy},
    Topology,
};

use crate::config::AllocationPolicy;
#[cfg(feature = "numa")]
use crate::constants::MAX_NODE_ALIGN;
use crate::error::{BenchError, Result};

/// Source of node-placed memory for shard instances
pub trait NodeAllocator: Send + Sync + fmt::Debug {
    /// Allocate `layout` on `node`. Dropping the returned handle releases it.
    fn allocate(&self, node: usize, layout: Layout) -> Result<NodeMemory>;

    /// Short name used in logs and reports
    fn name(&self) -> &'static str;
}

enum Backing {
    /// Zero-sized layout, nothing to release
    Empty,
    /// Global allocator
    Heap,
    /// hwloc-bound memory. `bytes` borrows `topology`, so it is declared first
    /// and dropped first.
    #[cfg(feature = "numa")]
    Bound {
        bytes: hwlocality::memory::binding::Bytes<'static>,
        topology: Arc<Topology>,
    },
}

/// Owned handle to memory placed on one node
pub struct NodeMemory {
    ptr: NonNull<u8>,
    layout: Layout,
    node: usize,
    backing: Backing,
}

// SAFETY: NodeMemory exclusively owns its allocation; nothing else aliases it.
unsafe impl Send for NodeMemory {}
// SAFETY: shared access only exposes the pointer value and metadata.
unsafe impl Sync for NodeMemory {}

impl NodeMemory {
    fn empty(node: usize, layout: Layout) -> Self {
        Self {
            // Dangling but aligned, never dereferenced for zero-sized layouts
            ptr: NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling()),
            layout,
            node,
            backing: Backing::Empty,
        }
    }

    /// Start of the allocation
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Layout this memory was requested with
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Node the memory was requested on
    pub fn node(&self) -> usize {
        self.node
    }

    /// Whether the memory is bound to its node (as opposed to plain heap memory)
    pub fn is_node_bound(&self) -> bool {
        match self.backing {
            #[cfg(feature = "numa")]
            Backing::Bound { .. } => true,
            Backing::Empty | Backing::Heap => false,
        }
    }
}

impl Drop for NodeMemory {
    fn drop(&mut self) {
        match self.backing {
            Backing::Heap => {
                tracing::trace!(
                    "Releasing {} heap bytes of node {}",
                    self.layout.size(),
                    self.node
                );
                // SAFETY: allocated by `std::alloc::alloc` with exactly this layout.
                unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) }
            }
            // hwloc frees the binding when `bytes` drops
            #[cfg(feature = "numa")]
            Backing::Bound { .. } => {
                tracing::trace!(
                    "Releasing {} bound bytes of node {}",
                    self.layout.size(),
                    self.node
                );
            }
            Backing::Empty => {}
        }
    }
}

impl fmt::Debug for NodeMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeMemory")
            .field("node", &self.node)
            .field("size", &self.layout.size())
            .field("bound", &self.is_node_bound())
            .finish()
    }
}

/// Unbound allocation through the global allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl NodeAllocator for HeapAllocator {
    fn allocate(&self, node: usize, layout: Layout) -> Result<NodeMemory> {
        if layout.size() == 0 {
            return Ok(NodeMemory::empty(node, layout));
        }
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| BenchError::Allocation {
            node,
            size: layout.size(),
            reason: "global allocator returned null".to_string(),
        })?;
        Ok(NodeMemory {
            ptr,
            layout,
            node,
            backing: Backing::Heap,
        })
    }

    fn name(&self) -> &'static str {
        "heap"
    }
}

/// Memory bound to a NUMA node with hwlocality
#[cfg(feature = "numa")]
#[derive(Debug)]
pub struct HwlocAllocator {
    topology: Arc<Topology>,
}

#[cfg(feature = "numa")]
impl HwlocAllocator {
    /// Load the topology once; every allocation shares it
    pub fn new() -> Result<Self> {
        let topology = Topology::new()
            .map_err(|e| BenchError::Topology(format!("failed to create hwloc topology: {}", e)))?;
        Ok(Self {
            topology: Arc::new(topology),
        })
    }

    /// Check that every harness node exists before any shard is built
    pub fn ensure_nodes(&self, nodes: usize) -> Result<()> {
        use hwlocality::object::types::ObjectType;

        for node_id in 0..nodes {
            let found = self
                .topology
                .objects_with_type(ObjectType::NUMANode)
                .any(|n| n.os_index() == Some(node_id));
            if !found {
                return Err(BenchError::Topology(format!(
                    "NUMA node {} not present, affine allocation needs {} nodes",
                    node_id, nodes
                )));
            }
        }
        Ok(())
    }
}

#[cfg(feature = "numa")]
impl NodeAllocator for HwlocAllocator {
    fn allocate(&self, node_id: usize, layout: Layout) -> Result<NodeMemory> {
        use hwlocality::object::types::ObjectType;

        if layout.size() == 0 {
            return Ok(NodeMemory::empty(node_id, layout));
        }
        let alloc_err = |reason: String| BenchError::Allocation {
            node: node_id,
            size: layout.size(),
            reason,
        };
        // hwloc hands out page-aligned memory
        if layout.align() > MAX_NODE_ALIGN {
            return Err(alloc_err(format!(
                "alignment {} exceeds page alignment",
                layout.align()
            )));
        }

        let node = self
            .topology
            .objects_with_type(ObjectType::NUMANode)
            .find(|n| n.os_index() == Some(node_id))
            .ok_or_else(|| alloc_err("NUMA node not found".to_string()))?;
        let nodeset = node
            .nodeset()
            .ok_or_else(|| alloc_err("NUMA node has no nodeset".to_string()))?;

        tracing::trace!(
            "Allocating {} bytes on NUMA node {} with nodeset {:?}",
            layout.size(),
            node_id,
            nodeset
        );

        let mut bytes = self
            .topology
            .binding_allocate_memory(
                layout.size(),
                nodeset,
                MemoryBindingPolicy::Bind,
                MemoryBindingFlags::ASSUME_SINGLE_THREAD,
            )
            .map_err(|e| alloc_err(format!("hwloc binding allocation failed: {}", e)))?;

        let ptr = NonNull::new(bytes.as_mut_ptr() as *mut u8)
            .ok_or_else(|| alloc_err("hwloc returned null".to_string()))?;

        // SAFETY: Bytes borrows the topology. The topology lives in an Arc that
        // NodeMemory keeps alive for as long as the bytes exist.
        let bytes_static = unsafe {
            std::mem::transmute::<
                hwlocality::memory::binding::Bytes<'_>,
                hwlocality::memory::binding::Bytes<'static>,
            >(bytes)
        };

        Ok(NodeMemory {
            ptr,
            layout,
            node: node_id,
            backing: Backing::Bound {
                bytes: bytes_static,
                topology: Arc::clone(&self.topology),
            },
        })
    }

    fn name(&self) -> &'static str {
        "hwloc-bind"
    }
}

/// Build the provider for an allocation policy.
///
/// `affine` fails when the topology cannot supply `nodes` NUMA nodes.
pub fn allocator_for(policy: AllocationPolicy, nodes: usize) -> Result<Box<dyn NodeAllocator>> {
    match policy {
        AllocationPolicy::Default => Ok(Box::new(HeapAllocator)),
        #[cfg(feature = "numa")]
        AllocationPolicy::Affine => {
            let allocator = HwlocAllocator::new()?;
            allocator.ensure_nodes(nodes)?;
            tracing::info!("Affine allocation: binding shards to {} NUMA nodes", nodes);
            Ok(Box::new(allocator))
        }
        #[cfg(not(feature = "numa"))]
        AllocationPolicy::Affine => Err(BenchError::Topology(format!(
            "affine allocation over {} nodes requires the `numa` feature",
            nodes
        ))),
    }
}

/// A value placed in node memory; the Rust counterpart of a node-specialised `new`
pub struct NodeBox<T> {
    ptr: NonNull<T>,
    memory: NodeMemory,
    _marker: PhantomData<T>,
}

// SAFETY: NodeBox owns its T like Box does.
unsafe impl<T: Send> Send for NodeBox<T> {}
// SAFETY: shared references only hand out &T.
unsafe impl<T: Sync> Sync for NodeBox<T> {}

impl<T> NodeBox<T> {
    /// Move `value` into memory allocated on `node`
    pub fn new_in(value: T, node: usize, allocator: &dyn NodeAllocator) -> Result<Self> {
        let layout = Layout::new::<T>();
        let memory = allocator.allocate(node, layout)?;
        let ptr = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            NonNull::new(memory.as_ptr().cast::<T>()).ok_or_else(|| BenchError::Allocation {
                node,
                size: layout.size(),
                reason: "provider returned null".to_string(),
            })?
        };
        // SAFETY: ptr is valid for writes of T, aligned per layout, and uninitialised.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self {
            ptr,
            memory,
            _marker: PhantomData,
        })
    }

    /// Node the value lives on
    pub fn node(&self) -> usize {
        self.memory.node()
    }

    /// Whether the value's memory is bound to its node
    pub fn is_node_bound(&self) -> bool {
        self.memory.is_node_bound()
    }
}

impl<T> Deref for NodeBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialised in new_in and valid until drop.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for NodeBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: initialised in new_in; &mut self guarantees exclusivity.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for NodeBox<T> {
    fn drop(&mut self) {
        // SAFETY: the value is initialised and dropped exactly once; `memory`
        // is released afterwards when the field drops.
        unsafe { std::ptr::drop_in_place(self.ptr.as_ptr()) }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeBox")
            .field("node", &self.node())
            .field("value", &**self)
            .finish()
    }
}
