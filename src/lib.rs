// src/lib.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NUMA-sharded throughput harness for lock-protected data structures
//!
//! This library provides:
//! - Two node-affine pools of single-threaded containers (stack, queue, BST, linked list)
//! - One mutex per shard, reachable only through the shard lock table
//! - Deterministic Xoshiro256++ workload streams shared by all workers of a run
//! - Barrier-coordinated worker threads with a fixed measurement window
//! - Per-node operation counters merged under one global lock
//! - Teardown in pool order, each shard released together with its lock
//! - hwloc memory binding and CPU pinning (optional features)

// Core modules
pub mod alloc;
pub mod config;
pub mod constants;
pub mod containers;
pub mod error;
pub mod numa;
pub mod workload;

// Run machinery
pub mod bench;
pub mod coordinator;
pub mod counters;
pub mod lifecycle;
pub mod locks;
pub mod pool;
pub mod worker;

// Re-export main API
pub use bench::{run_benchmark, run_with_context, BenchReport, REPORT_HEADER};
pub use config::{AllocationPolicy, BenchConfig, Prefill, StructureKind, ThreadPlacement};
pub use containers::{Container, OpOutcome, Operation, Shard};
pub use error::{BenchError, Result};
pub use lifecycle::{teardown, BenchmarkContext, TeardownReport};
pub use numa::{NodeCpuMap, NumaNode, NumaTopology};
pub use workload::{Step, WorkloadGenerator};
