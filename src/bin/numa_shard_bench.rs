// src/bin/numa_shard_bench.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command line driver: one run per invocation, one CSV record on stdout

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use numa_shard_bench::constants::*;
use numa_shard_bench::{
    run_benchmark, AllocationPolicy, BenchConfig, NumaTopology, Prefill, StructureKind,
    ThreadPlacement, REPORT_HEADER,
};

#[derive(Parser, Debug)]
#[command(name = "numa-shard-bench")]
#[command(about = "Throughput of lock-protected data-structure shards across two NUMA nodes")]
struct Args {
    /// Data structure held by every shard (stack, queue, bst, linked_list)
    #[arg(short = 'k', long, default_value = "stack")]
    structure: StructureKind,

    /// Shard memory placement (affine or default)
    #[arg(short = 'a', long, default_value = "default")]
    allocation: AllocationPolicy,

    /// Worker thread placement (pinned, unpinned or interleaved)
    #[arg(short = 'p', long, default_value = "unpinned")]
    placement: ThreadPlacement,

    /// Shards per node
    #[arg(short = 's', long, default_value_t = DEFAULT_SHARD_COUNT)]
    shards: usize,

    /// Total worker threads, split across both nodes
    #[arg(short = 't', long, default_value_t = DEFAULT_WORKER_COUNT)]
    threads: usize,

    /// Measurement window in seconds
    #[arg(short = 'd', long, default_value_t = DEFAULT_DURATION_SECS)]
    duration_secs: u64,

    /// Seed shared by all worker generators
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Percent chance per operation of targeting the other node
    #[arg(short = 'x', long, default_value_t = 0)]
    crossover: u32,

    /// Values are drawn from 0..key_range
    #[arg(long, default_value_t = DEFAULT_KEY_RANGE)]
    key_range: u64,

    /// Prefill this percentage of each node's shards before measuring
    #[arg(long)]
    prefill_percent: Option<u32>,

    /// Insert operations per prefilled shard
    #[arg(long, default_value_t = DEFAULT_PREFILL_VALUES)]
    prefill_values: usize,

    /// Print the CSV header before the record
    #[arg(long)]
    header: bool,

    /// Print the detected NUMA topology and exit
    #[arg(long)]
    show_topology: bool,
}

impl Args {
    fn to_config(&self) -> BenchConfig {
        BenchConfig {
            structure_kind: self.structure,
            allocation_policy: self.allocation,
            thread_placement: self.placement,
            shard_count: self.shards,
            worker_count: self.threads,
            duration_secs: self.duration_secs,
            seed: self.seed,
            crossover_percent: self.crossover,
            key_range: self.key_range,
            prefill: self.prefill_percent.map(|shard_percent| Prefill {
                shard_percent,
                values_per_shard: self.prefill_values,
            }),
        }
    }
}

fn show_topology() -> Result<()> {
    let topology = NumaTopology::detect().context("topology detection failed")?;
    println!("Deployment: {}", topology.deployment_type());
    println!(
        "Physical cores: {}, logical CPUs: {}",
        topology.physical_cores, topology.logical_cpus
    );
    for node in &topology.nodes {
        println!("  node {}: {} CPUs {:?}", node.node_id, node.cpus.len(), node.cpus);
    }
    if !topology.covers_harness_nodes() {
        println!("Note: nodes 0 and 1 are not both present, affine allocation will fail");
    }
    Ok(())
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.show_topology {
        return show_topology();
    }

    let config = args.to_config();
    tracing::debug!("Configuration: {:?}", config);

    let report = run_benchmark(&config).context("benchmark run failed")?;
    if args.header {
        println!("{}", REPORT_HEADER);
    }
    println!("{}", report);
    Ok(())
}
