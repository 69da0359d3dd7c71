// src/numa.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NUMA topology detection and worker pinning
//!
//! Uses hwlocality for topology detection when the `numa` feature is enabled and
//! falls back to the Linux sysfs node directory otherwise.

#[cfg(feature = "numa")]
use hwlocality::{object::types::ObjectType, Topology};

use crate::constants::NODE_COUNT;
use crate::error::{BenchError, Result};

/// NUMA node information
#[derive(Debug, Clone)]
pub struct NumaNode {
    /// Node ID
    pub node_id: usize,
    /// CPU IDs in this NUMA node
    pub cpus: Vec<usize>,
}

/// System NUMA topology
#[derive(Debug, Clone)]
pub struct NumaTopology {
    /// Number of NUMA nodes
    pub num_nodes: usize,
    /// Total physical cores
    pub physical_cores: usize,
    /// Total logical CPUs
    pub logical_cpus: usize,
    /// Per-NUMA node details
    pub nodes: Vec<NumaNode>,
    /// Is this a UMA system (single NUMA node)
    pub is_uma: bool,
}

impl NumaTopology {
    /// Detect NUMA topology from system using hwlocality
    #[cfg(feature = "numa")]
    pub fn detect() -> Result<Self> {
        tracing::debug!("Detecting NUMA topology via hwlocality...");

        let topology = Topology::new()
            .map_err(|e| BenchError::Topology(format!("failed to create hwloc topology: {}", e)))?;

        let numa_nodes: Vec<_> = topology.objects_with_type(ObjectType::NUMANode).collect();

        let nodes: Vec<NumaNode> = if numa_nodes.is_empty() {
            // No NUMA nodes reported - treat as single UMA node
            vec![NumaNode {
                node_id: 0,
                cpus: (0..num_cpus::get()).collect(),
            }]
        } else {
            let pu_count = topology.objects_with_type(ObjectType::PU).count();
            numa_nodes
                .iter()
                .filter_map(|node| {
                    let node_id = node.os_index()?;
                    let cpuset = node.cpuset()?;
                    let cpus: Vec<usize> = (0..pu_count)
                        .filter(|&cpu_id| cpuset.is_set(cpu_id))
                        .collect();
                    Some(NumaNode { node_id, cpus })
                })
                .collect()
        };

        Ok(Self::from_nodes(nodes))
    }

    /// Detect NUMA topology from /sys/devices/system/node
    #[cfg(not(feature = "numa"))]
    pub fn detect() -> Result<Self> {
        tracing::debug!("Detecting NUMA topology via sysfs...");
        let nodes = detect_sysfs_nodes().unwrap_or_else(|e| {
            tracing::debug!("sysfs topology unavailable ({}), assuming UMA", e);
            vec![NumaNode {
                node_id: 0,
                cpus: (0..num_cpus::get()).collect(),
            }]
        });
        Ok(Self::from_nodes(nodes))
    }

    fn from_nodes(mut nodes: Vec<NumaNode>) -> Self {
        nodes.sort_by_key(|n| n.node_id);
        let num_nodes = nodes.len().max(1);
        tracing::info!("Detected {} NUMA node(s)", num_nodes);

        Self {
            num_nodes,
            physical_cores: num_cpus::get_physical(),
            logical_cpus: num_cpus::get(),
            nodes,
            is_uma: num_nodes == 1,
        }
    }

    /// Get deployment type description
    pub fn deployment_type(&self) -> &str {
        if self.is_uma {
            "UMA (single NUMA node - cloud VM or workstation)"
        } else {
            "NUMA (multi-socket system or large cloud VM)"
        }
    }

    /// Get CPUs for a specific NUMA node
    pub fn cpus_for_node(&self, node_id: usize) -> Option<&[usize]> {
        self.nodes
            .iter()
            .find(|n| n.node_id == node_id)
            .map(|n| n.cpus.as_slice())
    }

    /// True when every harness node maps to a real NUMA node with CPUs
    pub fn covers_harness_nodes(&self) -> bool {
        (0..NODE_COUNT).all(|node| self.cpus_for_node(node).is_some_and(|c| !c.is_empty()))
    }
}

/// Read node ids and their CPU lists from sysfs
#[cfg(not(feature = "numa"))]
fn detect_sysfs_nodes() -> Result<Vec<NumaNode>> {
    let node_path = std::path::Path::new("/sys/devices/system/node");
    let entries = std::fs::read_dir(node_path)
        .map_err(|e| BenchError::Topology(format!("cannot read {}: {}", node_path.display(), e)))?;

    let mut numa_nodes = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let Some(id_str) = name_str.strip_prefix("node") else {
            continue;
        };
        let Ok(node_id) = id_str.parse::<usize>() else {
            continue;
        };

        let cpus = std::fs::read_to_string(entry.path().join("cpulist"))
            .map(|list| parse_cpu_list(list.trim()))
            .unwrap_or_default();
        numa_nodes.push(NumaNode { node_id, cpus });
    }

    if numa_nodes.is_empty() {
        return Err(BenchError::Topology("no NUMA nodes listed in sysfs".to_string()));
    }
    Ok(numa_nodes)
}

/// Parse Linux CPU list (e.g., "0-23" or "0-11,24-35")
pub fn parse_cpu_list(cpu_list: &str) -> Vec<usize> {
    let mut cpus = Vec::new();
    for range in cpu_list.split(',') {
        let range = range.trim();
        if range.is_empty() {
            continue;
        }

        if let Some((start, end)) = range.split_once('-') {
            if let (Ok(s), Ok(e)) = (start.parse::<usize>(), end.parse::<usize>()) {
                cpus.extend(s..=e);
            }
        } else if let Ok(cpu) = range.parse::<usize>() {
            cpus.push(cpu);
        }
    }
    cpus
}

/// CPUs workers of each harness node are pinned to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCpuMap {
    nodes: [Vec<usize>; NODE_COUNT],
}

impl NodeCpuMap {
    /// Build the map from the detected topology.
    ///
    /// On systems without two NUMA nodes the logical CPUs are split into two
    /// halves so the run still has two placement domains.
    pub fn detect() -> Self {
        match NumaTopology::detect() {
            Ok(topology) => {
                if let Some(map) = Self::from_topology(&topology) {
                    return map;
                }
                tracing::warn!(
                    "{} NUMA node(s) detected, splitting {} CPUs into two placement halves",
                    topology.num_nodes,
                    topology.logical_cpus
                );
            }
            Err(e) => tracing::warn!("NUMA topology detection failed: {}", e),
        }
        let cpus: Vec<usize> = (0..num_cpus::get()).collect();
        Self::split_evenly(&cpus)
    }

    /// Use NUMA nodes 0 and 1 of `topology`, if both exist and have CPUs
    pub fn from_topology(topology: &NumaTopology) -> Option<Self> {
        if !topology.covers_harness_nodes() {
            return None;
        }
        let node0 = topology.cpus_for_node(0)?.to_vec();
        let node1 = topology.cpus_for_node(1)?.to_vec();
        Some(Self {
            nodes: [node0, node1],
        })
    }

    /// First half (rounded up) to node 0, the rest to node 1.
    /// A single CPU is shared by both nodes.
    pub fn split_evenly(cpus: &[usize]) -> Self {
        let mid = cpus.len().div_ceil(NODE_COUNT);
        let (first, second) = cpus.split_at(mid);
        let second = if second.is_empty() { first } else { second };
        Self {
            nodes: [first.to_vec(), second.to_vec()],
        }
    }

    /// CPUs assigned to a node
    pub fn cpus(&self, node: usize) -> &[usize] {
        self.nodes.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// CPU for the `local_index`-th worker of `node`, wrapping around the node's CPUs
    pub fn cpu_for(&self, node: usize, local_index: usize) -> Option<usize> {
        let cpus = self.cpus(node);
        if cpus.is_empty() {
            return None;
        }
        cpus.get(local_index % cpus.len()).copied()
    }
}

/// Pin current thread to one CPU. Returns whether the pin took effect.
#[cfg(feature = "thread-pinning")]
pub fn pin_current_thread(cpu: usize) -> bool {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        tracing::debug!("Core ids unavailable, cannot pin to CPU {}", cpu);
        return false;
    };
    match core_ids.get(cpu) {
        Some(&core_id) => {
            let pinned = core_affinity::set_for_current(core_id);
            if pinned {
                tracing::trace!("Pinned thread to core {}", cpu);
            } else {
                tracing::debug!("Failed to pin thread to core {}", cpu);
            }
            pinned
        }
        None => {
            tracing::debug!("CPU {} outside the {} available cores", cpu, core_ids.len());
            false
        }
    }
}

/// Pinning is compiled out without the `thread-pinning` feature
#[cfg(not(feature = "thread-pinning"))]
pub fn pin_current_thread(cpu: usize) -> bool {
    tracing::debug!("thread-pinning feature disabled, not pinning to CPU {}", cpu);
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_tracing() {
        use tracing_subscriber::{fmt, EnvFilter};
        let _ = fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    #[test]
    fn test_detect_topology() {
        init_tracing();
        if let Ok(topology) = NumaTopology::detect() {
            println!("NUMA topology: {:?}", topology);
            assert!(topology.num_nodes >= 1);
            assert!(topology.physical_cores >= 1);
            assert!(topology.logical_cpus >= topology.physical_cores);
        }
    }

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0-1,8,10-11"), vec![0, 1, 8, 10, 11]);
        assert_eq!(parse_cpu_list(""), Vec::<usize>::new());
        assert_eq!(parse_cpu_list("x,2"), vec![2]);
    }

    #[test]
    fn test_split_evenly() {
        let map = NodeCpuMap::split_evenly(&[0, 1, 2, 3, 4]);
        assert_eq!(map.cpus(0), &[0, 1, 2]);
        assert_eq!(map.cpus(1), &[3, 4]);
        assert_eq!(map.cpu_for(1, 3), Some(4));

        let single = NodeCpuMap::split_evenly(&[0]);
        assert_eq!(single.cpus(0), &[0]);
        assert_eq!(single.cpus(1), &[0]);

        let empty = NodeCpuMap::split_evenly(&[]);
        assert_eq!(empty.cpu_for(0, 0), None);
    }

    #[test]
    fn test_from_topology_needs_two_nodes() {
        let uma = NumaTopology {
            num_nodes: 1,
            physical_cores: 2,
            logical_cpus: 4,
            nodes: vec![NumaNode {
                node_id: 0,
                cpus: vec![0, 1, 2, 3],
            }],
            is_uma: true,
        };
        assert!(NodeCpuMap::from_topology(&uma).is_none());

        let numa = NumaTopology {
            num_nodes: 2,
            physical_cores: 4,
            logical_cpus: 4,
            nodes: vec![
                NumaNode {
                    node_id: 0,
                    cpus: vec![0, 2],
                },
                NumaNode {
                    node_id: 1,
                    cpus: vec![1, 3],
                },
            ],
            is_uma: false,
        };
        let map = NodeCpuMap::from_topology(&numa).unwrap();
        assert_eq!(map.cpus(1), &[1, 3]);
        assert_eq!(map.cpu_for(0, 2), Some(0));
    }

    #[test]
    fn test_detect_cpu_map_has_cpus() {
        init_tracing();
        let map = NodeCpuMap::detect();
        assert!(!map.cpus(0).is_empty());
        assert!(!map.cpus(1).is_empty());
    }
}
