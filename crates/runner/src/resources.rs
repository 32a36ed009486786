// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System inventory and metrics: CPU, memory, temperatures, GPUs, NUMA.

use kr_core::{GpuInfo, NumaNode, NumaTopology};
use std::path::Path;
use tracing::{debug, warn};

/// Point-in-time metrics for a heartbeat.
#[derive(Debug, Clone, Default)]
pub struct SystemStats {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub current_avg_temp: Option<f32>,
    pub current_max_temp: Option<f32>,
}

/// Refresh and sample CPU/memory/temperature state.
pub fn system_stats(system: &mut sysinfo::System) -> SystemStats {
    system.refresh_cpu_usage();
    system.refresh_memory();

    let memory_total = system.total_memory();
    let memory_used = system.used_memory();
    let memory_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let temps: Vec<f32> = sysinfo::Components::new_with_refreshed_list()
        .iter()
        .map(|c| c.temperature())
        .filter(|t| t.is_finite())
        .collect();
    let (avg, max) = if temps.is_empty() {
        (None, None)
    } else {
        let sum: f32 = temps.iter().sum();
        let max = temps.iter().cloned().fold(f32::MIN, f32::max);
        (Some(sum / temps.len() as f32), Some(max))
    };

    SystemStats {
        cpu_percent: system.global_cpu_usage(),
        memory_percent,
        memory_used_bytes: memory_used,
        memory_total_bytes: memory_total,
        current_avg_temp: avg,
        current_max_temp: max,
    }
}

pub fn total_cores() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or_else(|_| {
        warn!("could not determine CPU count, defaulting to 4");
        4
    })
}

pub fn total_memory_bytes(system: &mut sysinfo::System) -> u64 {
    system.refresh_memory();
    system.total_memory()
}

/// Inventory GPUs via `nvidia-smi`; an empty list when the tool is absent.
pub async fn gpu_inventory() -> Vec<GpuInfo> {
    let output = tokio::process::Command::new("nvidia-smi")
        .args([
            "--query-gpu=index,name,memory.total,memory.used,utilization.gpu,temperature.gpu",
            "--format=csv,noheader,nounits",
        ])
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            parse_nvidia_smi(&String::from_utf8_lossy(&out.stdout))
        }
        Ok(out) => {
            debug!(
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "nvidia-smi failed, reporting no GPUs"
            );
            Vec::new()
        }
        Err(_) => Vec::new(),
    }
}

/// Parse `nvidia-smi` CSV rows: `index, name, mem_total, mem_used, util, temp`.
pub(crate) fn parse_nvidia_smi(output: &str) -> Vec<GpuInfo> {
    const MIB: u64 = 1024 * 1024;
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 6 {
                return None;
            }
            Some(GpuInfo {
                gpu_id: fields[0].parse().ok()?,
                name: fields[1].to_string(),
                memory_total_bytes: fields[2].parse::<u64>().ok()? * MIB,
                memory_used_bytes: fields[3].parse::<u64>().ok().map(|m| m * MIB),
                utilization_percent: fields[4].parse().ok(),
                temperature_c: fields[5].parse().ok(),
            })
        })
        .collect()
}

/// Detect NUMA topology by parsing `numactl --hardware` output.
///
/// `None` when numactl is missing, fails, or reports no nodes.
pub fn detect_numa_topology(numactl_path: &Path) -> Option<NumaTopology> {
    let output = std::process::Command::new(numactl_path).arg("-H").output();
    match output {
        Ok(out) if out.status.success() => {
            let topology = parse_numactl_hardware(&String::from_utf8_lossy(&out.stdout));
            match &topology {
                Some(t) => tracing::info!(nodes = t.len(), "detected NUMA topology"),
                None => tracing::info!("no NUMA nodes detected"),
            }
            topology
        }
        Ok(out) => {
            warn!(
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "numactl -H failed, skipping NUMA detection"
            );
            None
        }
        Err(e) => {
            warn!(path = %numactl_path.display(), error = %e, "numactl not runnable");
            None
        }
    }
}

/// Parse `numactl -H` lines like:
///
/// ```text
/// node 0 cpus: 0 1 2 3
/// node 0 size: 64215 MB
/// ```
pub(crate) fn parse_numactl_hardware(output: &str) -> Option<NumaTopology> {
    let mut topology = NumaTopology::new();

    for line in output.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix("node ") else { continue };

        if let Some((id_str, cpus)) = rest.split_once(" cpus:") {
            let Ok(node_id) = id_str.trim().parse::<u32>() else { continue };
            let cores: Vec<u32> = cpus.split_whitespace().filter_map(|c| c.parse().ok()).collect();
            topology.insert(node_id, NumaNode { cores, memory_bytes: None });
        } else if let Some((id_str, size)) = rest.split_once(" size:") {
            let Ok(node_id) = id_str.trim().parse::<u32>() else { continue };
            if let Some(node) = topology.get_mut(&node_id) {
                node.memory_bytes = parse_mem_size(size.trim());
            }
        }
    }

    if topology.is_empty() {
        None
    } else {
        Some(topology)
    }
}

fn parse_mem_size(size: &str) -> Option<u64> {
    let mut parts = size.split_whitespace();
    let value: u64 = parts.next()?.parse().ok()?;
    let unit = parts.next().unwrap_or("MB");
    match unit.to_ascii_uppercase().as_str() {
        "GB" => Some(value * 1024 * 1024 * 1024),
        "MB" => Some(value * 1024 * 1024),
        "KB" => Some(value * 1024),
        _ => Some(value),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod tests;
