// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node records: identity, capacity, topology, and liveness.

use crate::status::NodeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One NUMA memory-affinity node: its CPU list and local memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumaNode {
    pub cores: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// NUMA node id -> core/memory assignment, as detected by the runner.
pub type NumaTopology = BTreeMap<u32, NumaNode>;

/// One GPU as inventoried by the runner (ordered by index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub gpu_id: u32,
    pub name: String,
    pub memory_total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f32>,
}

/// Latest metric snapshot from a node's heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_avg_temp: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_max_temp: Option<f32>,
}

/// A registered worker node.
///
/// Created on first registration, refreshed on re-registration and every
/// heartbeat. `hostname` is the primary identifier cluster-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub hostname: String,
    /// Base URL of the runner's HTTP API.
    pub url: String,
    /// First-seen sequence number. Assigned by the store on first
    /// registration, preserved across re-registrations; scheduler
    /// tie-breaks follow it.
    #[serde(default)]
    pub registration_order: u64,
    pub total_cores: u32,
    pub memory_total_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numa_topology: Option<NumaTopology>,
    #[serde(default)]
    pub gpu_info: Vec<GpuInfo>,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: NodeMetrics,
}

impl NodeInfo {
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}
