// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON DTOs for the HTTP control plane.

use chrono::{DateTime, Utc};
use kr_core::{GpuInfo, NodeStatus, NumaTopology, SshKeyMode, TaskId, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Generic acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// `POST /register` — runner announcing itself and its inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub hostname: String,
    pub url: String,
    pub total_cores: u32,
    pub total_ram_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numa_topology: Option<NumaTopology>,
    #[serde(default)]
    pub gpu_info: Vec<GpuInfo>,
}

/// One out-of-band container death reported through a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KilledTask {
    pub task_id: TaskId,
    /// e.g. `"oom"`.
    pub reason: String,
}

/// `PUT /heartbeat/{hostname}` payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub running_tasks: Vec<TaskId>,
    #[serde(default)]
    pub killed_tasks: Vec<KilledTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_avg_temp: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_max_temp: Option<f32>,
    #[serde(default)]
    pub gpu_info: Vec<GpuInfo>,
}

/// `POST /submit` — one submission, fanned out over `targets`.
///
/// For VPS submissions `command` carries the SSH public key (or is empty
/// for `disabled`/`none` key modes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_type: TaskType,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    #[serde(default = "default_required_cores")]
    pub required_cores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_memory_bytes: Option<u64>,
    /// One GPU index list per target; empty means no GPUs anywhere.
    #[serde(default)]
    pub required_gpus: Vec<Vec<u32>>,
    /// `host[:numa][::gpu,...]` strings; empty lets the scheduler pick.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Environment name; `"NULL"` is the explicit no-container sentinel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_mounts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_mode: Option<SshKeyMode>,
}

fn default_required_cores() -> u32 {
    1
}

/// A target the scheduler could not place, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedTarget {
    pub target: String,
    pub reason: String,
}

/// `POST /submit` response: what was created and what was not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub message: String,
    pub task_ids: Vec<TaskId>,
    #[serde(default)]
    pub failed_targets: Vec<FailedTarget>,
}

/// `POST /update` — runner -> host status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u16>,
}

impl StatusUpdate {
    pub fn new(task_id: TaskId, status: TaskStatus) -> Self {
        Self {
            task_id,
            status,
            exit_code: None,
            message: None,
            started_at: None,
            completed_at: None,
            ssh_port: None,
        }
    }
}

/// `POST /kill`, `/pause`, `/resume` on a runner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ControlRequest {
    pub task_id: TaskId,
}

/// `POST /execute` on a runner — everything needed to launch a command task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub required_cores: u32,
    #[serde(default)]
    pub required_gpus: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_numa_node_id: Option<u32>,
    /// Environment name; the runner derives the image tag.
    pub container_name: String,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub mount_dirs: Vec<String>,
    pub working_dir: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// `POST /vps/create` on a runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpsSpec {
    pub task_id: TaskId,
    pub required_cores: u32,
    #[serde(default)]
    pub required_gpus: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_numa_node_id: Option<u32>,
    pub container_name: String,
    pub ssh_key_mode: SshKeyMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,
    /// Tentative port the host reserved; the actual published port may differ.
    pub ssh_port: u16,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub mount_dirs: Vec<String>,
}

/// Runner's answer to `POST /vps/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpsCreateResponse {
    /// Actual published SSH port; 0 when the VPS is TTY-only.
    pub ssh_port: u16,
    pub container_name: String,
}

/// One row of `GET /nodes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusEntry {
    pub hostname: String,
    pub url: String,
    pub total_cores: u32,
    pub cores_in_use: u32,
    pub available_cores: u32,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numa_topology: Option<NumaTopology>,
    #[serde(default)]
    pub gpu_info: Vec<GpuInfo>,
}

/// Per-node health as carried in a [`HealthSample`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub hostname: String,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_bytes: Option<u64>,
    pub memory_total_bytes: u64,
    pub total_cores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_avg_temp: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_max_temp: Option<f32>,
    #[serde(default)]
    pub gpu_info: Vec<GpuInfo>,
}

/// Cluster-wide rollup computed by the health collation loop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AggregateHealth {
    pub total_nodes: u32,
    pub online_nodes: u32,
    pub total_cores: u32,
    pub total_mem_bytes: u64,
    pub used_mem_bytes: u64,
    pub avg_cpu_percent: f32,
    pub avg_mem_percent: f32,
    pub max_avg_cpu_temp: f32,
    pub max_max_cpu_temp: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// One collation sample: every node plus the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    pub nodes: BTreeMap<String, NodeHealth>,
    pub aggregate: AggregateHealth,
}

/// `GET /health` response: latest sample plus up to 60 samples of history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<HealthSample>,
    #[serde(default)]
    pub history: Vec<HealthSample>,
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
