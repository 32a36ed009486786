// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for host-side tests.

use crate::state::HostState;
use chrono::Utc;
use kr_core::{
    HostConfig, NodeInfo, NodeMetrics, NodeStatus, SshKeyMode, Task, TaskBody, TaskId, TaskStatus,
};
use std::path::PathBuf;
use std::sync::Arc;

/// A host state backed by a temp-dir store. Keep the `TempDir` alive for
/// the duration of the test.
pub fn make_state() -> (tempfile::TempDir, Arc<HostState>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = HostConfig::default();
    config.paths.db_file = dir.path().join("host.db");
    config.paths.shared_dir = dir.path().to_path_buf();
    let state = HostState::new(config).expect("host state");
    (dir, Arc::new(state))
}

pub fn make_node(hostname: &str, cores: u32) -> NodeInfo {
    NodeInfo {
        hostname: hostname.to_string(),
        url: format!("http://{hostname}:8001"),
        registration_order: 0,
        total_cores: cores,
        memory_total_bytes: 64_000_000_000,
        numa_topology: None,
        gpu_info: Vec::new(),
        status: NodeStatus::Online,
        last_heartbeat: Some(Utc::now()),
        metrics: NodeMetrics::default(),
    }
}

pub fn make_command_task(id: u64, node: &str, cores: u32, status: TaskStatus) -> Task {
    Task {
        task_id: TaskId(id),
        batch_id: TaskId(id),
        command: "sleep".to_string(),
        arguments: vec!["60".to_string()],
        env_vars: Default::default(),
        required_cores: cores,
        required_memory_bytes: None,
        required_gpus: Vec::new(),
        target_numa_node_id: None,
        assigned_node: Some(node.to_string()),
        container_name: Some("kohakuriver-base".to_string()),
        docker_image_tag: Some("kohakuriver/kohakuriver-base:base".to_string()),
        privileged: false,
        mount_dirs: Vec::new(),
        status,
        exit_code: None,
        error_message: None,
        submitted_at: Utc::now(),
        started_at: None,
        completed_at: None,
        assignment_suspicion_count: 0,
        body: TaskBody::Command {
            stdout_path: PathBuf::from(format!("/shared/logs/{id}/stdout.log")),
            stderr_path: PathBuf::from(format!("/shared/logs/{id}/stderr.log")),
            working_dir: "/shared".to_string(),
        },
    }
}

pub fn make_vps_task(id: u64, node: &str, status: TaskStatus, ssh_port: Option<u16>) -> Task {
    let mut task = make_command_task(id, node, 1, status);
    task.body = TaskBody::Vps { ssh_port, ssh_key_mode: SshKeyMode::Upload };
    task
}
