// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submission handling: validation, node selection, allocation, dispatch.
//!
//! A submission fans out over its targets; each target succeeds or fails
//! independently, sharing the first successful task id as `batch_id`. No
//! records are created when validation fails the whole request.

use crate::dispatch;
use crate::state::HostState;
use chrono::Utc;
use kr_core::{
    ApiError, NodeInfo, SshKeyMode, Target, Task, TaskBody, TaskId, TaskStatus, TaskType,
};
use kr_wire::{FailedTarget, SubmitRequest, SubmitResponse, TaskSpec, VpsSpec};
use std::sync::Arc;
use tracing::{info, warn};

/// Container sentinel meaning "no explicit environment".
const NULL_CONTAINER: &str = "NULL";

pub async fn submit(state: &Arc<HostState>, req: SubmitRequest) -> Result<SubmitResponse, ApiError> {
    let is_vps = req.task_type == TaskType::Vps;

    // Request-level validation: nothing is created past a failure here.
    if is_vps && req.container_name.as_deref() == Some(NULL_CONTAINER) {
        return Err(ApiError::Validation("VPS tasks require a container environment.".into()));
    }
    if is_vps && req.targets.len() > 1 {
        return Err(ApiError::Validation(
            "VPS tasks cannot be submitted to multiple targets.".into(),
        ));
    }
    if !req.required_gpus.is_empty() && req.targets.is_empty() {
        return Err(ApiError::Validation(
            "GPU tasks require an explicit target node.".into(),
        ));
    }
    if !req.required_gpus.is_empty() && req.required_gpus.len() != req.targets.len() {
        return Err(ApiError::Validation(format!(
            "required_gpus length ({}) must match targets length ({})",
            req.required_gpus.len(),
            req.targets.len()
        )));
    }

    // Environment resolution: explicit name, or the cluster default.
    let env = match req.container_name.as_deref() {
        None | Some(NULL_CONTAINER) | Some("") => {
            state.config.docker.default_container_name.clone()
        }
        Some(name) => name.to_string(),
    };
    let privileged = req.privileged.unwrap_or(state.config.docker.tasks_privileged);
    let mounts = req
        .additional_mounts
        .clone()
        .unwrap_or_else(|| state.config.docker.additional_mounts.clone());

    // Log root must exist before any task references paths under it.
    let logs_dir = state.config.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .map_err(|e| ApiError::Internal(format!("cannot create log directory: {e}")))?;

    // Auto-select a node when no targets were given.
    let targets: Vec<String> = if req.targets.is_empty() {
        let node = select_node(state, req.required_cores, req.required_memory_bytes)
            .ok_or_else(|| {
                ApiError::Capacity("No suitable node available for this task.".into())
            })?;
        info!(node = %node.hostname, "auto-selected target node");
        vec![node.hostname]
    } else {
        req.targets.clone()
    };

    let gpus_per_target: Vec<Vec<u32>> = if req.required_gpus.is_empty() {
        vec![Vec::new(); targets.len()]
    } else {
        req.required_gpus.clone()
    };

    let mut created: Vec<TaskId> = Vec::new();
    let mut failed: Vec<FailedTarget> = Vec::new();
    let mut batch_id: Option<TaskId> = None;

    for (target_str, request_gpus) in targets.iter().zip(gpus_per_target) {
        match place_on_target(
            state,
            &req,
            PlacementInputs {
                target_str,
                request_gpus,
                env: &env,
                privileged,
                mounts: &mounts,
                batch_id,
            },
        )
        .await
        {
            Ok(task_id) => {
                batch_id.get_or_insert(task_id);
                created.push(task_id);
            }
            Err(reason) => {
                warn!(target = %target_str, %reason, "target placement failed");
                failed.push(FailedTarget { target: target_str.clone(), reason });
            }
        }
    }

    if created.is_empty() {
        let reasons: Vec<String> =
            failed.iter().map(|f| format!("{}: {}", f.target, f.reason)).collect();
        return Err(ApiError::Capacity(format!(
            "Failed to schedule task for any target. Failures: [{}]",
            reasons.join("; ")
        )));
    }

    let message = if failed.is_empty() {
        format!("Task batch submitted successfully. {} tasks created.", created.len())
    } else {
        format!("Task batch submitted. {} tasks created. Some targets failed.", created.len())
    };
    info!(task_ids = ?created, failed = failed.len(), "submission processed");
    Ok(SubmitResponse { message, task_ids: created, failed_targets: failed })
}

struct PlacementInputs<'a> {
    target_str: &'a str,
    request_gpus: Vec<u32>,
    env: &'a str,
    privileged: bool,
    mounts: &'a [String],
    batch_id: Option<TaskId>,
}

/// Validate one target, create its task record, and dispatch it.
/// Returns the new task id, or the failure reason for this target.
async fn place_on_target(
    state: &Arc<HostState>,
    req: &SubmitRequest,
    inputs: PlacementInputs<'_>,
) -> Result<TaskId, String> {
    let target = Target::parse(inputs.target_str).map_err(|e| e.to_string())?;

    // GPUs can come from the `host::g0,g1` syntax or the per-target list.
    let gpus = target.gpu_ids.clone().unwrap_or(inputs.request_gpus);

    let node = state
        .store
        .get_node(&target.hostname)
        .ok_or_else(|| "Node not registered".to_string())?;
    if !node.is_online() {
        return Err(format!("Node status is {}", node.status));
    }

    if let Some(numa_id) = target.numa_node_id {
        match &node.numa_topology {
            None => return Err("Node has no NUMA topology".to_string()),
            Some(topology) if !topology.contains_key(&numa_id) => {
                let valid: Vec<u32> = topology.keys().copied().collect();
                return Err(format!("Invalid NUMA ID (Valid: {valid:?})"));
            }
            Some(_) => {}
        }
    }

    if !gpus.is_empty() {
        let invalid: Vec<u32> =
            gpus.iter().copied().filter(|g| *g as usize >= node.gpu_info.len()).collect();
        if !invalid.is_empty() {
            return Err(format!("Invalid GPU IDs: {invalid:?}"));
        }
        let in_use = state.store.gpus_in_use(&node.hostname);
        if gpus.iter().any(|g| in_use.contains(g)) {
            return Err("Requested GPUs not available".to_string());
        }
    }

    let available_cores =
        node.total_cores.saturating_sub(state.store.cores_in_use(&node.hostname));
    if available_cores < req.required_cores {
        return Err("Insufficient available cores".to_string());
    }

    if let Some(required_memory) = req.required_memory_bytes {
        if available_memory(state, &node) < required_memory {
            return Err("Insufficient available memory".to_string());
        }
    }

    let task_id = state.ids.next_id();
    let batch_id = inputs.batch_id.unwrap_or(task_id);
    let task_log_dir = state.config.logs_dir().join(task_id.to_string());
    let stdout_path = task_log_dir.join("stdout.log");
    let stderr_path = task_log_dir.join("stderr.log");

    let body = match req.task_type {
        TaskType::Command => TaskBody::Command {
            stdout_path: stdout_path.clone(),
            stderr_path: stderr_path.clone(),
            working_dir: state.config.docker.default_working_dir.clone(),
        },
        TaskType::Vps => TaskBody::Vps {
            ssh_port: Some(state.store.next_free_ssh_port()),
            ssh_key_mode: vps_key_mode(req),
        },
    };

    let task = Task {
        task_id,
        batch_id,
        command: req.command.clone(),
        arguments: req.arguments.clone(),
        env_vars: req.env_vars.clone(),
        required_cores: req.required_cores,
        required_memory_bytes: req.required_memory_bytes,
        required_gpus: gpus.clone(),
        target_numa_node_id: target.numa_node_id,
        assigned_node: Some(node.hostname.clone()),
        container_name: Some(inputs.env.to_string()),
        docker_image_tag: Some(kr_docker::naming::image_tag(inputs.env)),
        privileged: inputs.privileged,
        mount_dirs: inputs.mounts.to_vec(),
        status: TaskStatus::Assigning,
        exit_code: None,
        error_message: None,
        submitted_at: Utc::now(),
        started_at: None,
        completed_at: None,
        assignment_suspicion_count: 0,
        body,
    };
    let tentative_ssh_port = task.ssh_port();
    state
        .store
        .insert_task(task)
        .map_err(|e| format!("Database error during task creation: {e}"))?;
    info!(%task_id, node = %node.hostname, task_type = %req.task_type, "task created");

    match req.task_type {
        TaskType::Command => {
            let spec = TaskSpec {
                task_id,
                command: req.command.clone(),
                arguments: req.arguments.clone(),
                env_vars: req.env_vars.clone(),
                required_cores: req.required_cores,
                required_gpus: gpus,
                required_memory_bytes: req.required_memory_bytes,
                target_numa_node_id: target.numa_node_id,
                container_name: inputs.env.to_string(),
                privileged: inputs.privileged,
                mount_dirs: inputs.mounts.to_vec(),
                working_dir: state.config.docker.default_working_dir.clone(),
                stdout_path,
                stderr_path,
            };
            let dispatch_state = Arc::clone(state);
            let runner_url = node.url.clone();
            tokio::spawn(async move {
                dispatch::send_execute(&dispatch_state, runner_url, spec).await;
            });
            Ok(task_id)
        }
        TaskType::Vps => {
            let spec = VpsSpec {
                task_id,
                required_cores: req.required_cores,
                required_gpus: gpus,
                required_memory_bytes: req.required_memory_bytes,
                target_numa_node_id: target.numa_node_id,
                container_name: inputs.env.to_string(),
                ssh_key_mode: vps_key_mode(req),
                ssh_public_key: (!req.command.trim().is_empty())
                    .then(|| req.command.trim().to_string()),
                ssh_port: tentative_ssh_port.unwrap_or(0),
                privileged: inputs.privileged,
                mount_dirs: inputs.mounts.to_vec(),
            };
            match dispatch::send_vps_create(state, &node.url, &spec).await {
                Ok(response) => {
                    // Docker publishes wherever it likes; the tentative port
                    // is replaced by the truth.
                    let _ = state.store.update_task(task_id, |task| {
                        task.set_ssh_port(response.ssh_port);
                    });
                    Ok(task_id)
                }
                Err(reason) => {
                    let _ = state.store.update_task(task_id, |task| {
                        task.status = TaskStatus::Failed;
                        task.error_message = Some(reason.clone());
                        task.completed_at = Some(Utc::now());
                    });
                    Err(reason)
                }
            }
        }
    }
}

/// SSH key mode: explicit, else inferred from whether a key was supplied.
fn vps_key_mode(req: &SubmitRequest) -> SshKeyMode {
    req.ssh_key_mode.unwrap_or_else(|| {
        if req.command.trim().is_empty() {
            SshKeyMode::None
        } else {
            SshKeyMode::Upload
        }
    })
}

/// Node selection when the submitter names no target: online nodes with
/// enough free cores (and memory, when requested), preferring the LARGEST
/// available-core count so load spreads. Ties break on first-seen order:
/// `list_nodes` iterates in registration order and an equal count never
/// displaces the earlier node.
fn select_node(state: &HostState, required_cores: u32, required_memory: Option<u64>) -> Option<NodeInfo> {
    let mut best: Option<(u32, NodeInfo)> = None;
    for node in state.store.list_nodes() {
        if !node.is_online() {
            continue;
        }
        let available = node.total_cores.saturating_sub(state.store.cores_in_use(&node.hostname));
        if available < required_cores {
            continue;
        }
        if let Some(required) = required_memory {
            if available_memory(state, &node) < required {
                continue;
            }
        }
        match &best {
            Some((best_available, _)) if *best_available >= available => {}
            _ => best = Some((available, node)),
        }
    }
    best.map(|(_, node)| node)
}

/// Free memory estimate: total minus the larger of (reserved by tasks,
/// actually used per the last heartbeat).
fn available_memory(state: &HostState, node: &NodeInfo) -> u64 {
    let reserved = state.store.memory_reserved(&node.hostname);
    let used = node.metrics.memory_used_bytes.unwrap_or(0);
    node.memory_total_bytes.saturating_sub(reserved.max(used))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
