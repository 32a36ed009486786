// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node registration, heartbeats, and cluster visibility.

use super::Failure;
use crate::state::HostState;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use kr_core::{ApiError, NodeInfo, NodeMetrics, NodeStatus, TaskStatus};
use kr_wire::{Ack, HealthResponse, HeartbeatPayload, NodeStatusEntry, RegisterRequest};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `POST /register` — create or refresh a node row.
///
/// Re-posting for a known hostname is a no-op beyond refreshing fields.
pub async fn register(
    State(state): State<Arc<HostState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<Ack>, Failure> {
    let known = state.store.get_node(&req.hostname).is_some();

    let node = NodeInfo {
        hostname: req.hostname.clone(),
        url: req.url,
        // The store assigns (or preserves) the first-seen sequence.
        registration_order: 0,
        total_cores: req.total_cores,
        memory_total_bytes: req.total_ram_bytes,
        numa_topology: req.numa_topology,
        gpu_info: req.gpu_info,
        status: NodeStatus::Online,
        last_heartbeat: Some(Utc::now()),
        metrics: state.store.get_node(&req.hostname).map(|n| n.metrics).unwrap_or_default(),
    };
    state.store.upsert_node(node).map_err(ApiError::internal)?;

    if known {
        info!(hostname = %req.hostname, "runner re-registered");
    } else {
        info!(hostname = %req.hostname, cores = req.total_cores, "runner registered");
    }
    Ok(Json(Ack::new(format!("Runner {} acknowledged.", req.hostname))))
}

/// `PUT /heartbeat/{hostname}` — refresh liveness, apply kill reports,
/// reconcile `assigning` tasks against the runner's running set.
pub async fn heartbeat(
    State(state): State<Arc<HostState>>,
    Path(hostname): Path<String>,
    Json(payload): Json<HeartbeatPayload>,
) -> Result<Json<Ack>, Failure> {
    process_heartbeat(&state, &hostname, &payload, Utc::now())?;
    Ok(Json(Ack::new("Heartbeat received")))
}

/// Heartbeat processing, factored out of the handler for direct testing.
pub(crate) fn process_heartbeat(
    state: &HostState,
    hostname: &str,
    payload: &HeartbeatPayload,
    now: chrono::DateTime<Utc>,
) -> Result<(), ApiError> {
    // Unknown hostname gets 404 so the runner re-registers.
    if state.store.get_node(hostname).is_none() {
        warn!(%hostname, "heartbeat from unknown hostname");
        return Err(ApiError::NotFound("Node not registered".into()));
    }

    state
        .store
        .update_node(hostname, |node| {
            if node.status != NodeStatus::Online {
                info!(%hostname, "runner came back online");
                node.status = NodeStatus::Online;
            }
            node.last_heartbeat = Some(now);
            node.metrics = NodeMetrics {
                cpu_percent: payload.cpu_percent,
                memory_percent: payload.memory_percent,
                memory_used_bytes: payload.memory_used_bytes,
                current_avg_temp: payload.current_avg_temp,
                current_max_temp: payload.current_max_temp,
            };
            if let Some(total) = payload.memory_total_bytes {
                node.memory_total_bytes = total;
            }
            if !payload.gpu_info.is_empty() {
                node.gpu_info = payload.gpu_info.clone();
            }
        })
        .map_err(ApiError::internal)?;

    // Out-of-band deaths first: a task reported both killed and running in
    // the same beat resolves as killed.
    for killed in &payload.killed_tasks {
        let Some(task) = state.store.get_task(killed.task_id) else {
            warn!(task_id = %killed.task_id, "kill report for unknown task");
            continue;
        };
        if task.status.is_terminal() {
            debug!(task_id = %killed.task_id, "kill report for already-final task, ignoring");
            continue;
        }
        let new_status = if killed.reason == "oom" {
            TaskStatus::KilledOom
        } else {
            TaskStatus::Failed
        };
        warn!(
            task_id = %killed.task_id,
            %hostname,
            reason = %killed.reason,
            status = %new_status,
            "task killed out-of-band on runner"
        );
        let _ = state.store.update_task(killed.task_id, |t| {
            t.status = new_status;
            t.exit_code = Some(-9);
            t.error_message = Some(format!("Killed by runner: {}", killed.reason));
            t.completed_at = Some(now);
        });
    }

    // Reconcile `assigning` tasks on this node against the running set.
    let running: std::collections::HashSet<u64> =
        payload.running_tasks.iter().map(|id| id.as_u64()).collect();
    let suspicion_window =
        chrono::Duration::seconds(3 * state.config.timing.heartbeat_interval_seconds as i64);

    for task in state.store.tasks_on_node(hostname, &[TaskStatus::Assigning]) {
        if running.contains(&task.task_id.as_u64()) {
            debug!(task_id = %task.task_id, "runner confirmed start via heartbeat");
            let _ = state.store.update_task(task.task_id, |t| {
                t.status = TaskStatus::Running;
                if t.started_at.is_none() {
                    t.started_at = Some(now);
                }
                t.assignment_suspicion_count = 0;
            });
        } else if now - task.submitted_at > suspicion_window {
            let count = task.assignment_suspicion_count.saturating_add(1).min(2);
            if count < 2 {
                warn!(
                    task_id = %task.task_id,
                    %hostname,
                    suspicion = count,
                    "dispatched task not yet confirmed running"
                );
                let _ = state.store.update_task(task.task_id, |t| {
                    t.assignment_suspicion_count = count;
                });
            } else {
                warn!(task_id = %task.task_id, %hostname, "assignment failed after repeated checks");
                let _ = state.store.update_task(task.task_id, |t| {
                    t.assignment_suspicion_count = count;
                    t.status = TaskStatus::Failed;
                    t.exit_code = Some(-1);
                    t.error_message = Some(format!(
                        "Runner {hostname} did not confirm start after multiple checks."
                    ));
                    t.completed_at = Some(now);
                });
            }
        }
    }

    Ok(())
}

/// `GET /nodes` — all nodes with core usage.
pub async fn list_nodes(State(state): State<Arc<HostState>>) -> Json<Vec<NodeStatusEntry>> {
    let entries = state
        .store
        .list_nodes()
        .into_iter()
        .map(|node| {
            let cores_in_use =
                if node.is_online() { state.store.cores_in_use(&node.hostname) } else { 0 };
            NodeStatusEntry {
                available_cores: node.total_cores.saturating_sub(cores_in_use),
                cores_in_use,
                hostname: node.hostname,
                url: node.url,
                total_cores: node.total_cores,
                status: node.status,
                last_heartbeat: node.last_heartbeat,
                numa_topology: node.numa_topology,
                gpu_info: node.gpu_info,
            }
        })
        .collect();
    Json(entries)
}

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    hostname: Option<String>,
}

/// `GET /health[?hostname=]` — latest sample plus 60-sample history.
pub async fn health(
    State(state): State<Arc<HostState>>,
    Query(query): Query<HealthQuery>,
) -> Result<Json<HealthResponse>, Failure> {
    let history: Vec<_> = state.health.lock().iter().cloned().collect();
    let mut current = history.last().cloned();
    let mut history = history;

    if let Some(hostname) = &query.hostname {
        let known = current
            .as_ref()
            .map(|sample| sample.nodes.contains_key(hostname))
            .unwrap_or(false);
        if !known {
            return Err(
                ApiError::NotFound(format!("No health data found for hostname: {hostname}")).into()
            );
        }
        let filter = |sample: &mut kr_wire::HealthSample| {
            sample.nodes.retain(|name, _| name == hostname);
        };
        if let Some(sample) = current.as_mut() {
            filter(sample);
        }
        for sample in history.iter_mut() {
            filter(sample);
        }
    }

    Ok(Json(HealthResponse { current, history }))
}

#[cfg(test)]
#[path = "nodes_tests.rs"]
mod tests;
