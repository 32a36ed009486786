// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle endpoints: submission, status reports, queries, control.

use super::Failure;
use crate::state::HostState;
use crate::{dispatch, scheduler};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use kr_core::{ApiError, Task, TaskId, TaskStatus, TaskType};
use kr_storage::{TaskFilter, UpdateFields, UpdateOutcome};
use kr_wire::{Ack, StatusUpdate, SubmitRequest, SubmitResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// `POST /submit` — create and dispatch a task batch.
pub async fn submit(
    State(state): State<Arc<HostState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), Failure> {
    let response = scheduler::submit(&state, req).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `POST /update` — status report from a runner.
pub async fn update(
    State(state): State<Arc<HostState>>,
    Json(report): Json<StatusUpdate>,
) -> Result<Json<Ack>, Failure> {
    info!(task_id = %report.task_id, status = %report.status, "status update from runner");

    let fields = UpdateFields {
        exit_code: report.exit_code,
        message: report.message,
        started_at: report.started_at,
        completed_at: report.completed_at,
        ssh_port: report.ssh_port,
    };
    let outcome = state
        .store
        .apply_update(report.task_id, report.status, fields)
        .map_err(|e| match e {
            kr_storage::StorageError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::internal(other),
        })?;

    let message = match outcome {
        UpdateOutcome::Applied => "Task status updated successfully.",
        UpdateOutcome::Resurrected => "VPS recovered from lost state.",
        UpdateOutcome::RejectedTerminal => "Task already in a final state.",
    };
    Ok(Json(Ack::new(message)))
}

/// `GET /status/{task_id}` — full task record.
pub async fn status(
    State(state): State<Arc<HostState>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<Task>, Failure> {
    state
        .store
        .get_task(task_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Task not found.".into()).into())
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    status: Option<TaskStatus>,
    task_type: Option<TaskType>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    node: Option<String>,
}

fn default_limit() -> usize {
    100
}

/// `GET /tasks` — filtered, paged task listing.
pub async fn list(
    State(state): State<Arc<HostState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Task>> {
    let filter = TaskFilter {
        status: query.status,
        task_type: query.task_type,
        node: query.node,
    };
    Json(state.store.list_tasks(&filter, query.limit, query.offset))
}

/// `POST /kill/{task_id}` — mark killed and notify the runner.
pub async fn kill(
    State(state): State<Arc<HostState>>,
    Path(task_id): Path<TaskId>,
) -> Result<(StatusCode, Json<Ack>), Failure> {
    let task = state
        .store
        .get_task(task_id)
        .ok_or_else(|| ApiError::NotFound("Task not found.".to_string()))?;

    if !task.status.is_active() {
        return Err(ApiError::StateConflict(format!(
            "Task cannot be killed (state: {})",
            task.status
        ))
        .into());
    }

    let original_status = task.status;
    state
        .store
        .update_task(task_id, |t| {
            t.status = TaskStatus::Killed;
            t.error_message = Some("Kill requested by user.".to_string());
            t.completed_at = Some(Utc::now());
        })
        .map_err(ApiError::internal)?;
    info!(%task_id, was = %original_status, "task marked killed");

    // Only bother the runner when the container may actually exist there.
    if matches!(original_status, TaskStatus::Running | TaskStatus::Paused) {
        if let Some(node) = task.assigned_node.as_deref().and_then(|h| state.store.get_node(h)) {
            if node.is_online() {
                let kill_state = Arc::clone(&state);
                tokio::spawn(async move {
                    dispatch::send_kill(&kill_state, node.url, task_id).await;
                });
            }
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(Ack::new(format!("Kill requested for task {task_id}. Task marked as killed."))),
    ))
}

/// `POST /command/{task_id}/{pause|resume}` — control a running task.
///
/// State mutates only after the runner acknowledged the command.
pub async fn command(
    State(state): State<Arc<HostState>>,
    Path((task_id, command)): Path<(TaskId, String)>,
) -> Result<Json<Ack>, Failure> {
    let task = state
        .store
        .get_task(task_id)
        .ok_or_else(|| ApiError::NotFound("Task not found.".to_string()))?;

    let (required_status, new_status) = match command.as_str() {
        "pause" => (TaskStatus::Running, TaskStatus::Paused),
        "resume" => (TaskStatus::Paused, TaskStatus::Running),
        other => {
            return Err(ApiError::Validation(format!("Unknown command '{other}'")).into());
        }
    };
    if task.status != required_status {
        return Err(ApiError::StateConflict(format!(
            "Cannot {command} task in state {}",
            task.status
        ))
        .into());
    }

    let node = task
        .assigned_node
        .as_deref()
        .and_then(|h| state.store.get_node(h))
        .ok_or_else(|| ApiError::StateConflict("Task has no assigned node.".to_string()))?;

    dispatch::send_control(&state, &node.url, &command, task_id)
        .await
        .map_err(ApiError::WorkerUnreachable)?;

    state
        .store
        .update_task(task_id, |t| {
            t.status = new_status;
        })
        .map_err(ApiError::internal)?;
    info!(%task_id, %command, "task control applied");

    Ok(Json(Ack::new(format!("{command} for task {task_id} succeeded."))))
}

#[derive(Debug, Deserialize)]
pub struct TailQuery {
    #[serde(default = "default_lines")]
    lines: usize,
}

fn default_lines() -> usize {
    100
}

/// `GET /task/{task_id}/stdout?lines=N` — tail of the task's stdout log.
pub async fn stdout(
    state: State<Arc<HostState>>,
    path: Path<TaskId>,
    query: Query<TailQuery>,
) -> Result<String, Failure> {
    tail_log(state, path, query, LogKind::Stdout).await
}

/// `GET /task/{task_id}/stderr?lines=N` — tail of the task's stderr log.
pub async fn stderr(
    state: State<Arc<HostState>>,
    path: Path<TaskId>,
    query: Query<TailQuery>,
) -> Result<String, Failure> {
    tail_log(state, path, query, LogKind::Stderr).await
}

enum LogKind {
    Stdout,
    Stderr,
}

async fn tail_log(
    State(state): State<Arc<HostState>>,
    Path(task_id): Path<TaskId>,
    Query(query): Query<TailQuery>,
    kind: LogKind,
) -> Result<String, Failure> {
    let task = state
        .store
        .get_task(task_id)
        .ok_or_else(|| ApiError::NotFound("Task not found.".to_string()))?;

    if task.is_vps() {
        return Err(
            ApiError::Validation("VPS tasks do not have stdout/stderr logs.".into()).into()
        );
    }

    let path = match kind {
        LogKind::Stdout => task.stdout_path(),
        LogKind::Stderr => task.stderr_path(),
    }
    .ok_or_else(|| ApiError::NotFound("Log path not recorded for this task.".to_string()))?;

    // A missing file just means the task has produced no output yet.
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(ApiError::Internal(format!("error reading log: {e}")).into()),
    };
    Ok(tail_lines(&content, query.lines))
}

/// Last `n` lines of `content`, preserving the trailing newline.
fn tail_lines(content: &str, n: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    let mut out = lines[start..].join("\n");
    if content.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
