// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VPS-specific endpoints; creation is the same scheduler path as /submit
//! with the type pinned.

use super::Failure;
use crate::scheduler;
use crate::state::HostState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use kr_core::{ApiError, Task, TaskId, TaskStatus, TaskType};
use kr_storage::TaskFilter;
use kr_wire::{Ack, SubmitRequest, SubmitResponse};
use std::sync::Arc;
use tracing::info;

/// `POST /vps/create` — submit a VPS session.
pub async fn create(
    State(state): State<Arc<HostState>>,
    Json(mut req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), Failure> {
    req.task_type = TaskType::Vps;
    // VPS sessions carry no command payload beyond the SSH key.
    req.arguments.clear();
    req.env_vars.clear();

    let response = scheduler::submit(&state, req).await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// `GET /vps/status` — active VPS sessions.
pub async fn active(State(state): State<Arc<HostState>>) -> Json<Vec<Task>> {
    let filter = TaskFilter { task_type: Some(TaskType::Vps), ..Default::default() };
    let sessions = state
        .store
        .list_tasks(&filter, usize::MAX, 0)
        .into_iter()
        .filter(|t| t.status.is_active())
        .collect();
    Json(sessions)
}

/// `POST /vps/stop/{task_id}` — terminate a VPS session.
pub async fn stop(
    State(state): State<Arc<HostState>>,
    Path(task_id): Path<TaskId>,
) -> Result<(StatusCode, Json<Ack>), Failure> {
    let task = state
        .store
        .get_task(task_id)
        .filter(|t| t.is_vps())
        .ok_or_else(|| ApiError::NotFound("VPS not found.".to_string()))?;

    if !task.status.is_active() {
        return Err(ApiError::StateConflict(format!(
            "VPS cannot be stopped (state: {})",
            task.status
        ))
        .into());
    }

    let original_status = task.status;
    state
        .store
        .update_task(task_id, |t| {
            t.status = TaskStatus::Stopped;
            t.error_message = Some("Stopped by user.".to_string());
            t.completed_at = Some(Utc::now());
        })
        .map_err(ApiError::internal)?;
    info!(%task_id, was = %original_status, "VPS marked stopped");

    if matches!(original_status, TaskStatus::Running | TaskStatus::Paused) {
        if let Some(node) = task.assigned_node.as_deref().and_then(|h| state.store.get_node(h)) {
            if node.is_online() {
                let url = format!("{}/vps/stop/{}", node.url, task_id);
                let stop_state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = stop_state
                        .http
                        .post(&url)
                        .timeout(std::time::Duration::from_secs(10))
                        .send()
                        .await
                    {
                        tracing::error!(%task_id, error = %e, "runner unreachable for VPS stop");
                    }
                });
            }
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(Ack::new(format!("VPS {task_id} stop requested. VPS marked as stopped."))),
    ))
}
