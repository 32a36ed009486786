// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill, pause, and resume of containers on this runner.

use crate::report;
use crate::state::RunnerCtx;
use chrono::Utc;
use kr_core::{ApiError, TaskId, TaskStatus};
use kr_storage::PausedRecord;
use kr_wire::StatusUpdate;
use tracing::{info, warn};

const STOP_TIMEOUT_SECS: u32 = 10;

/// Kill a task's container, remove it, and report `killed`.
///
/// When the container is already gone, a `killed` report with a diagnostic
/// is still sent — the host asked for a terminal state and gets one.
pub async fn kill_task(ctx: &RunnerCtx, task_id: TaskId) -> Result<(), ApiError> {
    let lock = ctx.task_lock(task_id);
    let _guard = lock.lock().await;

    info!(%task_id, "kill requested");

    let Some(container_name) = ctx.vault.resolve_container(task_id) else {
        warn!(%task_id, "kill requested but no container is tracked");
        let mut update = StatusUpdate::new(task_id, TaskStatus::Killed);
        update.message = Some("Kill requested, but container not found on runner.".to_string());
        update.completed_at = Some(Utc::now());
        report::report_status(ctx, update).await;
        return Err(ApiError::NotFound(format!("task {task_id} not tracked on this runner")));
    };

    // Mark before stopping so a waiting executor's exit path stays quiet.
    // Only command tasks have one.
    if container_name.starts_with(kr_docker::naming::TASK_PREFIX) {
        ctx.mark_killed_by_request(task_id);
    }

    if let Err(e) = ctx.docker.stop(&container_name, STOP_TIMEOUT_SECS).await {
        if e.is_not_found() {
            info!(%task_id, "container already gone during kill");
        } else {
            warn!(%task_id, error = %e, "docker stop failed, forcing removal");
        }
    }
    if let Err(e) = ctx.docker.remove(&container_name, true).await {
        if !e.is_not_found() {
            warn!(%task_id, error = %e, "failed to remove container during kill");
        }
    }

    ctx.vault.remove_all(task_id).map_err(ApiError::internal)?;

    let mut update = StatusUpdate::new(task_id, TaskStatus::Killed);
    update.exit_code = Some(-9);
    update.message = Some("Task killed by host request.".to_string());
    update.completed_at = Some(Utc::now());
    report::report_status(ctx, update).await;

    info!(%task_id, container = %container_name, "task killed");
    Ok(())
}

/// Pause a task's container at the runtime level.
pub async fn pause_task(ctx: &RunnerCtx, task_id: TaskId) -> Result<(), ApiError> {
    let lock = ctx.task_lock(task_id);
    let _guard = lock.lock().await;

    let container_name = ctx
        .vault
        .resolve_container(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not tracked on this runner")))?;

    ctx.docker
        .pause(&container_name)
        .await
        .map_err(|e| ApiError::Runtime(format!("docker pause failed: {e}")))?;
    ctx.vault
        .mark_paused(PausedRecord { task_id, container_name: container_name.clone() })
        .map_err(ApiError::internal)?;

    info!(%task_id, container = %container_name, "task paused");
    Ok(())
}

/// Resume a previously paused container.
pub async fn resume_task(ctx: &RunnerCtx, task_id: TaskId) -> Result<(), ApiError> {
    let lock = ctx.task_lock(task_id);
    let _guard = lock.lock().await;

    let container_name = ctx
        .vault
        .resolve_container(task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not tracked on this runner")))?;

    ctx.docker
        .unpause(&container_name)
        .await
        .map_err(|e| ApiError::Runtime(format!("docker unpause failed: {e}")))?;
    ctx.vault.clear_paused(task_id).map_err(ApiError::internal)?;

    info!(%task_id, container = %container_name, "task resumed");
    Ok(())
}
