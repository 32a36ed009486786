// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound RPCs to runner agents.
//!
//! All calls carry bounded timeouts. Failures never unwind scheduler
//! state: a failed dispatch fails the task only while it is still
//! `assigning`, and everything else is left to the reconciliation loops.

use crate::state::HostState;
use chrono::Utc;
use kr_core::{TaskId, TaskStatus};
use kr_wire::{ControlRequest, TaskSpec, VpsCreateResponse, VpsSpec};
use std::time::Duration;
use tracing::{error, info, warn};

const EXECUTE_TIMEOUT: Duration = Duration::from_secs(30);
const VPS_CREATE_TIMEOUT: Duration = Duration::from_secs(60);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire a command task at a runner; on failure, fail the task if it is
/// still `assigning`. Spawned as a background task by the scheduler.
pub async fn send_execute(state: &HostState, runner_url: String, spec: TaskSpec) {
    let task_id = spec.task_id;
    info!(%task_id, %runner_url, "dispatching task to runner");

    let url = format!("{runner_url}/execute");
    let result = state.http.post(&url).timeout(EXECUTE_TIMEOUT).json(&spec).send().await;

    let failure = match result {
        Ok(response) if response.status().is_success() => None,
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Some(format!("Runner rejected task: {status} - {body}"))
        }
        Err(e) => Some(format!("Failed to contact runner: {e}")),
    };

    if let Some(message) = failure {
        error!(%task_id, %message, "task dispatch failed");
        fail_if_assigning(state, task_id, message);
    }
}

/// Synchronously create a VPS on a runner, returning the runner's answer
/// (which carries the actual published SSH port).
pub async fn send_vps_create(
    state: &HostState,
    runner_url: &str,
    spec: &VpsSpec,
) -> Result<VpsCreateResponse, String> {
    let task_id = spec.task_id;
    info!(%task_id, %runner_url, "dispatching VPS to runner");

    let url = format!("{runner_url}/vps/create");
    let result = state.http.post(&url).timeout(VPS_CREATE_TIMEOUT).json(spec).send().await;

    match result {
        Ok(response) if response.status().is_success() => {
            response.json::<VpsCreateResponse>().await.map_err(|e| {
                format!("Runner returned an unreadable VPS response: {e}")
            })
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(format!("Runner rejected VPS: {status} - {body}"))
        }
        Err(e) => Err(format!("Failed to contact runner: {e}")),
    }
}

/// Background kill to a runner; the task is already marked terminal.
pub async fn send_kill(state: &HostState, runner_url: String, task_id: TaskId) {
    info!(%task_id, %runner_url, "sending kill to runner");

    let url = format!("{runner_url}/kill");
    let request = ControlRequest { task_id };
    let result = state.http.post(&url).timeout(CONTROL_TIMEOUT).json(&request).send().await;

    match result {
        Ok(response) if response.status().is_success() => {
            info!(%task_id, "runner acknowledged kill");
        }
        Ok(response) => {
            error!(%task_id, status = %response.status(), "runner failed the kill");
        }
        Err(e) => {
            error!(%task_id, error = %e, "runner unreachable for kill");
            let _ = state.store.update_task(task_id, |task| {
                if task.status == TaskStatus::Killed {
                    let prior = task.error_message.take().unwrap_or_default();
                    task.error_message =
                        Some(format!("{prior} | Runner unreachable for kill confirmation"));
                }
            });
        }
    }
}

/// Pause or resume on a runner; `Ok` only when the runner acked.
pub async fn send_control(
    state: &HostState,
    runner_url: &str,
    command: &str,
    task_id: TaskId,
) -> Result<(), String> {
    info!(%task_id, command, %runner_url, "sending control command to runner");

    let url = format!("{runner_url}/{command}");
    let request = ControlRequest { task_id };
    let result = state.http.post(&url).timeout(CONTROL_TIMEOUT).json(&request).send().await;

    match result {
        Ok(response) if response.status().is_success() => Ok(()),
        Ok(response) => Err(format!("Runner error during {command}: {}", response.status())),
        Err(e) => Err(format!("Failed to send {command} command: {e}")),
    }
}

fn fail_if_assigning(state: &HostState, task_id: TaskId, message: String) {
    let result = state.store.update_task(task_id, |task| {
        if task.status == TaskStatus::Assigning {
            task.status = TaskStatus::Failed;
            task.error_message = Some(message);
            task.completed_at = Some(Utc::now());
        }
    });
    if let Err(e) = result {
        warn!(%task_id, error = %e, "could not record dispatch failure");
    }
}
