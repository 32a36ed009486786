// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-task execution.
//!
//! Launch sequence: image freshness, vault record (before the container
//! exists), foreground `docker run` with stdout/stderr wired into the
//! host-provided log paths, `running` report, wait, final report, explicit
//! container removal. The container is never auto-removed: the exit code
//! must be read before the runtime forgets it.
//!
//! The per-task lock covers only the launch; holding it across the wait
//! would block a kill for the same task until the task finished on its own.

use crate::report;
use crate::state::RunnerCtx;
use chrono::Utc;
use kr_core::{TaskStatus, TaskType};
use kr_docker::{naming, RunSpec};
use kr_storage::TaskRecord;
use kr_wire::{StatusUpdate, TaskSpec};
use tracing::{error, info, warn};

/// Run a command task to completion. Spawned as a background task.
pub async fn run_command_task(ctx: &RunnerCtx, spec: TaskSpec) {
    let task_id = spec.task_id;
    let container_name = naming::task_container_name(task_id);
    let started_at = Utc::now();

    let child = {
        let lock = ctx.task_lock(task_id);
        let _guard = lock.lock().await;

        match launch(ctx, &spec, &container_name).await {
            Ok(child) => child,
            Err(message) => {
                error!(%task_id, %message, "task launch failed");
                let _ = ctx.vault.remove_task(task_id);
                let mut update = StatusUpdate::new(task_id, TaskStatus::Failed);
                update.exit_code = Some(-1);
                update.message = Some(message);
                update.completed_at = Some(Utc::now());
                report::report_status(ctx, update).await;
                return;
            }
        }
    };

    // Report running before waiting so the host sees the start promptly.
    let mut running = StatusUpdate::new(task_id, TaskStatus::Running);
    running.started_at = Some(started_at);
    report::report_status(ctx, running).await;

    wait_and_report(ctx, task_id, &container_name, child, started_at).await;

    if let Err(e) = ctx.vault.remove_task(task_id) {
        warn!(%task_id, error = %e, "failed to drop task record");
    }
}

/// Launch critical section: image freshness, vault record, container spawn.
async fn launch(
    ctx: &RunnerCtx,
    spec: &TaskSpec,
    container_name: &str,
) -> Result<tokio::process::Child, String> {
    let task_id = spec.task_id;

    // Image freshness gates everything else.
    ctx.image_store
        .ensure_fresh(&spec.container_name, &ctx.docker, ctx.config.image_sync_timeout())
        .await
        .map_err(|e| format!("image sync failed for '{}': {e}", spec.container_name))?;

    // Record before create: a crash between here and the exit report leaves
    // a record the startup reconciliation can resolve.
    let record = TaskRecord {
        task_id,
        container_name: container_name.to_string(),
        allocated_cores: spec.required_cores,
        allocated_gpus: spec.required_gpus.clone(),
        numa_node: spec.target_numa_node_id,
    };
    ctx.vault.add_task(record).map_err(|e| format!("runner state store failure: {e}"))?;

    let (stdout, stderr) = open_log_files(spec)?;

    let mut command = Vec::with_capacity(1 + spec.arguments.len());
    command.push(spec.command.clone());
    command.extend(spec.arguments.iter().cloned());

    let mut mounts = ctx.default_mounts();
    mounts.extend(spec.mount_dirs.iter().cloned());

    let run_spec = RunSpec::new(naming::image_tag(&spec.container_name), container_name)
        .command(command)
        .cpus(spec.required_cores)
        .memory_bytes(spec.required_memory_bytes)
        .pin_numa(spec.target_numa_node_id, ctx.numa_topology.as_ref())
        .gpus(&spec.required_gpus)
        .mounts(mounts)
        .envs(spec.env_vars.clone())
        .env("KOHAKURIVER_TASK_ID", task_id.to_string())
        .working_dir(&spec.working_dir)
        .privileged(spec.privileged)
        .network("host")
        .labels(naming::make_labels(task_id, TaskType::Command, &ctx.hostname));

    info!(%task_id, container = %container_name, command = %spec.command, "starting command task");
    ctx.docker
        .spawn_foreground(&run_spec, stdout, stderr)
        .map_err(|e| format!("docker run failed to start: {e}"))
}

/// Wait for the container to exit and report the outcome.
async fn wait_and_report(
    ctx: &RunnerCtx,
    task_id: kr_core::TaskId,
    container_name: &str,
    mut child: tokio::process::Child,
    started_at: chrono::DateTime<chrono::Utc>,
) {
    let exit_code = match child.wait().await {
        Ok(status) => i64::from(status.code().unwrap_or(-1)),
        Err(e) => {
            error!(%task_id, error = %e, "wait on docker run failed");
            -1
        }
    };
    let completed_at = Utc::now();

    // An explicit kill already reported and removed the container.
    if ctx.take_killed_by_request(task_id) {
        info!(%task_id, "task was killed on request, skipping exit report");
        return;
    }

    let oom = ctx.docker.was_oom_killed(container_name).await.unwrap_or(false);
    if oom {
        // The host turns this heartbeat entry into killed_oom.
        warn!(%task_id, "container was OOM-killed");
        ctx.queue_killed(task_id, "oom");
    } else {
        let status = if exit_code == 0 { TaskStatus::Completed } else { TaskStatus::Failed };
        let mut update = StatusUpdate::new(task_id, status);
        update.exit_code = Some(exit_code);
        if exit_code != 0 {
            update.message = Some(format!("process exited with non-zero code: {exit_code}"));
        }
        update.started_at = Some(started_at);
        update.completed_at = Some(completed_at);
        report::report_status(ctx, update).await;
        info!(%task_id, exit_code, "command task finished");
    }

    if let Err(e) = ctx.docker.remove(container_name, true).await {
        if !e.is_not_found() {
            warn!(%task_id, error = %e, "failed to remove task container");
        }
    }
}

fn open_log_files(spec: &TaskSpec) -> Result<(std::fs::File, std::fs::File), String> {
    if let Some(parent) = spec.stdout_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create log directory {}: {e}", parent.display()))?;
    }
    let stdout = std::fs::File::create(&spec.stdout_path)
        .map_err(|e| format!("cannot open stdout log {}: {e}", spec.stdout_path.display()))?;
    let stderr = std::fs::File::create(&spec.stderr_path)
        .map_err(|e| format!("cannot open stderr log {}: {e}", spec.stderr_path.display()))?;
    Ok((stdout, stderr))
}
