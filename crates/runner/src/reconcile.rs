// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation after a runner restart or crash.
//!
//! Runs exactly once before the agent accepts new work. The vault and the
//! container runtime are reconciled in both directions:
//!
//! - tracked task, container gone  -> report `stopped`, drop the record
//! - tracked VPS, container alive  -> re-query the SSH port, report `running`
//! - orphan VPS container          -> adopt it back into the vault
//! - orphan task container         -> stop and remove, no report (the host
//!   has already judged that task)
//!
//! A container is only treated as ours when its name matches the grammar
//! AND it carries the managed label; the label filter is applied by the
//! listing, the name check here.

use crate::report;
use crate::state::RunnerCtx;
use crate::vps;
use chrono::Utc;
use kr_core::{TaskStatus, TaskType};
use kr_docker::naming;
use kr_storage::VpsRecord;
use kr_wire::StatusUpdate;
use std::collections::HashSet;
use tracing::{info, warn};

pub async fn startup_reconcile(ctx: &RunnerCtx) {
    let running = match ctx.docker.list_managed(false).await {
        Ok(containers) => containers,
        Err(e) => {
            warn!(error = %e, "cannot list containers at startup, skipping reconciliation");
            return;
        }
    };
    let running_names: HashSet<&str> = running.iter().map(|c| c.name.as_str()).collect();

    // Pass 1: every vault record against the live container set.
    for (task_id, container_name) in ctx.vault.all_records() {
        if !running_names.contains(container_name.as_str()) {
            warn!(
                %task_id,
                container = %container_name,
                "tracked container not found at startup, reporting stopped"
            );
            let mut update = StatusUpdate::new(task_id, TaskStatus::Stopped);
            update.exit_code = Some(-1);
            update.message = Some("Container not found on runner startup.".to_string());
            update.completed_at = Some(Utc::now());
            report::report_status(ctx, update).await;

            if let Err(e) = ctx.vault.remove_all(task_id) {
                warn!(%task_id, error = %e, "failed to drop stale record");
            }
            continue;
        }

        if container_name.starts_with(naming::VPS_PREFIX) {
            // The published port can change across a docker restart.
            let ssh_port = vps::find_ssh_port(ctx, &container_name).await;
            if let Some(record) = ctx.vault.get_vps(task_id) {
                let _ = ctx.vault.add_vps(VpsRecord { ssh_port, ..record });
            }
            info!(%task_id, ssh_port, "tracked VPS survived restart, reporting running");
            let mut update = StatusUpdate::new(task_id, TaskStatus::Running);
            update.message = Some(recovery_message(ssh_port));
            update.ssh_port = Some(ssh_port);
            report::report_status(ctx, update).await;
        } else {
            info!(%task_id, container = %container_name, "tracked container still running");
        }
    }

    // Pass 2: live managed containers with no record (orphans).
    let tracked: HashSet<u64> =
        ctx.vault.all_records().into_iter().map(|(id, _)| id.as_u64()).collect();

    for container in running {
        let Some((task_type, task_id)) = naming::extract_task_id(&container.name) else {
            if naming::is_managed_name(&container.name) {
                warn!(container = %container.name, "managed container with unparseable name, skipping");
            }
            continue;
        };
        if tracked.contains(&task_id.as_u64()) {
            continue;
        }

        match task_type {
            TaskType::Vps => {
                // Adopt: the host may have marked this VPS lost while we
                // were down.
                let ssh_port = vps::find_ssh_port(ctx, &container.name).await;
                info!(%task_id, container = %container.name, ssh_port, "adopting orphan VPS");
                let record = VpsRecord {
                    task_id,
                    container_name: container.name.clone(),
                    ssh_port,
                    has_key: false,
                    allocated_cores: 0,
                    allocated_gpus: Vec::new(),
                    numa_node: None,
                };
                if let Err(e) = ctx.vault.add_vps(record) {
                    warn!(%task_id, error = %e, "failed to adopt orphan VPS");
                    continue;
                }
                let mut update = StatusUpdate::new(task_id, TaskStatus::Running);
                update.message = Some(recovery_message(ssh_port));
                update.ssh_port = Some(ssh_port);
                report::report_status(ctx, update).await;
            }
            TaskType::Command => {
                // The host already resolved this task's fate; just clean up.
                warn!(%task_id, container = %container.name, "removing orphan task container");
                if let Err(e) = ctx.docker.stop(&container.name, 10).await {
                    if !e.is_not_found() {
                        warn!(container = %container.name, error = %e, "failed to stop orphan");
                    }
                }
                if let Err(e) = ctx.docker.remove(&container.name, true).await {
                    if !e.is_not_found() {
                        warn!(container = %container.name, error = %e, "failed to remove orphan");
                    }
                }
            }
        }
    }
}

fn recovery_message(ssh_port: u16) -> String {
    if ssh_port > 0 {
        "VPS recovered after runner restart".to_string()
    } else {
        "VPS recovered after runner restart (TTY-only, no SSH)".to_string()
    }
}
