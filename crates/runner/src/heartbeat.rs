// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic heartbeat to the host.
//!
//! Each beat carries the running task set, out-of-band kill reports, and a
//! metrics snapshot. Kill reports are cleared only after the host accepted
//! the beat; on failure they are re-queued for the next one. A 404 means
//! the host no longer knows this node and triggers re-registration.

use crate::report::register_with_host;
use crate::resources;
use crate::state::RunnerCtx;
use kr_wire::HeartbeatPayload;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh the cached metrics snapshot on the configured cadence.
pub async fn resource_loop(ctx: Arc<RunnerCtx>) {
    let period = Duration::from_secs(ctx.config.timing.resource_check_interval_seconds.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let stats = {
            let mut system = ctx.system.lock();
            resources::system_stats(&mut system)
        };
        *ctx.latest_stats.lock() = stats;
    }
}

pub async fn heartbeat_loop(ctx: Arc<RunnerCtx>) {
    let mut interval = tokio::time::interval(ctx.config.heartbeat_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so registration settles.
    interval.tick().await;

    loop {
        interval.tick().await;
        send_heartbeat(&ctx).await;
    }
}

async fn send_heartbeat(ctx: &RunnerCtx) {
    let killed: Vec<_> = std::mem::take(&mut *ctx.killed_pending.lock());
    let stats = ctx.latest_stats.lock().clone();

    let payload = HeartbeatPayload {
        running_tasks: ctx.vault.running_task_ids(),
        killed_tasks: killed.clone(),
        cpu_percent: Some(stats.cpu_percent),
        memory_percent: Some(stats.memory_percent),
        memory_used_bytes: Some(stats.memory_used_bytes),
        memory_total_bytes: Some(stats.memory_total_bytes),
        current_avg_temp: stats.current_avg_temp,
        current_max_temp: stats.current_max_temp,
        gpu_info: resources::gpu_inventory().await,
    };

    let url = format!("{}/heartbeat/{}", ctx.config.host_url(), ctx.hostname);
    let result = ctx.http.put(&url).timeout(HEARTBEAT_TIMEOUT).json(&payload).send().await;

    match result {
        Ok(response) if response.status().is_success() => {
            debug!(running = payload.running_tasks.len(), "heartbeat accepted");
        }
        Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
            warn!("host does not know this node, re-registering");
            requeue_killed(ctx, killed);
            register_with_host(ctx).await;
        }
        Ok(response) => {
            warn!(status = %response.status(), "host rejected heartbeat");
            requeue_killed(ctx, killed);
        }
        Err(e) => {
            warn!(error = %e, "failed to send heartbeat");
            requeue_killed(ctx, killed);
        }
    }
}

fn requeue_killed(ctx: &RunnerCtx, killed: Vec<kr_wire::KilledTask>) {
    if killed.is_empty() {
        return;
    }
    warn!(count = killed.len(), "re-queueing kill reports for the next heartbeat");
    let mut pending = ctx.killed_pending.lock();
    for entry in killed {
        if !pending.contains(&entry) {
            pending.push(entry);
        }
    }
}
