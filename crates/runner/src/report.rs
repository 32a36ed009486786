// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner -> host reporting: registration and status updates.
//!
//! The host is the authoritative state machine; a lost update is recovered
//! by its reconciliation loops, so failures here are logged, not retried.

use crate::resources;
use crate::state::RunnerCtx;
use kr_wire::{RegisterRequest, StatusUpdate};
use std::time::Duration;
use tracing::{debug, error, info};

const UPDATE_TIMEOUT: Duration = Duration::from_secs(15);
const REGISTER_TIMEOUT: Duration = Duration::from_secs(15);

/// POST a status update to the host; best effort.
pub async fn report_status(ctx: &RunnerCtx, update: StatusUpdate) {
    let task_id = update.task_id;
    let status = update.status;
    debug!(%task_id, %status, "reporting status to host");

    let url = format!("{}/update", ctx.config.host_url());
    let result = ctx.http.post(&url).timeout(UPDATE_TIMEOUT).json(&update).send().await;
    match result {
        Ok(response) if response.status().is_success() => {
            debug!(%task_id, "host acknowledged status update");
        }
        Ok(response) => {
            error!(%task_id, status = %response.status(), "host rejected status update");
        }
        Err(e) => {
            error!(%task_id, error = %e, "failed to report status to host, update lost");
        }
    }
}

/// Register this runner and its inventory with the host.
pub async fn register_with_host(ctx: &RunnerCtx) -> bool {
    let total_ram_bytes = {
        let mut system = ctx.system.lock();
        resources::total_memory_bytes(&mut system)
    };
    let request = RegisterRequest {
        hostname: ctx.hostname.clone(),
        url: ctx.runner_url.clone(),
        total_cores: resources::total_cores(),
        total_ram_bytes,
        numa_topology: ctx.numa_topology.clone(),
        gpu_info: resources::gpu_inventory().await,
    };

    info!(
        hostname = %request.hostname,
        cores = request.total_cores,
        gpus = request.gpu_info.len(),
        "registering with host"
    );

    let url = format!("{}/register", ctx.config.host_url());
    match ctx.http.post(&url).timeout(REGISTER_TIMEOUT).json(&request).send().await {
        Ok(response) if response.status().is_success() => {
            info!("registered with host");
            true
        }
        Ok(response) => {
            error!(status = %response.status(), "host rejected registration");
            false
        }
        Err(e) => {
            error!(error = %e, "failed to reach host for registration");
            false
        }
    }
}
