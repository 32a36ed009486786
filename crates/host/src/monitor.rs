// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background loops: dead-runner detection and health collation.

use crate::state::HostState;
use chrono::Utc;
use kr_core::{NodeStatus, TaskStatus};
use kr_wire::{AggregateHealth, HealthSample, NodeHealth};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Mark nodes offline when their heartbeats go stale, and their active
/// tasks `lost`. A heartbeat exactly at the threshold still counts as
/// alive; only strictly older ones are dead.
pub async fn dead_runner_loop(state: Arc<HostState>) {
    let interval = Duration::from_secs(state.config.timing.cleanup_check_interval_seconds);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        check_dead_runners(&state);
    }
}

pub fn check_dead_runners(state: &HostState) {
    let threshold = Utc::now() - state.config.dead_runner_threshold();

    for node in state.store.list_nodes() {
        if !node.is_online() {
            continue;
        }
        let stale = match node.last_heartbeat {
            Some(last) => last < threshold,
            None => true,
        };
        if !stale {
            continue;
        }

        warn!(
            hostname = %node.hostname,
            last_heartbeat = ?node.last_heartbeat,
            "runner missed heartbeat threshold, marking offline"
        );
        let _ = state.store.update_node(&node.hostname, |n| {
            n.status = NodeStatus::Offline;
        });

        let active = state
            .store
            .tasks_on_node(&node.hostname, &[TaskStatus::Assigning, TaskStatus::Running]);
        for task in active {
            warn!(task_id = %task.task_id, hostname = %node.hostname, "marking task lost");
            let _ = state.store.update_task(task.task_id, |t| {
                t.status = TaskStatus::Lost;
                t.exit_code = Some(-1);
                t.error_message =
                    Some(format!("Node {} went offline (heartbeat timeout).", node.hostname));
                t.completed_at = Some(Utc::now());
            });
        }
    }
}

/// Sample every node's metrics once per second; keep 60 samples.
pub async fn health_loop(state: Arc<HostState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        state.push_health_sample(collect_health_sample(&state));
    }
}

pub fn collect_health_sample(state: &HostState) -> HealthSample {
    let mut nodes = BTreeMap::new();
    let mut aggregate = AggregateHealth::default();
    let mut weighted_cpu = 0.0f64;

    for node in state.store.list_nodes() {
        aggregate.total_nodes += 1;
        if node.is_online() {
            aggregate.online_nodes += 1;
        }
        aggregate.total_cores += node.total_cores;
        aggregate.total_mem_bytes += node.memory_total_bytes;
        aggregate.used_mem_bytes += node.metrics.memory_used_bytes.unwrap_or(0);
        weighted_cpu +=
            f64::from(node.metrics.cpu_percent.unwrap_or(0.0)) * f64::from(node.total_cores);

        if let Some(temp) = node.metrics.current_avg_temp {
            aggregate.max_avg_cpu_temp = aggregate.max_avg_cpu_temp.max(temp);
        }
        if let Some(temp) = node.metrics.current_max_temp {
            aggregate.max_max_cpu_temp = aggregate.max_max_cpu_temp.max(temp);
        }
        if let Some(beat) = node.last_heartbeat {
            if aggregate.last_updated.is_none_or(|prev| beat > prev) {
                aggregate.last_updated = Some(beat);
            }
        }

        nodes.insert(
            node.hostname.clone(),
            NodeHealth {
                hostname: node.hostname.clone(),
                status: node.status,
                last_heartbeat: node.last_heartbeat,
                cpu_percent: node.metrics.cpu_percent,
                memory_percent: node.metrics.memory_percent,
                memory_used_bytes: node.metrics.memory_used_bytes,
                memory_total_bytes: node.memory_total_bytes,
                total_cores: node.total_cores,
                current_avg_temp: node.metrics.current_avg_temp,
                current_max_temp: node.metrics.current_max_temp,
                gpu_info: node.gpu_info.clone(),
            },
        );
    }

    if aggregate.total_cores > 0 {
        aggregate.avg_cpu_percent = (weighted_cpu / f64::from(aggregate.total_cores)) as f32;
    }
    if aggregate.total_mem_bytes > 0 {
        aggregate.avg_mem_percent =
            (aggregate.used_mem_bytes as f64 / aggregate.total_mem_bytes as f64 * 100.0) as f32;
    }

    HealthSample { nodes, aggregate }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
