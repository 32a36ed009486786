// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dead-runner detection and health collation tests.

use super::*;
use crate::test_support::{make_command_task, make_node, make_state, make_vps_task};
use kr_core::TaskId;

#[test]
fn stale_node_goes_offline_and_its_active_tasks_go_lost() {
    let (_dir, state) = make_state();

    // Default timing: 5s interval x factor 6 = 30s threshold.
    let mut node = make_node("n1", 8);
    node.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(31));
    state.store.upsert_node(node).unwrap();

    state.store.insert_task(make_command_task(1, "n1", 2, TaskStatus::Running)).unwrap();
    state.store.insert_task(make_command_task(2, "n1", 2, TaskStatus::Assigning)).unwrap();
    state.store.insert_task(make_command_task(3, "n1", 2, TaskStatus::Completed)).unwrap();
    state.store.insert_task(make_vps_task(4, "n1", TaskStatus::Running, Some(2222))).unwrap();

    check_dead_runners(&state);

    assert_eq!(state.store.get_node("n1").unwrap().status, NodeStatus::Offline);
    for id in [1u64, 2, 4] {
        let task = state.store.get_task(TaskId(id)).unwrap();
        assert_eq!(task.status, TaskStatus::Lost, "task {id}");
        assert_eq!(task.exit_code, Some(-1));
        assert!(task.completed_at.is_some());
    }
    // Terminal tasks are untouched.
    assert_eq!(state.store.get_task(TaskId(3)).unwrap().status, TaskStatus::Completed);
}

#[test]
fn heartbeat_exactly_at_the_threshold_counts_as_alive() {
    let (_dir, state) = make_state();
    let threshold = state.config.dead_runner_threshold();

    let mut node = make_node("n1", 8);
    node.last_heartbeat = Some(Utc::now() - threshold + chrono::Duration::milliseconds(500));
    state.store.upsert_node(node).unwrap();

    check_dead_runners(&state);
    assert_eq!(state.store.get_node("n1").unwrap().status, NodeStatus::Online);
}

#[test]
fn offline_nodes_are_not_reprocessed() {
    let (_dir, state) = make_state();
    let mut node = make_node("n1", 8);
    node.status = NodeStatus::Offline;
    node.last_heartbeat = Some(Utc::now() - chrono::Duration::hours(1));
    state.store.upsert_node(node).unwrap();

    // A task that became running again via VPS resurrection must not be
    // re-lost by the loop while the node is already offline.
    state.store.insert_task(make_vps_task(1, "n1", TaskStatus::Running, Some(2222))).unwrap();
    check_dead_runners(&state);
    assert_eq!(state.store.get_task(TaskId(1)).unwrap().status, TaskStatus::Running);
}

#[test]
fn health_sample_aggregates_across_nodes() {
    let (_dir, state) = make_state();

    let mut n1 = make_node("n1", 8);
    n1.metrics.cpu_percent = Some(50.0);
    n1.metrics.memory_used_bytes = Some(32_000_000_000);
    state.store.upsert_node(n1).unwrap();

    let mut n2 = make_node("n2", 8);
    n2.metrics.cpu_percent = Some(100.0);
    n2.status = NodeStatus::Offline;
    state.store.upsert_node(n2).unwrap();

    let sample = collect_health_sample(&state);
    assert_eq!(sample.aggregate.total_nodes, 2);
    assert_eq!(sample.aggregate.online_nodes, 1);
    assert_eq!(sample.aggregate.total_cores, 16);
    assert!((sample.aggregate.avg_cpu_percent - 75.0).abs() < 0.01);
    assert_eq!(sample.nodes.len(), 2);
}

#[test]
fn health_history_is_capped_at_sixty_samples() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();

    for _ in 0..70 {
        state.push_health_sample(collect_health_sample(&state));
    }
    assert_eq!(state.health.lock().len(), crate::state::HEALTH_HISTORY_LEN);
}
