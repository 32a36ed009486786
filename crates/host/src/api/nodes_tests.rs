// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat handling tests: kill reports, suspicion ladder, liveness.

use super::*;
use crate::test_support::{make_command_task, make_node, make_state, make_vps_task};
use kr_core::TaskId;
use kr_wire::KilledTask;

fn beat_with(running: Vec<TaskId>, killed: Vec<KilledTask>) -> HeartbeatPayload {
    HeartbeatPayload { running_tasks: running, killed_tasks: killed, ..Default::default() }
}

#[test]
fn heartbeat_from_unknown_hostname_is_not_found() {
    let (_dir, state) = make_state();
    let err = process_heartbeat(&state, "ghost", &HeartbeatPayload::default(), Utc::now())
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn heartbeat_brings_an_offline_node_back_online() {
    let (_dir, state) = make_state();
    let mut node = make_node("n1", 8);
    node.status = NodeStatus::Offline;
    state.store.upsert_node(node).unwrap();

    process_heartbeat(&state, "n1", &HeartbeatPayload::default(), Utc::now()).unwrap();
    assert_eq!(state.store.get_node("n1").unwrap().status, NodeStatus::Online);
}

#[test]
fn heartbeat_refreshes_metrics_and_timestamp() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();

    let now = Utc::now();
    let payload = HeartbeatPayload {
        cpu_percent: Some(42.0),
        memory_used_bytes: Some(1_000),
        ..Default::default()
    };
    process_heartbeat(&state, "n1", &payload, now).unwrap();

    let node = state.store.get_node("n1").unwrap();
    assert_eq!(node.metrics.cpu_percent, Some(42.0));
    assert_eq!(node.last_heartbeat, Some(now));
}

#[test]
fn oom_kill_report_becomes_killed_oom() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.insert_task(make_command_task(7, "n1", 2, TaskStatus::Running)).unwrap();

    let payload = beat_with(
        vec![],
        vec![KilledTask { task_id: TaskId(7), reason: "oom".to_string() }],
    );
    process_heartbeat(&state, "n1", &payload, Utc::now()).unwrap();

    let task = state.store.get_task(TaskId(7)).unwrap();
    assert_eq!(task.status, TaskStatus::KilledOom);
    assert_eq!(task.exit_code, Some(-9));
    assert!(task.completed_at.is_some());
}

#[test]
fn non_oom_kill_report_becomes_failed() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.insert_task(make_command_task(7, "n1", 2, TaskStatus::Running)).unwrap();

    let payload = beat_with(
        vec![],
        vec![KilledTask { task_id: TaskId(7), reason: "watchdog".to_string() }],
    );
    process_heartbeat(&state, "n1", &payload, Utc::now()).unwrap();
    assert_eq!(state.store.get_task(TaskId(7)).unwrap().status, TaskStatus::Failed);
}

#[test]
fn kill_report_for_terminal_task_is_ignored() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.insert_task(make_command_task(7, "n1", 2, TaskStatus::Completed)).unwrap();

    let payload = beat_with(
        vec![],
        vec![KilledTask { task_id: TaskId(7), reason: "oom".to_string() }],
    );
    process_heartbeat(&state, "n1", &payload, Utc::now()).unwrap();
    assert_eq!(state.store.get_task(TaskId(7)).unwrap().status, TaskStatus::Completed);
}

#[test]
fn task_reported_both_killed_and_running_resolves_as_killed() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.insert_task(make_command_task(7, "n1", 2, TaskStatus::Assigning)).unwrap();

    let payload = beat_with(
        vec![TaskId(7)],
        vec![KilledTask { task_id: TaskId(7), reason: "oom".to_string() }],
    );
    process_heartbeat(&state, "n1", &payload, Utc::now()).unwrap();
    assert_eq!(state.store.get_task(TaskId(7)).unwrap().status, TaskStatus::KilledOom);
}

#[test]
fn assigning_task_reported_running_transitions_with_started_at() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    let mut task = make_command_task(9, "n1", 2, TaskStatus::Assigning);
    task.assignment_suspicion_count = 1;
    state.store.insert_task(task).unwrap();

    process_heartbeat(&state, "n1", &beat_with(vec![TaskId(9)], vec![]), Utc::now()).unwrap();

    let task = state.store.get_task(TaskId(9)).unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.started_at.is_some());
    assert_eq!(task.assignment_suspicion_count, 0);
}

#[test]
fn suspicion_counts_up_then_fails_on_the_second_strike() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();

    // Submitted long enough ago to exceed 3 x heartbeat_interval.
    let mut task = make_command_task(9, "n1", 2, TaskStatus::Assigning);
    task.submitted_at = Utc::now() - chrono::Duration::seconds(120);
    state.store.insert_task(task).unwrap();

    let empty = beat_with(vec![], vec![]);
    process_heartbeat(&state, "n1", &empty, Utc::now()).unwrap();
    let task = state.store.get_task(TaskId(9)).unwrap();
    assert_eq!(task.assignment_suspicion_count, 1);
    assert_eq!(task.status, TaskStatus::Assigning);

    process_heartbeat(&state, "n1", &empty, Utc::now()).unwrap();
    let task = state.store.get_task(TaskId(9)).unwrap();
    assert_eq!(task.assignment_suspicion_count, 2);
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.exit_code, Some(-1));
}

#[test]
fn fresh_assigning_task_is_not_suspected() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.insert_task(make_command_task(9, "n1", 2, TaskStatus::Assigning)).unwrap();

    process_heartbeat(&state, "n1", &beat_with(vec![], vec![]), Utc::now()).unwrap();
    let task = state.store.get_task(TaskId(9)).unwrap();
    assert_eq!(task.assignment_suspicion_count, 0);
    assert_eq!(task.status, TaskStatus::Assigning);
}

#[test]
fn vps_in_running_set_counts_like_any_task() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.insert_task(make_vps_task(5, "n1", TaskStatus::Assigning, Some(2222))).unwrap();

    process_heartbeat(&state, "n1", &beat_with(vec![TaskId(5)], vec![]), Utc::now()).unwrap();
    assert_eq!(state.store.get_task(TaskId(5)).unwrap().status, TaskStatus::Running);
}
