// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler tests: validation, node selection, per-target placement.

use super::*;
use crate::test_support::{make_command_task, make_node, make_state};
use kr_core::{GpuInfo, NodeStatus, NumaNode};

fn command_request(targets: &[&str]) -> SubmitRequest {
    SubmitRequest {
        task_type: TaskType::Command,
        command: "echo".to_string(),
        arguments: vec!["hi".to_string()],
        env_vars: Default::default(),
        required_cores: 2,
        required_memory_bytes: None,
        required_gpus: Vec::new(),
        targets: targets.iter().map(|t| t.to_string()).collect(),
        container_name: Some("base".to_string()),
        privileged: None,
        additional_mounts: None,
        ssh_key_mode: None,
    }
}

fn vps_request(target: &str) -> SubmitRequest {
    SubmitRequest {
        task_type: TaskType::Vps,
        command: "ssh-ed25519 AAAA test@host".to_string(),
        targets: vec![target.to_string()],
        ..command_request(&[])
    }
}

fn gpu_node(hostname: &str, cores: u32, gpus: u32) -> kr_core::NodeInfo {
    let mut node = make_node(hostname, cores);
    node.gpu_info = (0..gpus)
        .map(|i| GpuInfo {
            gpu_id: i,
            name: "Test GPU".to_string(),
            memory_total_bytes: 24 * 1024 * 1024 * 1024,
            memory_used_bytes: None,
            utilization_percent: None,
            temperature_c: None,
        })
        .collect();
    node
}

#[tokio::test]
async fn vps_with_null_container_is_rejected_without_records() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();

    let mut req = vps_request("n1");
    req.container_name = Some("NULL".to_string());
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(state.store.list_tasks(&Default::default(), 100, 0).is_empty());
}

#[tokio::test]
async fn vps_with_multiple_targets_is_rejected() {
    let (_dir, state) = make_state();
    let mut req = vps_request("n1");
    req.targets = vec!["n1".to_string(), "n2".to_string()];
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn gpu_demand_without_targets_is_rejected() {
    let (_dir, state) = make_state();
    let mut req = command_request(&[]);
    req.required_gpus = vec![vec![0]];
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn gpu_list_must_match_target_count() {
    let (_dir, state) = make_state();
    let mut req = command_request(&["n1", "n2"]);
    req.required_gpus = vec![vec![0]];
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn submission_with_no_placeable_target_is_rejected() {
    let (_dir, state) = make_state();
    let mut node = make_node("n1", 8);
    node.status = NodeStatus::Offline;
    state.store.upsert_node(node).unwrap();

    let err = submit(&state, command_request(&["n1"])).await.unwrap_err();
    assert_eq!(err.status_code(), 503);
    assert!(state.store.list_tasks(&Default::default(), 100, 0).is_empty());
}

#[tokio::test]
async fn partial_failure_reports_both_created_and_failed_targets() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    let mut offline = make_node("n2", 8);
    offline.status = NodeStatus::Offline;
    state.store.upsert_node(offline).unwrap();

    let response = submit(&state, command_request(&["n1", "n2"])).await.unwrap();
    assert_eq!(response.task_ids.len(), 1);
    assert_eq!(response.failed_targets.len(), 1);
    assert_eq!(response.failed_targets[0].target, "n2");
    assert_eq!(response.failed_targets[0].reason, "Node status is offline");

    let task = state.store.get_task(response.task_ids[0]).unwrap();
    assert_eq!(task.assigned_node.as_deref(), Some("n1"));
    assert_eq!(task.batch_id, task.task_id);
}

#[tokio::test]
async fn multi_target_batch_shares_the_first_task_id() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();
    state.store.upsert_node(make_node("n2", 8)).unwrap();

    let response = submit(&state, command_request(&["n1", "n2"])).await.unwrap();
    assert_eq!(response.task_ids.len(), 2);

    let first = state.store.get_task(response.task_ids[0]).unwrap();
    let second = state.store.get_task(response.task_ids[1]).unwrap();
    assert_eq!(first.batch_id, first.task_id);
    assert_eq!(second.batch_id, first.task_id);
}

#[tokio::test]
async fn auto_selection_prefers_the_largest_available_node() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("small", 4)).unwrap();
    state.store.upsert_node(make_node("big", 16)).unwrap();
    // Load the big node a little; it still has the most headroom.
    state.store.insert_task(make_command_task(1, "big", 4, TaskStatus::Running)).unwrap();

    let response = submit(&state, command_request(&[])).await.unwrap();
    let task = state.store.get_task(response.task_ids[0]).unwrap();
    assert_eq!(task.assigned_node.as_deref(), Some("big"));
}

#[tokio::test]
async fn auto_selection_tie_breaks_on_first_seen_order() {
    let (_dir, state) = make_state();
    // "zeta" registers first; with equal free cores it wins the tie even
    // though "alpha" sorts before it.
    state.store.upsert_node(make_node("zeta", 8)).unwrap();
    state.store.upsert_node(make_node("alpha", 8)).unwrap();

    let response = submit(&state, command_request(&[])).await.unwrap();
    let task = state.store.get_task(response.task_ids[0]).unwrap();
    assert_eq!(task.assigned_node.as_deref(), Some("zeta"));
}

#[tokio::test]
async fn re_registration_does_not_reset_tie_break_priority() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("zeta", 8)).unwrap();
    state.store.upsert_node(make_node("alpha", 8)).unwrap();
    // zeta re-registers (e.g. runner restart); it keeps first-seen priority.
    state.store.upsert_node(make_node("zeta", 8)).unwrap();

    let response = submit(&state, command_request(&[])).await.unwrap();
    let task = state.store.get_task(response.task_ids[0]).unwrap();
    assert_eq!(task.assigned_node.as_deref(), Some("zeta"));
}

#[tokio::test]
async fn invalid_target_syntax_fails_that_target_only() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 8)).unwrap();

    let response = submit(&state, command_request(&["n1", "n1::"])).await.unwrap();
    assert_eq!(response.task_ids.len(), 1);
    assert_eq!(response.failed_targets.len(), 1);
    assert!(response.failed_targets[0].reason.contains("empty GPU list"));
}

#[tokio::test]
async fn numa_target_requires_a_known_numa_node() {
    let (_dir, state) = make_state();
    let mut node = make_node("n1", 8);
    let mut topology = kr_core::NumaTopology::new();
    topology.insert(0, NumaNode { cores: vec![0, 1, 2, 3], memory_bytes: None });
    node.numa_topology = Some(topology);
    state.store.upsert_node(node).unwrap();
    state.store.upsert_node(make_node("flat", 8)).unwrap();

    // Valid NUMA id places; invalid id and no-topology node fail.
    let response =
        submit(&state, command_request(&["n1:0", "n1:3", "flat:0"])).await.unwrap();
    assert_eq!(response.task_ids.len(), 1);
    assert_eq!(response.failed_targets.len(), 2);

    let task = state.store.get_task(response.task_ids[0]).unwrap();
    assert_eq!(task.target_numa_node_id, Some(0));
}

#[tokio::test]
async fn gpu_indices_must_exist_on_the_node() {
    let (_dir, state) = make_state();
    state.store.upsert_node(gpu_node("g1", 8, 2)).unwrap();

    let mut req = command_request(&["g1"]);
    req.required_gpus = vec![vec![0, 5]];
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 503); // single target, so the batch fails
}

#[tokio::test]
async fn busy_gpus_cannot_be_double_booked() {
    let (_dir, state) = make_state();
    state.store.upsert_node(gpu_node("g1", 8, 2)).unwrap();
    let mut holder = make_command_task(1, "g1", 1, TaskStatus::Running);
    holder.required_gpus = vec![0];
    state.store.insert_task(holder).unwrap();

    let mut req = command_request(&["g1"]);
    req.required_gpus = vec![vec![0]];
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn target_string_gpu_syntax_selects_gpus() {
    let (_dir, state) = make_state();
    state.store.upsert_node(gpu_node("g1", 8, 4)).unwrap();

    let response = submit(&state, command_request(&["g1::0,1"])).await.unwrap();
    let task = state.store.get_task(response.task_ids[0]).unwrap();
    assert_eq!(task.required_gpus, vec![0, 1]);
}

#[tokio::test]
async fn insufficient_cores_fail_the_target() {
    let (_dir, state) = make_state();
    state.store.upsert_node(make_node("n1", 2)).unwrap();

    let mut req = command_request(&["n1"]);
    req.required_cores = 4;
    let err = submit(&state, req).await.unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn vps_dispatch_failure_marks_the_task_failed() {
    let (_dir, state) = make_state();
    // The node's URL points nowhere reachable, so the awaited VPS dispatch
    // fails and the task must be failed rather than left assigning.
    let mut node = make_node("n1", 8);
    node.url = "http://127.0.0.1:1".to_string();
    state.store.upsert_node(node).unwrap();

    let err = submit(&state, vps_request("n1")).await.unwrap_err();
    assert_eq!(err.status_code(), 503);

    let tasks = state.store.list_tasks(&Default::default(), 10, 0);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert!(tasks[0].completed_at.is_some());
}

#[tokio::test]
async fn first_vps_gets_port_2222() {
    let (_dir, state) = make_state();
    let mut node = make_node("n1", 8);
    node.url = "http://127.0.0.1:1".to_string();
    state.store.upsert_node(node).unwrap();

    // Dispatch fails, but the record keeps its tentative allocation.
    let _ = submit(&state, vps_request("n1")).await;
    let tasks = state.store.list_tasks(&Default::default(), 10, 0);
    assert_eq!(tasks[0].ssh_port(), Some(2222));
}
