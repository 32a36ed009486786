// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kr_core::{NodeMetrics, NodeStatus, SshKeyMode, TaskBody};
use std::path::PathBuf;

fn store() -> (tempfile::TempDir, TaskStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::open(&dir.path().join("host.db")).unwrap();
    (dir, store)
}

fn node(hostname: &str, cores: u32) -> NodeInfo {
    NodeInfo {
        hostname: hostname.to_string(),
        url: format!("http://{hostname}:8001"),
        registration_order: 0,
        total_cores: cores,
        memory_total_bytes: 64_000_000_000,
        numa_topology: None,
        gpu_info: Vec::new(),
        status: NodeStatus::Online,
        last_heartbeat: Some(Utc::now()),
        metrics: NodeMetrics::default(),
    }
}

fn command_task(id: u64, node: &str, cores: u32, status: TaskStatus) -> Task {
    Task {
        task_id: TaskId(id),
        batch_id: TaskId(id),
        command: "sleep".to_string(),
        arguments: vec!["60".to_string()],
        env_vars: Default::default(),
        required_cores: cores,
        required_memory_bytes: None,
        required_gpus: Vec::new(),
        target_numa_node_id: None,
        assigned_node: Some(node.to_string()),
        container_name: Some("base".to_string()),
        docker_image_tag: Some("kohakuriver/base:base".to_string()),
        privileged: false,
        mount_dirs: Vec::new(),
        status,
        exit_code: None,
        error_message: None,
        submitted_at: Utc::now(),
        started_at: None,
        completed_at: None,
        assignment_suspicion_count: 0,
        body: TaskBody::Command {
            stdout_path: PathBuf::from(format!("/shared/logs/{id}/stdout.log")),
            stderr_path: PathBuf::from(format!("/shared/logs/{id}/stderr.log")),
            working_dir: "/shared".to_string(),
        },
    }
}

fn vps_task(id: u64, node: &str, status: TaskStatus, ssh_port: Option<u16>) -> Task {
    let mut task = command_task(id, node, 1, status);
    task.body = TaskBody::Vps { ssh_port, ssh_key_mode: SshKeyMode::Upload };
    task
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.db");
    {
        let store = TaskStore::open(&path).unwrap();
        store.upsert_node(node("n1", 8)).unwrap();
        store.insert_task(command_task(1, "n1", 2, TaskStatus::Running)).unwrap();
    }
    let store = TaskStore::open(&path).unwrap();
    assert_eq!(store.get_node("n1").unwrap().total_cores, 8);
    assert_eq!(store.get_task(TaskId(1)).unwrap().status, TaskStatus::Running);
}

#[test]
fn nodes_list_in_first_seen_order() {
    let (_dir, store) = store();
    store.upsert_node(node("zeta", 8)).unwrap();
    store.upsert_node(node("alpha", 8)).unwrap();
    store.upsert_node(node("mid", 8)).unwrap();

    let hostnames: Vec<String> =
        store.list_nodes().into_iter().map(|n| n.hostname).collect();
    assert_eq!(hostnames, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn re_registration_keeps_the_first_seen_order() {
    let (_dir, store) = store();
    store.upsert_node(node("zeta", 8)).unwrap();
    store.upsert_node(node("alpha", 8)).unwrap();

    // Re-register the first node with new capacity; it must not move to
    // the back of the first-seen sequence, even if the caller claims a
    // different order.
    let mut refreshed = node("zeta", 16);
    refreshed.registration_order = 99;
    store.upsert_node(refreshed).unwrap();

    let nodes = store.list_nodes();
    assert_eq!(nodes[0].hostname, "zeta");
    assert_eq!(nodes[0].total_cores, 16);
    assert_eq!(nodes[1].hostname, "alpha");
}

#[test]
fn first_seen_order_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.db");
    {
        let store = TaskStore::open(&path).unwrap();
        store.upsert_node(node("zeta", 8)).unwrap();
        store.upsert_node(node("alpha", 8)).unwrap();
    }
    let store = TaskStore::open(&path).unwrap();
    let hostnames: Vec<String> =
        store.list_nodes().into_iter().map(|n| n.hostname).collect();
    assert_eq!(hostnames, vec!["zeta", "alpha"]);

    // A node registered after the restart lands at the end.
    store.upsert_node(node("late", 8)).unwrap();
    assert_eq!(store.list_nodes()[2].hostname, "late");
}

#[test]
fn second_open_of_the_same_db_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("host.db");
    let _store = TaskStore::open(&path).unwrap();
    assert!(matches!(TaskStore::open(&path), Err(StorageError::Locked(_))));
}

#[test]
fn cores_in_use_counts_assigning_and_running_only() {
    let (_dir, store) = store();
    store.upsert_node(node("n1", 16)).unwrap();
    store.insert_task(command_task(1, "n1", 4, TaskStatus::Running)).unwrap();
    store.insert_task(command_task(2, "n1", 2, TaskStatus::Assigning)).unwrap();
    store.insert_task(command_task(3, "n1", 8, TaskStatus::Completed)).unwrap();
    store.insert_task(command_task(4, "n2", 8, TaskStatus::Running)).unwrap();

    assert_eq!(store.cores_in_use("n1"), 6);
}

#[test]
fn gpus_in_use_are_a_union_over_active_tasks() {
    let (_dir, store) = store();
    let mut t1 = command_task(1, "n1", 1, TaskStatus::Running);
    t1.required_gpus = vec![0, 1];
    let mut t2 = command_task(2, "n1", 1, TaskStatus::Assigning);
    t2.required_gpus = vec![2];
    let mut t3 = command_task(3, "n1", 1, TaskStatus::Failed);
    t3.required_gpus = vec![3];
    for t in [t1, t2, t3] {
        store.insert_task(t).unwrap();
    }
    assert_eq!(store.gpus_in_use("n1"), HashSet::from([0, 1, 2]));
}

#[test]
fn ssh_port_allocation_starts_at_2222_and_skips_active_ports() {
    let (_dir, store) = store();
    assert_eq!(store.next_free_ssh_port(), 2222);

    store.insert_task(vps_task(1, "n1", TaskStatus::Running, Some(2222))).unwrap();
    store.insert_task(vps_task(2, "n1", TaskStatus::Assigning, Some(2223))).unwrap();
    assert_eq!(store.next_free_ssh_port(), 2224);
}

#[test]
fn terminal_vps_frees_its_port() {
    let (_dir, store) = store();
    store.insert_task(vps_task(1, "n1", TaskStatus::Stopped, Some(2222))).unwrap();
    assert_eq!(store.next_free_ssh_port(), 2222);
}

#[test]
fn tty_only_port_zero_is_never_allocated_or_reserved() {
    let (_dir, store) = store();
    store.insert_task(vps_task(1, "n1", TaskStatus::Running, Some(0))).unwrap();
    assert_eq!(store.next_free_ssh_port(), 2222);
}

#[test]
fn list_tasks_filters_and_paginates_newest_first() {
    let (_dir, store) = store();
    for id in 1..=5 {
        let mut task = command_task(id, "n1", 1, TaskStatus::Running);
        task.submitted_at = Utc::now() + chrono::Duration::seconds(id as i64);
        store.insert_task(task).unwrap();
    }
    store.insert_task(vps_task(6, "n1", TaskStatus::Running, Some(2222))).unwrap();

    let filter = TaskFilter { task_type: Some(TaskType::Command), ..Default::default() };
    let page = store.list_tasks(&filter, 2, 1);
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].task_id, TaskId(4));
    assert_eq!(page[1].task_id, TaskId(3));
}

#[test]
fn apply_update_moves_assigning_to_running_and_clears_suspicion() {
    let (_dir, store) = store();
    let mut task = command_task(1, "n1", 1, TaskStatus::Assigning);
    task.assignment_suspicion_count = 1;
    store.insert_task(task).unwrap();

    let fields =
        UpdateFields { started_at: Some(Utc::now()), ..Default::default() };
    let outcome = store.apply_update(TaskId(1), TaskStatus::Running, fields).unwrap();
    assert_eq!(outcome, UpdateOutcome::Applied);

    let task = store.get_task(TaskId(1)).unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.started_at.is_some());
    assert_eq!(task.assignment_suspicion_count, 0);
}

#[test]
fn apply_update_rejects_overwriting_terminal_states() {
    let (_dir, store) = store();
    store.insert_task(command_task(1, "n1", 1, TaskStatus::Completed)).unwrap();

    let outcome = store
        .apply_update(TaskId(1), TaskStatus::Running, UpdateFields::default())
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::RejectedTerminal);
    assert_eq!(store.get_task(TaskId(1)).unwrap().status, TaskStatus::Completed);
}

#[test]
fn lost_vps_resurrects_and_clears_completed_at() {
    let (_dir, store) = store();
    let mut vps = vps_task(1, "n1", TaskStatus::Lost, Some(2222));
    vps.completed_at = Some(Utc::now());
    store.insert_task(vps).unwrap();

    let fields = UpdateFields { ssh_port: Some(32801), ..Default::default() };
    let outcome = store.apply_update(TaskId(1), TaskStatus::Running, fields).unwrap();
    assert_eq!(outcome, UpdateOutcome::Resurrected);

    let task = store.get_task(TaskId(1)).unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.completed_at, None);
    assert_eq!(task.ssh_port(), Some(32801));
}

#[test]
fn lost_command_task_cannot_resurrect() {
    let (_dir, store) = store();
    store.insert_task(command_task(1, "n1", 1, TaskStatus::Lost)).unwrap();

    let outcome = store
        .apply_update(TaskId(1), TaskStatus::Running, UpdateFields::default())
        .unwrap();
    assert_eq!(outcome, UpdateOutcome::RejectedTerminal);
    assert_eq!(store.get_task(TaskId(1)).unwrap().status, TaskStatus::Lost);
}

#[test]
fn terminal_update_without_completed_at_gets_stamped() {
    let (_dir, store) = store();
    store.insert_task(command_task(1, "n1", 1, TaskStatus::Running)).unwrap();

    let fields = UpdateFields { exit_code: Some(0), ..Default::default() };
    store.apply_update(TaskId(1), TaskStatus::Completed, fields).unwrap();

    let task = store.get_task(TaskId(1)).unwrap();
    assert!(task.completed_at.is_some());
    assert_eq!(task.exit_code, Some(0));
}

#[test]
fn unknown_task_update_is_not_found() {
    let (_dir, store) = store();
    assert!(matches!(
        store.apply_update(TaskId(999), TaskStatus::Running, UpdateFields::default()),
        Err(StorageError::NotFound(_))
    ));
}
