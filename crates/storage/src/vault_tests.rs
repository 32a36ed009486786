// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn task_record(id: u64) -> TaskRecord {
    TaskRecord {
        task_id: TaskId(id),
        container_name: format!("kohakuriver-task-{id}"),
        allocated_cores: 2,
        allocated_gpus: vec![],
        numa_node: None,
    }
}

fn vps_record(id: u64, port: u16) -> VpsRecord {
    VpsRecord {
        task_id: TaskId(id),
        container_name: format!("kohakuriver-vps-{id}"),
        ssh_port: port,
        has_key: true,
        allocated_cores: 1,
        allocated_gpus: vec![],
        numa_node: None,
    }
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner-state.db");
    {
        let vault = StateVault::open(&path).unwrap();
        vault.add_task(task_record(1)).unwrap();
        vault.add_vps(vps_record(2, 32801)).unwrap();
    }
    let vault = StateVault::open(&path).unwrap();
    assert_eq!(vault.get_task(TaskId(1)), Some(task_record(1)));
    assert_eq!(vault.get_vps(TaskId(2)), Some(vps_record(2, 32801)));
}

#[test]
fn running_ids_cover_both_collections() {
    let dir = tempfile::tempdir().unwrap();
    let vault = StateVault::open(&dir.path().join("state.db")).unwrap();
    vault.add_task(task_record(3)).unwrap();
    vault.add_vps(vps_record(1, 0)).unwrap();

    assert_eq!(vault.running_task_ids(), vec![TaskId(1), TaskId(3)]);
}

#[test]
fn resolve_container_checks_all_collections() {
    let dir = tempfile::tempdir().unwrap();
    let vault = StateVault::open(&dir.path().join("state.db")).unwrap();
    vault.add_task(task_record(1)).unwrap();
    vault.add_vps(vps_record(2, 0)).unwrap();

    assert_eq!(vault.resolve_container(TaskId(1)).as_deref(), Some("kohakuriver-task-1"));
    assert_eq!(vault.resolve_container(TaskId(2)).as_deref(), Some("kohakuriver-vps-2"));
    assert_eq!(vault.resolve_container(TaskId(3)), None);
}

#[test]
fn pause_markers_are_independent_of_running_records() {
    let dir = tempfile::tempdir().unwrap();
    let vault = StateVault::open(&dir.path().join("state.db")).unwrap();
    vault.add_task(task_record(1)).unwrap();
    vault
        .mark_paused(PausedRecord {
            task_id: TaskId(1),
            container_name: "kohakuriver-task-1".to_string(),
        })
        .unwrap();

    assert!(vault.is_paused(TaskId(1)));
    assert!(vault.get_task(TaskId(1)).is_some());

    vault.clear_paused(TaskId(1)).unwrap();
    assert!(!vault.is_paused(TaskId(1)));
}

#[test]
fn remove_all_clears_every_trace() {
    let dir = tempfile::tempdir().unwrap();
    let vault = StateVault::open(&dir.path().join("state.db")).unwrap();
    vault.add_vps(vps_record(5, 2222)).unwrap();
    vault
        .mark_paused(PausedRecord {
            task_id: TaskId(5),
            container_name: "kohakuriver-vps-5".to_string(),
        })
        .unwrap();

    let container = vault.remove_all(TaskId(5)).unwrap();
    assert_eq!(container.as_deref(), Some("kohakuriver-vps-5"));
    assert!(vault.get_vps(TaskId(5)).is_none());
    assert!(!vault.is_paused(TaskId(5)));
    assert!(vault.running_task_ids().is_empty());
}

#[test]
fn remove_task_returns_the_record_once() {
    let dir = tempfile::tempdir().unwrap();
    let vault = StateVault::open(&dir.path().join("state.db")).unwrap();
    vault.add_task(task_record(1)).unwrap();

    assert_eq!(vault.remove_task(TaskId(1)).unwrap(), Some(task_record(1)));
    assert_eq!(vault.remove_task(TaskId(1)).unwrap(), None);
}
