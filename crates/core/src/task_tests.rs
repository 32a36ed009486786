// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::status::SshKeyMode;

fn command_task() -> Task {
    Task {
        task_id: TaskId(100),
        batch_id: TaskId(100),
        command: "echo".to_string(),
        arguments: vec!["hi".to_string()],
        env_vars: HashMap::new(),
        required_cores: 2,
        required_memory_bytes: Some(1_000_000_000),
        required_gpus: vec![],
        target_numa_node_id: None,
        assigned_node: Some("n1".to_string()),
        container_name: Some("base".to_string()),
        docker_image_tag: Some("kohakuriver/base:base".to_string()),
        privileged: false,
        mount_dirs: vec![],
        status: TaskStatus::Assigning,
        exit_code: None,
        error_message: None,
        submitted_at: Utc::now(),
        started_at: None,
        completed_at: None,
        assignment_suspicion_count: 0,
        body: TaskBody::Command {
            stdout_path: PathBuf::from("/shared/logs/100/stdout.log"),
            stderr_path: PathBuf::from("/shared/logs/100/stderr.log"),
            working_dir: "/shared".to_string(),
        },
    }
}

#[test]
fn body_tag_appears_as_task_type_in_json() {
    let json = serde_json::to_value(command_task()).unwrap();
    assert_eq!(json["task_type"], "command");
    assert_eq!(json["stdout_path"], "/shared/logs/100/stdout.log");
}

#[test]
fn round_trips_through_json() {
    let task = command_task();
    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back.task_id, task.task_id);
    assert_eq!(back.task_type(), TaskType::Command);
    assert_eq!(back.stdout_path(), task.stdout_path());
}

#[test]
fn vps_body_carries_ssh_port() {
    let mut task = command_task();
    task.body = TaskBody::Vps { ssh_port: Some(2222), ssh_key_mode: SshKeyMode::Upload };
    assert!(task.is_vps());
    assert_eq!(task.ssh_port(), Some(2222));
    assert_eq!(task.stdout_path(), None);

    task.set_ssh_port(32801);
    assert_eq!(task.ssh_port(), Some(32801));
}

#[test]
fn set_ssh_port_is_a_no_op_for_command_tasks() {
    let mut task = command_task();
    task.set_ssh_port(9999);
    assert_eq!(task.ssh_port(), None);
}
