// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kr_core::TaskStatus;

#[test]
fn minimal_submit_request_fills_defaults() {
    let req: SubmitRequest = serde_json::from_str(
        r#"{"task_type":"command","command":"echo","targets":["n1"]}"#,
    )
    .expect("parse");
    assert_eq!(req.task_type, TaskType::Command);
    assert_eq!(req.required_cores, 1);
    assert!(req.arguments.is_empty());
    assert!(req.required_gpus.is_empty());
    assert_eq!(req.container_name, None);
}

#[test]
fn heartbeat_payload_defaults_to_empty_lists() {
    let hb: HeartbeatPayload = serde_json::from_str(r#"{"cpu_percent":12.5}"#).expect("parse");
    assert!(hb.running_tasks.is_empty());
    assert!(hb.killed_tasks.is_empty());
    assert_eq!(hb.cpu_percent, Some(12.5));
}

#[test]
fn status_update_roundtrip_preserves_ssh_port() {
    let mut update = StatusUpdate::new(TaskId(55), TaskStatus::Running);
    update.ssh_port = Some(32801);
    let json = serde_json::to_string(&update).expect("json");
    let back: StatusUpdate = serde_json::from_str(&json).expect("parse");
    assert_eq!(back.ssh_port, Some(32801));
    assert_eq!(back.status, TaskStatus::Running);
}

#[test]
fn status_update_omits_absent_fields() {
    let update = StatusUpdate::new(TaskId(55), TaskStatus::Completed);
    let json = serde_json::to_string(&update).expect("json");
    assert!(!json.contains("ssh_port"));
    assert!(!json.contains("exit_code"));
}

#[test]
fn killed_task_reason_is_freeform() {
    let killed: KilledTask =
        serde_json::from_str(r#"{"task_id":9,"reason":"oom"}"#).expect("parse");
    assert_eq!(killed, KilledTask { task_id: TaskId(9), reason: "oom".to_string() });
}
