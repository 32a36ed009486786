// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    completed = { TaskStatus::Completed },
    failed = { TaskStatus::Failed },
    killed = { TaskStatus::Killed },
    killed_oom = { TaskStatus::KilledOom },
    lost = { TaskStatus::Lost },
    stopped = { TaskStatus::Stopped },
)]
fn terminal_states_are_terminal(status: TaskStatus) {
    assert!(status.is_terminal());
    assert!(!status.is_active());
}

#[parameterized(
    pending = { TaskStatus::Pending },
    assigning = { TaskStatus::Assigning },
    running = { TaskStatus::Running },
    paused = { TaskStatus::Paused },
)]
fn active_states_are_not_terminal(status: TaskStatus) {
    assert!(status.is_active());
    assert!(!status.is_terminal());
}

#[test]
fn paused_tasks_do_not_hold_scheduler_resources() {
    assert!(TaskStatus::Assigning.holds_resources());
    assert!(TaskStatus::Running.holds_resources());
    assert!(!TaskStatus::Paused.holds_resources());
    assert!(!TaskStatus::Pending.holds_resources());
}

#[test]
fn terminal_states_reject_all_updates() {
    assert!(!TaskStatus::Completed.accepts_update(TaskStatus::Running, TaskType::Command));
    assert!(!TaskStatus::Killed.accepts_update(TaskStatus::Paused, TaskType::Vps));
    assert!(!TaskStatus::Killed.accepts_update(TaskStatus::Killed, TaskType::Command));
    assert!(!TaskStatus::Lost.accepts_update(TaskStatus::Stopped, TaskType::Command));
}

#[test]
fn lost_vps_may_resurrect_to_running() {
    assert!(TaskStatus::Lost.accepts_update(TaskStatus::Running, TaskType::Vps));
}

#[test]
fn lost_command_task_stays_lost() {
    assert!(!TaskStatus::Lost.accepts_update(TaskStatus::Running, TaskType::Command));
}

#[test]
fn resurrection_only_applies_from_lost() {
    assert!(!TaskStatus::Stopped.accepts_update(TaskStatus::Running, TaskType::Vps));
    assert!(!TaskStatus::Completed.accepts_update(TaskStatus::Running, TaskType::Vps));
}

#[test]
fn wire_spelling_matches_display() {
    for (status, expected) in [
        (TaskStatus::KilledOom, "killed_oom"),
        (TaskStatus::Assigning, "assigning"),
    ] {
        assert_eq!(status.to_string(), expected);
        assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{}\"", expected));
    }
}
