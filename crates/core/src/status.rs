// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status vocabulary and the task state machine.
//!
//! Terminal states are immutable with exactly one exception: a VPS marked
//! `lost` may come back as `running` when the runner that was presumed dead
//! reappears and still holds the container.

use serde::{Deserialize, Serialize};

/// Task lifecycle status (wire vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted but not yet dispatched (VPS reports this while preparing).
    Pending,
    /// Dispatched to a runner, start not yet confirmed.
    Assigning,
    Running,
    Paused,
    Completed,
    Failed,
    Killed,
    /// Killed by the kernel OOM killer on the runner.
    KilledOom,
    /// Runner went offline while the task was active.
    Lost,
    /// Container disappeared (e.g. runner host rebooted).
    Stopped,
}

crate::simple_display! {
    TaskStatus {
        Pending => "pending",
        Assigning => "assigning",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Killed => "killed",
        KilledOom => "killed_oom",
        Lost => "lost",
        Stopped => "stopped",
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Killed
                | TaskStatus::KilledOom
                | TaskStatus::Lost
                | TaskStatus::Stopped
        )
    }

    /// Active statuses: the task occupies (or is about to occupy) a node.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Assigning | TaskStatus::Running | TaskStatus::Paused
        )
    }

    /// Statuses counted against a node's cores and GPUs.
    pub fn holds_resources(&self) -> bool {
        matches!(self, TaskStatus::Assigning | TaskStatus::Running)
    }

    /// Whether a status update from a runner may replace `self`.
    ///
    /// Final states are immutable, with exactly one exception: the VPS
    /// resurrection path `lost -> running`.
    pub fn accepts_update(&self, new: TaskStatus, task_type: TaskType) -> bool {
        if !self.is_terminal() {
            return true;
        }
        task_type == TaskType::Vps && *self == TaskStatus::Lost && new == TaskStatus::Running
    }
}

/// Kind of workload a task record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Command,
    Vps,
}

crate::simple_display! {
    TaskType {
        Command => "command",
        Vps => "vps",
    }
}

/// Node liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
}

crate::simple_display! {
    NodeStatus {
        Online => "online",
        Offline => "offline",
    }
}

/// SSH authentication mode for a VPS session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SshKeyMode {
    /// No SSH daemon at all; terminal access only.
    Disabled,
    /// sshd with empty-password root login.
    None,
    /// Caller-provided public key.
    #[default]
    Upload,
    /// Key pair generated client-side; the public half arrives like `upload`.
    Generate,
}

crate::simple_display! {
    SshKeyMode {
        Disabled => "disabled",
        None => "none",
        Upload => "upload",
        Generate => "generate",
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
