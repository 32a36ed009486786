// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records.
//!
//! Command tasks and VPS sessions share most fields; the divergent parts
//! live in a tagged [`TaskBody`] so the scheduler and state machine stay
//! single-pathed.

use crate::id::TaskId;
use crate::status::{SshKeyMode, TaskStatus, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Variant-specific task fields, tagged on the wire as `task_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskBody {
    Command {
        stdout_path: PathBuf,
        stderr_path: PathBuf,
        working_dir: String,
    },
    Vps {
        /// Host-side SSH port. Tentative until the runner reports the port
        /// Docker actually published; 0 means TTY-only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ssh_port: Option<u16>,
        ssh_key_mode: SshKeyMode,
    },
}

impl TaskBody {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskBody::Command { .. } => TaskType::Command,
            TaskBody::Vps { .. } => TaskType::Vps,
        }
    }
}

/// A scheduled unit of work, command task or VPS session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    /// First task ID of the submission group; self-referencing for
    /// single-target submissions.
    pub batch_id: TaskId,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub required_cores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_memory_bytes: Option<u64>,
    /// GPU indices chosen on the assigned node.
    #[serde(default)]
    pub required_gpus: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_numa_node_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_node: Option<String>,
    /// Base environment name (image lineage), None for bare-metal command tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_tag: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub mount_dirs: Vec<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Reconciliation cycles that failed to confirm a dispatched task
    /// is running (0..=2; at 2 the task fails).
    #[serde(default)]
    pub assignment_suspicion_count: u8,
    #[serde(flatten)]
    pub body: TaskBody,
}

impl Task {
    pub fn task_type(&self) -> TaskType {
        self.body.task_type()
    }

    pub fn is_vps(&self) -> bool {
        self.task_type() == TaskType::Vps
    }

    pub fn ssh_port(&self) -> Option<u16> {
        match &self.body {
            TaskBody::Vps { ssh_port, .. } => *ssh_port,
            TaskBody::Command { .. } => None,
        }
    }

    pub fn set_ssh_port(&mut self, port: u16) {
        if let TaskBody::Vps { ssh_port, .. } = &mut self.body {
            *ssh_port = Some(port);
        }
    }

    pub fn stdout_path(&self) -> Option<&std::path::Path> {
        match &self.body {
            TaskBody::Command { stdout_path, .. } => Some(stdout_path),
            TaskBody::Vps { .. } => None,
        }
    }

    pub fn stderr_path(&self) -> Option<&std::path::Path> {
        match &self.body {
            TaskBody::Command { stderr_path, .. } => Some(stderr_path),
            TaskBody::Vps { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
