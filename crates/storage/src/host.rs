// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-side node/task store (C6).
//!
//! Two tables — nodes by hostname, tasks by task id — materialized in
//! memory under one lock and snapshotted to the DB file after every
//! mutation. Status transitions go through [`TaskStore::apply_update`],
//! which owns the terminal-state rules.

use crate::{snapshot, StorageError};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use kr_core::{NodeInfo, Task, TaskId, TaskStatus, TaskType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// First SSH port handed to VPS sessions.
const SSH_PORT_FLOOR: u16 = 2222;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HostState {
    nodes: HashMap<String, NodeInfo>,
    tasks: HashMap<String, Task>,
}

/// Filter for task listing queries.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub node: Option<String>,
}

/// Fields a runner status report may change on a task.
#[derive(Debug, Clone, Default)]
pub struct UpdateFields {
    pub exit_code: Option<i64>,
    pub message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ssh_port: Option<u16>,
}

/// What [`TaskStore::apply_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The VPS came back from `lost`; `completed_at` was cleared.
    Resurrected,
    /// The task is terminal and the update was dropped.
    RejectedTerminal,
}

/// The host's persistent view of nodes and tasks.
pub struct TaskStore {
    path: PathBuf,
    // Held for the process lifetime; the lock file guards against a second
    // coordinator opening the same DB.
    _lock: std::fs::File,
    state: Mutex<HostState>,
}

impl TaskStore {
    /// Open (or create) the store at `path`, taking an exclusive lock.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| StorageError::Io { path: parent.to_path_buf(), source })?;
        }

        let lock_path = path.with_extension("lock");
        let lock = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StorageError::Io { path: lock_path.clone(), source })?;
        lock.try_lock_exclusive().map_err(|_| StorageError::Locked(path.to_path_buf()))?;

        let state = snapshot::load::<HostState>(path)?.unwrap_or_default();
        tracing::info!(
            path = %path.display(),
            nodes = state.nodes.len(),
            tasks = state.tasks.len(),
            "task store opened"
        );
        Ok(Self { path: path.to_path_buf(), _lock: lock, state: Mutex::new(state) })
    }

    fn persist(&self, state: &HostState) -> Result<(), StorageError> {
        snapshot::save(&self.path, state)?;
        Ok(())
    }

    // --- nodes ---

    /// Insert or refresh a node row.
    ///
    /// The store owns `registration_order`: a new hostname gets the next
    /// first-seen sequence number, a re-registration keeps its original
    /// one regardless of what the caller passed in.
    pub fn upsert_node(&self, mut node: NodeInfo) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        node.registration_order = match state.nodes.get(&node.hostname) {
            Some(existing) => existing.registration_order,
            None => {
                state.nodes.values().map(|n| n.registration_order).max().map_or(1, |max| max + 1)
            }
        };
        state.nodes.insert(node.hostname.clone(), node);
        self.persist(&state)
    }

    pub fn get_node(&self, hostname: &str) -> Option<NodeInfo> {
        self.state.lock().nodes.get(hostname).cloned()
    }

    /// All nodes in first-seen order (the sequence survives restarts with
    /// the snapshot; hostname only disambiguates legacy rows that predate
    /// the sequence).
    pub fn list_nodes(&self) -> Vec<NodeInfo> {
        let state = self.state.lock();
        let mut nodes: Vec<NodeInfo> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| {
            a.registration_order
                .cmp(&b.registration_order)
                .then_with(|| a.hostname.cmp(&b.hostname))
        });
        nodes
    }

    /// Mutate one node row; `NotFound` when the hostname is unknown.
    pub fn update_node(
        &self,
        hostname: &str,
        mutate: impl FnOnce(&mut NodeInfo),
    ) -> Result<NodeInfo, StorageError> {
        let mut state = self.state.lock();
        let node = state
            .nodes
            .get_mut(hostname)
            .ok_or_else(|| StorageError::NotFound(format!("node '{hostname}'")))?;
        mutate(node);
        let updated = node.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    // --- tasks ---

    pub fn insert_task(&self, task: Task) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.tasks.insert(task.task_id.to_string(), task);
        self.persist(&state)
    }

    pub fn get_task(&self, task_id: TaskId) -> Option<Task> {
        self.state.lock().tasks.get(&task_id.to_string()).cloned()
    }

    /// Filtered listing, newest submissions first, with pagination.
    pub fn list_tasks(&self, filter: &TaskFilter, limit: usize, offset: usize) -> Vec<Task> {
        let state = self.state.lock();
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.task_type.is_none_or(|ty| t.task_type() == ty))
            .filter(|t| {
                filter.node.as_deref().is_none_or(|n| t.assigned_node.as_deref() == Some(n))
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        tasks.into_iter().skip(offset).take(limit).collect()
    }

    /// Mutate one task row; `NotFound` when the id is unknown.
    pub fn update_task(
        &self,
        task_id: TaskId,
        mutate: impl FnOnce(&mut Task),
    ) -> Result<Task, StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&task_id.to_string())
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        mutate(task);
        let updated = task.clone();
        self.persist(&state)?;
        Ok(updated)
    }

    /// Apply a runner status report under the terminal-state rules.
    ///
    /// Exactly one non-terminal overwrite of a terminal state is allowed:
    /// `lost -> running` for VPS tasks, which also clears `completed_at`.
    pub fn apply_update(
        &self,
        task_id: TaskId,
        new_status: TaskStatus,
        fields: UpdateFields,
    ) -> Result<UpdateOutcome, StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(&task_id.to_string())
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;

        if !task.status.accepts_update(new_status, task.task_type()) {
            tracing::warn!(
                %task_id,
                current = %task.status,
                update = %new_status,
                "ignoring status update for task in a final state"
            );
            return Ok(UpdateOutcome::RejectedTerminal);
        }

        let resurrecting = task.status == TaskStatus::Lost && new_status == TaskStatus::Running;

        task.status = new_status;
        task.exit_code = fields.exit_code;
        task.error_message = fields.message;

        if let Some(started) = fields.started_at {
            if task.started_at.is_none() {
                task.started_at = Some(started);
            }
        }

        if resurrecting {
            task.completed_at = None;
        } else if let Some(completed) = fields.completed_at {
            task.completed_at = Some(completed);
        } else if new_status.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(Utc::now());
        }

        if let Some(port) = fields.ssh_port {
            task.set_ssh_port(port);
        }

        if task.assignment_suspicion_count > 0 {
            task.assignment_suspicion_count = 0;
        }

        let outcome =
            if resurrecting { UpdateOutcome::Resurrected } else { UpdateOutcome::Applied };
        self.persist(&state)?;
        Ok(outcome)
    }

    /// Tasks on a node whose status is one of `statuses`.
    pub fn tasks_on_node(&self, hostname: &str, statuses: &[TaskStatus]) -> Vec<Task> {
        let state = self.state.lock();
        state
            .tasks
            .values()
            .filter(|t| t.assigned_node.as_deref() == Some(hostname))
            .filter(|t| statuses.contains(&t.status))
            .cloned()
            .collect()
    }

    // --- capacity queries ---

    /// Cores claimed on a node by tasks in resource-holding states.
    pub fn cores_in_use(&self, hostname: &str) -> u32 {
        let state = self.state.lock();
        state
            .tasks
            .values()
            .filter(|t| t.assigned_node.as_deref() == Some(hostname))
            .filter(|t| t.status.holds_resources())
            .map(|t| t.required_cores)
            .sum()
    }

    /// GPU indices claimed on a node by tasks in resource-holding states.
    pub fn gpus_in_use(&self, hostname: &str) -> HashSet<u32> {
        let state = self.state.lock();
        state
            .tasks
            .values()
            .filter(|t| t.assigned_node.as_deref() == Some(hostname))
            .filter(|t| t.status.holds_resources())
            .flat_map(|t| t.required_gpus.iter().copied())
            .collect()
    }

    /// Memory reserved on a node by tasks in resource-holding states.
    pub fn memory_reserved(&self, hostname: &str) -> u64 {
        let state = self.state.lock();
        state
            .tasks
            .values()
            .filter(|t| t.assigned_node.as_deref() == Some(hostname))
            .filter(|t| t.status.holds_resources())
            .filter_map(|t| t.required_memory_bytes)
            .sum()
    }

    /// SSH ports held by active VPS sessions, cluster-wide.
    pub fn active_vps_ports(&self) -> HashSet<u16> {
        let state = self.state.lock();
        state
            .tasks
            .values()
            .filter(|t| t.is_vps() && t.status.is_active())
            .filter_map(|t| t.ssh_port())
            .filter(|p| *p != 0)
            .collect()
    }

    /// Smallest port >= 2222 not held by an active VPS.
    pub fn next_free_ssh_port(&self) -> u16 {
        let taken = self.active_vps_ports();
        let mut port = SSH_PORT_FLOOR;
        while taken.contains(&port) {
            port += 1;
        }
        port
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
