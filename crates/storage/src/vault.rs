// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner-side state vault (C3).
//!
//! Three collections keyed by task id — running tasks, VPS sessions,
//! paused markers — snapshotted to `<local_temp>/runner-state.db` so a
//! restarted runner can reconcile against what it believed it owned.
//! A record exists iff the runner believes the container is on disk;
//! records are written before the container is launched and removed after
//! the final state has been reported.

use crate::{snapshot, StorageError};
use kr_core::TaskId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Record for a running command-task container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub container_name: String,
    pub allocated_cores: u32,
    #[serde(default)]
    pub allocated_gpus: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numa_node: Option<u32>,
}

/// Record for a VPS container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpsRecord {
    pub task_id: TaskId,
    pub container_name: String,
    /// Published host port; 0 means TTY-only.
    pub ssh_port: u16,
    #[serde(default)]
    pub has_key: bool,
    pub allocated_cores: u32,
    #[serde(default)]
    pub allocated_gpus: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numa_node: Option<u32>,
}

/// Marker for a paused container (the running/VPS record stays alongside).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausedRecord {
    pub task_id: TaskId,
    pub container_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultState {
    running_tasks: HashMap<String, TaskRecord>,
    vps_sessions: HashMap<String, VpsRecord>,
    paused_tasks: HashMap<String, PausedRecord>,
}

/// Persistent vault handle. Single-process single-writer.
pub struct StateVault {
    path: PathBuf,
    state: Mutex<VaultState>,
}

impl StateVault {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let state = snapshot::load::<VaultState>(path)?.unwrap_or_default();
        tracing::info!(
            path = %path.display(),
            running = state.running_tasks.len(),
            vps = state.vps_sessions.len(),
            paused = state.paused_tasks.len(),
            "runner state vault opened"
        );
        Ok(Self { path: path.to_path_buf(), state: Mutex::new(state) })
    }

    fn persist(&self, state: &VaultState) -> Result<(), StorageError> {
        snapshot::save(&self.path, state)?;
        Ok(())
    }

    // --- running command tasks ---

    pub fn add_task(&self, record: TaskRecord) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.running_tasks.insert(record.task_id.to_string(), record);
        self.persist(&state)
    }

    pub fn get_task(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.state.lock().running_tasks.get(&task_id.to_string()).cloned()
    }

    pub fn remove_task(&self, task_id: TaskId) -> Result<Option<TaskRecord>, StorageError> {
        let mut state = self.state.lock();
        let removed = state.running_tasks.remove(&task_id.to_string());
        if removed.is_some() {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    // --- VPS sessions ---

    pub fn add_vps(&self, record: VpsRecord) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.vps_sessions.insert(record.task_id.to_string(), record);
        self.persist(&state)
    }

    pub fn get_vps(&self, task_id: TaskId) -> Option<VpsRecord> {
        self.state.lock().vps_sessions.get(&task_id.to_string()).cloned()
    }

    pub fn list_vps(&self) -> Vec<VpsRecord> {
        self.state.lock().vps_sessions.values().cloned().collect()
    }

    pub fn remove_vps(&self, task_id: TaskId) -> Result<Option<VpsRecord>, StorageError> {
        let mut state = self.state.lock();
        let removed = state.vps_sessions.remove(&task_id.to_string());
        if removed.is_some() {
            self.persist(&state)?;
        }
        Ok(removed)
    }

    // --- paused markers ---

    pub fn mark_paused(&self, record: PausedRecord) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.paused_tasks.insert(record.task_id.to_string(), record);
        self.persist(&state)
    }

    pub fn clear_paused(&self, task_id: TaskId) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.paused_tasks.remove(&task_id.to_string()).is_some() {
            self.persist(&state)?;
        }
        Ok(())
    }

    pub fn is_paused(&self, task_id: TaskId) -> bool {
        self.state.lock().paused_tasks.contains_key(&task_id.to_string())
    }

    // --- cross-collection views ---

    /// Every container the runner believes it owns: `(task_id, container)`.
    pub fn all_records(&self) -> Vec<(TaskId, String)> {
        let state = self.state.lock();
        let mut records: Vec<(TaskId, String)> = state
            .running_tasks
            .values()
            .map(|r| (r.task_id, r.container_name.clone()))
            .chain(state.vps_sessions.values().map(|r| (r.task_id, r.container_name.clone())))
            .collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }

    /// Task IDs reported as running in heartbeats (commands and VPS).
    pub fn running_task_ids(&self) -> Vec<TaskId> {
        let state = self.state.lock();
        let mut ids: Vec<TaskId> = state
            .running_tasks
            .values()
            .map(|r| r.task_id)
            .chain(state.vps_sessions.values().map(|r| r.task_id))
            .collect();
        ids.sort();
        ids
    }

    /// Resolve a task id to its container name, whichever collection holds it.
    pub fn resolve_container(&self, task_id: TaskId) -> Option<String> {
        let state = self.state.lock();
        let key = task_id.to_string();
        state
            .running_tasks
            .get(&key)
            .map(|r| r.container_name.clone())
            .or_else(|| state.vps_sessions.get(&key).map(|r| r.container_name.clone()))
            .or_else(|| state.paused_tasks.get(&key).map(|r| r.container_name.clone()))
    }

    /// Drop every trace of a task; returns the container name if any
    /// collection knew it.
    pub fn remove_all(&self, task_id: TaskId) -> Result<Option<String>, StorageError> {
        let mut state = self.state.lock();
        let key = task_id.to_string();
        let from_running = state.running_tasks.remove(&key).map(|r| r.container_name);
        let from_vps = state.vps_sessions.remove(&key).map(|r| r.container_name);
        let container = from_running.or(from_vps);
        let had_pause = state.paused_tasks.remove(&key).is_some();
        if container.is_some() || had_pause {
            self.persist(&state)?;
        }
        Ok(container)
    }
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
