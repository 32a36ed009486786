// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared runner context passed to every handler and background task.

use kr_core::{NumaTopology, RunnerConfig, TaskId};
use kr_docker::{DockerCli, ImageStore};
use kr_storage::{StateVault, StorageError};
use kr_wire::KilledTask;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct RunnerCtx {
    pub config: RunnerConfig,
    pub hostname: String,
    /// URL the host uses to reach this runner.
    pub runner_url: String,
    pub vault: StateVault,
    pub docker: DockerCli,
    pub image_store: ImageStore,
    pub http: reqwest::Client,
    pub numa_topology: Option<NumaTopology>,
    /// Out-of-band container deaths awaiting the next successful heartbeat.
    pub killed_pending: Mutex<Vec<KilledTask>>,
    /// Tasks killed on explicit request; their executor skips the final
    /// status report because the kill path already sent one.
    pub killed_by_request: Mutex<HashSet<TaskId>>,
    /// Per-task operation locks: create/pause/resume/kill for one task id
    /// never interleave.
    task_locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
    /// System probe driven by the resource loop; sysinfo needs successive
    /// refreshes to produce CPU deltas.
    pub system: Mutex<sysinfo::System>,
    /// Latest metrics snapshot, refreshed by the resource loop and read by
    /// heartbeats.
    pub latest_stats: Mutex<crate::resources::SystemStats>,
}

impl RunnerCtx {
    pub fn new(config: RunnerConfig) -> Result<Self, StorageError> {
        let hostname = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
        let runner_url = format!("http://{}:{}", hostname, config.network.runner_port);
        let vault = StateVault::open(&config.state_db_path())?;
        let image_store = ImageStore::new(config.container_dir());
        let numa_topology = config
            .paths
            .numactl_path
            .as_deref()
            .and_then(crate::resources::detect_numa_topology);

        Ok(Self {
            config,
            hostname,
            runner_url,
            vault,
            docker: DockerCli::new(),
            image_store,
            http: reqwest::Client::new(),
            numa_topology,
            killed_pending: Mutex::new(Vec::new()),
            killed_by_request: Mutex::new(HashSet::new()),
            task_locks: Mutex::new(HashMap::new()),
            system: Mutex::new(sysinfo::System::new()),
            latest_stats: Mutex::new(crate::resources::SystemStats::default()),
        })
    }

    /// Default bind mounts every container gets, plus configured extras.
    pub fn default_mounts(&self) -> Vec<String> {
        let mut mounts = vec![
            format!("{}/shared_data:/shared", self.config.paths.shared_dir.display()),
            format!("{}:/local_temp", self.config.paths.local_temp_dir.display()),
        ];
        mounts.extend(self.config.docker.additional_mounts.iter().cloned());
        mounts
    }

    /// The serialization lock for one task id.
    pub fn task_lock(&self, task_id: TaskId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.task_locks.lock();
        Arc::clone(locks.entry(task_id.as_u64()).or_default())
    }

    pub fn queue_killed(&self, task_id: TaskId, reason: &str) {
        self.killed_pending
            .lock()
            .push(KilledTask { task_id, reason: reason.to_string() });
    }

    pub fn mark_killed_by_request(&self, task_id: TaskId) {
        self.killed_by_request.lock().insert(task_id);
    }

    pub fn take_killed_by_request(&self, task_id: TaskId) -> bool {
        self.killed_by_request.lock().remove(&task_id)
    }
}
