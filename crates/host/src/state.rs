// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared host context for request handlers and background loops.

use crate::ssh_proxy::ProxyRegistry;
use kr_core::{HostConfig, SnowflakeGenerator};
use kr_storage::{StorageError, TaskStore};
use kr_wire::HealthSample;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Samples of health history kept for `GET /health`.
pub const HEALTH_HISTORY_LEN: usize = 60;

pub struct HostState {
    pub config: HostConfig,
    pub store: TaskStore,
    pub ids: SnowflakeGenerator,
    pub http: reqwest::Client,
    /// Rolling health history, newest last.
    pub health: Mutex<VecDeque<HealthSample>>,
    /// Live worker SSH channels.
    pub ssh: ProxyRegistry,
}

impl HostState {
    pub fn new(config: HostConfig) -> Result<Self, StorageError> {
        let store = TaskStore::open(&config.paths.db_file)?;
        Ok(Self {
            config,
            store,
            ids: SnowflakeGenerator::new(0),
            http: reqwest::Client::new(),
            health: Mutex::new(VecDeque::with_capacity(HEALTH_HISTORY_LEN)),
            ssh: ProxyRegistry::new(),
        })
    }

    pub fn push_health_sample(&self, sample: HealthSample) {
        let mut history = self.health.lock();
        if history.len() == HEALTH_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(sample);
    }
}
