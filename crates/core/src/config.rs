// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host and runner configuration.
//!
//! Both configs are immutable values built once at startup from a TOML file
//! (every key optional, falling back to defaults) and passed explicitly to
//! the components that need them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Logging verbosity (higher = less logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Everything including trace.
    Full,
    Debug,
    #[default]
    Info,
    Warning,
}

impl LogLevel {
    /// The `tracing` env-filter directive for this level.
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Full => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
        }
    }
}

crate::simple_display! {
    LogLevel {
        Full => "full",
        Debug => "debug",
        Info => "info",
        Warning => "warning",
    }
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_host_port() -> u16 {
    8000
}

fn default_runner_port() -> u16 {
    8001
}

fn default_ssh_proxy_port() -> u16 {
    8002
}

fn default_host_address() -> String {
    "127.0.0.1".to_string()
}

fn default_shared_dir() -> PathBuf {
    PathBuf::from("/mnt/cluster-share")
}

fn default_db_file() -> PathBuf {
    PathBuf::from("/var/lib/kohakuriver/kohakuriver.db")
}

fn default_local_temp_dir() -> PathBuf {
    PathBuf::from("/tmp/kohakuriver")
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_timeout_factor() -> u32 {
    6
}

fn default_cleanup_interval() -> u64 {
    10
}

fn default_resource_interval() -> u64 {
    1
}

fn default_container_name() -> String {
    "kohakuriver-base".to_string()
}

fn default_base_image() -> String {
    "python:3.12-alpine".to_string()
}

fn default_working_dir() -> String {
    "/shared".to_string()
}

fn default_sync_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostNetwork {
    pub host_bind_ip: String,
    pub host_port: u16,
    pub host_ssh_proxy_port: u16,
    /// Address runners and clients use to reach the host.
    pub host_reachable_address: String,
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self {
            host_bind_ip: default_bind_ip(),
            host_port: default_host_port(),
            host_ssh_proxy_port: default_ssh_proxy_port(),
            host_reachable_address: default_host_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPaths {
    pub shared_dir: PathBuf,
    pub db_file: PathBuf,
    /// Tarball directory; empty means `<shared_dir>/kohakuriver-containers`.
    pub container_dir: Option<PathBuf>,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self { shared_dir: default_shared_dir(), db_file: default_db_file(), container_dir: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostTiming {
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_timeout_factor: u32,
    pub cleanup_check_interval_seconds: u64,
}

impl Default for HostTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            heartbeat_timeout_factor: default_timeout_factor(),
            cleanup_check_interval_seconds: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerDefaults {
    pub default_container_name: String,
    pub initial_base_image: String,
    pub tasks_privileged: bool,
    pub additional_mounts: Vec<String>,
    pub default_working_dir: String,
    pub docker_image_sync_timeout: u64,
}

impl Default for DockerDefaults {
    fn default() -> Self {
        Self {
            default_container_name: default_container_name(),
            initial_base_image: default_base_image(),
            tasks_privileged: false,
            additional_mounts: Vec::new(),
            default_working_dir: default_working_dir(),
            docker_image_sync_timeout: default_sync_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub log_level: LogLevel,
    /// Optional log file; stderr only when unset.
    pub log_file: Option<PathBuf>,
}

/// Host daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    pub network: HostNetwork,
    pub paths: HostPaths,
    pub timing: HostTiming,
    pub docker: DockerDefaults,
    pub logging: Logging,
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    /// Tarball directory for the shared image store.
    pub fn container_dir(&self) -> PathBuf {
        match &self.paths.container_dir {
            Some(dir) => dir.clone(),
            None => self.paths.shared_dir.join("kohakuriver-containers"),
        }
    }

    /// Per-task log directory root on the shared filesystem.
    pub fn logs_dir(&self) -> PathBuf {
        self.paths.shared_dir.join("logs")
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timing.heartbeat_interval_seconds)
    }

    /// Heartbeat staleness threshold: a node whose last heartbeat is older
    /// than this is dead. Exactly at the threshold counts as alive.
    pub fn dead_runner_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            (self.timing.heartbeat_interval_seconds * u64::from(self.timing.heartbeat_timeout_factor))
                as i64,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerNetwork {
    pub runner_bind_ip: String,
    pub runner_port: u16,
    pub host_reachable_address: String,
    pub host_port: u16,
    pub host_ssh_proxy_port: u16,
}

impl Default for RunnerNetwork {
    fn default() -> Self {
        Self {
            runner_bind_ip: default_bind_ip(),
            runner_port: default_runner_port(),
            host_reachable_address: default_host_address(),
            host_port: default_host_port(),
            host_ssh_proxy_port: default_ssh_proxy_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerPaths {
    pub shared_dir: PathBuf,
    pub local_temp_dir: PathBuf,
    /// Tarball directory; empty means `<shared_dir>/kohakuriver-containers`.
    pub container_dir: Option<PathBuf>,
    /// Path to `numactl`; unset disables NUMA detection.
    pub numactl_path: Option<PathBuf>,
}

impl Default for RunnerPaths {
    fn default() -> Self {
        Self {
            shared_dir: default_shared_dir(),
            local_temp_dir: default_local_temp_dir(),
            container_dir: None,
            numactl_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerTiming {
    pub heartbeat_interval_seconds: u64,
    pub resource_check_interval_seconds: u64,
}

impl Default for RunnerTiming {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            resource_check_interval_seconds: default_resource_interval(),
        }
    }
}

/// Runner agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunnerConfig {
    pub network: RunnerNetwork,
    pub paths: RunnerPaths,
    pub timing: RunnerTiming,
    pub docker: DockerDefaults,
    pub logging: Logging,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    pub fn host_url(&self) -> String {
        format!("http://{}:{}", self.network.host_reachable_address, self.network.host_port)
    }

    pub fn container_dir(&self) -> PathBuf {
        match &self.paths.container_dir {
            Some(dir) => dir.clone(),
            None => self.paths.shared_dir.join("kohakuriver-containers"),
        }
    }

    /// Path of the persistent runner state vault.
    pub fn state_db_path(&self) -> PathBuf {
        self.paths.local_temp_dir.join("runner-state.db")
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timing.heartbeat_interval_seconds)
    }

    pub fn image_sync_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.docker.docker_image_sync_timeout)
    }
}

fn load_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
