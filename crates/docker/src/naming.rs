// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container, image, and tarball naming conventions.
//!
//! A runtime-level container belongs to the cluster only when BOTH its name
//! matches the grammar below AND it carries the managed label; either alone
//! is insufficient (users can create matching names without labels and vice
//! versa).

use kr_core::{TaskId, TaskType};

pub const KOHAKURIVER_PREFIX: &str = "kohakuriver";
pub const TASK_PREFIX: &str = "kohakuriver-task";
pub const VPS_PREFIX: &str = "kohakuriver-vps";
pub const ENV_PREFIX: &str = "kohakuriver-env";

pub const LABEL_MANAGED: &str = "kohakuriver.managed";
pub const LABEL_TASK_ID: &str = "kohakuriver.task_id";
pub const LABEL_TASK_TYPE: &str = "kohakuriver.task_type";
pub const LABEL_NODE: &str = "kohakuriver.node";

/// Container name for a command task.
pub fn task_container_name(task_id: TaskId) -> String {
    format!("{}-{}", TASK_PREFIX, task_id)
}

/// Container name for a VPS session.
pub fn vps_container_name(task_id: TaskId) -> String {
    format!("{}-{}", VPS_PREFIX, task_id)
}

/// Container name for an environment-prep container.
pub fn env_container_name(env: &str) -> String {
    format!("{}-{}", ENV_PREFIX, env)
}

pub fn container_name_for(task_type: TaskType, task_id: TaskId) -> String {
    match task_type {
        TaskType::Command => task_container_name(task_id),
        TaskType::Vps => vps_container_name(task_id),
    }
}

/// Local image tag for an environment: `kohakuriver/<env>:base`.
pub fn image_tag(env: &str) -> String {
    format!("{}/{}:base", KOHAKURIVER_PREFIX, env)
}

/// Labels attached to every managed container.
pub fn make_labels(task_id: TaskId, task_type: TaskType, node: &str) -> Vec<(String, String)> {
    vec![
        (LABEL_MANAGED.to_string(), "true".to_string()),
        (LABEL_TASK_ID.to_string(), task_id.to_string()),
        (LABEL_TASK_TYPE.to_string(), task_type.to_string()),
        (LABEL_NODE.to_string(), node.to_string()),
    ]
}

/// Whether a container name matches the cluster's naming grammar.
pub fn is_managed_name(name: &str) -> bool {
    name.starts_with(KOHAKURIVER_PREFIX)
}

/// Extract the task type and ID from a task or VPS container name.
///
/// Environment containers and names whose suffix is not a decimal integer
/// yield `None`.
pub fn extract_task_id(name: &str) -> Option<(TaskType, TaskId)> {
    for (prefix, task_type) in [(TASK_PREFIX, TaskType::Command), (VPS_PREFIX, TaskType::Vps)] {
        if let Some(suffix) = name.strip_prefix(prefix).and_then(|s| s.strip_prefix('-')) {
            return suffix.parse::<u64>().ok().map(|id| (task_type, TaskId(id)));
        }
    }
    None
}

/// Tarball filename for an environment snapshot: `<env>-<unix-ts>.tar`.
pub fn tarball_filename(env: &str, timestamp: i64) -> String {
    format!("{}-{}.tar", env, timestamp)
}

/// Parse `<env>-<unix-ts>.tar`, validating the env grammar
/// `[a-z0-9][a-z0-9._-]*` and a positive integer timestamp.
pub fn parse_tarball_filename(filename: &str) -> Option<(String, i64)> {
    let stem = filename.strip_suffix(".tar")?;
    // The env itself may contain '-', so split on the last one.
    let (env, ts_str) = stem.rsplit_once('-')?;
    let timestamp: i64 = ts_str.parse().ok()?;
    if timestamp <= 0 || !is_valid_env_name(env) {
        return None;
    }
    Some((env.to_string(), timestamp))
}

/// Environment name grammar: `[a-z0-9][a-z0-9._-]*`.
pub fn is_valid_env_name(env: &str) -> bool {
    let mut chars = env.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
