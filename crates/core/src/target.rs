// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Submission target parsing.
//!
//! A target names a node and optionally pins the task to a NUMA node and
//! a set of GPU indices: `host`, `host:1`, `host::0,1`, `host:1::2`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A parsed submission target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numa_node_id: Option<u32>,
    /// GPU indices requested on this node; `None` when the `::` section is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_ids: Option<Vec<u32>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("empty hostname in target '{0}'")]
    EmptyHostname(String),
    #[error("invalid NUMA ID in target '{0}'")]
    InvalidNuma(String),
    #[error("empty GPU list in target '{0}'")]
    EmptyGpuList(String),
    #[error("invalid GPU index in target '{0}'")]
    InvalidGpu(String),
}

impl Target {
    /// Parse `host[:numa][::gpu,gpu,...]`.
    pub fn parse(raw: &str) -> Result<Self, TargetParseError> {
        let (node_part, gpu_part) = match raw.split_once("::") {
            Some((node, gpus)) => (node, Some(gpus)),
            None => (raw, None),
        };

        let (hostname, numa_part) = match node_part.split_once(':') {
            Some((host, numa)) => (host, Some(numa)),
            None => (node_part, None),
        };
        if hostname.is_empty() {
            return Err(TargetParseError::EmptyHostname(raw.to_string()));
        }

        let numa_node_id = numa_part
            .map(|s| s.parse::<u32>().map_err(|_| TargetParseError::InvalidNuma(raw.to_string())))
            .transpose()?;

        let gpu_ids = match gpu_part {
            None => None,
            // "host::" is a syntax error, not an empty allocation.
            Some("") => return Err(TargetParseError::EmptyGpuList(raw.to_string())),
            Some(list) => Some(
                list.split(',')
                    .map(|s| {
                        s.trim()
                            .parse::<u32>()
                            .map_err(|_| TargetParseError::InvalidGpu(raw.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        Ok(Target { hostname: hostname.to_string(), numa_node_id, gpu_ids })
    }
}

impl std::str::FromStr for Target {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hostname)?;
        if let Some(numa) = self.numa_node_id {
            write!(f, ":{}", numa)?;
        }
        if let Some(gpus) = &self.gpu_ids {
            let list: Vec<String> = gpus.iter().map(|g| g.to_string()).collect();
            write!(f, "::{}", list.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
