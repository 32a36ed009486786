// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin async wrapper around the `docker` CLI.
//!
//! Every call shells out through `tokio::process`, keeping the runtime's
//! blocking work off the scheduler. The CLI is treated as a black-box local
//! service; stderr text is surfaced in errors verbatim.

use crate::spec::RunSpec;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("failed to exec docker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("docker {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("docker {0} timed out")]
    Timeout(String),

    #[error("unexpected docker output: {0}")]
    Parse(String),
}

impl DockerError {
    /// Whether the failure looks like a missing container/image.
    pub fn is_not_found(&self) -> bool {
        match self {
            DockerError::CommandFailed { stderr, .. } => {
                let lower = stderr.to_ascii_lowercase();
                lower.contains("no such container")
                    || lower.contains("no such image")
                    || lower.contains("no such object")
            }
            _ => false,
        }
    }
}

/// One locally available image.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub tag: String,
    pub id: String,
    pub created: String,
    pub size: String,
}

/// One container as listed by `docker ps`.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub name: String,
    pub state: String,
}

/// Handle to the local container runtime.
#[derive(Debug, Clone, Default)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        Self
    }

    /// Run a docker CLI command and return stdout on success.
    async fn run(&self, args: &[&str]) -> Result<String, DockerError> {
        let output = Command::new("docker").args(args).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(DockerError::CommandFailed {
                command: args.first().unwrap_or(&"").to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn run_timed(&self, args: &[&str], timeout: Duration) -> Result<String, DockerError> {
        tokio::time::timeout(timeout, self.run(args))
            .await
            .map_err(|_| DockerError::Timeout(args.first().unwrap_or(&"").to_string()))?
    }

    /// `docker run` a detached container, returning its ID.
    pub async fn run_detached(&self, spec: &RunSpec) -> Result<String, DockerError> {
        let args = spec.to_args();
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs).await
    }

    /// Spawn a foreground `docker run`, wiring the container's stdio into
    /// the given files. The child's exit status is the container's.
    pub fn spawn_foreground(
        &self,
        spec: &RunSpec,
        stdout: std::fs::File,
        stderr: std::fs::File,
    ) -> Result<tokio::process::Child, DockerError> {
        let mut command = Command::new("docker");
        command
            .args(spec.to_args())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(stdout))
            .stderr(std::process::Stdio::from(stderr))
            .kill_on_drop(false);
        Ok(command.spawn()?)
    }

    /// `docker create` a stopped container (used for environment prep).
    pub async fn create(&self, image: &str, name: &str) -> Result<String, DockerError> {
        self.run(&["create", "--name", name, image]).await
    }

    pub async fn start(&self, name: &str) -> Result<(), DockerError> {
        self.run(&["start", name]).await.map(|_| ())
    }

    pub async fn stop(&self, name: &str, timeout_secs: u32) -> Result<(), DockerError> {
        self.run(&["stop", "-t", &timeout_secs.to_string(), name]).await.map(|_| ())
    }

    pub async fn pause(&self, name: &str) -> Result<(), DockerError> {
        self.run(&["pause", name]).await.map(|_| ())
    }

    pub async fn unpause(&self, name: &str) -> Result<(), DockerError> {
        self.run(&["unpause", name]).await.map(|_| ())
    }

    pub async fn kill(&self, name: &str, signal: &str) -> Result<(), DockerError> {
        self.run(&["kill", "--signal", signal, name]).await.map(|_| ())
    }

    pub async fn remove(&self, name: &str, force: bool) -> Result<(), DockerError> {
        if force {
            self.run(&["rm", "-f", name]).await.map(|_| ())
        } else {
            self.run(&["rm", name]).await.map(|_| ())
        }
    }

    /// Wait for a container to exit and return its exit code.
    pub async fn wait(&self, name: &str) -> Result<i64, DockerError> {
        let out = self.run(&["wait", name]).await?;
        out.trim().parse::<i64>().map_err(|_| DockerError::Parse(out))
    }

    pub async fn container_exists(&self, name: &str) -> Result<bool, DockerError> {
        match self.run(&["container", "inspect", "--format", "{{.Name}}", name]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn container_state(&self, name: &str) -> Result<String, DockerError> {
        self.run(&["container", "inspect", "--format", "{{.State.Status}}", name]).await
    }

    pub async fn is_running(&self, name: &str) -> Result<bool, DockerError> {
        match self.container_state(name).await {
            Ok(state) => Ok(state == "running"),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the kernel OOM killer terminated the container.
    pub async fn was_oom_killed(&self, name: &str) -> Result<bool, DockerError> {
        let out =
            self.run(&["container", "inspect", "--format", "{{.State.OOMKilled}}", name]).await?;
        Ok(out == "true")
    }

    /// Resolve the host port published for a container port, if any.
    pub async fn port(&self, name: &str, container_port: u16) -> Result<Option<u16>, DockerError> {
        match self.run(&["port", name, &container_port.to_string()]).await {
            Ok(out) => Ok(parse_port_output(&out)),
            Err(e) if e.is_not_found() => Ok(None),
            // `docker port` fails when the port is simply unpublished.
            Err(DockerError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Running (or all) containers carrying the managed label.
    pub async fn list_managed(&self, all: bool) -> Result<Vec<ContainerSummary>, DockerError> {
        let filter = format!("label={}=true", crate::naming::LABEL_MANAGED);
        let mut args = vec![
            "ps",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Names}}\t{{.State}}",
        ];
        if all {
            args.insert(1, "-a");
        }
        let out = self.run(&args).await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let (name, state) = line.split_once('\t')?;
                Some(ContainerSummary { name: name.to_string(), state: state.to_string() })
            })
            .collect())
    }

    pub async fn image_exists(&self, tag: &str) -> Result<bool, DockerError> {
        match self.run(&["image", "inspect", "--format", "{{.Id}}", tag]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creation time of a local image as a unix timestamp.
    pub async fn image_created_ts(&self, tag: &str) -> Result<Option<i64>, DockerError> {
        let out = match self.run(&["image", "inspect", "--format", "{{.Created}}", tag]).await {
            Ok(out) => out,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let created = chrono::DateTime::parse_from_rfc3339(out.trim())
            .map_err(|_| DockerError::Parse(out.clone()))?;
        Ok(Some(created.timestamp()))
    }

    pub async fn pull(&self, tag: &str, timeout: Duration) -> Result<(), DockerError> {
        self.run_timed(&["pull", tag], timeout).await.map(|_| ())
    }

    pub async fn save(&self, tag: &str, path: &Path, timeout: Duration) -> Result<(), DockerError> {
        let path = path.to_string_lossy();
        self.run_timed(&["save", "-o", &path, tag], timeout).await.map(|_| ())
    }

    pub async fn load(&self, path: &Path, timeout: Duration) -> Result<(), DockerError> {
        let path = path.to_string_lossy();
        self.run_timed(&["load", "-i", &path], timeout).await.map(|_| ())
    }

    pub async fn commit(&self, container: &str, tag: &str) -> Result<(), DockerError> {
        self.run(&["commit", container, tag]).await.map(|_| ())
    }

    pub async fn remove_image(&self, tag: &str, force: bool) -> Result<(), DockerError> {
        if force {
            self.run(&["rmi", "-f", tag]).await.map(|_| ())
        } else {
            self.run(&["rmi", tag]).await.map(|_| ())
        }
    }

    pub async fn prune_dangling(&self) -> Result<(), DockerError> {
        self.run(&["image", "prune", "-f"]).await.map(|_| ())
    }

    pub async fn list_images(&self) -> Result<Vec<ImageSummary>, DockerError> {
        let out = self
            .run(&[
                "image",
                "ls",
                "--format",
                "{{.Repository}}:{{.Tag}}\t{{.ID}}\t{{.CreatedAt}}\t{{.Size}}",
            ])
            .await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut parts = line.split('\t');
                Some(ImageSummary {
                    tag: parts.next()?.to_string(),
                    id: parts.next()?.to_string(),
                    created: parts.next()?.to_string(),
                    size: parts.next()?.to_string(),
                })
            })
            .collect())
    }

    /// Exit code of a one-shot `docker exec` (used for shell detection).
    pub async fn exec_check(&self, container: &str, cmd: &[&str]) -> Result<bool, DockerError> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(cmd);
        match self.run(&args).await {
            Ok(_) => Ok(true),
            Err(DockerError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Parse `docker port` output like `0.0.0.0:32801` / `:::32801`.
pub(crate) fn parse_port_output(out: &str) -> Option<u16> {
    let line = out.lines().next()?.trim();
    let port = line.rsplit(':').next()?;
    port.parse::<u16>().ok()
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
