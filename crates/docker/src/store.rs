// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared image store: per-environment tarballs on the cluster filesystem.
//!
//! Tarballs are named `<env>-<unix-ts>.tar`; the greatest timestamp is the
//! canonical image for that environment. The store keeps one tarball per
//! environment (keep-1): publishing a new snapshot deletes the older ones.

use crate::cli::{DockerCli, DockerError};
use crate::naming;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error under {dir}: {source}")]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no tarball and no local image for environment '{0}'")]
    NoImage(String),

    #[error(transparent)]
    Docker(#[from] DockerError),
}

/// Freshness verdict for a local environment image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDecision {
    /// Local image is at least as new as the newest shared tarball.
    UpToDate,
    /// The tarball at this path must be loaded.
    Sync(PathBuf),
    /// The store has nothing for this environment.
    NoTarball,
}

/// Handle to the tarball directory.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tarballs for one environment, newest first. A missing directory is
    /// an empty store, not an error.
    pub fn list(&self, env: &str) -> Result<Vec<(i64, PathBuf)>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { dir: self.dir.clone(), source }),
        };

        let mut tarballs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io { dir: self.dir.clone(), source })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            if let Some((tar_env, ts)) = naming::parse_tarball_filename(name) {
                if tar_env == env {
                    tarballs.push((ts, entry.path()));
                }
            }
        }
        tarballs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(tarballs)
    }

    /// The canonical (newest) tarball for an environment.
    pub fn latest(&self, env: &str) -> Result<Option<(i64, PathBuf)>, StoreError> {
        Ok(self.list(env)?.into_iter().next())
    }

    /// All environments present in the store, with their canonical timestamp.
    pub fn environments(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StoreError::Io { dir: self.dir.clone(), source }),
        };
        let mut newest: std::collections::BTreeMap<String, i64> = Default::default();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io { dir: self.dir.clone(), source })?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            if let Some((env, ts)) = naming::parse_tarball_filename(name) {
                let slot = newest.entry(env).or_insert(ts);
                *slot = (*slot).max(ts);
            }
        }
        Ok(newest.into_iter().collect())
    }

    /// Decide whether the local image for `env` needs a tarball load.
    ///
    /// Sync is needed iff a shared tarball exists and the local image is
    /// missing or older than it.
    pub async fn check_sync(&self, env: &str, cli: &DockerCli) -> Result<SyncDecision, StoreError> {
        let Some((ts_shared, path)) = self.latest(env)? else {
            return Ok(SyncDecision::NoTarball);
        };
        let ts_local = cli.image_created_ts(&naming::image_tag(env)).await?;
        Ok(decide_sync(Some(ts_shared), ts_local).map_or(SyncDecision::UpToDate, |_| {
            SyncDecision::Sync(path)
        }))
    }

    /// Make sure the local `kohakuriver/<env>:base` image is current,
    /// loading the canonical tarball when needed. Returns whether a load
    /// happened.
    pub async fn ensure_fresh(
        &self,
        env: &str,
        cli: &DockerCli,
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        match self.check_sync(env, cli).await? {
            SyncDecision::UpToDate => Ok(false),
            SyncDecision::Sync(path) => {
                tracing::info!(env, path = %path.display(), "loading image from shared tarball");
                cli.load(&path, timeout).await?;
                Ok(true)
            }
            SyncDecision::NoTarball => {
                if cli.image_exists(&naming::image_tag(env)).await? {
                    Ok(false)
                } else {
                    Err(StoreError::NoImage(env.to_string()))
                }
            }
        }
    }

    /// Snapshot a container into a new canonical tarball for `env`.
    ///
    /// The new timestamp is strictly greater than any prior one for the
    /// environment; older tarballs are pruned afterwards (keep-1).
    pub async fn publish(
        &self,
        env: &str,
        source_container: &str,
        cli: &DockerCli,
        timeout: Duration,
    ) -> Result<(i64, PathBuf), StoreError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|source| StoreError::Io { dir: self.dir.clone(), source })?;

        let prior = self.latest(env)?.map(|(ts, _)| ts).unwrap_or(0);
        let timestamp = chrono::Utc::now().timestamp().max(prior + 1);

        let tag = naming::image_tag(env);
        cli.commit(source_container, &tag).await?;

        let path = self.dir.join(naming::tarball_filename(env, timestamp));
        cli.save(&tag, &path, timeout).await?;
        tracing::info!(env, timestamp, path = %path.display(), "published environment tarball");

        // Keep-1: drop everything older than the tarball just written.
        for (ts, old_path) in self.list(env)? {
            if ts < timestamp {
                if let Err(e) = std::fs::remove_file(&old_path) {
                    tracing::warn!(path = %old_path.display(), error = %e, "failed to prune old tarball");
                }
            }
        }

        Ok((timestamp, path))
    }
}

/// Pure freshness rule: `Some(())` when a sync is needed.
fn decide_sync(ts_shared: Option<i64>, ts_local: Option<i64>) -> Option<()> {
    match (ts_shared, ts_local) {
        (None, _) => None,
        (Some(_), None) => Some(()),
        (Some(shared), Some(local)) => (shared > local).then_some(()),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
