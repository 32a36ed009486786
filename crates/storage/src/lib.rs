// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence for the cluster manager.
//!
//! - [`host`] — the host's node/task store (C6): a materialized state held
//!   in memory and snapshotted to the DB file on every mutation
//! - [`vault`] — the runner's state vault (C3): running/VPS/paused records
//!   surviving runner restarts
//! - [`snapshot`] — the shared zstd-compressed JSON snapshot format

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod host;
pub mod snapshot;
pub mod vault;

pub use host::{TaskFilter, TaskStore, UpdateFields, UpdateOutcome};
pub use snapshot::SnapshotError;
pub use vault::{PausedRecord, StateVault, TaskRecord, VpsRecord};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] snapshot::SnapshotError),

    #[error("database {0} is locked by another process")]
    Locked(PathBuf),

    #[error("{0}")]
    NotFound(String),
}
