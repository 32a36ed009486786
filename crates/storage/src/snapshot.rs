// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence.
//!
//! Snapshots are zstd-compressed JSON written to a temp file and renamed
//! into place. The previous snapshot rotates into `.bak` files so a crash
//! mid-write or a corrupt file never loses the whole state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;
const MAX_BAK_FILES: u32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

#[derive(Debug, Serialize, serde::Deserialize)]
struct Envelope<T> {
    #[serde(rename = "v")]
    version: u32,
    state: T,
}

/// Write `state` to `path` atomically, rotating the previous file to `.bak`.
pub fn save<T: Serialize>(path: &Path, state: &T) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let envelope = Envelope { version: CURRENT_SNAPSHOT_VERSION, state };
    let json = serde_json::to_vec(&envelope)?;
    let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &compressed)?;

    if path.exists() {
        let bak = rotate_bak_path(path);
        let _ = fs::rename(path, bak);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a snapshot; `Ok(None)` when the file does not exist yet.
///
/// A corrupt primary falls back to the newest readable `.bak`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    if !path.exists() {
        return Ok(None);
    }
    match load_one(path) {
        Ok(state) => Ok(Some(state)),
        Err(primary_err) => {
            for n in 1..=MAX_BAK_FILES {
                let bak = bak_path(path, n);
                if bak.exists() {
                    if let Ok(state) = load_one::<T>(&bak) {
                        tracing::warn!(
                            path = %path.display(),
                            bak = %bak.display(),
                            "primary snapshot unreadable, recovered from backup"
                        );
                        return Ok(Some(state));
                    }
                }
            }
            Err(primary_err)
        }
    }
}

fn load_one<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let compressed = fs::read(path)?;
    let json = zstd::decode_all(compressed.as_slice())?;
    let envelope: Envelope<T> = serde_json::from_slice(&json)?;
    if envelope.version != CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(envelope.version));
    }
    Ok(envelope.state)
}

fn bak_path(path: &Path, n: u32) -> PathBuf {
    if n == 1 {
        path.with_extension("bak")
    } else {
        path.with_extension(format!("bak.{n}"))
    }
}

/// Pick the next `.bak` path, rotating older backups out (keeps up to
/// [`MAX_BAK_FILES`]).
fn rotate_bak_path(path: &Path) -> PathBuf {
    let oldest = bak_path(path, MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }
    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak_path(path, n);
        if src.exists() {
            let _ = fs::rename(&src, bak_path(path, n + 1));
        }
    }
    bak_path(path, 1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
