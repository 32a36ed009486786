// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn save_then_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    let mut state: HashMap<String, u64> = HashMap::new();
    state.insert("42".to_string(), 7);

    save(&path, &state).unwrap();
    let loaded: HashMap<String, u64> = load(&path).unwrap().unwrap();
    assert_eq!(loaded, state);
}

#[test]
fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let loaded: Option<HashMap<String, u64>> = load(&dir.path().join("absent.db")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn overwrite_rotates_a_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    save(&path, &1u64).unwrap();
    save(&path, &2u64).unwrap();

    assert!(path.with_extension("bak").exists());
    let loaded: u64 = load(&path).unwrap().unwrap();
    assert_eq!(loaded, 2);
}

#[test]
fn corrupt_primary_recovers_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    save(&path, &1u64).unwrap();
    save(&path, &2u64).unwrap();
    std::fs::write(&path, b"garbage").unwrap();

    let loaded: u64 = load(&path).unwrap().unwrap();
    assert_eq!(loaded, 1);
}

#[test]
fn corrupt_primary_without_backup_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    std::fs::write(&path, b"garbage").unwrap();

    assert!(load::<u64>(&path).is_err());
}
