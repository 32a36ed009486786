// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bare_host = { "n1", "n1", None, None },
    with_numa = { "n1:0", "n1", Some(0), None },
    with_gpus = { "n1::0,1", "n1", None, Some(vec![0, 1]) },
    numa_and_gpus = { "n1:1::2", "n1", Some(1), Some(vec![2]) },
    single_gpu = { "gpu-box::3", "gpu-box", None, Some(vec![3]) },
)]
fn parses_valid_targets(
    raw: &str,
    host: &str,
    numa: Option<u32>,
    gpus: Option<Vec<u32>>,
) {
    let target = Target::parse(raw).unwrap();
    assert_eq!(target.hostname, host);
    assert_eq!(target.numa_node_id, numa);
    assert_eq!(target.gpu_ids, gpus);
}

#[parameterized(
    empty = { "" },
    colon_only = { ":1" },
    empty_gpu_list = { "n1::" },
    bad_numa = { "n1:x" },
    negative_numa = { "n1:-1" },
    bad_gpu = { "n1::a" },
    trailing_comma = { "n1::0," },
)]
fn rejects_invalid_targets(raw: &str) {
    assert!(Target::parse(raw).is_err(), "expected {:?} to fail", raw);
}

#[test]
fn display_round_trips() {
    for raw in ["n1", "n1:0", "n1::0,1", "n1:1::2"] {
        let target = Target::parse(raw).unwrap();
        assert_eq!(target.to_string(), raw);
    }
}
