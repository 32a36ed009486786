// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    ipv4 = { "0.0.0.0:32801", Some(32801) },
    ipv6 = { ":::32801", Some(32801) },
    both_lines = { "0.0.0.0:32792\n[::]:32792", Some(32792) },
    empty = { "", None },
    garbage = { "not a mapping", None },
    out_of_range = { "0.0.0.0:70000", None },
)]
fn port_output_parsing(out: &str, expected: Option<u16>) {
    assert_eq!(parse_port_output(out), expected);
}

#[test]
fn not_found_detection_matches_docker_phrasing() {
    let err = DockerError::CommandFailed {
        command: "inspect".to_string(),
        stderr: "Error: No such container: kohakuriver-task-1".to_string(),
    };
    assert!(err.is_not_found());

    let err = DockerError::CommandFailed {
        command: "run".to_string(),
        stderr: "connection refused".to_string(),
    };
    assert!(!err.is_not_found());
}
