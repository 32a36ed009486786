// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

#[test]
fn host_config_defaults_are_sane() {
    let config = HostConfig::default();
    assert_eq!(config.network.host_port, 8000);
    assert_eq!(config.network.host_ssh_proxy_port, 8002);
    assert_eq!(config.timing.heartbeat_interval_seconds, 5);
    assert_eq!(config.timing.heartbeat_timeout_factor, 6);
    assert_eq!(
        config.container_dir(),
        PathBuf::from("/mnt/cluster-share/kohakuriver-containers")
    );
}

#[test]
fn dead_runner_threshold_is_interval_times_factor() {
    let config = HostConfig::default();
    assert_eq!(config.dead_runner_threshold(), chrono::Duration::seconds(30));
}

#[test]
fn partial_toml_overrides_merge_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[network]
host_port = 9000

[paths]
shared_dir = "/srv/share"

[logging]
log_level = "debug"
"#
    )
    .unwrap();

    let config = HostConfig::load(file.path()).unwrap();
    assert_eq!(config.network.host_port, 9000);
    assert_eq!(config.network.host_bind_ip, "0.0.0.0");
    assert_eq!(config.paths.shared_dir, PathBuf::from("/srv/share"));
    assert_eq!(config.logging.log_level, LogLevel::Debug);
    assert_eq!(config.container_dir(), PathBuf::from("/srv/share/kohakuriver-containers"));
}

#[test]
fn runner_config_derives_host_url_and_state_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[network]
host_reachable_address = "10.0.0.1"

[paths]
local_temp_dir = "/var/tmp/kr"
"#
    )
    .unwrap();

    let config = RunnerConfig::load(file.path()).unwrap();
    assert_eq!(config.host_url(), "http://10.0.0.1:8000");
    assert_eq!(config.state_db_path(), PathBuf::from("/var/tmp/kr/runner-state.db"));
}

#[test]
fn unreadable_file_reports_the_path() {
    let err = HostConfig::load(Path::new("/nonexistent/kohakuriver.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/kohakuriver.toml"));
}

#[test]
fn log_level_maps_to_filter_directives() {
    assert_eq!(LogLevel::Full.filter_directive(), "trace");
    assert_eq!(LogLevel::Warning.filter_directive(), "warn");
}
