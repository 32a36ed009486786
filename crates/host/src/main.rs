// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host coordinator: the cluster's single point of scheduling and truth.
//!
//! Owns the node/task store, receives registrations and heartbeats,
//! schedules submissions onto runners, proxies terminals and SSH, and runs
//! the dead-runner and health-collation loops.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod api;
mod bootstrap;
mod dispatch;
mod monitor;
mod scheduler;
mod ssh_proxy;
mod state;
mod terminal;

#[cfg(test)]
mod test_support;

use kr_core::HostConfig;
use state::HostState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

fn init_tracing(config: &HostConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.log_level.filter_directive()));

    match &config.logging.log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| "host.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    let _log_guard = init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("host failed: {e}");
        std::process::exit(1);
    }
}

fn load_config() -> Result<HostConfig, kr_core::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => HostConfig::load(std::path::Path::new(&path)),
        None => Ok(HostConfig::default()),
    }
}

async fn run(config: HostConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(HostState::new(config)?);
    info!("host server starting");

    // The default environment must exist before any runner asks for it.
    if let Err(e) = bootstrap::ensure_default_environment(&state).await {
        error!(error = %e, "default environment bootstrap failed");
    }

    let monitor_state = Arc::clone(&state);
    tokio::spawn(async move { monitor::dead_runner_loop(monitor_state).await });

    let health_state = Arc::clone(&state);
    tokio::spawn(async move { monitor::health_loop(health_state).await });

    let proxy_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = ssh_proxy::listen(proxy_state).await {
            error!(error = %e, "ssh proxy listener failed");
        }
    });

    let bind =
        format!("{}:{}", state.config.network.host_bind_ip, state.config.network.host_port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "host API listening");
    axum::serve(listener, api::router(Arc::clone(&state))).await?;
    Ok(())
}
