// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner agent: drives containers on one worker node.
//!
//! Startup order matters: open the vault, reconcile against the actual
//! container runtime, register with the host, and only then start serving
//! requests and heartbeating.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod api;
mod control;
mod executor;
mod heartbeat;
mod reconcile;
mod report;
mod resources;
mod ssh_channel;
mod state;
mod terminal;
mod vps;

use kr_core::RunnerConfig;
use state::RunnerCtx;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

fn init_tracing(config: &RunnerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.log_level.filter_directive()));

    match &config.logging.log_file {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| "runner.log".into());
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
        error!("runner failed: {e}");
        std::process::exit(1);
    }
}

fn load_config() -> Result<RunnerConfig, kr_core::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => RunnerConfig::load(std::path::Path::new(&path)),
        None => Ok(RunnerConfig::default()),
    }
}

async fn run(config: RunnerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // The local temp dir hosts the vault and is bind-mounted into every
    // container, so nothing works without it.
    std::fs::create_dir_all(&config.paths.local_temp_dir)?;

    let ctx = Arc::new(RunnerCtx::new(config)?);
    info!(
        hostname = %ctx.hostname,
        url = %ctx.runner_url,
        host = %ctx.config.host_url(),
        "runner starting"
    );

    // Reconcile persisted state against actual containers before anything
    // else can mutate either side.
    reconcile::startup_reconcile(&ctx).await;

    let mut registered = false;
    for attempt in 1..=5u32 {
        if report::register_with_host(&ctx).await {
            registered = true;
            break;
        }
        let wait = std::time::Duration::from_secs(5 * u64::from(attempt));
        info!("registration attempt {attempt}/5 failed, retrying in {}s", wait.as_secs());
        tokio::time::sleep(wait).await;
    }
    if !registered {
        warn!("failed to register with host after 5 attempts; continuing, heartbeats will retry");
    }

    let resource_ctx = Arc::clone(&ctx);
    tokio::spawn(async move { heartbeat::resource_loop(resource_ctx).await });

    let heartbeat_ctx = Arc::clone(&ctx);
    tokio::spawn(async move { heartbeat::heartbeat_loop(heartbeat_ctx).await });

    let channel_ctx = Arc::clone(&ctx);
    tokio::spawn(async move { ssh_channel::channel_loop(channel_ctx).await });

    let bind = format!("{}:{}", ctx.config.network.runner_bind_ip, ctx.config.network.runner_port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "runner API listening");
    axum::serve(listener, api::router(Arc::clone(&ctx))).await?;
    Ok(())
}
