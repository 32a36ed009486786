// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default environment bootstrap.
//!
//! On startup the host makes sure the shared image store holds a tarball
//! for the configured default environment. When none exists, one is built
//! from `initial_base_image`: create a prep container, commit it to the
//! environment tag, and publish the tarball (which prunes older ones).

use crate::state::HostState;
use kr_docker::{naming, DockerCli, ImageStore};
use std::time::Duration;
use tracing::{info, warn};

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(600);

pub async fn ensure_default_environment(
    state: &HostState,
) -> Result<(), Box<dyn std::error::Error>> {
    let container_dir = state.config.container_dir();
    std::fs::create_dir_all(&container_dir)?;

    let env = state.config.docker.default_container_name.clone();
    let store = ImageStore::new(&container_dir);
    if let Some((ts, _)) = store.latest(&env)? {
        info!(env, timestamp = ts, "default environment tarball present");
        return Ok(());
    }

    let base_image = &state.config.docker.initial_base_image;
    info!(env, base_image, "no tarball for default environment, creating one");

    let cli = DockerCli::new();
    let container = naming::env_container_name(&env);

    if !cli.container_exists(&container).await? {
        if let Err(e) = cli.pull(base_image, BOOTSTRAP_TIMEOUT).await {
            warn!(error = %e, "pull failed, trying local image");
        }
        cli.create(base_image, &container).await?;
        info!(%container, "environment prep container created");
    }

    let (timestamp, path) = store.publish(&env, &container, &cli, BOOTSTRAP_TIMEOUT).await?;
    info!(env, timestamp, path = %path.display(), "default environment tarball published");
    Ok(())
}
