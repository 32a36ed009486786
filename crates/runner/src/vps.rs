// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! VPS session management: creation, stop, pause, resume.
//!
//! A VPS container keeps itself alive (`--restart unless-stopped`) and runs
//! an entry script that installs and configures sshd according to the key
//! mode. Docker picks the published SSH port; the actual port is polled
//! after start and reported back to the host.

use crate::report;
use crate::state::RunnerCtx;
use chrono::Utc;
use kr_core::{ApiError, SshKeyMode, TaskStatus, TaskType};
use kr_docker::{naming, RunSpec};
use kr_storage::VpsRecord;
use kr_wire::{StatusUpdate, VpsCreateResponse, VpsSpec};
use std::time::Duration;
use tracing::{error, info, warn};

const PORT_POLL_ATTEMPTS: u32 = 10;
const PORT_POLL_DELAY: Duration = Duration::from_millis(500);

/// Package manager families by image OS lineage.
fn detect_package_manager(image: &str) -> &'static str {
    let image = image.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| image.contains(n));
    if has(&["alpine"]) {
        "apk"
    } else if has(&["ubuntu", "debian"]) {
        "apt"
    } else if has(&["fedora"]) {
        "dnf"
    } else if has(&["centos", "rhel", "redhat", "rocky", "alma"]) {
        "yum"
    } else if has(&["opensuse", "suse"]) {
        "zypper"
    } else if has(&["arch"]) {
        "pacman"
    } else {
        "apt"
    }
}

fn ssh_install_command(pkg_manager: &str) -> &'static str {
    match pkg_manager {
        "apk" => "apk update && apk add --no-cache openssh",
        "apt" => "apt update && apt install -y openssh-server",
        "dnf" => "dnf install -y openssh-server",
        "yum" => "yum install -y openssh-server",
        "zypper" => "zypper refresh && zypper install -y openssh",
        "pacman" => "pacman -Syu --noconfirm openssh",
        _ => "apt update && apt install -y openssh-server",
    }
}

/// Entry script for the VPS container, by SSH key mode.
pub(crate) fn build_setup_script(
    image: &str,
    key_mode: SshKeyMode,
    public_key: Option<&str>,
) -> Result<String, ApiError> {
    match key_mode {
        SshKeyMode::Disabled => {
            // No SSH; just keep the container alive for exec access.
            Ok("tail -f /dev/null".to_string())
        }
        SshKeyMode::None => {
            let install = ssh_install_command(detect_package_manager(image));
            Ok(format!(
                "{install} && ssh-keygen -A && \
                 echo 'PasswordAuthentication yes' >> /etc/ssh/sshd_config && \
                 echo 'PermitRootLogin yes' >> /etc/ssh/sshd_config && \
                 echo 'PermitEmptyPasswords yes' >> /etc/ssh/sshd_config && \
                 passwd -d root && \
                 mkdir -p /run/sshd && chmod 0755 /run/sshd && \
                 /usr/sbin/sshd -D -e"
            ))
        }
        SshKeyMode::Upload | SshKeyMode::Generate => {
            let key = public_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                ApiError::Validation(format!("ssh_public_key required for mode '{key_mode}'"))
            })?;
            let install = ssh_install_command(detect_package_manager(image));
            Ok(format!(
                "{install} && ssh-keygen -A && \
                 echo 'PasswordAuthentication no' >> /etc/ssh/sshd_config && \
                 echo 'PermitRootLogin yes' >> /etc/ssh/sshd_config && \
                 mkdir -p /run/sshd && chmod 0755 /run/sshd && \
                 mkdir -p /root/.ssh && \
                 echo '{key}' > /root/.ssh/authorized_keys && \
                 chmod 700 /root/.ssh && chmod 600 /root/.ssh/authorized_keys && \
                 /usr/sbin/sshd -D -e",
                key = key.trim(),
            ))
        }
    }
}

/// Poll for the published SSH port; 0 when it never shows up (the VPS is
/// still reachable through the terminal proxy).
pub(crate) async fn find_ssh_port(ctx: &RunnerCtx, container: &str) -> u16 {
    for attempt in 1..=PORT_POLL_ATTEMPTS {
        match ctx.docker.port(container, 22).await {
            Ok(Some(port)) => return port,
            Ok(None) | Err(_) => {
                if attempt < PORT_POLL_ATTEMPTS {
                    tokio::time::sleep(PORT_POLL_DELAY).await;
                }
            }
        }
    }
    warn!(container, "SSH port not found, VPS will work via terminal only");
    0
}

/// Create a VPS container and report it running with its actual SSH port.
pub async fn create_vps(ctx: &RunnerCtx, spec: VpsSpec) -> Result<VpsCreateResponse, ApiError> {
    let task_id = spec.task_id;
    let lock = ctx.task_lock(task_id);
    let _guard = lock.lock().await;

    let container_name = naming::vps_container_name(task_id);
    let started_at = Utc::now();

    report::report_status(ctx, StatusUpdate::new(task_id, TaskStatus::Pending)).await;

    if let Err(e) = ctx
        .image_store
        .ensure_fresh(&spec.container_name, &ctx.docker, ctx.config.image_sync_timeout())
        .await
    {
        let message = format!("image sync failed for '{}': {e}", spec.container_name);
        error!(%task_id, error = %e, "VPS image sync failed");
        let mut update = StatusUpdate::new(task_id, TaskStatus::Failed);
        update.message = Some(message.clone());
        update.completed_at = Some(Utc::now());
        report::report_status(ctx, update).await;
        return Err(ApiError::ImageSync(message));
    }

    let image = naming::image_tag(&spec.container_name);
    let script = build_setup_script(&image, spec.ssh_key_mode, spec.ssh_public_key.as_deref())?;

    let mut mounts = ctx.default_mounts();
    mounts.extend(spec.mount_dirs.iter().cloned());

    let mut run_spec = RunSpec::new(&image, &container_name)
        .detach()
        .restart("unless-stopped")
        .shell_command(script)
        .cpus(spec.required_cores)
        .memory_bytes(spec.required_memory_bytes)
        .pin_numa(spec.target_numa_node_id, ctx.numa_topology.as_ref())
        .gpus(&spec.required_gpus)
        .mounts(mounts)
        .working_dir(&ctx.config.docker.default_working_dir)
        .privileged(spec.privileged)
        .labels(naming::make_labels(task_id, TaskType::Vps, &ctx.hostname));
    if spec.ssh_key_mode != SshKeyMode::Disabled {
        run_spec = run_spec.publish("0:22");
    }

    // Record before create, so a crash mid-launch is reconciled at startup.
    let record = VpsRecord {
        task_id,
        container_name: container_name.clone(),
        ssh_port: 0,
        has_key: spec.ssh_public_key.is_some(),
        allocated_cores: spec.required_cores,
        allocated_gpus: spec.required_gpus.clone(),
        numa_node: spec.target_numa_node_id,
    };
    ctx.vault.add_vps(record.clone()).map_err(ApiError::internal)?;

    info!(%task_id, container = %container_name, mode = %spec.ssh_key_mode, "creating VPS");

    if let Err(e) = ctx.docker.run_detached(&run_spec).await {
        let message = format!("docker run failed: {e}");
        error!(%task_id, error = %e, "VPS creation failed");
        let _ = ctx.vault.remove_vps(task_id);
        let mut update = StatusUpdate::new(task_id, TaskStatus::Failed);
        update.message = Some(message.clone());
        update.completed_at = Some(Utc::now());
        report::report_status(ctx, update).await;
        return Err(ApiError::Runtime(message));
    }

    let ssh_port = if spec.ssh_key_mode == SshKeyMode::Disabled {
        0
    } else {
        find_ssh_port(ctx, &container_name).await
    };

    ctx.vault
        .add_vps(VpsRecord { ssh_port, ..record })
        .map_err(ApiError::internal)?;

    let mut update = StatusUpdate::new(task_id, TaskStatus::Running);
    update.started_at = Some(started_at);
    update.ssh_port = Some(ssh_port);
    report::report_status(ctx, update).await;

    info!(%task_id, container = %container_name, ssh_port, "VPS running");
    Ok(VpsCreateResponse { ssh_port, container_name })
}

/// Stop and remove a VPS container; the host has already recorded the
/// terminal state, so no status report is sent.
pub async fn stop_vps(ctx: &RunnerCtx, task_id: kr_core::TaskId) -> Result<(), ApiError> {
    let lock = ctx.task_lock(task_id);
    let _guard = lock.lock().await;

    let container_name = naming::vps_container_name(task_id);

    if let Err(e) = ctx.docker.stop(&container_name, 10).await {
        if !e.is_not_found() {
            warn!(%task_id, error = %e, "failed to stop VPS container");
        }
    }
    if let Err(e) = ctx.docker.remove(&container_name, true).await {
        if !e.is_not_found() {
            return Err(ApiError::Runtime(format!("failed to remove VPS container: {e}")));
        }
    }
    ctx.vault.remove_all(task_id).map_err(ApiError::internal)?;
    info!(%task_id, "VPS stopped");
    Ok(())
}

#[cfg(test)]
#[path = "vps_tests.rs"]
mod tests;
