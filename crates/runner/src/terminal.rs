// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side terminal endpoint.
//!
//! Resolves the task's container, opens an interactive shell exec, and
//! brokers bytes between the WebSocket and the exec TTY. The client gets
//! up to 2 seconds to send an initial resize before the shell starts
//! rendering; an empty `output` message is the ready signal.

use crate::state::RunnerCtx;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use kr_core::TaskId;
use kr_docker::exec::DEFAULT_SOCKET;
use kr_docker::ExecSession;
use kr_wire::{TermClientMessage, TermServerMessage};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Policy violation (unknown task, container not running).
const CLOSE_POLICY: u16 = 1008;
/// Runtime failure talking to docker.
const CLOSE_ERROR: u16 = 1011;
const CLOSE_NORMAL: u16 = 1000;

const READ_CHUNK: usize = 4096;
const RESIZE_HANDSHAKE_WINDOW: Duration = Duration::from_secs(2);

pub async fn serve_terminal(ctx: Arc<RunnerCtx>, task_id: TaskId, mut socket: WebSocket) {
    info!(%task_id, "terminal connection accepted");

    let Some(container_name) = ctx.vault.resolve_container(task_id) else {
        warn!(%task_id, "terminal requested for unknown task");
        close_with_error(
            &mut socket,
            &format!("Task {task_id} not found on this runner."),
            CLOSE_POLICY,
        )
        .await;
        return;
    };

    match ctx.docker.is_running(&container_name).await {
        Ok(true) => {}
        Ok(false) => {
            close_with_error(
                &mut socket,
                &format!("Container '{container_name}' is not running."),
                CLOSE_POLICY,
            )
            .await;
            return;
        }
        Err(e) => {
            close_with_error(&mut socket, &format!("Error accessing container: {e}"), CLOSE_ERROR)
                .await;
            return;
        }
    }

    let Some(shell) = detect_shell(&ctx, &container_name).await else {
        close_with_error(&mut socket, "No suitable shell found in container.", CLOSE_ERROR).await;
        return;
    };

    let session = match ExecSession::open(Path::new(DEFAULT_SOCKET), &container_name, shell).await {
        Ok(session) => session,
        Err(e) => {
            warn!(%task_id, error = %e, "failed to open exec session");
            close_with_error(&mut socket, &format!("Failed to open shell: {e}"), CLOSE_ERROR)
                .await;
            return;
        }
    };
    let (stream, resize_handle) = session.into_parts();
    let (mut tty_read, mut tty_write) = stream.into_split();

    // Initial resize handshake: apply the first message if it is a resize,
    // then signal readiness with an empty output.
    if let Ok(Some(Ok(Message::Text(text)))) =
        tokio::time::timeout(RESIZE_HANDSHAKE_WINDOW, socket.recv()).await
    {
        if let Ok(TermClientMessage::Resize { rows, cols }) = serde_json::from_str(text.as_str()) {
            if let Err(e) = resize_handle.resize(rows, cols).await {
                debug!(%task_id, error = %e, "initial resize failed");
            }
        }
    }
    if send_server(&mut socket, &TermServerMessage::output("")).await.is_err() {
        return;
    }

    info!(%task_id, container = %container_name, shell, "terminal session started");

    let mut buf = vec![0u8; READ_CHUNK];
    let close_code = loop {
        tokio::select! {
            ws_msg = socket.recv() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<TermClientMessage>(text.as_str()) {
                            Ok(TermClientMessage::Input { data }) => {
                                if tty_write.write_all(data.as_bytes()).await.is_err() {
                                    break CLOSE_NORMAL;
                                }
                            }
                            Ok(TermClientMessage::Resize { rows, cols }) => {
                                if let Err(e) = resize_handle.resize(rows, cols).await {
                                    warn!(%task_id, error = %e, "terminal resize failed");
                                }
                            }
                            Err(_) => {
                                warn!(%task_id, "dropping invalid terminal message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%task_id, "client closed terminal");
                        break CLOSE_NORMAL;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary — ignore
                    Some(Err(e)) => {
                        debug!(%task_id, error = %e, "terminal socket error");
                        break CLOSE_NORMAL;
                    }
                }
            }
            read = tty_read.read(&mut buf) => {
                match read {
                    Ok(0) => {
                        debug!(%task_id, "shell exited");
                        break CLOSE_NORMAL;
                    }
                    Ok(n) => {
                        let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if send_server(&mut socket, &TermServerMessage::output(data)).await.is_err() {
                            break CLOSE_NORMAL;
                        }
                    }
                    Err(e) => {
                        let _ = send_server(
                            &mut socket,
                            &TermServerMessage::error(format!("Error reading from container: {e}")),
                        )
                        .await;
                        break CLOSE_ERROR;
                    }
                }
            }
        }
    };

    let _ = socket
        .send(Message::Close(Some(CloseFrame { code: close_code, reason: "".into() })))
        .await;
    info!(%task_id, "terminal session ended");
}

/// Prefer bash, fall back to sh.
async fn detect_shell(ctx: &RunnerCtx, container: &str) -> Option<&'static str> {
    for shell in ["/bin/bash", "/bin/sh"] {
        match ctx.docker.exec_check(container, &["which", shell]).await {
            Ok(true) => return Some(shell),
            Ok(false) => continue,
            Err(e) => {
                warn!(container, error = %e, "shell detection failed");
                return None;
            }
        }
    }
    None
}

async fn send_server(socket: &mut WebSocket, msg: &TermServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    socket.send(Message::Text(json.into())).await
}

async fn close_with_error(socket: &mut WebSocket, message: &str, code: u16) {
    let _ = send_server(socket, &TermServerMessage::error(message)).await;
    let _ = socket.send(Message::Close(Some(CloseFrame { code, reason: "".into() }))).await;
}
