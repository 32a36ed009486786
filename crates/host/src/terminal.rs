// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host-side terminal proxy.
//!
//! The client's WebSocket is bridged to the runner's `/task/{id}/terminal`
//! endpoint frame-for-frame; the host adds nothing but routing. Close
//! codes propagate; neither side is reconnected — the client restarts the
//! session.

use crate::state::HostState;
use axum::extract::ws::{CloseFrame, Message as AxMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use kr_core::TaskId;
use kr_wire::TermServerMessage;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message as TgMessage;
use tracing::{debug, info, warn};

const CLOSE_POLICY: u16 = 1008;
const CLOSE_ERROR: u16 = 1011;
const CLOSE_NORMAL: u16 = 1000;

pub async fn proxy_terminal(state: Arc<HostState>, task_id: TaskId, mut client: WebSocket) {
    info!(%task_id, "terminal proxy connection accepted");

    let Some(task) = state.store.get_task(task_id) else {
        close_with_error(&mut client, "Task not found.", CLOSE_POLICY).await;
        return;
    };
    let Some(node) = task.assigned_node.as_deref().and_then(|h| state.store.get_node(h)) else {
        close_with_error(&mut client, "Task has no assigned node.", CLOSE_POLICY).await;
        return;
    };
    if !node.is_online() {
        close_with_error(&mut client, "Assigned node is offline.", CLOSE_POLICY).await;
        return;
    }

    // http://host:port -> ws://host:port, same path shape on the runner.
    let runner_ws = format!(
        "{}/task/{}/terminal",
        node.url.replacen("http", "ws", 1),
        task_id
    );
    let (upstream, _) = match tokio_tungstenite::connect_async(&runner_ws).await {
        Ok(connected) => connected,
        Err(e) => {
            warn!(%task_id, url = %runner_ws, error = %e, "cannot reach runner terminal");
            close_with_error(&mut client, &format!("Runner unreachable: {e}"), CLOSE_ERROR).await;
            return;
        }
    };
    info!(%task_id, runner = %node.hostname, "terminal proxy bridged");

    let (mut up_write, mut up_read) = upstream.split();

    // Byte-for-byte relay; the first side to close ends both.
    let close_code = loop {
        tokio::select! {
            from_client = client.recv() => {
                match from_client {
                    Some(Ok(AxMessage::Text(text))) => {
                        if up_write.send(TgMessage::Text(text.as_str().into())).await.is_err() {
                            break CLOSE_ERROR;
                        }
                    }
                    Some(Ok(AxMessage::Close(frame))) => {
                        debug!(%task_id, "client closed terminal proxy");
                        let code = frame.map(|f| f.code).unwrap_or(CLOSE_NORMAL);
                        let _ = up_write.send(TgMessage::Close(None)).await;
                        break code;
                    }
                    None => {
                        debug!(%task_id, "client closed terminal proxy");
                        let _ = up_write.send(TgMessage::Close(None)).await;
                        break CLOSE_NORMAL;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary — terminal frames are text-only
                    Some(Err(e)) => {
                        debug!(%task_id, error = %e, "client socket error");
                        let _ = up_write.send(TgMessage::Close(None)).await;
                        break CLOSE_NORMAL;
                    }
                }
            }
            from_runner = up_read.next() => {
                match from_runner {
                    Some(Ok(TgMessage::Text(text))) => {
                        if client.send(AxMessage::Text(text.as_str().into())).await.is_err() {
                            break CLOSE_NORMAL;
                        }
                    }
                    Some(Ok(TgMessage::Close(frame))) => {
                        debug!(%task_id, ?frame, "runner closed terminal");
                        break frame.map(|f| u16::from(f.code)).unwrap_or(CLOSE_NORMAL);
                    }
                    None => break CLOSE_NORMAL,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%task_id, error = %e, "runner socket error");
                        break CLOSE_ERROR;
                    }
                }
            }
        }
    };

    let _ = client
        .send(AxMessage::Close(Some(CloseFrame { code: close_code, reason: "".into() })))
        .await;
    info!(%task_id, "terminal proxy session ended");
}

async fn close_with_error(client: &mut WebSocket, message: &str, code: u16) {
    let payload = serde_json::to_string(&TermServerMessage::error(message)).unwrap_or_default();
    let _ = client.send(AxMessage::Text(payload.into())).await;
    let _ = client.send(AxMessage::Close(Some(CloseFrame { code, reason: "".into() }))).await;
}
