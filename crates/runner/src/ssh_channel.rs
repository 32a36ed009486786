// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker side of the SSH multiplex channel.
//!
//! One persistent framed TCP connection to the host's proxy port carries
//! every SSH session for this node. The host opens logical channels
//! (OPEN), we dial the VPS's published port on loopback, and DATA frames
//! flow both ways until either side closes the channel. The connection is
//! re-dialed with backoff whenever it drops.

use crate::state::RunnerCtx;
use kr_core::TaskId;
use kr_wire::{read_frame, write_frame, write_hello, ChannelFlag, Frame, ProxyHello};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DATA_CHUNK: usize = 16 * 1024;
/// Bounded per-channel buffer toward the container; the frame reader stops
/// draining the host connection when a channel falls behind.
const CHANNEL_BUFFER: usize = 32;

pub async fn channel_loop(ctx: Arc<RunnerCtx>) {
    loop {
        match run_channel(&ctx).await {
            Ok(()) => info!("ssh channel closed by host"),
            Err(e) => warn!(error = %e, "ssh channel failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_channel(ctx: &Arc<RunnerCtx>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!(
        "{}:{}",
        ctx.config.network.host_reachable_address, ctx.config.network.host_ssh_proxy_port
    );
    let mut stream = TcpStream::connect(&addr).await?;
    write_hello(&mut stream, &ProxyHello::Worker { hostname: ctx.hostname.clone() }).await?;
    info!(%addr, "ssh channel established");

    let (mut reader, writer) = stream.into_split();

    // All channel tasks funnel their outbound frames through one writer task.
    let (out_tx, out_rx) = mpsc::channel::<Frame>(CHANNEL_BUFFER * 4);
    let writer_task = tokio::spawn(write_loop(writer, out_rx));

    let mut channels: HashMap<u32, mpsc::Sender<Vec<u8>>> = HashMap::new();

    let result = loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(kr_wire::FrameError::ConnectionClosed) => break Ok(()),
            Err(e) => break Err(e.into()),
        };

        match frame.flag {
            ChannelFlag::Open => {
                let channel_id = frame.channel_id;
                let task_id = frame.task_id;
                match open_channel(ctx, channel_id, task_id, out_tx.clone()).await {
                    Ok(sender) => {
                        channels.insert(channel_id, sender);
                    }
                    Err(message) => {
                        warn!(channel_id, %task_id, %message, "rejecting ssh channel");
                        let _ = out_tx.send(Frame::err(channel_id, task_id, &message)).await;
                    }
                }
            }
            ChannelFlag::Data => {
                if let Some(sender) = channels.get(&frame.channel_id) {
                    // Bounded send: back-pressure pauses this read loop.
                    if sender.send(frame.payload).await.is_err() {
                        channels.remove(&frame.channel_id);
                    }
                } else {
                    debug!(channel_id = frame.channel_id, "data for unknown channel, dropping");
                }
            }
            ChannelFlag::Close | ChannelFlag::Err => {
                // Dropping the sender ends the channel's relay tasks.
                channels.remove(&frame.channel_id);
            }
        }
    };

    drop(channels);
    drop(out_tx);
    let _ = writer_task.await;
    result
}

async fn write_loop(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = out_rx.recv().await {
        if write_frame(&mut writer, &frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Dial the VPS's SSH port and wire both relay directions.
async fn open_channel(
    ctx: &Arc<RunnerCtx>,
    channel_id: u32,
    task_id: TaskId,
    out_tx: mpsc::Sender<Frame>,
) -> Result<mpsc::Sender<Vec<u8>>, String> {
    let record = ctx
        .vault
        .get_vps(task_id)
        .ok_or_else(|| format!("VPS {task_id} not tracked on this runner"))?;
    if record.ssh_port == 0 {
        return Err(format!("VPS {task_id} has no SSH port (TTY-only)"));
    }

    let addr = format!("127.0.0.1:{}", record.ssh_port);
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| format!("cannot reach sshd at {addr}: {e}"))?;
    info!(channel_id, %task_id, %addr, "ssh channel opened");

    let (read_half, write_half) = stream.into_split();
    let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_BUFFER);

    tokio::spawn(pump_to_container(write_half, in_rx));
    tokio::spawn(pump_to_host(read_half, channel_id, task_id, out_tx));

    Ok(in_tx)
}

/// host -> container direction.
async fn pump_to_container(mut writer: OwnedWriteHalf, mut in_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(chunk) = in_rx.recv().await {
        if writer.write_all(&chunk).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// container -> host direction; sends CLOSE when the container side ends.
async fn pump_to_host(
    mut reader: OwnedReadHalf,
    channel_id: u32,
    task_id: TaskId,
    out_tx: mpsc::Sender<Frame>,
) {
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; DATA_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let frame = Frame::data(channel_id, task_id, buf[..n].to_vec());
                if out_tx.send(frame).await.is_err() {
                    return;
                }
            }
        }
    }
    let _ = out_tx.send(Frame::close(channel_id, task_id)).await;
}
