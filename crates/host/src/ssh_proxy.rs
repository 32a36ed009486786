// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH multiplexed proxy (host side).
//!
//! Runners on private networks dial OUT to this listener and keep one
//! framed channel open; SSH clients dial IN to the same port. A JSON
//! hello distinguishes the two. Client connections are multiplexed onto
//! the task's worker channel as OPEN/DATA/CLOSE/ERR frames; back-pressure
//! comes from bounded per-channel buffers pausing the faster side's reads.

use crate::state::HostState;
use kr_core::{TaskId, TaskStatus};
use kr_wire::{read_frame, read_hello, write_frame, ChannelFlag, Frame, ProxyHello};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DATA_CHUNK: usize = 16 * 1024;
/// Bounded per-channel frame buffer; the relay stops reading from the
/// faster side once it fills.
const CHANNEL_BUFFER: usize = 32;

/// One live worker channel.
struct WorkerChannel {
    /// Frames bound for the worker.
    out_tx: mpsc::Sender<Frame>,
    /// Per-channel routes for worker -> client payloads.
    routes: Arc<Mutex<HashMap<u32, mpsc::Sender<Vec<u8>>>>>,
}

/// Registry of connected workers, keyed by hostname.
pub struct ProxyRegistry {
    workers: Mutex<HashMap<String, Arc<WorkerChannel>>>,
    next_channel_id: AtomicU32,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self { workers: Mutex::new(HashMap::new()), next_channel_id: AtomicU32::new(1) }
    }

    fn allocate_channel_id(&self) -> u32 {
        self.next_channel_id.fetch_add(1, Ordering::Relaxed)
    }

    fn get(&self, hostname: &str) -> Option<Arc<WorkerChannel>> {
        self.workers.lock().get(hostname).cloned()
    }
}

impl Default for ProxyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept loop on the SSH proxy port.
pub async fn listen(state: Arc<HostState>) -> std::io::Result<()> {
    let bind = format!(
        "{}:{}",
        state.config.network.host_bind_ip, state.config.network.host_ssh_proxy_port
    );
    let listener = TcpListener::bind(&bind).await?;
    info!(%bind, "ssh proxy listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let conn_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(conn_state, stream).await {
                debug!(%peer, error = %e, "ssh proxy connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    state: Arc<HostState>,
    mut stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match read_hello(&mut stream).await? {
        ProxyHello::Worker { hostname } => {
            run_worker_channel(state, hostname, stream).await;
            Ok(())
        }
        ProxyHello::Client { task_id } => run_client_session(state, task_id, stream).await,
    }
}

/// Serve one worker's persistent frame channel. A reconnect replaces the
/// previous channel; its routes die with the old writer.
async fn run_worker_channel(state: Arc<HostState>, hostname: String, stream: TcpStream) {
    info!(%hostname, "worker ssh channel connected");

    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Frame>(CHANNEL_BUFFER * 4);
    let routes: Arc<Mutex<HashMap<u32, mpsc::Sender<Vec<u8>>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let channel = Arc::new(WorkerChannel { out_tx, routes: Arc::clone(&routes) });
    state.ssh.workers.lock().insert(hostname.clone(), channel);

    let writer_task = tokio::spawn(worker_write_loop(writer, out_rx));

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(kr_wire::FrameError::ConnectionClosed) => break,
            Err(e) => {
                warn!(%hostname, error = %e, "worker channel protocol error");
                break;
            }
        };

        match frame.flag {
            ChannelFlag::Data => {
                let route = routes.lock().get(&frame.channel_id).cloned();
                match route {
                    // Bounded send: a slow client pauses this worker read loop.
                    Some(sender) => {
                        if sender.send(frame.payload).await.is_err() {
                            routes.lock().remove(&frame.channel_id);
                        }
                    }
                    None => debug!(channel_id = frame.channel_id, "data for closed channel"),
                }
            }
            ChannelFlag::Close => {
                routes.lock().remove(&frame.channel_id);
            }
            ChannelFlag::Err => {
                let message = String::from_utf8_lossy(&frame.payload).into_owned();
                warn!(channel_id = frame.channel_id, task_id = %frame.task_id, %message, "worker reported channel error");
                routes.lock().remove(&frame.channel_id);
            }
            ChannelFlag::Open => {
                // Only the host opens channels.
                debug!(channel_id = frame.channel_id, "unexpected OPEN from worker, ignoring");
            }
        }
    }

    // Remove only if this channel is still the registered one.
    {
        let mut workers = state.ssh.workers.lock();
        if let Some(current) = workers.get(&hostname) {
            if Arc::ptr_eq(&current.routes, &routes) {
                workers.remove(&hostname);
            }
        }
    }
    routes.lock().clear();
    writer_task.abort();
    info!(%hostname, "worker ssh channel disconnected");
}

async fn worker_write_loop(mut writer: OwnedWriteHalf, mut out_rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = out_rx.recv().await {
        if write_frame(&mut writer, &frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Serve one SSH client: resolve the VPS, open a channel on its worker's
/// frame connection, and relay raw bytes both ways.
async fn run_client_session(
    state: Arc<HostState>,
    task_id: TaskId,
    stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let Some(task) = state.store.get_task(task_id) else {
        info!(%task_id, "ssh client for unknown task, dropping");
        return Ok(());
    };
    if !task.is_vps() || task.status != TaskStatus::Running {
        info!(%task_id, status = %task.status, "ssh client for inactive VPS, dropping");
        return Ok(());
    }
    let Some(hostname) = task.assigned_node.clone() else {
        return Ok(());
    };
    let Some(worker) = state.ssh.get(&hostname) else {
        warn!(%task_id, %hostname, "no ssh channel from worker, dropping client");
        return Ok(());
    };

    let channel_id = state.ssh.allocate_channel_id();
    let (route_tx, mut route_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_BUFFER);
    worker.routes.lock().insert(channel_id, route_tx);

    if worker.out_tx.send(Frame::open(channel_id, task_id)).await.is_err() {
        worker.routes.lock().remove(&channel_id);
        return Ok(());
    }
    info!(%task_id, channel_id, %hostname, "ssh session multiplexed");

    let (mut client_read, mut client_write) = stream.into_split();
    let mut buf = vec![0u8; DATA_CHUNK];

    loop {
        tokio::select! {
            from_client = client_read.read(&mut buf) => {
                match from_client {
                    Ok(0) | Err(_) => {
                        let _ = worker.out_tx.send(Frame::close(channel_id, task_id)).await;
                        break;
                    }
                    Ok(n) => {
                        let frame = Frame::data(channel_id, task_id, buf[..n].to_vec());
                        if worker.out_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
            from_worker = route_rx.recv() => {
                match from_worker {
                    Some(chunk) => {
                        if client_write.write_all(&chunk).await.is_err() {
                            let _ = worker.out_tx.send(Frame::close(channel_id, task_id)).await;
                            break;
                        }
                    }
                    // Route dropped: worker sent CLOSE/ERR or went away.
                    None => break,
                }
            }
        }
    }

    worker.routes.lock().remove(&channel_id);
    let _ = client_write.shutdown().await;
    debug!(%task_id, channel_id, "ssh session ended");
    Ok(())
}
