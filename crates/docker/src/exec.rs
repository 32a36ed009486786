// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive container exec over the Docker Engine API socket.
//!
//! The CLI has no way to hand us a resizable TTY stream, so this module
//! speaks the Engine's HTTP API directly over `/var/run/docker.sock`:
//! create an exec, start it with `Connection: Upgrade` (the socket then
//! becomes a raw bidirectional TTY byte stream), and resize through a
//! separate plain request.

use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot reach docker socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to docker: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed HTTP response from docker: {0}")]
    Protocol(String),

    #[error("container '{0}' not found")]
    ContainerNotFound(String),
}

/// Connection factory for the Engine API.
#[derive(Debug, Clone)]
pub struct EngineApi {
    socket_path: PathBuf,
}

impl Default for EngineApi {
    fn default() -> Self {
        Self { socket_path: PathBuf::from(DEFAULT_SOCKET) }
    }
}

impl EngineApi {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    async fn connect(&self) -> Result<UnixStream, ExecError> {
        UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ExecError::Connect { path: self.socket_path.clone(), source })
    }

    /// One request/response exchange (no upgrade).
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(u16, String), ExecError> {
        let mut stream = self.connect().await?;
        let payload = body.map(|b| b.to_string()).unwrap_or_default();
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: docker\r\nConnection: close\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{payload}",
            payload.len(),
        );
        stream.write_all(request.as_bytes()).await?;

        let head = read_head(&mut stream).await?;
        let (status, headers) = parse_head(&head)?;

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await?;
        let body = if headers.get("transfer-encoding").map(String::as_str) == Some("chunked") {
            decode_chunked(&rest)
                .ok_or_else(|| ExecError::Protocol("bad chunked encoding".to_string()))?
        } else {
            rest
        };
        Ok((status, String::from_utf8_lossy(&body).into_owned()))
    }

    /// Create a TTY exec in a container. Returns the exec ID.
    pub async fn create_exec(&self, container: &str, cmd: &[&str]) -> Result<String, ExecError> {
        let body = json!({
            "AttachStdin": true,
            "AttachStdout": true,
            "AttachStderr": true,
            "Tty": true,
            "Cmd": cmd,
        });
        let path = format!("/containers/{container}/exec");
        let (status, response) = self.request("POST", &path, Some(&body)).await?;
        match status {
            201 => {
                let parsed: serde_json::Value = serde_json::from_str(&response)
                    .map_err(|e| ExecError::Protocol(e.to_string()))?;
                parsed["Id"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ExecError::Protocol("exec create response missing Id".into()))
            }
            404 => Err(ExecError::ContainerNotFound(container.to_string())),
            _ => Err(ExecError::Api { status, body: response }),
        }
    }

    /// Start an exec, upgrading the connection to a raw TTY byte stream.
    pub async fn start_exec(&self, exec_id: &str) -> Result<UnixStream, ExecError> {
        let mut stream = self.connect().await?;
        let payload = json!({"Detach": false, "Tty": true}).to_string();
        let request = format!(
            "POST /exec/{exec_id}/start HTTP/1.1\r\nHost: docker\r\nConnection: Upgrade\r\nUpgrade: tcp\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{payload}",
            payload.len(),
        );
        stream.write_all(request.as_bytes()).await?;

        let head = read_head(&mut stream).await?;
        let (status, _) = parse_head(&head)?;
        // 101 is the upgrade; some engine versions answer 200 and stream anyway.
        if status != 101 && status != 200 {
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
            return Err(ExecError::Api {
                status,
                body: String::from_utf8_lossy(&rest).into_owned(),
            });
        }
        Ok(stream)
    }

    /// Resize the exec's TTY.
    pub async fn resize_exec(&self, exec_id: &str, rows: u16, cols: u16) -> Result<(), ExecError> {
        let path = format!("/exec/{exec_id}/resize?h={rows}&w={cols}");
        let (status, body) = self.request("POST", &path, None).await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(ExecError::Api { status, body })
        }
    }
}

/// Handle for resizing a live exec session.
#[derive(Debug, Clone)]
pub struct ExecHandle {
    exec_id: String,
    api: EngineApi,
}

impl ExecHandle {
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), ExecError> {
        self.api.resize_exec(&self.exec_id, rows, cols).await
    }
}

/// A live interactive shell inside a container.
pub struct ExecSession {
    stream: UnixStream,
    handle: ExecHandle,
}

impl ExecSession {
    /// Open an interactive exec running `shell` in `container`.
    pub async fn open(
        socket_path: &Path,
        container: &str,
        shell: &str,
    ) -> Result<Self, ExecError> {
        let api = EngineApi::new(socket_path);
        let exec_id = api.create_exec(container, &[shell]).await?;
        let stream = api.start_exec(&exec_id).await?;
        Ok(Self { stream, handle: ExecHandle { exec_id, api } })
    }

    /// Split into the raw byte stream and a resize handle.
    pub fn into_parts(self) -> (UnixStream, ExecHandle) {
        (self.stream, self.handle)
    }
}

/// Read HTTP response headers byte-by-byte up to the blank line, so no
/// body/stream bytes are consumed past the boundary.
async fn read_head(stream: &mut UnixStream) -> Result<String, ExecError> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(ExecError::Protocol("connection closed before headers".into()));
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            break;
        }
        if head.len() > 16 * 1024 {
            return Err(ExecError::Protocol("response headers too large".into()));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

/// Parse a response head into status code + lowercased headers.
fn parse_head(head: &str) -> Result<(u16, HashMap<String, String>), ExecError> {
    let mut lines = head.split("\r\n");
    let status_line =
        lines.next().ok_or_else(|| ExecError::Protocol("empty response".to_string()))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ExecError::Protocol(format!("bad status line: {status_line}")))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Ok((status, headers))
}

/// Minimal chunked transfer decoding.
fn decode_chunked(raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut rest = raw;
    loop {
        let line_end = rest.windows(2).position(|w| w == b"\r\n")?;
        let size_str = std::str::from_utf8(&rest[..line_end]).ok()?;
        let size = usize::from_str_radix(size_str.trim(), 16).ok()?;
        rest = &rest[line_end + 2..];
        if size == 0 {
            return Some(out);
        }
        if rest.len() < size + 2 {
            return None;
        }
        out.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
