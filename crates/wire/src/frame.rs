// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH-multiplex channel framing.
//!
//! Wire format: 4-byte length prefix (big-endian) + body. The first message
//! on a proxy connection is a JSON hello ([`ProxyHello`]); after that, worker
//! channels speak binary frames:
//!
//! ```text
//! channel_id: u32 BE | task_id: u64 BE | flag: u8 | payload
//! ```

use kr_core::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a frame payload. The relay never produces more than
/// 16 KiB per DATA frame; anything beyond this is a protocol violation.
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

const FRAME_HEADER_LEN: usize = 4 + 8 + 1;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("frame too short: {0} bytes")]
    TooShort(usize),

    #[error("unknown channel flag: {0}")]
    BadFlag(u8),

    #[error("malformed hello: {0}")]
    BadHello(#[from] serde_json::Error),
}

/// Role of a mux-channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelFlag {
    /// Host -> worker: open a channel to the task's SSH daemon.
    Open = 1,
    Data = 2,
    Close = 3,
    /// Carries a UTF-8 diagnostic; closes the channel like `Close`.
    Err = 4,
}

impl TryFrom<u8> for ChannelFlag {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            1 => Ok(ChannelFlag::Open),
            2 => Ok(ChannelFlag::Data),
            3 => Ok(ChannelFlag::Close),
            4 => Ok(ChannelFlag::Err),
            other => Err(FrameError::BadFlag(other)),
        }
    }
}

/// One record on a worker's mux channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel_id: u32,
    pub task_id: TaskId,
    pub flag: ChannelFlag,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(channel_id: u32, task_id: TaskId, flag: ChannelFlag, payload: Vec<u8>) -> Self {
        Self { channel_id, task_id, flag, payload }
    }

    pub fn open(channel_id: u32, task_id: TaskId) -> Self {
        Self::new(channel_id, task_id, ChannelFlag::Open, Vec::new())
    }

    pub fn data(channel_id: u32, task_id: TaskId, payload: Vec<u8>) -> Self {
        Self::new(channel_id, task_id, ChannelFlag::Data, payload)
    }

    pub fn close(channel_id: u32, task_id: TaskId) -> Self {
        Self::new(channel_id, task_id, ChannelFlag::Close, Vec::new())
    }

    pub fn err(channel_id: u32, task_id: TaskId, message: &str) -> Self {
        Self::new(channel_id, task_id, ChannelFlag::Err, message.as_bytes().to_vec())
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        body.extend_from_slice(&self.channel_id.to_be_bytes());
        body.extend_from_slice(&self.task_id.as_u64().to_be_bytes());
        body.push(self.flag as u8);
        body.extend_from_slice(&self.payload);
        body
    }

    fn decode_body(body: &[u8]) -> Result<Self, FrameError> {
        if body.len() < FRAME_HEADER_LEN {
            return Err(FrameError::TooShort(body.len()));
        }
        let channel_id = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let task_id = u64::from_be_bytes([
            body[4], body[5], body[6], body[7], body[8], body[9], body[10], body[11],
        ]);
        let flag = ChannelFlag::try_from(body[12])?;
        Ok(Frame {
            channel_id,
            task_id: TaskId(task_id),
            flag,
            payload: body[FRAME_HEADER_LEN..].to_vec(),
        })
    }
}

/// First message on any proxy connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ProxyHello {
    /// A runner offering its persistent frame channel.
    Worker { hostname: String },
    /// An SSH client asking to reach a VPS.
    Client { task_id: TaskId },
}

/// Read one length-prefixed message body.
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > FRAME_HEADER_LEN + MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed message body.
pub async fn write_message<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > FRAME_HEADER_LEN + MAX_FRAME_PAYLOAD {
        return Err(FrameError::TooLarge(body.len()));
    }
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let body = read_message(reader).await?;
    Frame::decode_body(&body)
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    write_message(writer, &frame.encode_body()).await
}

pub async fn read_hello<R>(reader: &mut R) -> Result<ProxyHello, FrameError>
where
    R: AsyncRead + Unpin,
{
    let body = read_message(reader).await?;
    Ok(serde_json::from_slice(&body)?)
}

pub async fn write_hello<W>(writer: &mut W, hello: &ProxyHello) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(hello)?;
    write_message(writer, &body).await
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
