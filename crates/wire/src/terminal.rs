// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal WebSocket messages.
//!
//! One JSON object per WebSocket text message; binary frames are not used.
//! The proxy hop forwards these byte-for-byte, so the same types serve the
//! client<->host and host<->runner legs.

use serde::{Deserialize, Serialize};

/// Client -> server terminal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TermClientMessage {
    /// Keystrokes, UTF-8 encoded.
    Input { data: String },
    Resize { rows: u16, cols: u16 },
}

/// Server -> client terminal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TermServerMessage {
    /// Terminal output; an empty `data` is the post-handshake ready signal.
    Output { data: String },
    Error { data: String },
}

impl TermServerMessage {
    pub fn output(data: impl Into<String>) -> Self {
        TermServerMessage::Output { data: data.into() }
    }

    pub fn error(data: impl Into<String>) -> Self {
        TermServerMessage::Error { data: data.into() }
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
