// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the control plane.
//!
//! Both daemons map these onto HTTP responses; the kind decides the status
//! code, the message goes to the caller verbatim.

use thiserror::Error;

/// Control-plane error kinds.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad submission or malformed request; no state was created.
    #[error("{0}")]
    Validation(String),

    /// No suitable node / insufficient cores, memory, or GPUs.
    #[error("{0}")]
    Capacity(String),

    /// Unknown task, hostname, or container.
    #[error("{0}")]
    NotFound(String),

    /// Operation not valid in the entity's current state.
    #[error("{0}")]
    StateConflict(String),

    /// Network or HTTP failure reaching a runner.
    #[error("runner unreachable: {0}")]
    WorkerUnreachable(String),

    /// Container runtime failure.
    #[error("{0}")]
    Runtime(String),

    /// Tarball missing or image load failed.
    #[error("image sync failed: {0}")]
    ImageSync(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Capacity(_) => 503,
            ApiError::NotFound(_) => 404,
            ApiError::StateConflict(_) => 409,
            ApiError::WorkerUnreachable(_) => 502,
            ApiError::Runtime(_) | ApiError::ImageSync(_) | ApiError::Internal(_) => 500,
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }
}
