// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime adapter and shared image store.
//!
//! Everything the cluster does to Docker goes through here:
//! - [`cli`] — container/image lifecycle via the `docker` CLI
//! - [`spec`] — `docker run` argument construction
//! - [`exec`] — interactive TTY exec over the Engine API socket
//! - [`store`] — content-addressed image tarballs on the shared filesystem
//! - [`naming`] — container/image/tarball naming and ownership rules
//!
//! The CLI is invoked through `tokio::process`, so nothing here blocks the
//! scheduler; callers treat every operation as a suspension point.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cli;
pub mod exec;
pub mod naming;
pub mod spec;
pub mod store;

pub use cli::{ContainerSummary, DockerCli, DockerError, ImageSummary};
pub use exec::{EngineApi, ExecError, ExecHandle, ExecSession};
pub use spec::RunSpec;
pub use store::{ImageStore, StoreError, SyncDecision};
