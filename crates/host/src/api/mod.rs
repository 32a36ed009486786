// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host HTTP control plane.
//!
//! Endpoint modules mirror the responsibilities: node registration and
//! heartbeats in [`nodes`], task lifecycle in [`tasks`], VPS surface in
//! [`vps`]. The terminal WebSocket proxy hangs off the same router.

mod nodes;
mod tasks;
mod vps;

use crate::state::HostState;
use crate::terminal;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use kr_core::{ApiError, TaskId};
use serde_json::json;
use std::sync::Arc;

/// `ApiError` adapter for axum responses.
pub struct Failure(pub ApiError);

impl From<ApiError> for Failure {
    fn from(err: ApiError) -> Self {
        Failure(err)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: Arc<HostState>) -> Router {
    Router::new()
        .route("/register", post(nodes::register))
        .route("/heartbeat/{hostname}", put(nodes::heartbeat))
        .route("/nodes", get(nodes::list_nodes))
        .route("/health", get(nodes::health))
        .route("/submit", post(tasks::submit))
        .route("/update", post(tasks::update))
        .route("/status/{task_id}", get(tasks::status))
        .route("/tasks", get(tasks::list))
        .route("/kill/{task_id}", post(tasks::kill))
        .route("/command/{task_id}/{command}", post(tasks::command))
        .route("/task/{task_id}/stdout", get(tasks::stdout))
        .route("/task/{task_id}/stderr", get(tasks::stderr))
        .route("/vps/create", post(vps::create))
        .route("/vps/status", get(vps::active))
        .route("/vps/stop/{task_id}", post(vps::stop))
        .route("/task/{task_id}/terminal", get(task_terminal))
        .with_state(state)
}

async fn task_terminal(
    State(state): State<Arc<HostState>>,
    Path(task_id): Path<TaskId>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| terminal::proxy_terminal(state, task_id, socket))
}
