// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner HTTP API.
//!
//! Exposes task execution, VPS lifecycle, docker image management, and the
//! terminal WebSocket. Requests for the same task id are serialized by the
//! per-task locks inside the handlers they dispatch to.

use crate::state::RunnerCtx;
use crate::{control, executor, terminal, vps};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use kr_core::{ApiError, TaskId};
use kr_docker::SyncDecision;
use kr_wire::{Ack, ControlRequest, TaskSpec, VpsSpec};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

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

pub fn router(ctx: Arc<RunnerCtx>) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/vps/create", post(vps_create))
        .route("/vps/stop/{task_id}", post(vps_stop))
        .route("/vps/pause/{task_id}", post(vps_pause))
        .route("/vps/resume/{task_id}", post(vps_resume))
        .route("/kill", post(kill))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/docker/images", get(docker_images))
        .route("/docker/sync/{env}", post(docker_sync))
        .route("/task/{task_id}/terminal", get(task_terminal))
        .with_state(ctx)
}

/// Creation is gated on the local temp dir: the vault and the default
/// mounts live there, so a missing dir means a broken node.
fn check_local_temp(ctx: &RunnerCtx) -> Result<(), ApiError> {
    let dir = &ctx.config.paths.local_temp_dir;
    if dir.is_dir() {
        Ok(())
    } else {
        Err(ApiError::Internal(format!(
            "local temp directory '{}' missing on this node",
            dir.display()
        )))
    }
}

async fn execute(
    State(ctx): State<Arc<RunnerCtx>>,
    Json(spec): Json<TaskSpec>,
) -> Result<(StatusCode, Json<Ack>), Failure> {
    check_local_temp(&ctx)?;

    let task_id = spec.task_id;
    if ctx.vault.resolve_container(task_id).is_some() {
        return Err(ApiError::StateConflict(format!(
            "task {task_id} is already running on this node"
        ))
        .into());
    }

    info!(%task_id, command = %spec.command, cores = spec.required_cores, "task accepted");
    let exec_ctx = Arc::clone(&ctx);
    tokio::spawn(async move { executor::run_command_task(&exec_ctx, spec).await });

    Ok((StatusCode::ACCEPTED, Json(Ack::new(format!("Task {task_id} accepted")))))
}

async fn vps_create(
    State(ctx): State<Arc<RunnerCtx>>,
    Json(spec): Json<VpsSpec>,
) -> Result<Json<kr_wire::VpsCreateResponse>, Failure> {
    check_local_temp(&ctx)?;

    let task_id = spec.task_id;
    if ctx.vault.resolve_container(task_id).is_some() {
        return Err(ApiError::StateConflict(format!(
            "task {task_id} is already running on this node"
        ))
        .into());
    }

    let response = vps::create_vps(&ctx, spec).await?;
    Ok(Json(response))
}

async fn vps_stop(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<Ack>, Failure> {
    vps::stop_vps(&ctx, task_id).await?;
    Ok(Json(Ack::new(format!("VPS {task_id} stopped"))))
}

async fn vps_pause(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<Ack>, Failure> {
    control::pause_task(&ctx, task_id).await?;
    Ok(Json(Ack::new(format!("VPS {task_id} paused"))))
}

async fn vps_resume(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(task_id): Path<TaskId>,
) -> Result<Json<Ack>, Failure> {
    control::resume_task(&ctx, task_id).await?;
    Ok(Json(Ack::new(format!("VPS {task_id} resumed"))))
}

async fn kill(
    State(ctx): State<Arc<RunnerCtx>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<Ack>, Failure> {
    control::kill_task(&ctx, request.task_id).await?;
    Ok(Json(Ack::new(format!("Kill processed for task {}", request.task_id))))
}

async fn pause(
    State(ctx): State<Arc<RunnerCtx>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<Ack>, Failure> {
    control::pause_task(&ctx, request.task_id).await?;
    Ok(Json(Ack::new(format!("Task {} paused", request.task_id))))
}

async fn resume(
    State(ctx): State<Arc<RunnerCtx>>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<Ack>, Failure> {
    control::resume_task(&ctx, request.task_id).await?;
    Ok(Json(Ack::new(format!("Task {} resumed", request.task_id))))
}

async fn docker_images(State(ctx): State<Arc<RunnerCtx>>) -> Result<Response, Failure> {
    let images = ctx
        .docker
        .list_images()
        .await
        .map_err(|e| ApiError::Runtime(format!("failed to list images: {e}")))?;
    let entries: Vec<_> = images
        .into_iter()
        .map(|img| json!({ "tag": img.tag, "id": img.id, "created": img.created, "size": img.size }))
        .collect();
    Ok(Json(json!({ "images": entries })).into_response())
}

async fn docker_sync(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(env): Path<String>,
) -> Result<Response, Failure> {
    let decision = ctx
        .image_store
        .check_sync(&env, &ctx.docker)
        .await
        .map_err(|e| ApiError::ImageSync(e.to_string()))?;

    match decision {
        SyncDecision::UpToDate => {
            Ok(Json(json!({ "message": format!("Environment '{env}' is up-to-date."), "synced": false }))
                .into_response())
        }
        SyncDecision::NoTarball => {
            Err(ApiError::NotFound(format!("no tarball found for environment '{env}'")).into())
        }
        SyncDecision::Sync(path) => {
            ctx.docker
                .load(&path, ctx.config.image_sync_timeout())
                .await
                .map_err(|e| ApiError::ImageSync(e.to_string()))?;
            info!(env, path = %path.display(), "environment synced from shared tarball");
            Ok(Json(json!({
                "message": format!("Environment '{env}' synced successfully."),
                "synced": true,
                "source": path.display().to_string(),
            }))
            .into_response())
        }
    }
}

async fn task_terminal(
    State(ctx): State<Arc<RunnerCtx>>,
    Path(task_id): Path<TaskId>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| terminal::serve_terminal(ctx, task_id, socket))
}
