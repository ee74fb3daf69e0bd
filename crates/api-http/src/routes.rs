// Read API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tagsmith_core::port::{AuditStore, JobQueue};

const DEFAULT_JOBS_LIMIT: i64 = 50;
const MAX_JOBS_LIMIT: i64 = 500;

fn internal(e: impl std::fmt::Display) -> StatusCode {
    tracing::error!("internal error: {e}");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn AuditStore>,
    pub queue: Arc<dyn JobQueue>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/assignments", get(get_assignments))
        .route("/api/queue", get(queue_counts))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct JobsQuery {
    limit: Option<i64>,
}

async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Value>, StatusCode> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_JOBS_LIMIT)
        .clamp(1, MAX_JOBS_LIMIT);
    let jobs = state
        .store
        .list_recent_jobs(limit)
        .await
        .map_err(internal)?;
    let total = state.store.count_jobs().await.map_err(internal)?;
    Ok(Json(json!({ "jobs": jobs, "total": total })))
}

async fn get_job(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    match state.store.get_job_by_id(id).await.map_err(internal)? {
        Some(job) => Ok(Json(json!({ "job": job }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_run(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    match state.store.get_run_by_id(id).await.map_err(internal)? {
        Some(run) => Ok(Json(json!({ "run": run }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_assignments(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StatusCode> {
    let assignments = state
        .store
        .get_assignments_for_run(id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "assignments": assignments })))
}

async fn queue_counts(State(state): State<ApiState>) -> Result<Json<Value>, StatusCode> {
    let counts = state.queue.counts().await.map_err(internal)?;
    Ok(Json(json!({ "queue": counts })))
}
