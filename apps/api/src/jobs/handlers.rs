use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::alerts::matcher::matching_jobs;
use crate::errors::AppError;
use crate::jobs::repository::{JobSource, NewJobPosting};
use crate::models::job::JobPosting;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct JobListQuery {
    /// Restrict the listing to postings matching this alert.
    pub alert: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct JobStatusUpdate {
    pub is_active: bool,
}

/// POST /api/v1/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(req): Json<NewJobPosting>,
) -> Result<(StatusCode, Json<JobPosting>), AppError> {
    req.validate()?;
    let job = state.jobs.create(&req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let jobs = state.jobs.list_active().await?;
    let Some(alert_id) = params.alert else {
        return Ok(Json(jobs));
    };

    let alert = state.alerts.get(alert_id).await?;
    let matched = matching_jobs(&alert.criteria, &jobs)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(matched))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobPosting>, AppError> {
    Ok(Json(state.jobs.get(id).await?))
}

/// PATCH /api/v1/jobs/:id/status
pub async fn handle_set_job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<JobStatusUpdate>,
) -> Result<Json<JobPosting>, AppError> {
    Ok(Json(state.jobs.set_active(id, req.is_active).await?))
}
