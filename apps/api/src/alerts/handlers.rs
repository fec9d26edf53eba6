use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alerts::matcher::matching_jobs;
use crate::alerts::naming::resolve_alert_name;
use crate::alerts::store::{validate_criteria, AlertSettingsUpdate, NewAlert};
use crate::errors::AppError;
use crate::jobs::repository::JobSource;
use crate::models::alert::JobAlert;
use crate::models::job::JobPosting;
use crate::state::AppState;

const MAX_NAME_CHARS: usize = 200;

#[derive(Deserialize)]
pub struct SubscriberQuery {
    pub subscriber_id: Uuid,
}

#[derive(Serialize)]
pub struct AlertMatchesResponse {
    pub alert_id: Uuid,
    pub count: usize,
    pub jobs: Vec<JobPosting>,
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub digests_sent: usize,
}

/// Request-level checks run before anything touches the database.
pub fn validate_new_alert(req: &NewAlert) -> Result<(), AppError> {
    validate_criteria(&req.criteria)?;
    if req
        .name
        .as_deref()
        .is_some_and(|n| n.trim().chars().count() > MAX_NAME_CHARS)
    {
        return Err(AppError::Validation(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

/// POST /api/v1/alerts
pub async fn handle_create_alert(
    State(state): State<AppState>,
    Json(req): Json<NewAlert>,
) -> Result<(StatusCode, Json<JobAlert>), AppError> {
    validate_new_alert(&req)?;
    let name = resolve_alert_name(req.name.as_deref(), &req.criteria);
    let alert = state.alerts.create(&req, &name).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

/// GET /api/v1/alerts?subscriber_id=
pub async fn handle_list_alerts(
    State(state): State<AppState>,
    Query(params): Query<SubscriberQuery>,
) -> Result<Json<Vec<JobAlert>>, AppError> {
    Ok(Json(
        state.alerts.list_for_subscriber(params.subscriber_id).await?,
    ))
}

/// PATCH /api/v1/alerts/:id
pub async fn handle_update_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AlertSettingsUpdate>,
) -> Result<Json<JobAlert>, AppError> {
    Ok(Json(state.alerts.update_settings(id, &req).await?))
}

/// DELETE /api/v1/alerts/:id
pub async fn handle_delete_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.alerts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/alerts/:id/matches
pub async fn handle_alert_matches(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertMatchesResponse>, AppError> {
    let alert = state.alerts.get(id).await?;
    let active = state.jobs.list_active().await?;
    let jobs: Vec<JobPosting> = matching_jobs(&alert.criteria, &active)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(AlertMatchesResponse {
        alert_id: id,
        count: jobs.len(),
        jobs,
    }))
}

/// POST /api/v1/alerts/sweep
pub async fn handle_run_sweep(
    State(state): State<AppState>,
) -> Result<Json<SweepResponse>, AppError> {
    let digests_sent = state.scheduler.sweep_once(Utc::now()).await?;
    Ok(Json(SweepResponse { digests_sent }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::Frequency;
    use rust_decimal::Decimal;

    fn request(json: serde_json::Value) -> NewAlert {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_new_alert_defaults() {
        let req = request(serde_json::json!({
            "subscriber_id": Uuid::nil(),
            "keyword": "welder"
        }));
        assert_eq!(req.frequency, Frequency::Daily);
        assert!(req.email_notifications);
        assert!(req.is_active);
        assert_eq!(req.criteria.keyword.as_deref(), Some("welder"));
        assert!(validate_new_alert(&req).is_ok());
    }

    #[test]
    fn test_rejects_inverted_salary_range() {
        let mut req = request(serde_json::json!({ "subscriber_id": Uuid::nil() }));
        req.criteria.min_salary = Some(Decimal::from(80000));
        req.criteria.max_salary = Some(Decimal::from(20000));
        assert!(matches!(validate_new_alert(&req), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_rejects_overlong_name() {
        let mut req = request(serde_json::json!({ "subscriber_id": Uuid::nil() }));
        req.name = Some("x".repeat(MAX_NAME_CHARS + 1));
        assert!(validate_new_alert(&req).is_err());
        req.name = Some("x".repeat(MAX_NAME_CHARS));
        assert!(validate_new_alert(&req).is_ok());
    }
}
