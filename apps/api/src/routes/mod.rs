pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::alerts::handlers as alerts;
use crate::jobs::handlers as jobs;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Jobs
        .route(
            "/api/v1/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_create_job),
        )
        .route("/api/v1/jobs/:id", get(jobs::handle_get_job))
        .route("/api/v1/jobs/:id/status", patch(jobs::handle_set_job_status))
        // Alerts
        .route(
            "/api/v1/alerts",
            get(alerts::handle_list_alerts).post(alerts::handle_create_alert),
        )
        .route("/api/v1/alerts/sweep", post(alerts::handle_run_sweep))
        .route(
            "/api/v1/alerts/:id",
            patch(alerts::handle_update_alert).delete(alerts::handle_delete_alert),
        )
        .route("/api/v1/alerts/:id/matches", get(alerts::handle_alert_matches))
        .with_state(state)
}
