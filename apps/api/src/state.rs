use std::sync::Arc;

use sqlx::PgPool;

use crate::alerts::store::PgAlertStore;
use crate::config::Config;
use crate::jobs::repository::JobRepository;
use crate::scheduler::DigestScheduler;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub jobs: JobRepository,
    pub alerts: PgAlertStore,
    /// Same scheduler the background sweep uses; the sweep endpoint runs it on demand.
    pub scheduler: Arc<DigestScheduler>,
}
