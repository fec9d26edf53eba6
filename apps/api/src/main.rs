mod alerts;
mod config;
mod db;
mod errors;
mod events;
mod jobs;
mod mail;
mod models;
mod routes;
mod scheduler;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::alerts::dispatcher::{DispatcherSettings, NotificationDispatcher};
use crate::alerts::store::{AlertStore, PgAlertStore};
use crate::config::Config;
use crate::db::create_pool;
use crate::events::{run_instant_alerts, EventPublisher};
use crate::jobs::repository::{JobRepository, JobSource};
use crate::mail::build_transport;
use crate::routes::build_router;
use crate::scheduler::DigestScheduler;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobBoard API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;

    // Mail transport and dispatcher
    let mailer = build_transport(&config.mail)?;
    let alert_store = PgAlertStore::new(db.clone());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        mailer,
        Arc::new(alert_store.clone()),
        DispatcherSettings::from_config(&config),
    ));

    // Instant path: job events feed the dispatcher
    let (events, rx) = EventPublisher::channel(config.event_channel_capacity);
    let jobs = JobRepository::new(db.clone(), events);
    let listener_store: Arc<dyn AlertStore> = Arc::new(alert_store.clone());
    let listener = tokio::spawn(run_instant_alerts(rx, dispatcher.clone(), listener_store));

    // Digest path: periodic sweep
    let job_source: Arc<dyn JobSource> = Arc::new(jobs.clone());
    let scheduler = Arc::new(DigestScheduler::new(
        dispatcher,
        Arc::new(alert_store.clone()),
        job_source,
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(scheduler.clone().run(shutdown_rx));

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        jobs,
        alerts: alert_store,
        scheduler,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let tcp = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Once the sweeper exits no EventPublisher is left and the listener
    // returns after draining the channel.
    info!("Shutting down background tasks");
    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    let _ = listener.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
