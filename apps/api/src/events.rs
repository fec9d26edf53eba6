//! Domain events emitted by the persistence layer.
//!
//! Saving a posting never sends email directly. The job repository publishes
//! `JobEvent::Published` and the instant-alert loop below reacts to it.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::alerts::dispatcher::NotificationDispatcher;
use crate::alerts::store::AlertStore;
use crate::models::alert::Frequency;
use crate::models::job::JobPosting;

#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A posting was created active or switched from inactive to active.
    Published(JobPosting),
}

/// Sending half of the event channel. Publishing never blocks the writer.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<JobEvent>,
}

impl EventPublisher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: JobEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(JobEvent::Published(job))) => {
                warn!(job_id = %job.id, "event channel full; instant alerts skipped for this job");
            }
            Err(TrySendError::Closed(JobEvent::Published(job))) => {
                warn!(job_id = %job.id, "event channel closed; instant alerts skipped for this job");
            }
        }
    }
}

/// Consumes job events until every publisher is dropped.
pub async fn run_instant_alerts(
    mut rx: mpsc::Receiver<JobEvent>,
    dispatcher: Arc<NotificationDispatcher>,
    alerts: Arc<dyn AlertStore>,
) {
    info!("Instant alert listener started");
    while let Some(event) = rx.recv().await {
        handle_event(event, &dispatcher, alerts.as_ref()).await;
    }
    info!("Instant alert listener stopped");
}

/// Dispatches one event. Returns the number of emails sent.
pub async fn handle_event(
    event: JobEvent,
    dispatcher: &NotificationDispatcher,
    alerts: &dyn AlertStore,
) -> usize {
    match event {
        JobEvent::Published(job) => {
            let mut candidates = match alerts.list_deliverable(&[Frequency::Instant]).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "could not load instant alerts");
                    return 0;
                }
            };
            debug!(job_id = %job.id, candidates = candidates.len(), "evaluating instant alerts");
            dispatcher.on_job_published(&job, &mut candidates).await
        }
    }
}
