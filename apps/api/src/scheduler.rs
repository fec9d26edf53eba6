//! Periodic digest sweep for DAILY and WEEKLY alerts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::alerts::dispatcher::NotificationDispatcher;
use crate::alerts::store::AlertStore;
use crate::errors::AppError;
use crate::jobs::repository::JobSource;
use crate::models::alert::Frequency;

pub struct DigestScheduler {
    dispatcher: Arc<NotificationDispatcher>,
    alerts: Arc<dyn AlertStore>,
    jobs: Arc<dyn JobSource>,
    interval: Duration,
}

impl DigestScheduler {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        alerts: Arc<dyn AlertStore>,
        jobs: Arc<dyn JobSource>,
        interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            alerts,
            jobs,
            interval,
        }
    }

    /// Loads digest alerts and active jobs, then runs one sweep at `now`.
    /// Returns the number of digests sent.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut alerts = self
            .alerts
            .list_deliverable(&[Frequency::Daily, Frequency::Weekly])
            .await?;
        let jobs = self.jobs.list_active().await?;
        Ok(self
            .dispatcher
            .run_scheduled_sweep(now, &mut alerts, &jobs)
            .await)
    }

    /// Sweeps every `interval` until `shutdown` flips to `true` or its
    /// sender is dropped. The first sweep runs immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Digest scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(sent) => info!(digests_sent = sent, "digest sweep finished"),
                        Err(e) => error!(error = %e, "digest sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Digest scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::dispatcher::DispatcherSettings;
    use crate::alerts::emails::SiteInfo;
    use crate::alerts::store::memory::InMemoryAlertStore;
    use crate::mail::testing::RecordingMailer;
    use crate::models::alert::{AlertCriteria, JobAlert};
    use crate::models::job::{EmploymentType, JobPosting};
    use crate::models::user::Subscriber;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FixedJobs(Vec<JobPosting>);

    #[async_trait]
    impl JobSource for FixedJobs {
        async fn list_active(&self) -> Result<Vec<JobPosting>, AppError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenJobs;

    #[async_trait]
    impl JobSource for BrokenJobs {
        async fn list_active(&self) -> Result<Vec<JobPosting>, AppError> {
            Err(AppError::Internal(anyhow::anyhow!("jobs table unavailable")))
        }
    }

    fn job(title: &str) -> JobPosting {
        JobPosting {
            id: Uuid::new_v4(),
            slug: title.to_lowercase().replace(' ', "-"),
            title: title.to_string(),
            company_name: "Acme".to_string(),
            description: String::new(),
            location: "Makati".to_string(),
            employment_type: EmploymentType::FullTime,
            education_level: None,
            experience_years: 0,
            is_remote: false,
            category_id: None,
            salary_min: None,
            salary_max: None,
            deadline: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn alert(keyword: &str, frequency: Frequency) -> JobAlert {
        JobAlert {
            id: Uuid::new_v4(),
            name: keyword.to_string(),
            subscriber: Subscriber {
                id: Uuid::new_v4(),
                email: format!("{keyword}@example.com"),
                username: keyword.to_string(),
                first_name: Some("Ana".to_string()),
            },
            criteria: AlertCriteria {
                keyword: Some(keyword.to_string()),
                ..Default::default()
            },
            frequency,
            email_notifications: true,
            is_active: true,
            last_sent: None,
            created_at: Utc::now(),
        }
    }

    fn scheduler(
        store: Arc<InMemoryAlertStore>,
        jobs: Arc<dyn JobSource>,
        mailer: Arc<RecordingMailer>,
    ) -> DigestScheduler {
        let dispatcher = NotificationDispatcher::new(
            mailer,
            store.clone(),
            DispatcherSettings {
                from_email: "noreply@jobboard.local".to_string(),
                site: SiteInfo {
                    name: "JobBoard".to_string(),
                    url: "http://localhost:8000".to_string(),
                },
                send_timeout: Duration::from_secs(5),
                instant_debounce: chrono::Duration::seconds(300),
            },
        );
        DigestScheduler::new(Arc::new(dispatcher), store, jobs, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_sweep_once_sends_only_digest_alerts() {
        let store = Arc::new(InMemoryAlertStore::with_alerts(&[
            alert("engineer", Frequency::Daily),
            alert("engineer", Frequency::Instant),
            alert("accountant", Frequency::Weekly),
        ]));
        let mailer = Arc::new(RecordingMailer::default());
        let jobs = Arc::new(FixedJobs(vec![job("Civil Engineer")]));
        let s = scheduler(store, jobs, mailer.clone());

        let sent = s.sweep_once(Utc::now()).await.unwrap();

        assert_eq!(sent, 1);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_second_sweep_same_day_sends_nothing() {
        let store = Arc::new(InMemoryAlertStore::with_alerts(&[alert("engineer", Frequency::Daily)]));
        let mailer = Arc::new(RecordingMailer::default());
        let jobs = Arc::new(FixedJobs(vec![job("Civil Engineer")]));
        let s = scheduler(store, jobs, mailer.clone());
        let now = Utc::now();

        assert_eq!(s.sweep_once(now).await.unwrap(), 1);
        assert_eq!(s.sweep_once(now + chrono::Duration::hours(3)).await.unwrap(), 0);
        assert_eq!(s.sweep_once(now + chrono::Duration::hours(25)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_job_source_failure_is_reported() {
        let store = Arc::new(InMemoryAlertStore::with_alerts(&[alert("engineer", Frequency::Daily)]));
        let mailer = Arc::new(RecordingMailer::default());
        let s = scheduler(store, Arc::new(BrokenJobs), mailer.clone());

        assert!(s.sweep_once(Utc::now()).await.is_err());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_signal() {
        let store = Arc::new(InMemoryAlertStore::with_alerts(&[alert("engineer", Frequency::Daily)]));
        let mailer = Arc::new(RecordingMailer::default());
        let jobs = Arc::new(FixedJobs(vec![job("Civil Engineer")]));
        let s = Arc::new(scheduler(store, jobs, mailer.clone()));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(s.run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(mailer.sent().len(), 1);
    }
}
