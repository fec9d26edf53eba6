//! Notification Dispatcher — decides which alerts fire, sends their email and
//! records `last_sent`.
//!
//! This is the single place where alert outcomes are logged. One alert's
//! failure never stops the others; failed sends leave `last_sent` untouched so
//! the next trigger retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::emails::{digest_email, single_job_email, RenderedEmail, SiteInfo};
use crate::alerts::matcher::{first_mismatch, matching_jobs};
use crate::alerts::schedule::{debounce_elapsed, should_send};
use crate::alerts::store::AlertStore;
use crate::config::Config;
use crate::errors::AppError;
use crate::mail::{MailError, MailTransport, OutgoingMail};
use crate::models::alert::{Frequency, JobAlert};
use crate::models::job::JobPosting;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub from_email: String,
    pub site: SiteInfo,
    pub send_timeout: Duration,
    pub instant_debounce: chrono::Duration,
}

impl DispatcherSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            from_email: format!("{} <{}>", config.site_name, config.mail.from_email),
            site: SiteInfo {
                name: config.site_name.clone(),
                url: config.site_url.clone(),
            },
            send_timeout: Duration::from_secs(config.mail_send_timeout_secs),
            instant_debounce: chrono::Duration::seconds(i64::from(config.instant_debounce_secs)),
        }
    }
}

pub struct NotificationDispatcher {
    mailer: Arc<dyn MailTransport>,
    store: Arc<dyn AlertStore>,
    settings: DispatcherSettings,
    /// Serializes dispatch per alert so concurrent runs cannot both pass the
    /// timing gate for the same alert.
    alert_locks: AlertLocks,
}

type AlertLocks = Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one alert's dispatch lock. On drop the map entry is removed unless
/// another run is already waiting on it.
struct AlertGuard<'a> {
    locks: &'a AlertLocks,
    alert_id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for AlertGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one here.
        let unused = locks
            .get(&self.alert_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2);
        if unused {
            locks.remove(&self.alert_id);
        }
    }
}

impl NotificationDispatcher {
    pub fn new(
        mailer: Arc<dyn MailTransport>,
        store: Arc<dyn AlertStore>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            mailer,
            store,
            settings,
            alert_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Instant path: emails every matching INSTANT alert that was not notified
    /// within the debounce window. Returns the number of emails sent.
    pub async fn on_job_published(&self, job: &JobPosting, alerts: &mut [JobAlert]) -> usize {
        self.on_job_published_at(job, alerts, Utc::now()).await
    }

    pub async fn on_job_published_at(
        &self,
        job: &JobPosting,
        alerts: &mut [JobAlert],
        now: DateTime<Utc>,
    ) -> usize {
        if !job.is_active {
            debug!(job_id = %job.id, "job is not active; no instant alerts");
            return 0;
        }

        let mut sent = 0;
        let mut matched = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.frequency == Frequency::Instant && a.is_deliverable())
        {
            if let Some(reason) = first_mismatch(&alert.criteria, job) {
                debug!(alert_id = %alert.id, job_id = %job.id, %reason, "job does not match alert");
                continue;
            }
            matched += 1;

            let _guard = self.lock_alert(alert.id).await;

            let Some(last_sent) = self.refresh_last_sent(alert).await else {
                continue;
            };
            if !debounce_elapsed(last_sent, now, self.settings.instant_debounce) {
                info!(alert_id = %alert.id, job_id = %job.id, "alert notified recently; skipping");
                continue;
            }

            let email = single_job_email(alert, job, &self.settings.site);
            if self.deliver(alert, email, last_sent, now).await {
                sent += 1;
            }
        }

        info!(job_id = %job.id, matched, sent, "instant alerts dispatched");
        sent
    }

    /// Digest path: for each due DAILY/WEEKLY alert with at least one matching
    /// active job, sends a digest. Returns the number of digests sent.
    pub async fn run_scheduled_sweep(
        &self,
        now: DateTime<Utc>,
        alerts: &mut [JobAlert],
        active_jobs: &[JobPosting],
    ) -> usize {
        let mut sent = 0;
        let mut due = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.frequency.is_digest() && a.is_deliverable())
        {
            let _guard = self.lock_alert(alert.id).await;

            let Some(last_sent) = self.refresh_last_sent(alert).await else {
                continue;
            };
            if !should_send(alert, now) {
                debug!(alert_id = %alert.id, frequency = %alert.frequency, "digest not due");
                continue;
            }
            due += 1;

            let jobs = matching_jobs(&alert.criteria, active_jobs);
            if jobs.is_empty() {
                debug!(alert_id = %alert.id, "no matching jobs; digest deferred");
                continue;
            }

            let email = digest_email(alert, &jobs, &self.settings.site);
            if self.deliver(alert, email, last_sent, now).await {
                info!(alert_id = %alert.id, jobs = jobs.len(), "digest sent");
                sent += 1;
            }
        }

        info!(due, sent, "scheduled sweep finished");
        sent
    }

    async fn lock_alert(&self, alert_id: Uuid) -> AlertGuard<'_> {
        let lock = {
            let mut locks = self
                .alert_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(alert_id).or_default())
        };
        let guard = Arc::clone(&lock).lock_owned().await;
        AlertGuard {
            locks: &self.alert_locks,
            alert_id,
            lock,
            guard: Some(guard),
        }
    }

    /// Folds the stored `last_sent` into the in-memory alert so decisions see
    /// sends made by other runs. `None` means the alert should be skipped.
    async fn refresh_last_sent(&self, alert: &mut JobAlert) -> Option<Option<DateTime<Utc>>> {
        match self.store.last_sent(alert.id).await {
            Ok(stored) => {
                if let Some(at) = stored {
                    alert.advance_last_sent(at);
                }
                Some(alert.last_sent)
            }
            Err(AppError::NotFound(_)) => {
                debug!(alert_id = %alert.id, "alert no longer exists; skipping");
                None
            }
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "could not read last_sent; skipping alert");
                None
            }
        }
    }

    /// Sends one email and, on success, records the send. Returns whether the
    /// email went out.
    async fn deliver(
        &self,
        alert: &mut JobAlert,
        email: RenderedEmail,
        expected: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        let mail = OutgoingMail {
            subject: email.subject,
            body: email.body,
            from: self.settings.from_email.clone(),
            to: alert.subscriber.email.clone(),
        };

        let outcome = tokio::time::timeout(self.settings.send_timeout, self.mailer.send(&mail))
            .await
            .unwrap_or(Err(MailError::Timeout(self.settings.send_timeout)));

        if let Err(e) = outcome {
            warn!(
                alert_id = %alert.id,
                to = %mail.to,
                error = %e,
                "alert email failed; will retry on next trigger"
            );
            return false;
        }

        match self.store.record_sent(alert.id, expected, now).await {
            Ok(true) => {}
            Ok(false) => warn!(
                alert_id = %alert.id,
                "last_sent changed concurrently; stored value kept"
            ),
            Err(e) => error!(alert_id = %alert.id, error = %e, "failed to record last_sent"),
        }
        alert.advance_last_sent(now);

        info!(alert_id = %alert.id, to = %mail.to, subject = %mail.subject, "alert email sent");
        true
    }
}
