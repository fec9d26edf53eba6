use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::alert::{AlertCriteria, AlertRow, Frequency, JobAlert};
use crate::models::job::{experience_column, validate_experience};

/// Alert persistence as seen by the dispatcher and its triggers.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Active alerts with email enabled whose frequency is one of `frequencies`.
    async fn list_deliverable(&self, frequencies: &[Frequency]) -> Result<Vec<JobAlert>, AppError>;

    /// Currently stored `last_sent` for an alert.
    async fn last_sent(&self, alert_id: Uuid) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Sets `last_sent = sent_at` only if the stored value still equals
    /// `expected` and `sent_at` is not earlier than it. Returns whether the
    /// write happened.
    async fn record_sent(
        &self,
        alert_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

const ALERT_SELECT: &str = r#"
    SELECT a.id, a.name, a.subscriber_id,
           u.email AS subscriber_email,
           u.username AS subscriber_username,
           u.first_name AS subscriber_first_name,
           a.keyword, a.location, a.employment_type, a.education_level,
           a.experience_years, a.is_remote, a.category_id,
           a.min_salary, a.max_salary, a.frequency,
           a.email_notifications, a.is_active, a.last_sent, a.created_at
    FROM job_alerts a
    JOIN users u ON u.id = a.subscriber_id
"#;

/// Fields accepted when a subscriber saves a new alert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAlert {
    pub subscriber_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub criteria: AlertCriteria,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Delivery settings a subscriber may change after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertSettingsUpdate {
    pub frequency: Option<Frequency>,
    pub email_notifications: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct PgAlertStore {
    pool: PgPool,
}

impl PgAlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a validated alert. `name` must already be resolved.
    pub async fn create(&self, alert: &NewAlert, name: &str) -> Result<JobAlert, AppError> {
        let c = &alert.criteria;
        let experience_years = c.experience_years.map(experience_column).transpose()?;
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO job_alerts
                (id, subscriber_id, name, keyword, location, employment_type,
                 education_level, experience_years, is_remote, category_id,
                 min_salary, max_salary, frequency, email_notifications, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(alert.subscriber_id)
        .bind(name)
        .bind(c.keyword.as_deref().map(str::trim))
        .bind(c.location.as_deref().map(str::trim))
        .bind(c.employment_type.map(|t| t.as_str()))
        .bind(c.education_level.map(|e| e.as_str()))
        .bind(experience_years)
        .bind(c.is_remote)
        .bind(c.category_id)
        .bind(c.min_salary)
        .bind(c.max_salary)
        .bind(alert.frequency.as_str())
        .bind(alert.email_notifications)
        .bind(alert.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_foreign_key_violation() {
                    return AppError::Validation(format!(
                        "subscriber {} does not exist",
                        alert.subscriber_id
                    ));
                }
            }
            AppError::Database(e)
        })?;

        info!(alert_id = %id, subscriber_id = %alert.subscriber_id, frequency = %alert.frequency, "alert created");
        self.get(id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<JobAlert, AppError> {
        let row: Option<AlertRow> = sqlx::query_as(&format!("{ALERT_SELECT} WHERE a.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobAlert::from)
            .ok_or_else(|| AppError::NotFound(format!("Alert {id} not found")))
    }

    pub async fn list_for_subscriber(&self, subscriber_id: Uuid) -> Result<Vec<JobAlert>, AppError> {
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "{ALERT_SELECT} WHERE a.subscriber_id = $1 ORDER BY a.created_at DESC"
        ))
        .bind(subscriber_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(JobAlert::from).collect())
    }

    pub async fn update_settings(
        &self,
        id: Uuid,
        update: &AlertSettingsUpdate,
    ) -> Result<JobAlert, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE job_alerts
            SET frequency = COALESCE($2, frequency),
                email_notifications = COALESCE($3, email_notifications),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.frequency.map(|f| f.as_str()))
        .bind(update.email_notifications)
        .bind(update.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Alert {id} not found")));
        }
        self.get(id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM job_alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Alert {id} not found")));
        }
        info!(alert_id = %id, "alert deleted");
        Ok(())
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn list_deliverable(&self, frequencies: &[Frequency]) -> Result<Vec<JobAlert>, AppError> {
        let frequencies: Vec<&str> = frequencies.iter().map(|f| f.as_str()).collect();
        let rows: Vec<AlertRow> = sqlx::query_as(&format!(
            "{ALERT_SELECT} WHERE a.is_active AND a.email_notifications AND a.frequency = ANY($1) ORDER BY a.created_at"
        ))
        .bind(&frequencies)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(JobAlert::from).collect())
    }

    async fn last_sent(&self, alert_id: Uuid) -> Result<Option<DateTime<Utc>>, AppError> {
        let row: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT last_sent FROM job_alerts WHERE id = $1")
                .bind(alert_id)
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or_else(|| AppError::NotFound(format!("Alert {alert_id} not found")))
    }

    async fn record_sent(
        &self,
        alert_id: Uuid,
        expected: Option<DateTime<Utc>>,
        sent_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE job_alerts
            SET last_sent = $3
            WHERE id = $1
              AND last_sent IS NOT DISTINCT FROM $2
              AND (last_sent IS NULL OR last_sent <= $3)
            "#,
        )
        .bind(alert_id)
        .bind(expected)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Checks the numeric ranges of alert criteria.
pub fn validate_criteria(criteria: &AlertCriteria) -> Result<(), AppError> {
    let non_negative = |value: Option<Decimal>, field: &str| match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => Err(AppError::Validation(format!(
            "{field} cannot be negative"
        ))),
        _ => Ok(()),
    };
    non_negative(criteria.min_salary, "min_salary")?;
    non_negative(criteria.max_salary, "max_salary")?;
    if let Some(years) = criteria.experience_years {
        validate_experience("experience_years", years)?;
    }

    if let (Some(min), Some(max)) = (criteria.min_salary, criteria.max_salary) {
        if !min.is_zero() && !max.is_zero() && min > max {
            return Err(AppError::Validation(
                "min_salary cannot exceed max_salary".to_string(),
            ));
        }
    }

    for (field, value, limit) in [
        ("keyword", &criteria.keyword, 100),
        ("location", &criteria.location, 100),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().chars().count() > limit) {
            return Err(AppError::Validation(format!(
                "{field} must be at most {limit} characters"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub mod memory {
    //! In-memory alert store for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct InMemoryAlertStore {
        alerts: Mutex<HashMap<Uuid, JobAlert>>,
    }

    impl InMemoryAlertStore {
        pub fn with_alerts(alerts: &[JobAlert]) -> Self {
            let store = Self::default();
            {
                let mut map = store.alerts.lock().unwrap();
                for alert in alerts {
                    map.insert(alert.id, alert.clone());
                }
            }
            store
        }

        pub fn stored_last_sent(&self, id: Uuid) -> Option<DateTime<Utc>> {
            self.alerts.lock().unwrap().get(&id).and_then(|a| a.last_sent)
        }

        pub fn set_last_sent(&self, id: Uuid, at: Option<DateTime<Utc>>) {
            if let Some(alert) = self.alerts.lock().unwrap().get_mut(&id) {
                alert.last_sent = at;
            }
        }
    }

    #[async_trait]
    impl AlertStore for InMemoryAlertStore {
        async fn list_deliverable(
            &self,
            frequencies: &[Frequency],
        ) -> Result<Vec<JobAlert>, AppError> {
            let mut alerts: Vec<JobAlert> = self
                .alerts
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.is_deliverable() && frequencies.contains(&a.frequency))
                .cloned()
                .collect();
            alerts.sort_by_key(|a| a.created_at);
            Ok(alerts)
        }

        async fn last_sent(&self, alert_id: Uuid) -> Result<Option<DateTime<Utc>>, AppError> {
            self.alerts
                .lock()
                .unwrap()
                .get(&alert_id)
                .map(|a| a.last_sent)
                .ok_or_else(|| AppError::NotFound(format!("Alert {alert_id} not found")))
        }

        async fn record_sent(
            &self,
            alert_id: Uuid,
            expected: Option<DateTime<Utc>>,
            sent_at: DateTime<Utc>,
        ) -> Result<bool, AppError> {
            let mut alerts = self.alerts.lock().unwrap();
            let alert = alerts
                .get_mut(&alert_id)
                .ok_or_else(|| AppError::NotFound(format!("Alert {alert_id} not found")))?;
            let current = alert.last_sent;
            if current != expected || current.is_some_and(|c| c > sent_at) {
                return Ok(false);
            }
            alert.last_sent = Some(sent_at);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryAlertStore;
    use super::*;
    use crate::models::user::Subscriber;
    use chrono::Duration;

    fn alert(frequency: Frequency) -> JobAlert {
        JobAlert {
            id: Uuid::new_v4(),
            name: "alert".to_string(),
            subscriber: Subscriber {
                id: Uuid::new_v4(),
                email: "s@example.com".to_string(),
                username: "s".to_string(),
                first_name: None,
            },
            criteria: AlertCriteria::default(),
            frequency,
            email_notifications: true,
            is_active: true,
            last_sent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_experience_ceiling() {
        let mut criteria = AlertCriteria {
            experience_years: Some(3_000_000_000),
            ..Default::default()
        };
        assert!(matches!(
            validate_criteria(&criteria),
            Err(AppError::Validation(_))
        ));

        criteria.experience_years = Some(11);
        assert!(validate_criteria(&criteria).is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_salary_range() {
        let criteria = AlertCriteria {
            min_salary: Some(Decimal::from(80000)),
            max_salary: Some(Decimal::from(30000)),
            ..Default::default()
        };
        assert!(matches!(
            validate_criteria(&criteria),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_negative_salary() {
        let criteria = AlertCriteria {
            min_salary: Some(Decimal::from(-1)),
            ..Default::default()
        };
        assert!(validate_criteria(&criteria).is_err());
    }

    #[test]
    fn test_validate_rejects_long_keyword() {
        let criteria = AlertCriteria {
            keyword: Some("x".repeat(101)),
            ..Default::default()
        };
        assert!(validate_criteria(&criteria).is_err());
    }

    #[test]
    fn test_validate_accepts_typical_alert() {
        let criteria = AlertCriteria {
            keyword: Some("python developer".to_string()),
            min_salary: Some(Decimal::from(30000)),
            max_salary: Some(Decimal::from(80000)),
            ..Default::default()
        };
        assert!(validate_criteria(&criteria).is_ok());
    }

    #[test]
    fn test_new_alert_deserializes_flat_criteria_with_defaults() {
        let json = serde_json::json!({
            "subscriber_id": Uuid::new_v4(),
            "keyword": "nurse",
            "education_level": "BACHELOR",
            "min_salary": 30000
        });
        let alert: NewAlert = serde_json::from_value(json).unwrap();
        assert_eq!(alert.criteria.keyword.as_deref(), Some("nurse"));
        assert_eq!(alert.criteria.min_salary, Some(Decimal::from(30000)));
        assert_eq!(alert.frequency, Frequency::Daily);
        assert!(alert.email_notifications);
        assert!(alert.is_active);
    }

    #[tokio::test]
    async fn test_memory_store_compare_and_set() {
        let a = alert(Frequency::Instant);
        let store = InMemoryAlertStore::with_alerts(&[a.clone()]);
        let t0 = Utc::now();

        assert!(store.record_sent(a.id, None, t0).await.unwrap());
        // Stale expectation loses.
        assert!(!store.record_sent(a.id, None, t0 + Duration::seconds(1)).await.unwrap());
        // Never moves backwards.
        assert!(!store
            .record_sent(a.id, Some(t0), t0 - Duration::seconds(5))
            .await
            .unwrap());
        assert_eq!(store.last_sent(a.id).await.unwrap(), Some(t0));
    }

    #[tokio::test]
    async fn test_memory_store_lists_deliverable_by_frequency() {
        let daily = alert(Frequency::Daily);
        let instant = alert(Frequency::Instant);
        let mut muted = alert(Frequency::Daily);
        muted.email_notifications = false;
        let store = InMemoryAlertStore::with_alerts(&[daily.clone(), instant, muted]);

        let found = store
            .list_deliverable(&[Frequency::Daily, Frequency::Weekly])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, daily.id);
    }
}
