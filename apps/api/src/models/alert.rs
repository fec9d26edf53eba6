use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::job::{EducationLevel, EmploymentType};
use crate::models::user::Subscriber;
use crate::models::UnknownVariant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Instant,
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Instant => "INSTANT",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Instant => "Instant",
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
        }
    }

    /// Daily and weekly alerts are batched into digests by the scheduled sweep.
    pub fn is_digest(&self) -> bool {
        matches!(self, Frequency::Daily | Frequency::Weekly)
    }
}

impl FromStr for Frequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "INSTANT" => Ok(Frequency::Instant),
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            other => Err(UnknownVariant::new("frequency", other)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search constraints of a saved alert. Every `None` means "don't care".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertCriteria {
    /// Case-insensitive substring of the job title.
    pub keyword: Option<String>,
    /// Case-insensitive substring of the job location.
    pub location: Option<String>,
    pub employment_type: Option<EmploymentType>,
    /// Minimum education the posting must ask for.
    pub education_level: Option<EducationLevel>,
    /// Most years of experience the subscriber is willing to be asked for.
    pub experience_years: Option<u32>,
    pub is_remote: Option<bool>,
    pub category_id: Option<i32>,
    pub min_salary: Option<Decimal>,
    pub max_salary: Option<Decimal>,
}

/// A subscriber's saved alert with its delivery settings and bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAlert {
    pub id: Uuid,
    pub name: String,
    pub subscriber: Subscriber,
    pub criteria: AlertCriteria,
    pub frequency: Frequency,
    pub email_notifications: bool,
    pub is_active: bool,
    pub last_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobAlert {
    /// Whether the alert may receive email at all, regardless of timing.
    pub fn is_deliverable(&self) -> bool {
        self.email_notifications && self.is_active
    }

    /// Moves `last_sent` forward to `at`. Never moves it backwards.
    pub fn advance_last_sent(&mut self, at: DateTime<Utc>) {
        match self.last_sent {
            Some(current) if current >= at => {}
            _ => self.last_sent = Some(at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub name: String,
    pub subscriber_id: Uuid,
    pub subscriber_email: String,
    pub subscriber_username: String,
    pub subscriber_first_name: Option<String>,
    pub keyword: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub education_level: Option<String>,
    pub experience_years: Option<i32>,
    pub is_remote: Option<bool>,
    pub category_id: Option<i32>,
    pub min_salary: Option<Decimal>,
    pub max_salary: Option<Decimal>,
    pub frequency: String,
    pub email_notifications: bool,
    pub is_active: bool,
    pub last_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Malformed criteria fields are dropped to "unset" so a bad value widens
/// the alert instead of silencing it.
impl From<AlertRow> for JobAlert {
    fn from(row: AlertRow) -> Self {
        let id = row.id;

        let employment_type = parse_optional::<EmploymentType>(id, row.employment_type.as_deref());
        let education_level = parse_optional::<EducationLevel>(id, row.education_level.as_deref());
        let experience_years = match row.experience_years {
            Some(years) if years < 0 => {
                tracing::warn!(alert_id = %id, years, "negative experience ceiling; ignoring");
                None
            }
            other => other.and_then(|years| u32::try_from(years).ok()),
        };
        let frequency = row.frequency.parse().unwrap_or_else(|e| {
            tracing::warn!(alert_id = %id, "{e}; falling back to DAILY");
            Frequency::Daily
        });

        JobAlert {
            id,
            name: row.name,
            subscriber: Subscriber {
                id: row.subscriber_id,
                email: row.subscriber_email,
                username: row.subscriber_username,
                first_name: row.subscriber_first_name,
            },
            criteria: AlertCriteria {
                keyword: non_blank(row.keyword),
                location: non_blank(row.location),
                employment_type,
                education_level,
                experience_years,
                is_remote: row.is_remote,
                category_id: row.category_id,
                min_salary: row.min_salary,
                max_salary: row.max_salary,
            },
            frequency,
            email_notifications: row.email_notifications,
            is_active: row.is_active,
            last_sent: row.last_sent,
            created_at: row.created_at,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_optional<T>(alert_id: Uuid, raw: Option<&str>) -> Option<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(alert_id = %alert_id, "{e}; treating constraint as unset");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row() -> AlertRow {
        AlertRow {
            id: Uuid::new_v4(),
            name: "rust in Manila".to_string(),
            subscriber_id: Uuid::new_v4(),
            subscriber_email: "seeker@example.com".to_string(),
            subscriber_username: "seeker".to_string(),
            subscriber_first_name: None,
            keyword: Some("rust".to_string()),
            location: Some("Manila".to_string()),
            employment_type: Some("FULL_TIME".to_string()),
            education_level: Some("BACHELOR".to_string()),
            experience_years: Some(3),
            is_remote: None,
            category_id: None,
            min_salary: None,
            max_salary: None,
            frequency: "WEEKLY".to_string(),
            email_notifications: true,
            is_active: true,
            last_sent: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_converts_all_fields() {
        let alert = JobAlert::from(row());
        assert_eq!(alert.frequency, Frequency::Weekly);
        assert_eq!(alert.criteria.keyword.as_deref(), Some("rust"));
        assert_eq!(alert.criteria.employment_type, Some(EmploymentType::FullTime));
        assert_eq!(alert.criteria.education_level, Some(EducationLevel::Bachelor));
        assert_eq!(alert.criteria.experience_years, Some(3));
        assert!(alert.is_deliverable());
    }

    #[test]
    fn test_malformed_fields_become_unset() {
        let mut r = row();
        r.employment_type = Some("SEASONAL".to_string());
        r.education_level = Some("".to_string());
        r.experience_years = Some(-1);
        r.keyword = Some("   ".to_string());
        let alert = JobAlert::from(r);
        assert_eq!(alert.criteria.employment_type, None);
        assert_eq!(alert.criteria.education_level, None);
        assert_eq!(alert.criteria.experience_years, None);
        assert_eq!(alert.criteria.keyword, None);
        assert_eq!(alert.criteria.location.as_deref(), Some("Manila"));
    }

    #[test]
    fn test_unknown_frequency_falls_back_to_daily() {
        let mut r = row();
        r.frequency = "HOURLY".to_string();
        assert_eq!(JobAlert::from(r).frequency, Frequency::Daily);
    }

    #[test]
    fn test_advance_last_sent_is_monotonic() {
        let mut alert = JobAlert::from(row());
        let t0 = Utc::now();
        alert.advance_last_sent(t0);
        alert.advance_last_sent(t0 - Duration::minutes(10));
        assert_eq!(alert.last_sent, Some(t0));
        alert.advance_last_sent(t0 + Duration::minutes(1));
        assert_eq!(alert.last_sent, Some(t0 + Duration::minutes(1)));
    }

    #[test]
    fn test_deliverable_requires_both_flags() {
        let mut alert = JobAlert::from(row());
        alert.email_notifications = false;
        assert!(!alert.is_deliverable());
        alert.email_notifications = true;
        alert.is_active = false;
        assert!(!alert.is_deliverable());
    }

    #[test]
    fn test_frequency_digest_classification() {
        assert!(!Frequency::Instant.is_digest());
        assert!(Frequency::Daily.is_digest());
        assert!(Frequency::Weekly.is_digest());
        assert_eq!(Frequency::default(), Frequency::Daily);
    }
}
