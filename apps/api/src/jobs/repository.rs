use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{EventPublisher, JobEvent};
use crate::models::job::{
    experience_column, validate_experience, EducationLevel, EmploymentType, JobPosting, JobRow,
};

/// Read access to the active posting set, used by the digest sweep.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn list_active(&self) -> Result<Vec<JobPosting>, AppError>;
}

/// Fields an employer submits when creating a posting.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJobPosting {
    pub title: String,
    pub company_name: String,
    pub description: String,
    pub location: String,
    pub employment_type: EmploymentType,
    #[serde(default)]
    pub education_level: Option<EducationLevel>,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub category_id: Option<i32>,
    #[serde(default)]
    pub salary_min: Option<Decimal>,
    #[serde(default)]
    pub salary_max: Option<Decimal>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewJobPosting {
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("title", &self.title),
            ("company_name", &self.company_name),
            ("location", &self.location),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} cannot be empty")));
            }
        }
        if self.title.chars().count() > 200 {
            return Err(AppError::Validation(
                "title must be at most 200 characters".to_string(),
            ));
        }
        validate_experience("experience_years", self.experience_years)?;
        for (field, value) in [("salary_min", self.salary_min), ("salary_max", self.salary_max)] {
            if value.is_some_and(|v| v.is_sign_negative() && !v.is_zero()) {
                return Err(AppError::Validation(format!("{field} cannot be negative")));
            }
        }
        if let (Some(min), Some(max)) = (self.salary_min, self.salary_max) {
            if min > max {
                return Err(AppError::Validation(
                    "salary_min cannot exceed salary_max".to_string(),
                ));
            }
        }
        Ok(())
    }
}

const JOB_SELECT: &str = r#"
    SELECT id, slug, title, company_name, description, location, employment_type,
           education_level, experience_years, is_remote, category_id,
           salary_min, salary_max, deadline, is_active, created_at
    FROM jobs
"#;

/// Postgres-backed job postings. Emits [`JobEvent::Published`] whenever a
/// posting becomes active.
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
    events: EventPublisher,
}

impl JobRepository {
    pub fn new(pool: PgPool, events: EventPublisher) -> Self {
        Self { pool, events }
    }

    pub async fn create(&self, new: &NewJobPosting) -> Result<JobPosting, AppError> {
        let experience_years = experience_column(new.experience_years)?;
        let slug = self
            .unique_slug(&slugify(&format!("{}-{}", new.title, new.company_name)))
            .await?;

        let row: JobRow = sqlx::query_as(
            r#"
            INSERT INTO jobs
                (id, slug, title, company_name, description, location, employment_type,
                 education_level, experience_years, is_remote, category_id,
                 salary_min, salary_max, deadline, is_active, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    CASE WHEN $15 THEN NOW() END)
            RETURNING id, slug, title, company_name, description, location, employment_type,
                      education_level, experience_years, is_remote, category_id,
                      salary_min, salary_max, deadline, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&slug)
        .bind(new.title.trim())
        .bind(new.company_name.trim())
        .bind(&new.description)
        .bind(new.location.trim())
        .bind(new.employment_type.as_str())
        .bind(new.education_level.map(|e| e.as_str()))
        .bind(experience_years)
        .bind(new.is_remote)
        .bind(new.category_id)
        .bind(new.salary_min)
        .bind(new.salary_max)
        .bind(new.deadline)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::Conflict(format!("slug '{slug}' was taken concurrently, retry"));
                }
            }
            AppError::Database(e)
        })?;

        let job = JobPosting::try_from(row).map_err(|e| AppError::Internal(e.into()))?;
        info!(job_id = %job.id, slug = %job.slug, active = job.is_active, "job posting created");

        announce_activation(&self.events, false, &job);
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<JobPosting, AppError> {
        let row: Option<JobRow> = sqlx::query_as(&format!("{JOB_SELECT} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
        JobPosting::try_from(row).map_err(|e| AppError::Internal(e.into()))
    }

    /// Activates or deactivates a posting. Activation of an inactive posting
    /// emits a publish event; repeated activation does not.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<JobPosting, AppError> {
        let previous: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE jobs AS j
            SET is_active = $2,
                published_at = COALESCE(j.published_at, CASE WHEN $2 THEN NOW() END),
                updated_at = NOW()
            FROM (SELECT id, is_active FROM jobs WHERE id = $1 FOR UPDATE) AS old
            WHERE j.id = old.id
            RETURNING old.is_active
            "#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        let previous = previous.ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
        let job = self.get(id).await?;

        announce_activation(&self.events, previous, &job);
        Ok(job)
    }

    async fn unique_slug(&self, base: &str) -> Result<String, AppError> {
        let taken: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM jobs WHERE slug = $1 OR slug LIKE $1 || '-%'")
                .bind(base)
                .fetch_all(&self.pool)
                .await?;
        Ok(next_free_slug(base, &taken))
    }
}

#[async_trait]
impl JobSource for JobRepository {
    async fn list_active(&self) -> Result<Vec<JobPosting>, AppError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "{JOB_SELECT} WHERE is_active ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                JobPosting::try_from(row)
                    .map_err(|e| warn!(job_id = %id, "skipping unreadable job row: {e}"))
                    .ok()
            })
            .collect())
    }
}

/// A posting is published when it is saved active and was not active before.
fn publishes_on(was_active: bool, is_active: bool) -> bool {
    is_active && !was_active
}

/// Emits [`JobEvent::Published`] for `job` if this save published it.
/// Returns whether an event was emitted.
fn announce_activation(events: &EventPublisher, was_active: bool, job: &JobPosting) -> bool {
    if !publishes_on(was_active, job.is_active) {
        return false;
    }
    info!(job_id = %job.id, "job posting published");
    events.publish(JobEvent::Published(job.clone()));
    true
}

/// Lowercase ASCII slug: runs of anything but letters and digits become `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "job".to_string()
    } else {
        slug.chars().take(180).collect::<String>().trim_end_matches('-').to_string()
    }
}

/// `base`, or `base-N` with the smallest N ≥ 1 not already taken.
fn next_free_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{base}-{}", Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> NewJobPosting {
        NewJobPosting {
            title: "Rust Engineer".to_string(),
            company_name: "Acme".to_string(),
            description: "Build things".to_string(),
            location: "Manila".to_string(),
            employment_type: EmploymentType::FullTime,
            education_level: None,
            experience_years: 0,
            is_remote: false,
            category_id: None,
            salary_min: None,
            salary_max: None,
            deadline: None,
            is_active: true,
        }
    }

    fn posting(is_active: bool) -> JobPosting {
        JobPosting {
            id: Uuid::new_v4(),
            slug: "rust-engineer-acme".to_string(),
            title: "Rust Engineer".to_string(),
            company_name: "Acme".to_string(),
            description: "Build things".to_string(),
            location: "Manila".to_string(),
            employment_type: EmploymentType::FullTime,
            education_level: None,
            experience_years: 0,
            is_remote: false,
            category_id: None,
            salary_min: None,
            salary_max: None,
            deadline: None,
            is_active,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_publishes_only_on_inactive_to_active() {
        assert!(publishes_on(false, true));
        assert!(!publishes_on(true, true));
        assert!(!publishes_on(true, false));
        assert!(!publishes_on(false, false));
    }

    #[tokio::test]
    async fn test_activation_emits_published_event() {
        let (events, mut rx) = EventPublisher::channel(4);
        let job = posting(true);

        assert!(announce_activation(&events, false, &job));

        match rx.try_recv() {
            Ok(JobEvent::Published(published)) => assert_eq!(published.id, job.id),
            other => panic!("expected a published event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reactivation_does_not_emit_again() {
        let (events, mut rx) = EventPublisher::channel(4);

        assert!(!announce_activation(&events, true, &posting(true)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inactive_create_and_deactivation_do_not_emit() {
        let (events, mut rx) = EventPublisher::channel(4);

        // create with is_active: false
        assert!(!announce_activation(&events, false, &posting(false)));
        // active -> inactive
        assert!(!announce_activation(&events, true, &posting(false)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Senior Rust Engineer-Acme Corp."), "senior-rust-engineer-acme-corp");
        assert_eq!(slugify("  C++ / Qt Developer  "), "c-qt-developer");
        assert_eq!(slugify("!!!"), "job");
    }

    #[test]
    fn test_next_free_slug_appends_counter() {
        let taken = vec!["dev-acme".to_string(), "dev-acme-1".to_string()];
        assert_eq!(next_free_slug("dev-acme", &taken), "dev-acme-2");
        assert_eq!(next_free_slug("ops-acme", &taken), "ops-acme");
    }

    #[test]
    fn test_validate_accepts_valid_posting() {
        assert!(new_job().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let mut job = new_job();
        job.title = "   ".to_string();
        assert!(matches!(job.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_salary() {
        let mut job = new_job();
        job.salary_min = Some(Decimal::from(90000));
        job.salary_max = Some(Decimal::from(50000));
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_experience() {
        let mut job = new_job();
        job.experience_years = 3_000_000_000;
        assert!(matches!(job.validate(), Err(AppError::Validation(_))));

        job.experience_years = 11;
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_new_posting_defaults_to_active() {
        let json = serde_json::json!({
            "title": "Nurse",
            "company_name": "St. Luke's",
            "description": "Ward duty",
            "location": "Taguig",
            "employment_type": "PART_TIME"
        });
        let job: NewJobPosting = serde_json::from_value(json).unwrap();
        assert!(job.is_active);
        assert_eq!(job.experience_years, 0);
        assert_eq!(job.employment_type, EmploymentType::PartTime);
    }
}
