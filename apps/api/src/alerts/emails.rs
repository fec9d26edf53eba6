//! Plain-text bodies for alert emails.

use std::fmt::Write;

use crate::models::alert::JobAlert;
use crate::models::job::JobPosting;

const DESCRIPTION_PREVIEW_CHARS: usize = 300;
/// Number of postings listed in a digest before the "view all" link.
pub const DIGEST_LISTED_JOBS: usize = 5;

/// Site identity used for links and sign-offs.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub name: String,
    /// Absolute base URL without a trailing slash.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Email for one new posting that matched an instant alert.
pub fn single_job_email(alert: &JobAlert, job: &JobPosting, site: &SiteInfo) -> RenderedEmail {
    let subject = format!("New Job Match: {} at {}", job.title, job.company_name);

    let deadline = job
        .deadline
        .map(|d| d.format("%B %d, %Y").to_string())
        .unwrap_or_else(|| "Open until filled".to_string());

    let body = format!(
        "Hello {greeting},

We found a NEW job that matches your alert \"{alert_name}\":

JOB DETAILS
-----------
Position: {title}
Company: {company}
Location: {location}
Job Type: {job_type}
Salary: {salary}
Education Required: {education}
Experience Required: {experience}

Job Description:
{description}

APPLY NOW
---------
View full job details and apply here:
{site_url}{job_path}

Posted: {posted}
Deadline: {deadline}

---

Manage your job alerts: {site_url}/job-alerts/
Unsubscribe from this alert: {site_url}/job-alerts/{alert_id}/edit/

Best regards,
{site_name} Team
",
        greeting = alert.subscriber.greeting_name(),
        alert_name = alert.name,
        title = job.title,
        company = job.company_name,
        location = location_line(job),
        job_type = job.employment_type.label(),
        salary = job.salary_range(),
        education = job.education_label(),
        experience = job.experience_label(),
        description = description_preview(&job.description),
        site_url = site.url,
        job_path = job.path(),
        posted = job.created_at.format("%B %d, %Y"),
        deadline = deadline,
        alert_id = alert.id,
        site_name = site.name,
    );

    RenderedEmail { subject, body }
}

/// Digest for a daily or weekly alert. `jobs` must be non-empty and newest first.
pub fn digest_email(alert: &JobAlert, jobs: &[&JobPosting], site: &SiteInfo) -> RenderedEmail {
    let total = jobs.len();
    let subject = format!(
        "{} Job Alert: {} Jobs Matching '{}'",
        alert.frequency.label(),
        total,
        alert.name
    );

    let mut body = format!(
        "Hello {},\n\nHere are your {} job matches for \"{}\". We found {} jobs that match your criteria.\n\nRecent Jobs:\n",
        alert.subscriber.greeting_name(),
        alert.frequency.label().to_lowercase(),
        alert.name,
        total,
    );

    for job in jobs.iter().take(DIGEST_LISTED_JOBS) {
        // Writing to a String cannot fail.
        let _ = write!(
            body,
            "\n• {} at {}\n  Location: {}\n  Type: {}\n  Salary: {}\n  View: {}{}\n",
            job.title,
            job.company_name,
            location_line(job),
            job.employment_type.label(),
            job.salary_range(),
            site.url,
            job.path(),
        );
    }

    let _ = write!(
        body,
        "\nView all {total} matching jobs: {url}/jobs/?alert={id}\n\nManage your alerts: {url}/job-alerts/\n\nBest regards,\n{name} Team\n",
        url = site.url,
        id = alert.id,
        name = site.name,
    );

    RenderedEmail { subject, body }
}

fn location_line(job: &JobPosting) -> String {
    if job.is_remote {
        format!("{} (Remote)", job.location)
    } else {
        job.location.clone()
    }
}

/// First 300 characters on one line, with an ellipsis when cut.
fn description_preview(description: &str) -> String {
    let mut preview: String = description
        .chars()
        .take(DESCRIPTION_PREVIEW_CHARS)
        .collect::<String>()
        .replace(['\r', '\n'], " ")
        .trim()
        .to_string();
    if description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
