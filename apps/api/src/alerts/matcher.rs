//! Alert Matcher — decides whether a job posting satisfies a saved alert.
//!
//! Constraints are checked in a fixed order and evaluation stops at the first
//! one that fails. Unset constraints never fail. Missing job attributes take
//! their most restrictive value: education NONE, experience 0, and an absent
//! salary bound fails any salary constraint.
//!
//! No logging here. Callers that want to explain a miss use [`first_mismatch`].

use std::fmt;

use rust_decimal::Decimal;

use crate::models::alert::AlertCriteria;
use crate::models::job::{EducationLevel, EmploymentType, JobPosting};

/// The first constraint a posting failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Keyword {
        keyword: String,
    },
    Location {
        location: String,
    },
    EmploymentType {
        wanted: EmploymentType,
        found: EmploymentType,
    },
    Education {
        required: EducationLevel,
        offered: EducationLevel,
    },
    Experience {
        max_years: u32,
        required_years: u32,
    },
    Remote {
        wanted: bool,
    },
    Category {
        wanted: i32,
        found: Option<i32>,
    },
    SalaryBelowMinimum {
        min: Decimal,
        offered: Option<Decimal>,
    },
    SalaryAboveMaximum {
        max: Decimal,
        offered: Option<Decimal>,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Keyword { keyword } => write!(f, "keyword '{keyword}' not in title"),
            Mismatch::Location { location } => write!(f, "location '{location}' not in job location"),
            Mismatch::EmploymentType { wanted, found } => {
                write!(f, "employment type {found} is not {wanted}")
            }
            Mismatch::Education { required, offered } => {
                write!(f, "education {offered} is below {required}")
            }
            Mismatch::Experience {
                max_years,
                required_years,
            } => write!(f, "requires {required_years} years, alert allows {max_years}"),
            Mismatch::Remote { wanted } => write!(f, "remote flag is not {wanted}"),
            Mismatch::Category { wanted, found } => match found {
                Some(found) => write!(f, "category {found} is not {wanted}"),
                None => write!(f, "job has no category, alert wants {wanted}"),
            },
            Mismatch::SalaryBelowMinimum { min, offered } => match offered {
                Some(offered) => write!(f, "minimum salary {offered} is below {min}"),
                None => write!(f, "no minimum salary, alert wants at least {min}"),
            },
            Mismatch::SalaryAboveMaximum { max, offered } => match offered {
                Some(offered) => write!(f, "maximum salary {offered} is above {max}"),
                None => write!(f, "no maximum salary, alert caps at {max}"),
            },
        }
    }
}

/// True when every constraint set on `criteria` is satisfied by `job`.
pub fn matches(criteria: &AlertCriteria, job: &JobPosting) -> bool {
    first_mismatch(criteria, job).is_none()
}

/// Returns the first failing constraint, or `None` when the job matches.
pub fn first_mismatch(criteria: &AlertCriteria, job: &JobPosting) -> Option<Mismatch> {
    if let Some(keyword) = trimmed(&criteria.keyword) {
        if !contains_ignore_case(&job.title, keyword) {
            return Some(Mismatch::Keyword {
                keyword: keyword.to_string(),
            });
        }
    }

    if let Some(location) = trimmed(&criteria.location) {
        if !contains_ignore_case(&job.location, location) {
            return Some(Mismatch::Location {
                location: location.to_string(),
            });
        }
    }

    if let Some(wanted) = criteria.employment_type {
        if job.employment_type != wanted {
            return Some(Mismatch::EmploymentType {
                wanted,
                found: job.employment_type,
            });
        }
    }

    if let Some(required) = criteria.education_level {
        let offered = job.education_level.unwrap_or(EducationLevel::NoneRequired);
        if offered.rank() < required.rank() {
            return Some(Mismatch::Education { required, offered });
        }
    }

    if let Some(max_years) = criteria.experience_years {
        if job.experience_years > max_years {
            return Some(Mismatch::Experience {
                max_years,
                required_years: job.experience_years,
            });
        }
    }

    if let Some(wanted) = criteria.is_remote {
        if job.is_remote != wanted {
            return Some(Mismatch::Remote { wanted });
        }
    }

    if let Some(wanted) = criteria.category_id {
        if job.category_id != Some(wanted) {
            return Some(Mismatch::Category {
                wanted,
                found: job.category_id,
            });
        }
    }

    // A zero bound is treated as unset, like an empty form field.
    if let Some(min) = criteria.min_salary.filter(|v| !v.is_zero()) {
        if !job.salary_min.is_some_and(|offered| offered >= min) {
            return Some(Mismatch::SalaryBelowMinimum {
                min,
                offered: job.salary_min,
            });
        }
    }

    if let Some(max) = criteria.max_salary.filter(|v| !v.is_zero()) {
        if !job.salary_max.is_some_and(|offered| offered <= max) {
            return Some(Mismatch::SalaryAboveMaximum {
                max,
                offered: job.salary_max,
            });
        }
    }

    None
}

/// Active postings that satisfy `criteria`, newest first.
pub fn matching_jobs<'a>(criteria: &AlertCriteria, jobs: &'a [JobPosting]) -> Vec<&'a JobPosting> {
    let mut found: Vec<&JobPosting> = jobs
        .iter()
        .filter(|job| job.is_active && matches(criteria, job))
        .collect();
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    found
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
