use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Remote,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "FULL_TIME",
            EmploymentType::PartTime => "PART_TIME",
            EmploymentType::Contract => "CONTRACT",
            EmploymentType::Internship => "INTERNSHIP",
            EmploymentType::Remote => "REMOTE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "Full Time",
            EmploymentType::PartTime => "Part Time",
            EmploymentType::Contract => "Contract",
            EmploymentType::Internship => "Internship",
            EmploymentType::Remote => "Remote",
        }
    }
}

impl FromStr for EmploymentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "FULL_TIME" => Ok(EmploymentType::FullTime),
            "PART_TIME" => Ok(EmploymentType::PartTime),
            "CONTRACT" => Ok(EmploymentType::Contract),
            "INTERNSHIP" => Ok(EmploymentType::Internship),
            "REMOTE" => Ok(EmploymentType::Remote),
            other => Err(UnknownVariant::new("employment type", other)),
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum education a posting asks for. Totally ordered through [`EducationLevel::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EducationLevel {
    #[serde(rename = "NONE")]
    NoneRequired,
    HighSchool,
    Vocational,
    Associate,
    Bachelor,
    Master,
    Doctorate,
}

impl EducationLevel {
    /// Position in the education hierarchy, NONE = 0 through DOCTORATE = 6.
    pub fn rank(&self) -> u8 {
        match self {
            EducationLevel::NoneRequired => 0,
            EducationLevel::HighSchool => 1,
            EducationLevel::Vocational => 2,
            EducationLevel::Associate => 3,
            EducationLevel::Bachelor => 4,
            EducationLevel::Master => 5,
            EducationLevel::Doctorate => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EducationLevel::NoneRequired => "NONE",
            EducationLevel::HighSchool => "HIGH_SCHOOL",
            EducationLevel::Vocational => "VOCATIONAL",
            EducationLevel::Associate => "ASSOCIATE",
            EducationLevel::Bachelor => "BACHELOR",
            EducationLevel::Master => "MASTER",
            EducationLevel::Doctorate => "DOCTORATE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EducationLevel::NoneRequired => "No formal education required",
            EducationLevel::HighSchool => "High School Diploma",
            EducationLevel::Vocational => "Vocational/TESDA",
            EducationLevel::Associate => "Associate Degree",
            EducationLevel::Bachelor => "Bachelor's Degree",
            EducationLevel::Master => "Master's Degree",
            EducationLevel::Doctorate => "Doctorate",
        }
    }
}

impl FromStr for EducationLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NONE" => Ok(EducationLevel::NoneRequired),
            "HIGH_SCHOOL" => Ok(EducationLevel::HighSchool),
            "VOCATIONAL" => Ok(EducationLevel::Vocational),
            "ASSOCIATE" => Ok(EducationLevel::Associate),
            "BACHELOR" => Ok(EducationLevel::Bachelor),
            "MASTER" => Ok(EducationLevel::Master),
            "DOCTORATE" => Ok(EducationLevel::Doctorate),
            other => Err(UnknownVariant::new("education level", other)),
        }
    }
}

impl fmt::Display for EducationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upper bound on any experience figure, for postings and alert ceilings.
pub const MAX_EXPERIENCE_YEARS: u32 = 50;

/// Checks an experience figure against [`MAX_EXPERIENCE_YEARS`].
pub fn validate_experience(field: &str, years: u32) -> Result<(), crate::errors::AppError> {
    if years > MAX_EXPERIENCE_YEARS {
        return Err(crate::errors::AppError::Validation(format!(
            "{field} must be at most {MAX_EXPERIENCE_YEARS}"
        )));
    }
    Ok(())
}

/// Experience as stored in an `INTEGER` column.
pub fn experience_column(years: u32) -> Result<i32, crate::errors::AppError> {
    i32::try_from(years).map_err(|_| {
        crate::errors::AppError::Validation(format!(
            "experience_years must be at most {MAX_EXPERIENCE_YEARS}"
        ))
    })
}

/// Human label for the experience buckets offered on the posting form.
pub fn experience_label(years: u32) -> String {
    match years {
        0 => "No experience (Entry level)".to_string(),
        1 => "1-2 years".to_string(),
        3 => "3-5 years".to_string(),
        6 => "6-10 years".to_string(),
        11 => "10+ years".to_string(),
        n => format!("{n} years"),
    }
}

/// A job posting as seen by alert matching and email formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub company_name: String,
    pub description: String,
    pub location: String,
    pub employment_type: EmploymentType,
    /// `None` means the employer did not specify; matching treats it as NONE.
    pub education_level: Option<EducationLevel>,
    pub experience_years: u32,
    pub is_remote: bool,
    pub category_id: Option<i32>,
    pub salary_min: Option<Decimal>,
    pub salary_max: Option<Decimal>,
    pub deadline: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn education_label(&self) -> &'static str {
        self.education_level
            .map(|level| level.label())
            .unwrap_or("Not specified")
    }

    pub fn experience_label(&self) -> String {
        experience_label(self.experience_years)
    }

    pub fn salary_range(&self) -> String {
        match (self.salary_min, self.salary_max) {
            (Some(min), Some(max)) => format!("₱{} - ₱{}", format_amount(min), format_amount(max)),
            (Some(min), None) => format!("From ₱{}", format_amount(min)),
            (None, Some(max)) => format!("Up to ₱{}", format_amount(max)),
            (None, None) => "Negotiable".to_string(),
        }
    }

    /// Site-relative path of the posting's detail page.
    pub fn path(&self) -> String {
        format!("/jobs/{}/", self.slug)
    }
}

/// Formats an amount with two decimals and comma thousands separators.
pub fn format_amount(amount: Decimal) -> String {
    let fixed = format!("{:.2}", amount.round_dp(2));
    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{fraction}")
}

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub company_name: String,
    pub description: String,
    pub location: String,
    pub employment_type: String,
    pub education_level: Option<String>,
    pub experience_years: Option<i32>,
    pub is_remote: bool,
    pub category_id: Option<i32>,
    pub salary_min: Option<Decimal>,
    pub salary_max: Option<Decimal>,
    pub deadline: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobPosting {
    type Error = UnknownVariant;

    /// Missing or unrecognised optional attributes fall back to the most
    /// restrictive value: education becomes unspecified, experience becomes 0.
    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let employment_type = row.employment_type.parse()?;
        let education_level = match row.education_level.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse() {
                Ok(level) => Some(level),
                Err(e) => {
                    tracing::warn!(job_id = %row.id, "{e}; treating as unspecified");
                    None
                }
            },
        };

        Ok(JobPosting {
            id: row.id,
            slug: row.slug,
            title: row.title,
            company_name: row.company_name,
            description: row.description,
            location: row.location,
            employment_type,
            education_level,
            experience_years: row
                .experience_years
                .and_then(|years| u32::try_from(years).ok())
                .unwrap_or(0),
            is_remote: row.is_remote,
            category_id: row.category_id,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            deadline: row.deadline,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}
