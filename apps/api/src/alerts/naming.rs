use crate::models::alert::AlertCriteria;

pub const PLACEHOLDER_NAME: &str = "My Job Alert";

/// Picks the stored name for an alert: the subscriber's own name when given,
/// otherwise one derived from the criteria.
pub fn resolve_alert_name(requested: Option<&str>, criteria: &AlertCriteria) -> String {
    match requested.map(str::trim) {
        Some(name) if !name.is_empty() && name != PLACEHOLDER_NAME => name.to_string(),
        _ => derive_alert_name(criteria),
    }
}

/// "keyword in location (Employment Type)", skipping unset parts.
pub fn derive_alert_name(criteria: &AlertCriteria) -> String {
    let mut parts = Vec::new();
    if let Some(keyword) = non_blank(&criteria.keyword) {
        parts.push(keyword.to_string());
    }
    if let Some(location) = non_blank(&criteria.location) {
        parts.push(format!("in {location}"));
    }
    if let Some(kind) = criteria.employment_type {
        parts.push(format!("({})", kind.label()));
    }

    if parts.is_empty() {
        PLACEHOLDER_NAME.to_string()
    } else {
        parts.join(" ")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
