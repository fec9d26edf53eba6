use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The job seeker who owns an alert and receives its emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
}

impl Subscriber {
    /// Name used in email greetings: first name when present, otherwise username.
    pub fn greeting_name(&self) -> &str {
        self.first_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}
