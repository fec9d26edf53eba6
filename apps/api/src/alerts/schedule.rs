use chrono::{DateTime, Duration, Utc};

use crate::models::alert::{Frequency, JobAlert};

/// Default quiet period between two instant emails for the same alert.
pub const INSTANT_DEBOUNCE_SECS: u32 = 300;

const DAILY_SECS: i64 = 24 * 60 * 60;
const WEEKLY_DAYS: i64 = 7;

/// True when an instant alert last sent at `last_sent` may be sent again at `now`.
pub fn debounce_elapsed(last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    match last_sent {
        None => true,
        Some(last) => now.signed_duration_since(last) >= window,
    }
}

/// True when a digest alert with the given frequency is due at `now`.
///
/// DAILY waits a full 24 hours. WEEKLY waits seven whole elapsed days.
/// INSTANT alerts are never due through the digest path.
pub fn is_digest_due(frequency: Frequency, last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    if !frequency.is_digest() {
        return false;
    }
    let Some(last) = last_sent else {
        return true;
    };
    let elapsed = now.signed_duration_since(last);
    match frequency {
        Frequency::Daily => elapsed.num_seconds() >= DAILY_SECS,
        Frequency::Weekly => elapsed.num_days() >= WEEKLY_DAYS,
        Frequency::Instant => false,
    }
}

/// Full eligibility check for the scheduled sweep.
pub fn should_send(alert: &JobAlert, now: DateTime<Utc>) -> bool {
    alert.is_deliverable() && is_digest_due(alert.frequency, alert.last_sent, now)
}
