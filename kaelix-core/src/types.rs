//! Common types used throughout the Kaelix system.

use chrono::{DateTime, SubsecRound, TimeZone, Utc};

/// Timestamp type for message creation and expiration.
///
/// Records store milliseconds since the epoch, so timestamps produced by
/// [`now`] are truncated to millisecond precision.
pub type Timestamp = DateTime<Utc>;

/// Current time truncated to milliseconds.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

/// Convert epoch milliseconds to a timestamp.
#[must_use]
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_millisecond_precise() {
        let ts = now();
        assert_eq!(from_millis(ts.timestamp_millis()), Some(ts));
    }
}
