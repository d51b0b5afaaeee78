use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

pub const DEFAULT_INTERVAL_HOURS: u32 = 2;
pub const MIN_FREQUENCY_HOURS: u32 = 1;
pub const MAX_FREQUENCY_HOURS: u32 = 24;

/// Per-user subscription record, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: UserId,
    pub tickers: BTreeSet<String>,
    pub interval_hours: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_notified: Option<DateTime<Utc>>,
}

impl UserPreference {
    pub fn new(user_id: UserId, tickers: &[String], now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            tickers: tickers.iter().cloned().collect(),
            interval_hours: DEFAULT_INTERVAL_HOURS,
            created_at: now,
            last_notified: None,
        }
    }

    /// Users that were never notified count from their creation time.
    /// `None` when the interval runs past the representable range.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.last_notified
            .unwrap_or(self.created_at)
            .checked_add_signed(Duration::hours(i64::from(self.interval_hours)))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due().is_some_and(|due| now >= due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn due_once_interval_has_elapsed() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut pref = UserPreference::new(7, &[], t);
        pref.interval_hours = 3;
        pref.last_notified = Some(t);

        assert!(!pref.is_due(t + Duration::hours(2)));
        assert!(pref.is_due(t + Duration::hours(3)));
    }

    #[test]
    fn never_notified_counts_from_creation() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let pref = UserPreference::new(7, &[], t);

        assert!(!pref.is_due(t + Duration::minutes(119)));
        assert!(pref.is_due(t + Duration::hours(2)));
    }

    #[test]
    fn unrepresentable_interval_is_never_due() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut pref = UserPreference::new(7, &[], t);
        pref.interval_hours = u32::MAX;
        pref.last_notified = Some(DateTime::<Utc>::MAX_UTC - Duration::hours(1));

        assert_eq!(pref.next_due(), None);
        assert!(!pref.is_due(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn record_without_last_notified_deserializes() {
        let json = r#"{"user_id":42,"tickers":["AAPL"],"interval_hours":4,"created_at":"2024-03-01T09:00:00Z"}"#;
        let pref: UserPreference = serde_json::from_str(json).unwrap();

        assert_eq!(pref.user_id, 42);
        assert_eq!(pref.interval_hours, 4);
        assert_eq!(pref.last_notified, None);
    }
}
