use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Persisted entry of the `temporary-mutes` list. `expiry` is unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryMute {
    pub name: String,
    pub expiry: i64,
}

impl TemporaryMute {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now.timestamp_millis()
    }
}

/// Persisted value of a `quota:<name>` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub count: u32,
    pub date: NaiveDate,
}

impl QuotaRecord {
    pub fn fresh(today: NaiveDate) -> Self {
        Self {
            count: 0,
            date: today,
        }
    }

    /// Count for `today`; a record from any other day counts as zero.
    pub fn count_on(&self, today: NaiveDate) -> u32 {
        if self.date == today { self.count } else { 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub count_after: u32,
}

/// Combined suppression state of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MuteState {
    pub temporary_until: Option<i64>,
    pub permanent: bool,
}

impl MuteState {
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.permanent
            || self
                .temporary_until
                .is_some_and(|expiry| expiry > now.timestamp_millis())
    }
}

/// Calendar date of `now` in the fixed reporting time zone.
pub fn local_date(now: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDate {
    let offset = FixedOffset::east_opt(utc_offset_hours.clamp(-23, 23) * 3600)
        .unwrap_or_else(|| Utc.fix());
    now.with_timezone(&offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_quota_record_wire_format() {
        let record: QuotaRecord =
            serde_json::from_str(r#"{"count":2,"date":"2024-01-01"}"#).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(record, QuotaRecord { count: 2, date: day });
        assert_eq!(record.count_on(day), 2);
        assert_eq!(record.count_on(day.succ_opt().unwrap()), 0);
    }

    #[test]
    fn test_local_date_uses_fixed_offset() {
        let late_utc = Utc.with_ymd_and_hms(2024, 1, 1, 17, 30, 0).unwrap();
        assert_eq!(
            local_date(late_utc, 8),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(
            local_date(late_utc, 0),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_permanent_mute_takes_precedence() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expired = now.timestamp_millis() - 1;
        let state = MuteState {
            temporary_until: Some(expired),
            permanent: true,
        };
        assert!(state.is_effective(now));
        let state = MuteState {
            temporary_until: Some(expired),
            permanent: false,
        };
        assert!(!state.is_effective(now));
    }
}
