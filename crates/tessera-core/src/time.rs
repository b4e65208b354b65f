use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// UTC timestamp that serializes as an RFC 3339 string.
///
/// Used wherever a wall-clock instant crosses a serialization boundary
/// (health reports, session expiries). In-process age checks should use
/// `std::time::Instant` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub OffsetDateTime);

impl Timestamp {
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime)
    }

    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn unix_timestamp(&self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Whether this timestamp lies strictly in the past.
    pub fn is_past(&self) -> bool {
        self.0 < OffsetDateTime::now_utc()
    }

    /// Time elapsed since this timestamp, zero if it lies in the future.
    pub fn age(&self) -> std::time::Duration {
        let elapsed = OffsetDateTime::now_utc() - self.0;
        std::time::Duration::try_from(elapsed).unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let datetime = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
            .map_err(|e| {
                CoreError::invalid_timestamp(format!("Failed to parse timestamp '{s}': {e}"))
            })?;
        Ok(Timestamp(datetime))
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Timestamp::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> Timestamp {
    Timestamp(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::new(datetime!(2024-03-01 09:15:00 UTC));
        assert_eq!(ts.to_string(), "2024-03-01T09:15:00Z");
    }

    #[test]
    fn test_timestamp_from_str() {
        let ts = Timestamp::from_str("2024-03-01T09:15:00Z").unwrap();
        assert_eq!(ts.0, datetime!(2024-03-01 09:15:00 UTC));
    }

    #[test]
    fn test_timestamp_from_str_with_offset() {
        let ts = Timestamp::from_str("2024-03-01T09:15:00+02:00").unwrap();
        let expected_utc = datetime!(2024-03-01 07:15:00 UTC);
        assert_eq!(ts.0.to_offset(time::UtcOffset::UTC), expected_utc);
    }

    #[test]
    fn test_timestamp_from_str_invalid() {
        assert!(Timestamp::from_str("not-a-date").is_err());
        assert!(Timestamp::from_str("2024-13-01T00:00:00Z").is_err());
        assert!(Timestamp::from_str("").is_err());
    }

    #[test]
    fn test_timestamp_serialization() {
        let ts = Timestamp::new(datetime!(2024-03-01 09:15:00 UTC));
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-03-01T09:15:00Z\"");

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_timestamp_is_past() {
        let past = Timestamp::new(datetime!(2020-01-01 00:00:00 UTC));
        assert!(past.is_past());

        let future = Timestamp::new(OffsetDateTime::now_utc() + time::Duration::hours(1));
        assert!(!future.is_past());
    }

    #[test]
    fn test_timestamp_age() {
        let past = Timestamp::new(OffsetDateTime::now_utc() - time::Duration::seconds(30));
        let age = past.age();
        assert!(age >= std::time::Duration::from_secs(29));
        assert!(age < std::time::Duration::from_secs(60));

        let future = Timestamp::new(OffsetDateTime::now_utc() + time::Duration::hours(1));
        assert_eq!(future.age(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_now_utc_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        let diff = b.0 - a.0;
        assert!(diff.whole_milliseconds() >= 0);
        assert!(diff.whole_seconds() < 1);
    }

    #[test]
    fn test_error_message_content() {
        match Timestamp::from_str("bad-date") {
            Err(CoreError::InvalidTimestamp(msg)) => {
                assert!(msg.contains("bad-date"));
            }
            _ => panic!("Expected InvalidTimestamp error"),
        }
    }
}
