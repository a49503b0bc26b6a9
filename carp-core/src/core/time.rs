// carp-core/src/core/time.rs
// ============================================================================
// Module: CARP Runtime Timestamps
// Description: UTC timestamp newtype with RFC 3339 serialization.
// Purpose: Give every timestamped record in the data model one stable wire form.
// Dependencies: time, serde
// ============================================================================

//! ## Overview
//! All timestamps in the CARP runtime are UTC instants serialized as RFC 3339
//! strings. This module wraps `time::OffsetDateTime` rather than exposing it
//! directly so the rest of the crate depends on one narrow surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as DeError;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// A UTC instant, serialized on the wire as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current UTC instant.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Wraps an existing `OffsetDateTime`, normalizing it to UTC.
    #[must_use]
    pub fn from_offset_date_time(value: OffsetDateTime) -> Self {
        Self(value.to_offset(time::UtcOffset::UTC))
    }

    /// Returns the underlying `OffsetDateTime`.
    #[must_use]
    pub fn as_offset_date_time(&self) -> OffsetDateTime {
        self.0
    }

    /// Returns this instant plus the given duration.
    #[must_use]
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        let signed = time::Duration::try_from(duration).ok()?;
        self.0.checked_add(signed).map(Self)
    }

    /// Returns the whole-millisecond difference `self - earlier`, saturating at zero
    /// when `earlier` is not actually earlier than `self`.
    #[must_use]
    pub fn saturating_millis_since(&self, earlier: Self) -> u64 {
        let delta = self.0 - earlier.0;
        let millis = delta.whole_milliseconds();
        u64::try_from(millis).unwrap_or(0)
    }

    /// Parses an RFC 3339 string into a timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` is not a valid RFC 3339 string.
    pub fn parse(value: &str) -> Result<Self, TimestampParseError> {
        OffsetDateTime::parse(value, &Rfc3339)
            .map(Self::from_offset_date_time)
            .map_err(|err| TimestampParseError(err.to_string()))
    }

    /// Formats this timestamp as an RFC 3339 string.
    ///
    /// # Errors
    ///
    /// Returns an error on the (practically unreachable) case that formatting fails.
    pub fn to_rfc3339(&self) -> Result<String, TimestampParseError> {
        self.0.format(&Rfc3339).map_err(|err| TimestampParseError(err.to_string()))
    }
}

/// Error returned when a timestamp cannot be parsed or formatted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp: {0}")]
pub struct TimestampParseError(String);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("<invalid-timestamp>"),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let text = self.to_rfc3339().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(|err| D::Error::custom(err.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::Timestamp;

    #[test]
    fn round_trips_through_rfc3339() {
        let now = Timestamp::now();
        let text = now.to_rfc3339().expect("format");
        let parsed = Timestamp::parse(&text).expect("parse");
        assert_eq!(parsed, now);
    }

    #[test]
    fn computes_millisecond_deltas() {
        let start = Timestamp::parse("2026-01-01T00:00:00Z").expect("parse start");
        let end = Timestamp::parse("2026-01-01T00:00:01.500Z").expect("parse end");
        assert_eq!(end.saturating_millis_since(start), 1_500);
        assert_eq!(start.saturating_millis_since(end), 0);
    }
}
