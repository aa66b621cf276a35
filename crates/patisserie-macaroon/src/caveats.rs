//! Ready-made general caveat verifiers.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::HashSet;

use crate::verifier::CaveatVerifier;

const TIME_PREFIX: &str = "time < ";
const AUTHORITIES_PREFIX: &str = "authorities =";

/// Satisfies `time < <timestamp>` while the current time is strictly before
/// the timestamp.
///
/// Accepted timestamp forms, all read as UTC unless an offset is given:
///
/// | Form | Example |
/// |------|---------|
/// | RFC 3339 | `2015-01-01T00:00:00Z` |
/// | with offset | `2015-01-01T00:00:00+0200` |
/// | seconds | `2015-01-01T00:00:00` |
/// | minutes | `2015-01-01T00:00` |
/// | hours | `2015-01-01T00` |
/// | date | `2015-01-01` |
///
/// Predicates that do not parse are not satisfied.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampCaveatVerifier {
    now: Option<DateTime<Utc>>,
}

impl TimestampCaveatVerifier {
    /// Compare against the wall clock at verification time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare against a fixed instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Some(now) }
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

impl CaveatVerifier for TimestampCaveatVerifier {
    fn verify_caveat(&self, predicate: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(predicate) else {
            return false;
        };
        let Some(timestamp) = text.strip_prefix(TIME_PREFIX) else {
            return false;
        };
        parse_timestamp(timestamp.trim()).is_some_and(|deadline| self.now() < deadline)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t.and_utc());
        }
    }
    // chrono will not build a time from an hour alone
    if let Ok(t) = NaiveDateTime::parse_from_str(&format!("{s}:00"), "%Y-%m-%dT%H:%M") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Satisfies `authorities = A, B, ...` when every required authority is in
/// the comma-separated list.
///
/// Entries are trimmed and compared case-sensitively; empty entries are
/// ignored. A verifier with no required authorities satisfies nothing.
#[derive(Debug, Clone, Default)]
pub struct AuthoritiesCaveatVerifier {
    required: Vec<String>,
}

impl AuthoritiesCaveatVerifier {
    pub fn new(authorities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: authorities.into_iter().map(Into::into).collect(),
        }
    }
}

impl CaveatVerifier for AuthoritiesCaveatVerifier {
    fn verify_caveat(&self, predicate: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(predicate) else {
            return false;
        };
        let Some(list) = text.strip_prefix(AUTHORITIES_PREFIX) else {
            return false;
        };
        let granted: HashSet<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect();

        !self.required.is_empty() && self.required.iter().all(|a| granted.contains(a.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 9, 23, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_timestamp_formats() {
        let verifier = TimestampCaveatVerifier::at(noon());
        for predicate in [
            "time < 2014-09-23T12:00:01Z",
            "time < 2014-09-23T14:00:01+0200",
            "time < 2014-09-23T14:00:01+02:00",
            "time < 2014-09-23T12:00:01",
            "time < 2014-09-23T12:01",
            "time < 2014-09-23T13",
            "time < 2014-09-24",
        ] {
            assert!(verifier.verify_caveat(predicate.as_bytes()), "{predicate}");
        }
    }

    #[test]
    fn test_timestamp_in_the_past() {
        let verifier = TimestampCaveatVerifier::at(noon());
        for predicate in [
            "time < 2014-09-23T11:59:59Z",
            "time < 2014-09-23T12:00",
            "time < 2014-09-23T12",
            "time < 2014-09-23",
            "time < 2014-09-23T13:00:00+0200",
        ] {
            assert!(!verifier.verify_caveat(predicate.as_bytes()), "{predicate}");
        }
    }

    #[test]
    fn test_timestamp_is_strict() {
        let verifier = TimestampCaveatVerifier::at(noon());
        assert!(!verifier.verify_caveat(b"time < 2014-09-23T12:00:00Z"));
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        let verifier = TimestampCaveatVerifier::at(noon());
        assert!(!verifier.verify_caveat(b"time < tomorrow"));
        assert!(!verifier.verify_caveat(b"time > 2099-01-01"));
        assert!(!verifier.verify_caveat(b"account = 3735928559"));
        assert!(!verifier.verify_caveat(&[0xff, 0xfe]));
    }

    #[test]
    fn test_timestamp_uses_wall_clock() {
        let verifier = TimestampCaveatVerifier::new();
        assert!(verifier.verify_caveat(b"time < 2999-01-01T00:00"));
        assert!(!verifier.verify_caveat(b"time < 2000-01-01T00:00"));
    }

    #[test]
    fn test_authorities() {
        let cases: &[(&str, &[&str], bool)] = &[
            ("time < 2014-10-10", &["ADMIN"], false),
            ("authorities = ABC", &["ADMIN"], false),
            ("authorities = ADMIN", &["ADMIN"], true),
            ("authorities = NOADMIN", &["ADMIN"], false),
            ("authorities = FOO, ADMIN", &["ADMIN"], true),
            ("authorities =", &["ADMIN"], false),
            ("authorities = FOO,BAR,FOO, BAR, ADMIN", &["ADMIN", "FOO"], true),
            ("authorities = FOO", &["ADMIN", "FOO"], false),
            ("authorities = ,,,FOO,,, ,", &["FOO"], true),
            ("authorities = ,,,foo,,, ,", &["FOO"], false),
        ];

        for (predicate, required, expected) in cases {
            let verifier = AuthoritiesCaveatVerifier::new(required.iter().copied());
            assert_eq!(
                verifier.verify_caveat(predicate.as_bytes()),
                *expected,
                "{predicate} with {required:?}"
            );
        }
    }

    #[test]
    fn test_authorities_empty_requirement() {
        let verifier = AuthoritiesCaveatVerifier::new(Vec::<String>::new());
        assert!(!verifier.verify_caveat(b"authorities = ADMIN"));
    }
}
