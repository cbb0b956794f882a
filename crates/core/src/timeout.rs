//! `Timeout` request header values per RFC 4918 §10.7.
//!
//! Only the two standard forms are understood: `Second-<n>` and `Infinite`.
//! The locking core stores finite durations exclusively, so `Infinite` is
//! resolved against a server-configured cap before a lock is issued.

use std::time::Duration;

use crate::error::LockError;

/// A single parsed `TimeType` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutValue {
    Seconds(u64),
    Infinite,
}

impl TimeoutValue {
    /// Resolve to a concrete duration, clamping both `Infinite` and oversized
    /// `Second-<n>` requests to `cap`.
    pub fn resolve(&self, cap: Duration) -> Duration {
        match self {
            Self::Seconds(secs) => Duration::from_secs(*secs).min(cap),
            Self::Infinite => cap,
        }
    }
}

/// Parse one `Timeout` value token.
pub fn parse_timeout(value: &str) -> Result<TimeoutValue, LockError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("infinite") {
        return Ok(TimeoutValue::Infinite);
    }
    if let Some(digits) = value.strip_prefix("Second-") {
        return digits
            .parse::<u64>()
            .map(TimeoutValue::Seconds)
            .map_err(|_| LockError::Protocol(format!("Invalid Timeout value: {value:?}")));
    }
    Err(LockError::Protocol(format!(
        "Invalid Timeout value: {value:?}"
    )))
}

/// Parse a full `Timeout` header, which may list several values in preference
/// order; the first understood one wins.
pub fn parse_timeout_header(header: &str) -> Result<TimeoutValue, LockError> {
    header
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .find_map(|v| parse_timeout(v).ok())
        .ok_or_else(|| LockError::Protocol(format!("Invalid Timeout header: {header:?}")))
}

/// Serialize a granted lifetime for the `Timeout` response header.
pub fn format_timeout(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_second_form() {
        assert_eq!(parse_timeout("Second-600").unwrap(), TimeoutValue::Seconds(600));
    }

    #[test]
    fn parses_infinite_case_insensitively() {
        assert_eq!(parse_timeout("Infinite").unwrap(), TimeoutValue::Infinite);
        assert_eq!(parse_timeout("INFINITE").unwrap(), TimeoutValue::Infinite);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timeout("Second-").is_err());
        assert!(parse_timeout("Second-12x").is_err());
        assert!(parse_timeout("Minute-5").is_err());
    }

    #[test]
    fn header_takes_first_understood_value() {
        let parsed = parse_timeout_header("Infinite, Second-4100000000").unwrap();
        assert_eq!(parsed, TimeoutValue::Infinite);

        let parsed = parse_timeout_header("bogus, Second-30").unwrap();
        assert_eq!(parsed, TimeoutValue::Seconds(30));

        assert!(parse_timeout_header("bogus, nonsense").is_err());
    }

    #[test]
    fn infinite_resolves_to_the_cap() {
        let cap = Duration::from_secs(7 * 24 * 3600);
        assert_eq!(TimeoutValue::Infinite.resolve(cap), cap);
        assert_eq!(
            TimeoutValue::Seconds(60).resolve(cap),
            Duration::from_secs(60)
        );
        assert_eq!(TimeoutValue::Seconds(u64::MAX).resolve(cap), cap);
    }

    #[test]
    fn format_round_trips_through_parse() {
        let formatted = format_timeout(Duration::from_secs(120));
        assert_eq!(formatted, "Second-120");
        assert_eq!(
            parse_timeout(&formatted).unwrap(),
            TimeoutValue::Seconds(120)
        );
    }
}
