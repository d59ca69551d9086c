//! `Retry-After` header parsing
//!
//! The header is either a number of seconds or an HTTP date. The parsed
//! value is only a hint: the retry policy caps it at its own maximum delay.

use std::time::Duration;

use tracing::warn;

/// Parse a `Retry-After` header value
///
/// Returns `None` when the value is neither integer seconds nor an RFC 2822
/// date. A date in the past yields a zero wait.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return Some(wait.to_std().unwrap_or(Duration::ZERO));
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_http_date_in_future() {
        let target = chrono::Utc::now() + chrono::Duration::seconds(90);
        let parsed = parse_retry_after(&target.to_rfc2822()).unwrap();
        assert!(parsed <= Duration::from_secs(90));
        assert!(parsed >= Duration::from_secs(85), "{parsed:?}");
    }

    #[test]
    fn test_http_date_in_past_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-3"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
