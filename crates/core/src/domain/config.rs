// Engine configuration keys and defaults
//
// The two tunables live in the durable Config collection as text values,
// seeded at first startup. Unparseable stored values fall back to the
// defaults rather than failing the operation.

/// Config key: retry ceiling applied when a job does not carry its own
pub const CONFIG_MAX_RETRIES: &str = "max_retries";

/// Config key: base delay for the exponential backoff ladder
pub const CONFIG_BASE_BACKOFF_SECONDS: &str = "base_backoff_seconds";

pub const DEFAULT_MAX_RETRIES: i64 = 3;
pub const DEFAULT_BASE_BACKOFF_SECONDS: i64 = 2;

/// Parse a stored `max_retries` value, falling back to the default
pub fn max_retries_from(value: Option<String>) -> i64 {
    parse_non_negative(value).unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Parse a stored `base_backoff_seconds` value, falling back to the default
pub fn base_backoff_seconds_from(value: Option<String>) -> i64 {
    parse_non_negative(value).unwrap_or(DEFAULT_BASE_BACKOFF_SECONDS)
}

fn parse_non_negative(value: Option<String>) -> Option<i64> {
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_values() {
        assert_eq!(max_retries_from(Some("5".to_string())), 5);
        assert_eq!(base_backoff_seconds_from(Some(" 10 ".to_string())), 10);
    }

    #[test]
    fn falls_back_on_missing_or_garbage() {
        assert_eq!(max_retries_from(None), DEFAULT_MAX_RETRIES);
        assert_eq!(max_retries_from(Some("lots".to_string())), DEFAULT_MAX_RETRIES);
        assert_eq!(
            base_backoff_seconds_from(Some("-4".to_string())),
            DEFAULT_BASE_BACKOFF_SECONDS
        );
    }
}
