use std::time::Duration;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a duration given in whole seconds, e.g. `"3600"`. Negative values yield `None`, since
/// `std::time::Duration` cannot represent them; callers that need signed TTLs should use [`parse_signed_seconds`].
pub fn parse_duration_secs(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Parse a signed number of seconds.
pub fn parse_signed_seconds(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}
