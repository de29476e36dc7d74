//! # Duration Parsing
//!
//! Parses duration flags such as `--sync-period`.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static DURATION_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$").expect("duration shape regex is valid")
});

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h|d)").expect("duration part regex is valid")
});

/// Parse a duration string into `std::time::Duration`
///
/// Accepts one or more `<number><unit>` parts, where unit is one of
/// `ms`, `s`, `m`, `h`, `d` (case insensitive): `"30s"`, `"10m"`, `"1h30m"`, `"10m0s"`.
/// The total must be greater than zero.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let duration_lower = duration_trimmed.to_lowercase();

    if !DURATION_SHAPE.is_match(&duration_lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit>[<number><unit>...] (e.g., '30s', '10m', '1h30m')",
            duration_trimmed
        ));
    }

    let mut total = Duration::ZERO;
    for captures in DURATION_PART.captures_iter(&duration_lower) {
        let number_str = &captures["number"];
        let number: u64 = number_str.parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{}': {}",
                number_str,
                duration_trimmed,
                e
            )
        })?;

        let part = match &captures["unit"] {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            "d" => Duration::from_secs(number.saturating_mul(86400)),
            unit => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{}' in duration '{}'. Expected: ms, s, m, h, or d",
                    unit,
                    duration_trimmed
                ));
            }
        };
        total = total.saturating_add(part);
    }

    if total.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_compound() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("10m0s").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1m500ms").unwrap(), Duration::from_millis(60_500));
    }

    #[test]
    fn test_parse_trims_and_ignores_case() {
        assert_eq!(parse_duration(" 5M ").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5m").is_err());
        assert!(parse_duration("1.5h").is_err());
    }

    #[test]
    fn test_parse_rejects_zero() {
        let err = parse_duration("0s").unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
        assert!(parse_duration("0m0s").is_err());
    }
}
