//! Lenient parsers for the numeric strings providers send.
//!
//! Providers use placeholders such as `"None"`, `"-"` or `"N/A"` for missing
//! values; those parse to `None` rather than an error.

use std::str::FromStr;

use rust_decimal::Decimal;

fn is_placeholder(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "" | "none" | "-" | "n/a" | "na" | "null" | "nan"
    )
}

/// Strips currency symbols, thousands separators, a leading `+` and a
/// trailing `%`.
fn clean(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | '+'))
        .collect()
}

pub fn parse_decimal(value: Option<&str>) -> Option<Decimal> {
    let raw = value?.trim();
    if is_placeholder(raw) {
        return None;
    }
    let cleaned = clean(raw);
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

pub fn parse_f64(value: Option<&str>) -> Option<f64> {
    let raw = value?.trim();
    if is_placeholder(raw) {
        return None;
    }
    clean(raw).parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i64(value: Option<&str>) -> Option<i64> {
    let raw = value?.trim();
    if is_placeholder(raw) {
        return None;
    }
    clean(raw).parse::<i64>().ok()
}

/// Keeps non-empty text, dropping provider placeholders.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    let raw = value?.trim();
    if is_placeholder(raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal_strips_formatting() {
        assert_eq!(parse_decimal(Some("$185.50")), Some(dec!(185.50)));
        assert_eq!(parse_decimal(Some("-$927,500")), Some(dec!(-927500)));
        assert_eq!(parse_decimal(Some("+1,000")), Some(dec!(1000)));
        assert_eq!(parse_decimal(Some("0.8108%")), Some(dec!(0.8108)));
    }

    #[test]
    fn test_placeholders_are_missing() {
        assert_eq!(parse_decimal(Some("None")), None);
        assert_eq!(parse_decimal(Some("-")), None);
        assert_eq!(parse_f64(Some("N/A")), None);
        assert_eq!(parse_i64(None), None);
        assert_eq!(non_empty(Some("  ")), None);
    }

    #[test]
    fn test_parse_i64() {
        assert_eq!(parse_i64(Some("-5,000")), Some(-5000));
        assert_eq!(parse_i64(Some("3,280,000")), Some(3_280_000));
        assert_eq!(parse_i64(Some("abc")), None);
    }

    #[test]
    fn test_parse_f64_rejects_garbage() {
        assert_eq!(parse_f64(Some("22.5")), Some(22.5));
        assert_eq!(parse_f64(Some("abc")), None);
    }
}
