//! Raw scalar parsers for provider payload values.
//!
//! Upstream providers report numbers as bare JSON numbers, formatted strings
//! (`"$1,234.5"`, `"2.5B"`, `"12.5%"`), or sentinel "no data" tokens. These
//! parsers turn any of those into `Option<f64>` where `None` is the explicit
//! absent marker, never zero.

use serde_json::Value;

/// How a canonical field's raw values are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Plain numeric value.
    Numeric,
    /// Fractional value, normalized from whole percentage points when needed.
    Percent,
    /// Whole-number value (market cap, enterprise value, share counts).
    Cardinal,
}

/// Parses an arbitrary raw scalar into a number.
///
/// Returns `None` for null, empty strings, the sentinel tokens `N/A`,
/// `None`, `-`, and the literal string `null` (case-insensitive), and for
/// values that parse to NaN or infinity. Thousands separators, `$`, and `%`
/// are stripped; trailing `K`/`M`/`B` suffixes scale by 1e3/1e6/1e9.
#[must_use]
pub fn parse_scalar(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_str(s),
        _ => None,
    }
}

/// Parses a percentage-kind value into a fraction.
///
/// This is the whole-point heuristic: a value carrying a `%` sign is divided
/// by 100; otherwise a parsed magnitude above 1.0 is assumed to be whole
/// percentage points and divided by 100, while magnitudes at or below 1.0
/// pass through unchanged.
#[must_use]
pub fn parse_percent(value: &Value) -> Option<f64> {
    let has_sign = matches!(value, Value::String(s) if s.contains('%'));
    let parsed = parse_scalar(value)?;
    if has_sign || parsed.abs() > 1.0 {
        Some(parsed / 100.0)
    } else {
        Some(parsed)
    }
}

/// Parses a cardinal-scale value, rounding to the nearest whole number.
#[must_use]
pub fn parse_cardinal(value: &Value) -> Option<f64> {
    parse_scalar(value).map(f64::round)
}

/// Routes a raw value through the parser matching the field kind.
#[must_use]
pub fn parse_for_kind(kind: FieldKind, value: &Value) -> Option<f64> {
    match kind {
        FieldKind::Numeric => parse_scalar(value),
        FieldKind::Percent => parse_percent(value),
        FieldKind::Cardinal => parse_cardinal(value),
    }
}

fn parse_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_absent_token(trimmed) {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    let cleaned = cleaned.trim();

    let (number, scale) = if let Some(p) = cleaned.strip_suffix(['K', 'k']) {
        (p, 1e3)
    } else if let Some(p) = cleaned.strip_suffix(['M', 'm']) {
        (p, 1e6)
    } else if let Some(p) = cleaned.strip_suffix(['B', 'b']) {
        (p, 1e9)
    } else {
        (cleaned, 1.0)
    };

    let parsed: f64 = number.trim().parse().ok()?;
    let scaled = parsed * scale;
    scaled.is_finite().then_some(scaled)
}

fn is_absent_token(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "n/a" | "none" | "-" | "null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_tokens_parse_to_none() {
        for raw in [json!(null), json!(""), json!("N/A"), json!("None"), json!("-"), json!("null")]
        {
            assert_eq!(parse_scalar(&raw), None, "{raw:?}");
        }
    }

    #[test]
    fn strips_separators_and_currency() {
        assert_eq!(parse_scalar(&json!("$1,234.50")), Some(1234.5));
        assert_eq!(parse_scalar(&json!("  42 ")), Some(42.0));
        assert_eq!(parse_scalar(&json!(-3.25)), Some(-3.25));
    }

    #[test]
    fn unit_suffixes_scale() {
        assert_eq!(parse_scalar(&json!("12K")), Some(12_000.0));
        assert_eq!(parse_scalar(&json!("1.5M")), Some(1_500_000.0));
        assert_eq!(parse_scalar(&json!("2.5B")), Some(2_500_000_000.0));
    }

    #[test]
    fn non_finite_is_absent_not_zero() {
        assert_eq!(parse_scalar(&json!("NaN")), None);
        assert_eq!(parse_scalar(&json!("inf")), None);
        assert_eq!(parse_scalar(&json!("garbage")), None);
    }

    #[test]
    fn percent_whole_point_heuristic() {
        assert_eq!(parse_percent(&json!("12.5%")), Some(0.125));
        assert_eq!(parse_percent(&json!(45)), Some(0.45));
        assert_eq!(parse_percent(&json!(0.07)), Some(0.07));
        assert_eq!(parse_percent(&json!(-35.0)), Some(-0.35));
        assert_eq!(parse_percent(&json!("0.9")), Some(0.9));
    }

    #[test]
    fn cardinal_rounds_to_whole_numbers() {
        assert_eq!(parse_cardinal(&json!("2.5B")), Some(2_500_000_000.0));
        assert_eq!(parse_cardinal(&json!(1234.6)), Some(1235.0));
        assert_eq!(parse_cardinal(&json!("N/A")), None);
    }

    #[test]
    fn negative_dash_is_only_absent_when_alone() {
        assert_eq!(parse_scalar(&json!("-")), None);
        assert_eq!(parse_scalar(&json!("-5")), Some(-5.0));
    }
}
