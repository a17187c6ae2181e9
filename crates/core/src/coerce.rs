//! Permissive numeric coercion.
//!
//! Quantity and volume inputs arrive from forms, CLI arguments and stored documents of varying
//! vintage. Anything that is missing, non-numeric or malformed becomes `0`; it is never an
//! error. Negative and non-finite values also become `0`.

use serde_json::Value;

/// Converts a loosely-typed value into a number.
///
/// - numbers are taken as-is
/// - strings are trimmed and parsed; blank or unparsable strings give `0`
/// - `true` gives `1`, `false` and `null` give `0`
/// - arrays and objects give `0`
///
/// The result is always finite and non-negative.
pub fn number(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_str(s),
        Value::Bool(true) => 1.0,
        Value::Bool(false) | Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
    };
    non_negative(raw)
}

/// Like [`number`] but for an optional value; absence gives `0`.
pub fn optional_number(value: Option<&Value>) -> f64 {
    value.map(number).unwrap_or(0.0)
}

/// Clamps a number into `[0, +inf)`, mapping NaN and infinities to `0`.
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Coerces a percentage into `[0, 100]`.
pub fn percentage(value: &Value) -> f64 {
    number(value).min(100.0)
}

/// Coerces an optional override (a what-if volume, a requested batch size).
///
/// Absent, `null` or blank input means "not given" and stays `None`; anything else is coerced
/// with [`number`], so `"abc"` gives `Some(0.0)`.
pub fn optional_override(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        other => Some(number(other)),
    }
}

/// [`optional_override`] for raw text such as query parameters and CLI arguments.
pub fn text_override(raw: Option<&str>) -> Option<f64> {
    optional_override(raw.map(|s| Value::String(s.to_string())).as_ref())
}

/// Returns the number if the value is genuinely numeric, `None` otherwise.
///
/// Used where absence and garbage should fall back to a configured default rather than `0`.
pub fn strict_number(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| non_negative(raw))
}

fn parse_str(input: &str) -> f64 {
    input.trim().parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_pass_through() {
        assert_eq!(number(&json!(45)), 45.0);
        assert_eq!(number(&json!(12.5)), 12.5);
    }

    #[test]
    fn test_garbage_becomes_zero() {
        assert_eq!(number(&json!("abc")), 0.0);
        assert_eq!(number(&json!("")), 0.0);
        assert_eq!(number(&json!(null)), 0.0);
        assert_eq!(number(&json!([1, 2])), 0.0);
        assert_eq!(number(&json!({"parts": 3})), 0.0);
    }

    #[test]
    fn test_numeric_strings_parse() {
        assert_eq!(number(&json!(" 7.25 ")), 7.25);
        assert_eq!(number(&json!("1e2")), 100.0);
    }

    #[test]
    fn test_negative_and_non_finite_become_zero() {
        assert_eq!(number(&json!(-3)), 0.0);
        assert_eq!(number(&json!("-3")), 0.0);
        assert_eq!(number(&json!("NaN")), 0.0);
        assert_eq!(number(&json!("inf")), 0.0);
        assert_eq!(non_negative(f64::NAN), 0.0);
        assert_eq!(non_negative(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_booleans() {
        assert_eq!(number(&json!(true)), 1.0);
        assert_eq!(number(&json!(false)), 0.0);
    }

    #[test]
    fn test_percentage_is_capped() {
        assert_eq!(percentage(&json!(140)), 100.0);
        assert_eq!(percentage(&json!(45)), 45.0);
    }

    #[test]
    fn test_overrides_coerce_instead_of_failing() {
        assert_eq!(optional_override(None), None);
        assert_eq!(optional_override(Some(&json!(null))), None);
        assert_eq!(optional_override(Some(&json!("  "))), None);
        assert_eq!(optional_override(Some(&json!(250))), Some(250.0));
        assert_eq!(optional_override(Some(&json!("abc"))), Some(0.0));
        assert_eq!(text_override(Some("100")), Some(100.0));
        assert_eq!(text_override(Some("abc")), Some(0.0));
        assert_eq!(text_override(Some("-20")), Some(0.0));
        assert_eq!(text_override(None), None);
    }

    #[test]
    fn test_strict_number_distinguishes_garbage() {
        assert_eq!(strict_number(&json!(250)), Some(250.0));
        assert_eq!(strict_number(&json!("250")), Some(250.0));
        assert_eq!(strict_number(&json!("-5")), Some(0.0));
        assert_eq!(strict_number(&json!("abc")), None);
        assert_eq!(strict_number(&json!(null)), None);
        assert_eq!(strict_number(&json!(true)), None);
    }
}
