//! Coercion of raw declaration text into typed variable values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use mdflow_types::document::{VariableKind, VariableValue};

use crate::parser::keywords;

/// Strip one layer of matching quotes or backticks.
fn unquote(raw: &str) -> &str {
    let raw = raw.trim();
    for quote in ['"', '\'', '`'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a metadata-style timestamp (RFC 3339, `YYYY-MM-DD HH:MM:SS`, or a bare date).
pub fn timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_datetime(unquote(raw))
}

/// Coerce raw source text to a value of the declared kind.
///
/// Returns a human-readable reason on failure.
pub fn coerce(raw: &str, kind: VariableKind) -> Result<VariableValue, String> {
    let text = unquote(raw);
    match kind {
        VariableKind::String => Ok(VariableValue::String(text.to_string())),
        VariableKind::Number => {
            let n: f64 = text
                .parse()
                .map_err(|_| format!("'{text}' is not a number"))?;
            if !n.is_finite() {
                return Err(format!("'{text}' is not a finite number"));
            }
            Ok(VariableValue::Number(n))
        }
        VariableKind::Boolean => keywords::boolean(text)
            .map(VariableValue::Boolean)
            .ok_or_else(|| format!("'{text}' is not a boolean")),
        VariableKind::DateTime => parse_datetime(text)
            .map(VariableValue::DateTime)
            .ok_or_else(|| format!("'{text}' is not a date or RFC 3339 timestamp")),
        VariableKind::FilePath => {
            if text.is_empty() || text.contains('\0') {
                return Err("file path must be non-empty and contain no NUL bytes".to_string());
            }
            Ok(VariableValue::FilePath(text.to_string()))
        }
        VariableKind::Url => url::Url::parse(text)
            .map(|u| VariableValue::Url(u.to_string()))
            .map_err(|e| format!("'{text}' is not a URL: {e}")),
        VariableKind::Json => serde_json::from_str(text)
            .map(VariableValue::Json)
            .map_err(|e| format!("invalid JSON: {e}")),
        VariableKind::StringArray => {
            if text.starts_with('[') {
                let items: Vec<String> = serde_json::from_str(text)
                    .map_err(|e| format!("invalid string array: {e}"))?;
                return Ok(VariableValue::StringArray(items));
            }
            let items = text
                .split(',')
                .map(|s| unquote(s).to_string())
                .filter(|s| !s.is_empty())
                .collect();
            Ok(VariableValue::StringArray(items))
        }
    }
}

/// Bring an already-parsed value to the declared kind.
///
/// Values that already satisfy `kind` are returned unchanged; anything else
/// (including raw text kept by a non-strict parse) is re-coerced from its
/// source text.
pub fn conform(value: &VariableValue, kind: VariableKind) -> Result<VariableValue, String> {
    if value.kind() == Some(kind) {
        return Ok(value.clone());
    }
    coerce(&value.to_source_text(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_number() {
        assert_eq!(
            coerce("3", VariableKind::Number).unwrap(),
            VariableValue::Number(3.0)
        );
        assert_eq!(
            coerce("\"2.5\"", VariableKind::Number).unwrap(),
            VariableValue::Number(2.5)
        );
        assert!(coerce("three", VariableKind::Number).is_err());
        assert!(coerce("NaN", VariableKind::Number).is_err());
    }

    #[test]
    fn test_coerce_boolean_words() {
        assert_eq!(
            coerce("yes", VariableKind::Boolean).unwrap(),
            VariableValue::Boolean(true)
        );
        assert_eq!(
            coerce("false", VariableKind::Boolean).unwrap(),
            VariableValue::Boolean(false)
        );
        assert!(coerce("perhaps", VariableKind::Boolean).is_err());
    }

    #[test]
    fn test_coerce_datetime_formats() {
        assert!(coerce("2024-03-01", VariableKind::DateTime).is_ok());
        assert!(coerce("2024-03-01T10:00:00Z", VariableKind::DateTime).is_ok());
        assert!(coerce("2024-03-01 10:00:00", VariableKind::DateTime).is_ok());
        assert!(coerce("next tuesday", VariableKind::DateTime).is_err());
    }

    #[test]
    fn test_coerce_url_and_json() {
        assert!(coerce("https://example.com/hook", VariableKind::Url).is_ok());
        assert!(coerce("not a url", VariableKind::Url).is_err());
        assert_eq!(
            coerce(r#"{"a": 1}"#, VariableKind::Json).unwrap(),
            VariableValue::Json(serde_json::json!({"a": 1}))
        );
        assert!(coerce("{broken", VariableKind::Json).is_err());
    }

    #[test]
    fn test_coerce_string_array() {
        assert_eq!(
            coerce("a, b ,c", VariableKind::StringArray).unwrap(),
            VariableValue::StringArray(vec!["a".into(), "b".into(), "c".into()])
        );
        assert_eq!(
            coerce(r#"["x", "y"]"#, VariableKind::StringArray).unwrap(),
            VariableValue::StringArray(vec!["x".into(), "y".into()])
        );
    }

    #[test]
    fn test_conform_recoerces_raw_text() {
        let raw = VariableValue::Text("42".into());
        assert_eq!(
            conform(&raw, VariableKind::Number).unwrap(),
            VariableValue::Number(42.0)
        );
        let bad = VariableValue::Text("many".into());
        assert!(conform(&bad, VariableKind::Number).is_err());
        let typed = VariableValue::Boolean(true);
        assert_eq!(conform(&typed, VariableKind::Boolean).unwrap(), typed);
    }
}
