//! Parsing forecast answers out of free-text model output.
//!
//! The model is asked for a bare JSON object but routinely wraps it in
//! prose. Parsing tries the whole string first, then the first balanced
//! `{...}` substring, and validates the required fields before anything is
//! persisted.

use serde_json::Value;
use thiserror::Error;

use crate::models::PredictionRecord;

#[derive(Error, Debug, PartialEq)]
pub enum ForecastParseError {
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("forecast is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("forecast field `{0}` has the wrong type")]
    WrongType(&'static str),
}

/// Parse a model answer into a [`PredictionRecord`].
pub fn parse_forecast(text: &str) -> Result<PredictionRecord, ForecastParseError> {
    let value = match serde_json::from_str::<Value>(text.trim()) {
        Ok(value @ Value::Object(_)) => value,
        _ => balanced_object(text)
            .and_then(|fragment| serde_json::from_str::<Value>(fragment).ok())
            .ok_or(ForecastParseError::NoJson)?,
    };

    let time = match value.get("time") {
        None | Some(Value::Null) => return Err(ForecastParseError::MissingField("time")),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(ForecastParseError::WrongType("time")),
    };
    let num = match value.get("num") {
        None | Some(Value::Null) => return Err(ForecastParseError::MissingField("num")),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or(ForecastParseError::WrongType("num"))?,
        Some(_) => return Err(ForecastParseError::WrongType("num")),
    };
    let reasons = match value.get("reasons") {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };

    Ok(PredictionRecord { time, num, reasons })
}

/// Locate the first balanced `{...}` substring, skipping braces inside
/// string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json_object() {
        let record = parse_forecast(
            r#"{"time": "2025/01/01 12:00", "num": 42, "reasons": "lunch peak"}"#,
        )
        .unwrap();
        assert_eq!(record.time, "2025/01/01 12:00");
        assert_eq!(record.num, 42);
        assert_eq!(record.reasons, "lunch peak");
    }

    #[test]
    fn extracts_object_wrapped_in_prose() {
        let text = "Based on the data, here is my forecast:\n\
            {\"time\": \"2025-01-01:12:30+00:00\", \"num\": 55, \"reasons\": \"lecture ends at noon\"}\n\
            Let me know if you need anything else.";
        let record = parse_forecast(text).unwrap();
        assert_eq!(record.num, 55);
        assert_eq!(record.reasons, "lecture ends at noon");
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let text = r#"answer: {"time": "12:00", "num": 3, "reasons": "schedule says {busy}"}"#;
        let record = parse_forecast(text).unwrap();
        assert_eq!(record.reasons, "schedule says {busy}");
    }

    #[test]
    fn plain_text_is_rejected() {
        assert_eq!(
            parse_forecast("I cannot produce a forecast from this data."),
            Err(ForecastParseError::NoJson)
        );
    }

    #[test]
    fn null_or_missing_required_fields_are_rejected() {
        assert_eq!(
            parse_forecast(r#"{"time": null, "num": 10}"#),
            Err(ForecastParseError::MissingField("time"))
        );
        assert_eq!(
            parse_forecast(r#"{"time": "12:00"}"#),
            Err(ForecastParseError::MissingField("num"))
        );
        assert_eq!(
            parse_forecast(r#"{"time": "12:00", "num": "many"}"#),
            Err(ForecastParseError::WrongType("num"))
        );
    }

    #[test]
    fn missing_reasons_defaults_to_empty() {
        let record = parse_forecast(r#"{"time": "12:00", "num": 5}"#).unwrap();
        assert_eq!(record.reasons, "");
    }
}
