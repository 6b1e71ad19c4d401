//! Response parsing: model text → field maps.
//!
//! The model is asked for a bare JSON array, but answers are taken as they
//! come: one outer ```` ```json ```` fence is tolerated and stripped, a lone
//! object counts as a single record. Nothing else is repaired; a trailing
//! comma or prose around the JSON is a [`DocumentError::ResponseParse`].

use crate::error::DocumentError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Fields of one record, in the order the model emitted them.
pub type FieldMap = Map<String, Value>;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

/// Parse one model answer into zero or more records.
pub fn parse_records(response: &str) -> Result<Vec<FieldMap>, DocumentError> {
    let body = strip_outer_fence(response);

    let value: Value = serde_json::from_str(body).map_err(|e| DocumentError::ResponseParse {
        detail: e.to_string(),
        response: response.to_string(),
    })?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => Ok(map),
                other => Err(DocumentError::ResponseParse {
                    detail: format!("array element {i} is {}, expected an object", kind(&other)),
                    response: response.to_string(),
                }),
            })
            .collect(),
        Value::Object(map) => Ok(vec![map]),
        other => Err(DocumentError::ResponseParse {
            detail: format!("top-level value is {}, expected an array or object", kind(&other)),
            response: response.to_string(),
        }),
    }
}

fn strip_outer_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_of_objects_yields_one_record_each() {
        let records = parse_records(
            r#"[{"DATE": "2023-01-05", "AMOUNT": 19.99}, {"DATE": "2023-01-06"}, {}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["AMOUNT"], json!(19.99));
        assert!(records[2].is_empty());
    }

    #[test]
    fn keys_keep_response_order() {
        let records = parse_records(r#"[{"VENDOR": "Acme", "DATE": "x", "AMOUNT": 1}]"#).unwrap();
        let keys: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["VENDOR", "DATE", "AMOUNT"]);
    }

    #[test]
    fn single_object_is_one_record() {
        let records = parse_records(r#"{"ITEM": "Widget"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["ITEM"], json!("Widget"));
    }

    #[test]
    fn empty_array_is_zero_records() {
        assert!(parse_records("[]").unwrap().is_empty());
        assert!(parse_records("  [ ]\n").unwrap().is_empty());
    }

    #[test]
    fn trailing_comma_is_rejected() {
        let err = parse_records(r#"[{"DATE": "2023-01-05"},]"#).unwrap_err();
        match err {
            DocumentError::ResponseParse { response, .. } => {
                assert_eq!(response, r#"[{"DATE": "2023-01-05"},]"#)
            }
            other => panic!("expected ResponseParse, got {other:?}"),
        }
    }

    #[test]
    fn fenced_json_is_accepted() {
        let records = parse_records("```json\n[{\"AMOUNT\": \"19.99\"}]\n```").unwrap();
        assert_eq!(records.len(), 1);

        let records = parse_records("```\n{\"AMOUNT\": 1}\n```\n").unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn prose_around_json_is_rejected() {
        assert!(parse_records("Here is the data: [{\"a\": 1}]").is_err());
    }

    #[test]
    fn non_object_elements_are_rejected() {
        let err = parse_records(r#"[{"a": 1}, "b"]"#).unwrap_err();
        assert!(err.to_string().contains("array element 1 is a string"), "{err}");
    }

    #[test]
    fn scalar_top_level_is_rejected() {
        let err = parse_records("42").unwrap_err();
        assert!(err.to_string().contains("a number"), "{err}");
        assert!(parse_records("null").is_err());
        assert!(parse_records("").is_err());
    }
}
