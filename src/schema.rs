//! Field schema: which data points to extract and what each one means.
//!
//! The schema is supplied by the caller as a string. Two spellings are
//! accepted:
//!
//! * a strict JSON object, e.g. `{"DATE": "The date ...", "AMOUNT": "..."}`
//! * the looser dict-style form users tend to type by hand, with single
//!   quotes and a trailing comma, e.g. `{'DATE': 'The date ...',}`
//!
//! Field order is preserved; it becomes the order the fields are listed in
//! the prompt.

use crate::error::Pdf2TableError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered mapping of field name → natural-language description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<(String, String)>,
}

impl Default for FieldSchema {
    /// DATE, ITEM, AMOUNT, VENDOR: the invoice fields the tool was built for.
    fn default() -> Self {
        Self {
            fields: vec![
                ("DATE".into(), "The date when the invoice was issued".into()),
                ("ITEM".into(), "The purchased item listed in the invoice".into()),
                ("AMOUNT".into(), "The invoice amount".into()),
                (
                    "VENDOR".into(),
                    "The name of the company that issued the invoice".into(),
                ),
            ],
        }
    }
}

static RE_DICT_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:'([^']*)'|"((?:[^"\\]|\\.)*)")\s*:\s*(?:'([^']*)'|"((?:[^"\\]|\\.)*)")"#,
    )
    .unwrap()
});

impl FieldSchema {
    /// Create an empty schema; add fields with [`FieldSchema::with_field`].
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field. A field with the same name replaces the earlier description.
    pub fn with_field(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let description = description.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = description,
            None => self.fields.push((name, description)),
        }
        self
    }

    /// Parse a schema from its JSON or dict-style textual form.
    ///
    /// Values that are not strings in the JSON form are rendered with their
    /// JSON representation. An empty schema is rejected.
    pub fn parse(input: &str) -> Result<Self, Pdf2TableError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Pdf2TableError::InvalidSchema("schema is empty".into()));
        }

        let schema = match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(map)) => {
                map.into_iter()
                    .fold(Self::new(), |schema, (name, value)| {
                        let description = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        schema.with_field(name, description)
                    })
            }
            Ok(other) => {
                return Err(Pdf2TableError::InvalidSchema(format!(
                    "expected an object of field → description, got {}",
                    json_kind(&other)
                )))
            }
            Err(_) => Self::parse_dict_style(trimmed)?,
        };

        if schema.is_empty() {
            return Err(Pdf2TableError::InvalidSchema(
                "schema defines no fields".into(),
            ));
        }
        Ok(schema)
    }

    fn parse_dict_style(input: &str) -> Result<Self, Pdf2TableError> {
        if !(input.starts_with('{') && input.ends_with('}')) {
            return Err(Pdf2TableError::InvalidSchema(
                "expected a JSON object or a {'FIELD': 'description'} mapping".into(),
            ));
        }
        let schema = RE_DICT_PAIR
            .captures_iter(input)
            .fold(Self::new(), |schema, caps| {
                let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                let desc = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
                schema.with_field(name.trim(), desc.trim())
            });
        Ok(schema)
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    /// `(name, description)` pairs in declaration order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render the schema as a pretty JSON object for inclusion in the prompt.
    pub fn describe(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(n, d)| (n.clone(), serde_json::Value::String(d.clone())))
            .collect();
        // A map of strings always serialises.
        serde_json::to_string_pretty(&map).unwrap_or_default()
    }
}

impl fmt::Display for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DICT_STYLE_DEFAULT: &str = "{
    'DATE': 'The date when the invoice was issued',
    'ITEM': 'The purchased item listed in the invoice',
    'AMOUNT': 'The invoice amount',
    'VENDOR': 'The name of the company that issued the invoice',
    }";

    #[test]
    fn default_schema_has_invoice_fields() {
        let s = FieldSchema::default();
        let names: Vec<&str> = s.field_names().collect();
        assert_eq!(names, vec!["DATE", "ITEM", "AMOUNT", "VENDOR"]);
    }

    #[test]
    fn parse_strict_json_preserves_order() {
        let s = FieldSchema::parse(r#"{"VENDOR": "who", "AMOUNT": "how much"}"#).unwrap();
        let names: Vec<&str> = s.field_names().collect();
        assert_eq!(names, vec!["VENDOR", "AMOUNT"]);
        assert_eq!(s.fields()[1].1, "how much");
    }

    #[test]
    fn parse_dict_style_with_trailing_comma() {
        let s = FieldSchema::parse(DICT_STYLE_DEFAULT).unwrap();
        assert_eq!(s, FieldSchema::default());
    }

    #[test]
    fn parse_rejects_empty_and_non_objects() {
        assert!(FieldSchema::parse("").is_err());
        assert!(FieldSchema::parse("{}").is_err());
        assert!(FieldSchema::parse("[1, 2]").is_err());
        assert!(FieldSchema::parse("DATE, AMOUNT").is_err());
    }

    #[test]
    fn with_field_replaces_duplicates() {
        let s = FieldSchema::new()
            .with_field("A", "first")
            .with_field("B", "second")
            .with_field("A", "replaced");
        assert_eq!(s.len(), 2);
        assert_eq!(s.fields()[0], ("A".to_string(), "replaced".to_string()));
    }

    #[test]
    fn describe_is_valid_json() {
        let described = FieldSchema::default().describe();
        let back: serde_json::Value = serde_json::from_str(&described).unwrap();
        assert_eq!(back["AMOUNT"], "The invoice amount");
    }
}
