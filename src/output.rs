//! Output types returned by the extraction API.

use crate::error::DocumentError;
use crate::pipeline::parse::FieldMap;
use crate::table::RecordTable;
use serde::{Deserialize, Serialize};

/// One extracted row: field values plus the document they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Display name of the source document.
    pub document: String,
    /// Field name → scalar JSON value, in the order the model returned them.
    pub fields: FieldMap,
}

/// All records of a run, in document order then response order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    records: Vec<ExtractedRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the records of one document.
    pub fn extend_from_document(&mut self, document: &str, maps: impl IntoIterator<Item = FieldMap>) {
        self.records.extend(maps.into_iter().map(|fields| ExtractedRecord {
            document: document.to_string(),
            fields,
        }));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtractedRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[ExtractedRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a ExtractedRecord;
    type IntoIter = std::slice::Iter<'a, ExtractedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl From<Vec<ExtractedRecord>> for ResultSet {
    fn from(records: Vec<ExtractedRecord>) -> Self {
        Self { records }
    }
}

/// Outcome for one input document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentResult {
    /// Zero-based position in the input batch.
    pub index: usize,
    pub name: String,
    /// Records extracted from this document (empty on failure).
    pub records: Vec<FieldMap>,
    /// Pages rendered (0 if rasterisation failed).
    pub pages: usize,
    /// Characters of OCR text sent to the model.
    pub text_chars: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Wall-clock time for the whole document, all stages.
    pub duration_ms: u64,
    /// Transport retries spent on model calls.
    pub retries: u32,
    /// The first answer did not parse and a corrective prompt was sent.
    pub corrective_retry_used: bool,
    /// Set when the document failed; `records` is then empty.
    pub error: Option<DocumentError>,
}

impl DocumentResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// How the accumulated records are presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableView {
    /// No records at all.
    Empty,
    /// Records normalised into rows and columns.
    Table(RecordTable),
    /// Records could not be tabulated; shown as-is with the reason.
    Raw {
        records: Vec<ExtractedRecord>,
        message: String,
    },
}

impl TableView {
    pub fn as_table(&self) -> Option<&RecordTable> {
        match self {
            TableView::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TableView::Empty)
    }
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_documents: usize,
    pub processed_documents: usize,
    pub failed_documents: usize,
    pub total_pages: usize,
    pub total_records: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub corrective_retries: usize,
    pub total_duration_ms: u64,
}

/// Everything an extraction run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub records: ResultSet,
    /// Per-document outcomes in input order.
    pub documents: Vec<DocumentResult>,
    pub table: TableView,
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: serde_json::Value) -> FieldMap {
        match v {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn result_set_tags_provenance() {
        let mut set = ResultSet::new();
        set.extend_from_document("a.pdf", vec![map(json!({"X": 1})), map(json!({"X": 2}))]);
        set.extend_from_document("b.pdf", vec![map(json!({"X": 3}))]);

        let docs: Vec<&str> = set.iter().map(|r| r.document.as_str()).collect();
        assert_eq!(docs, ["a.pdf", "a.pdf", "b.pdf"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn table_view_serialises_with_kind_tag() {
        let v = serde_json::to_value(TableView::Empty).unwrap();
        assert_eq!(v, json!({"kind": "empty"}));

        let raw = TableView::Raw {
            records: vec![],
            message: "nested".into(),
        };
        let v = serde_json::to_value(raw).unwrap();
        assert_eq!(v["kind"], "raw");
        assert_eq!(v["message"], "nested");
    }

    #[test]
    fn document_result_success_flag() {
        let mut r = DocumentResult::default();
        assert!(r.is_success());
        r.error = Some(DocumentError::DocumentFormat {
            detail: "bad".into(),
        });
        assert!(!r.is_success());
    }
}
