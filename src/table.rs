//! Tabulation of extracted records and CSV export.
//!
//! Columns are the union of every record's field names in first-seen order,
//! so a field the model only returned for a later document still gets a
//! column. A record lacking a column leaves that cell empty.

use crate::error::Pdf2TableError;
use crate::output::ExtractedRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Header of the optional provenance column.
pub const SOURCE_COLUMN: &str = "source";

/// Records normalised into rows and columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTable {
    pub columns: Vec<String>,
    /// One row per record; `None` is an empty cell (missing field or null).
    pub rows: Vec<Vec<Option<String>>>,
    /// Source document of each row, parallel to `rows`.
    pub sources: Vec<String>,
}

impl RecordTable {
    /// Build a table from records in accumulation order.
    ///
    /// Fails with [`Pdf2TableError::TableConstruction`] when a value is an
    /// array or object, which has no single-cell rendering.
    pub fn from_records(records: &[ExtractedRecord]) -> Result<Self, Pdf2TableError> {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.fields.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(records.len());
        let mut sources = Vec::with_capacity(records.len());
        for (n, record) in records.iter().enumerate() {
            let row = columns
                .iter()
                .map(|col| match record.fields.get(col) {
                    None => Ok(None),
                    Some(value) => cell(value).map_err(|kind| Pdf2TableError::TableConstruction {
                        detail: format!(
                            "record {} from '{}': field '{}' holds {}, not a scalar",
                            n + 1,
                            record.document,
                            col,
                            kind
                        ),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
            sources.push(record.document.clone());
        }

        debug!("Built table: {} columns × {} rows", columns.len(), rows.len());
        Ok(Self {
            columns,
            rows,
            sources,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `(row, column name)`, if present and non-empty.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Serialise as UTF-8 CSV with a header row.
    ///
    /// With `include_source`, a leading `source` column names each row's document.
    pub fn to_csv_bytes(&self, include_source: bool) -> Result<Vec<u8>, Pdf2TableError> {
        let mut wtr = csv::Writer::from_writer(vec![]);

        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if include_source {
            header.push(SOURCE_COLUMN);
        }
        header.extend(self.columns.iter().map(String::as_str));
        if header.is_empty() {
            return Ok(Vec::new());
        }
        wtr.write_record(&header)?;

        for (row, source) in self.rows.iter().zip(&self.sources) {
            let mut out: Vec<&str> = Vec::with_capacity(header.len());
            if include_source {
                out.push(source);
            }
            out.extend(row.iter().map(|c| c.as_deref().unwrap_or("")));
            wtr.write_record(&out)?;
        }

        wtr.into_inner()
            .map_err(|e| Pdf2TableError::Internal(format!("CSV buffer: {}", e.error())))
    }

    /// Write the CSV to `path` atomically: a temp file in the same directory
    /// is written, then renamed over the target.
    pub fn write_csv(&self, path: &Path, include_source: bool) -> Result<(), Pdf2TableError> {
        let bytes = self.to_csv_bytes(include_source)?;
        let write_err = |source: std::io::Error| Pdf2TableError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// Render a scalar as cell text; on failure returns the value's kind.
fn cell(value: &Value) -> Result<Option<String>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) => Err("an array"),
        Value::Object(_) => Err("an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(doc: &str, v: Value) -> ExtractedRecord {
        ExtractedRecord {
            document: doc.into(),
            fields: match v {
                Value::Object(m) => m,
                _ => unreachable!(),
            },
        }
    }

    #[test]
    fn columns_are_union_in_first_seen_order() {
        let records = vec![
            record("a.pdf", json!({"DATE": "2023-01-05", "AMOUNT": 19.99})),
            record("b.pdf", json!({"VENDOR": "Acme Co", "DATE": "2023-02-01"})),
        ];
        let table = RecordTable::from_records(&records).unwrap();
        assert_eq!(table.columns, ["DATE", "AMOUNT", "VENDOR"]);
        assert_eq!(table.get(0, "AMOUNT"), Some("19.99"));
        assert_eq!(table.get(0, "VENDOR"), None);
        assert_eq!(table.get(1, "VENDOR"), Some("Acme Co"));
        assert_eq!(table.sources, ["a.pdf", "b.pdf"]);
    }

    #[test]
    fn scalars_render_as_text() {
        let records = vec![record(
            "a.pdf",
            json!({"s": "x", "i": 3, "f": 1.5, "b": true, "n": null}),
        )];
        let table = RecordTable::from_records(&records).unwrap();
        assert_eq!(
            table.rows[0],
            vec![
                Some("x".to_string()),
                Some("3".to_string()),
                Some("1.5".to_string()),
                Some("true".to_string()),
                None
            ]
        );
    }

    #[test]
    fn nested_value_fails_construction() {
        let records = vec![
            record("a.pdf", json!({"ITEM": "Widget"})),
            record("b.pdf", json!({"ITEM": ["Widget", "Gadget"]})),
        ];
        let err = RecordTable::from_records(&records).unwrap_err();
        match err {
            Pdf2TableError::TableConstruction { detail } => {
                assert!(detail.contains("b.pdf"), "{detail}");
                assert!(detail.contains("an array"), "{detail}");
            }
            other => panic!("expected TableConstruction, got {other:?}"),
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let records = vec![
            record("inv.pdf", json!({"DATE": "2023-01-05", "ITEM": "Widget, large"})),
            record("inv.pdf", json!({"DATE": "2023-01-06"})),
        ];
        let table = RecordTable::from_records(&records).unwrap();
        let csv = String::from_utf8(table.to_csv_bytes(false).unwrap()).unwrap();
        assert_eq!(
            csv,
            "DATE,ITEM\n2023-01-05,\"Widget, large\"\n2023-01-06,\n"
        );
    }

    #[test]
    fn csv_source_column_leads() {
        let records = vec![record("inv.pdf", json!({"AMOUNT": "19.99"}))];
        let table = RecordTable::from_records(&records).unwrap();
        let csv = String::from_utf8(table.to_csv_bytes(true).unwrap()).unwrap();
        assert_eq!(csv, "source,AMOUNT\ninv.pdf,19.99\n");
    }

    #[test]
    fn write_csv_creates_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("receipts_data.csv");
        let table =
            RecordTable::from_records(&[record("a.pdf", json!({"VENDOR": "Acme Co"}))]).unwrap();

        table.write_csv(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "VENDOR\nAcme Co\n");

        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1, "temp file must be renamed, not left behind");
    }
}
