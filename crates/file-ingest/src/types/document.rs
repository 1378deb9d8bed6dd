//! Structured parser output attached to a ready file record

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One parsed table row, keyed by header in column order
pub type Row = serde_json::Map<String, Value>;

/// Rows kept in the full `data` payload
pub const MAX_DATA_ROWS: usize = 100;

/// Rows kept in the `sample_data` preview
pub const MAX_SAMPLE_ROWS: usize = 5;

/// Note recorded for files no parser understands
pub const UNSUPPORTED_NOTE: &str =
    "File uploaded successfully. Parsing not supported for this file type.";

/// Source format of a tabular document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    Csv,
    Spreadsheet,
}

/// Text extracted from a single page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageText {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Extracted text, empty when the page has none
    pub text: String,
}

/// Structured content produced by a parser
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParsedDocument {
    /// Rows and columns from a CSV file or the first sheet of a workbook
    Tabular {
        format: TabularFormat,
        headers: Vec<String>,
        /// Number of rows parsed
        #[serde(rename = "rows")]
        row_count: usize,
        /// Number of data rows in the source
        #[serde(rename = "total_rows")]
        total_row_count: usize,
        /// First `MAX_DATA_ROWS` rows
        #[serde(rename = "data")]
        data_rows: Vec<Row>,
        /// First `MAX_SAMPLE_ROWS` rows
        #[serde(rename = "sample_data")]
        sample_rows: Vec<Row>,
        /// Sheets read (spreadsheets only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sheets: Option<u32>,
    },
    /// Page text from a PDF
    Text {
        page_count: u32,
        pages: Vec<PageText>,
        full_text: String,
        word_count: usize,
        char_count: usize,
    },
    /// Metadata only, for unsupported formats
    Opaque {
        filename: String,
        size: u64,
        mime_type: String,
        note: String,
    },
}

impl ParsedDocument {
    /// Build a tabular document, applying the row truncation policy
    pub fn tabular(format: TabularFormat, headers: Vec<String>, rows: Vec<Row>) -> Self {
        let total = rows.len();
        let sample_rows = rows.iter().take(MAX_SAMPLE_ROWS).cloned().collect();
        let mut data_rows = rows;
        data_rows.truncate(MAX_DATA_ROWS);

        Self::Tabular {
            format,
            headers,
            row_count: total,
            total_row_count: total,
            data_rows,
            sample_rows,
            sheets: match format {
                TabularFormat::Spreadsheet => Some(1),
                TabularFormat::Csv => None,
            },
        }
    }

    /// Build a text document from ordered page texts
    pub fn text(pages: Vec<PageText>) -> Self {
        let full_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = full_text.split_whitespace().count();
        let char_count = full_text.chars().count();

        Self::Text {
            page_count: pages.len() as u32,
            pages,
            full_text,
            word_count,
            char_count,
        }
    }

    /// Build the placeholder document for unsupported formats
    pub fn opaque(filename: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self::Opaque {
            filename: filename.into(),
            size,
            mime_type: mime_type.into(),
            note: UNSUPPORTED_NOTE.to_string(),
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tabular { .. } => "tabular",
            Self::Text { .. } => "text",
            Self::Opaque { .. } => "opaque",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(i: usize) -> Row {
        let mut row = Row::new();
        row.insert("n".to_string(), json!(i));
        row
    }

    #[test]
    fn test_tabular_truncation() {
        let rows: Vec<Row> = (0..250).map(row).collect();
        let doc = ParsedDocument::tabular(TabularFormat::Csv, vec!["n".into()], rows);

        match doc {
            ParsedDocument::Tabular { row_count, total_row_count, data_rows, sample_rows, sheets, .. } => {
                assert_eq!(row_count, 250);
                assert_eq!(total_row_count, 250);
                assert_eq!(data_rows.len(), MAX_DATA_ROWS);
                assert_eq!(sample_rows.len(), MAX_SAMPLE_ROWS);
                assert_eq!(sample_rows[4]["n"], json!(4));
                assert!(sheets.is_none());
            }
            other => panic!("unexpected document: {:?}", other),
        }
    }

    #[test]
    fn test_text_counts() {
        let doc = ParsedDocument::text(vec![
            PageText { page_number: 1, text: "hello  world".into() },
            PageText { page_number: 2, text: String::new() },
            PageText { page_number: 3, text: "bye".into() },
        ]);

        match doc {
            ParsedDocument::Text { page_count, full_text, word_count, char_count, .. } => {
                assert_eq!(page_count, 3);
                assert_eq!(full_text, "hello  world  bye");
                assert_eq!(word_count, 3);
                assert_eq!(char_count, 17);
            }
            other => panic!("unexpected document: {:?}", other),
        }
    }

    #[test]
    fn test_serialized_shape() {
        let doc = ParsedDocument::tabular(TabularFormat::Spreadsheet, vec!["n".into()], vec![row(1)]);
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["type"], "tabular");
        assert_eq!(value["format"], "spreadsheet");
        assert_eq!(value["total_rows"], 1);
        assert_eq!(value["sample_data"][0]["n"], 1);
        assert_eq!(value["sheets"], 1);

        let back: ParsedDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }
}
