//! Workbook parsing (first sheet only)

use calamine::{Data, Reader};
use serde_json::Value;

use super::parser::{
    unique_headers, Checkpoints, DocumentParser, ParseContext, ParseError, ProgressSink,
};
use crate::types::{ParsedDocument, Row, TabularFormat};

/// Parses xlsx/xls/ods workbooks
pub struct SpreadsheetParser;

impl DocumentParser for SpreadsheetParser {
    fn parse(
        &self,
        ctx: &ParseContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParsedDocument, ParseError> {
        let bytes = std::fs::read(&ctx.path)?;
        let mut checkpoints = Checkpoints::new(progress);

        let cursor = std::io::Cursor::new(bytes);
        let mut workbook = calamine::open_workbook_auto_from_rs(cursor)
            .map_err(|e| ParseError::UnsupportedFormat(e.to_string()))?;
        checkpoints.report(30);

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ParseError::UnsupportedFormat("Workbook has no sheets".to_string()))?
            .map_err(|e| ParseError::UnsupportedFormat(e.to_string()))?;
        checkpoints.report(60);

        let mut rows_iter = range.rows();
        let headers = unique_headers(
            rows_iter
                .next()
                .map(|cells| {
                    cells
                        .iter()
                        .enumerate()
                        .map(|(i, cell)| header_name(i, cell))
                        .collect()
                })
                .unwrap_or_default(),
        );

        let rows: Vec<Row> = rows_iter
            .map(|cells| {
                let mut row = Row::new();
                for (i, header) in headers.iter().enumerate() {
                    row.insert(header.clone(), cells.get(i).map(cell_value).unwrap_or(Value::Null));
                }
                row
            })
            .collect();
        checkpoints.report(80);

        tracing::debug!("Parsed {} rows from first sheet of {}", rows.len(), ctx.original_name);

        Ok(ParsedDocument::tabular(TabularFormat::Spreadsheet, headers, rows))
    }
}

/// Header text for a cell; blank cells get a positional name
fn header_name(index: usize, cell: &Data) -> String {
    let name = match cell {
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    };
    if name.is_empty() {
        format!("Unnamed: {}", index)
    } else {
        name
    }
}

/// Largest magnitude below which every integer is exact in an f64
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Convert a cell to JSON, keeping its native type where JSON has one.
/// xlsx stores every number as a float, so whole values come back as ints.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT => {
            Value::from(*f as i64)
        }
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Value::String(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}
