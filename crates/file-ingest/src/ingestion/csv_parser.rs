//! Delimited text parsing with delimiter sniffing

use serde_json::Value;

use super::parser::{
    unique_headers, Checkpoints, DocumentParser, ParseContext, ParseError, ProgressSink,
};
use crate::types::{ParsedDocument, Row, TabularFormat};

/// Bytes inspected when guessing the delimiter
pub const SNIFF_SAMPLE_BYTES: usize = 1024;

/// Delimiters considered, in order of preference
const CANDIDATE_DELIMITERS: [u8; 5] = [b',', b';', b'\t', b'|', b':'];

/// Key holding fields beyond the header width
const EXTRA_FIELDS_KEY: &str = "_extra";

/// Parses CSV and other delimited text files
pub struct CsvParser;

impl DocumentParser for CsvParser {
    fn parse(
        &self,
        ctx: &ParseContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParsedDocument, ParseError> {
        let bytes = std::fs::read(&ctx.path)?;
        let text = decode_utf8(&bytes)?;
        let mut checkpoints = Checkpoints::new(progress);

        let delimiter = sniff_delimiter(text).ok_or(ParseError::MalformedDelimiter)?;
        checkpoints.report(30);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());
        let mut headers = unique_headers(
            reader
                .headers()
                .map_err(csv_error)?
                .iter()
                .map(str::to_string)
                .collect(),
        );
        let extra_key = extra_fields_key(&headers);
        checkpoints.report(50);

        let mut rows = Vec::new();
        let mut has_extra = false;
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(csv_error)?;
            let row = record_to_row(&headers, &extra_key, &record);
            has_extra |= row.contains_key(&extra_key);
            rows.push(row);
            if i % 100 == 0 {
                checkpoints.report((50 + i * 30 / 1000).min(80));
            }
        }

        // Every row carries every header, so the overflow column is listed too
        if has_extra {
            for row in rows.iter_mut() {
                row.entry(extra_key.clone()).or_insert(Value::Null);
            }
            headers.push(extra_key);
        }

        tracing::debug!(
            "Parsed {} rows from {} (delimiter {:?})",
            rows.len(),
            ctx.original_name,
            delimiter as char
        );

        Ok(ParsedDocument::tabular(TabularFormat::Csv, headers, rows))
    }
}

/// Strict UTF-8 decode with a leading BOM removed
fn decode_utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))
}

/// Pick the first candidate delimiter that appears the same nonzero number
/// of times in every complete record of the leading sample.
pub fn sniff_delimiter(text: &str) -> Option<u8> {
    let truncated = text.len() > SNIFF_SAMPLE_BYTES;
    let mut end = text.len().min(SNIFF_SAMPLE_BYTES);
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    let records = delimiter_counts(&text[..end], truncated);
    let first = records.first()?;

    CANDIDATE_DELIMITERS
        .iter()
        .enumerate()
        .find(|&(i, _)| first[i] > 0 && records.iter().all(|r| r[i] == first[i]))
        .map(|(_, &delim)| delim)
}

type DelimiterCounts = [usize; CANDIDATE_DELIMITERS.len()];

/// Unquoted delimiter counts per non-blank logical record. Quote state
/// carries across newlines, so a quoted field may span lines. The trailing
/// record of a truncated sample is dropped unless it is the only one.
fn delimiter_counts(sample: &str, truncated: bool) -> Vec<DelimiterCounts> {
    let mut records = Vec::new();
    let mut counts: DelimiterCounts = [0; CANDIDATE_DELIMITERS.len()];
    let mut in_quotes = false;
    let mut blank = true;

    for b in sample.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
            blank = false;
            continue;
        }
        if in_quotes {
            continue;
        }
        if b == b'\n' {
            if !blank {
                records.push(counts);
            }
            counts = [0; CANDIDATE_DELIMITERS.len()];
            blank = true;
            continue;
        }
        if let Some(i) = CANDIDATE_DELIMITERS.iter().position(|&d| d == b) {
            counts[i] += 1;
            blank = false;
        } else if !b.is_ascii_whitespace() {
            blank = false;
        }
    }

    if !blank && (!truncated || records.is_empty()) {
        records.push(counts);
    }
    records
}

/// Key for overflow fields that does not clash with a header
fn extra_fields_key(headers: &[String]) -> String {
    let mut key = EXTRA_FIELDS_KEY.to_string();
    let mut n = 0;
    while headers.contains(&key) {
        n += 1;
        key = format!("{}.{}", EXTRA_FIELDS_KEY, n);
    }
    key
}

fn record_to_row(headers: &[String], extra_key: &str, record: &csv::StringRecord) -> Row {
    let mut row = Row::new();
    for (i, header) in headers.iter().enumerate() {
        let value = record
            .get(i)
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null);
        row.insert(header.clone(), value);
    }
    if record.len() > headers.len() {
        let extra = record
            .iter()
            .skip(headers.len())
            .map(|v| Value::String(v.to_string()))
            .collect();
        row.insert(extra_key.to_string(), Value::Array(extra));
    }
    row
}

fn csv_error(err: csv::Error) -> ParseError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => ParseError::Io(e),
        csv::ErrorKind::Utf8 { err, .. } => ParseError::Encoding(err.to_string()),
        other => ParseError::CorruptDocument(format!("{:?}", other)),
    }
}
