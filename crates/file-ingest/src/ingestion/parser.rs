//! Parser contract and format dispatch

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::csv_parser::CsvParser;
use super::detector::FormatKind;
use super::fallback::FallbackParser;
use super::pdf::PdfParser;
use super::spreadsheet::SpreadsheetParser;
use crate::types::ParsedDocument;

/// Parser failures, recorded on the file record as its error message
#[derive(Debug, Error)]
pub enum ParseError {
    /// No consistent delimiter in the CSV sample
    #[error("Could not determine delimiter")]
    MalformedDelimiter,

    /// Bytes are not valid UTF-8
    #[error("File is not valid UTF-8: {0}")]
    Encoding(String),

    /// File could not be read
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook could not be opened or its first sheet read
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Document structure is broken
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// Text extraction failed on one page
    #[error("Corrupt document: page {page}: {message}")]
    CorruptPage { page: u32, message: String },
}

/// Receives progress checkpoints from a running parser
pub trait ProgressSink {
    fn report(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Forwards only strictly increasing checkpoints, clipped to 100
pub struct Checkpoints<'a> {
    sink: &'a mut dyn ProgressSink,
    last: Option<u8>,
}

impl<'a> Checkpoints<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: None }
    }

    pub fn report(&mut self, percent: usize) {
        let percent = percent.min(100) as u8;
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.sink.report(percent);
    }
}

/// What a parser knows about the file it is reading
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Location of the stored bytes
    pub path: PathBuf,
    /// Filename as declared by the client
    pub original_name: String,
    /// Size in bytes
    pub file_size: u64,
    /// Declared MIME type
    pub mime_type: String,
}

/// Make column names unique: repeats of `a` become `a.1`, `a.2`, ...
pub fn unique_headers(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();

    names
        .into_iter()
        .map(|name| {
            if taken.insert(name.clone()) {
                return name;
            }
            let next = suffixes.entry(name.clone()).or_insert(0);
            loop {
                *next += 1;
                let candidate = format!("{}.{}", name, next);
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
            }
        })
        .collect()
}

/// A format-specific parser
pub trait DocumentParser: Send + Sync {
    /// Parse the file, reporting checkpoints as work completes
    fn parse(
        &self,
        ctx: &ParseContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParsedDocument, ParseError>;
}

/// Parser registry keyed by detected format
#[derive(Clone)]
pub struct FileParser {
    parsers: HashMap<FormatKind, Arc<dyn DocumentParser>>,
}

impl Default for FileParser {
    fn default() -> Self {
        let mut parsers: HashMap<FormatKind, Arc<dyn DocumentParser>> = HashMap::new();
        parsers.insert(FormatKind::Csv, Arc::new(CsvParser));
        parsers.insert(FormatKind::Spreadsheet, Arc::new(SpreadsheetParser));
        parsers.insert(FormatKind::Pdf, Arc::new(PdfParser));
        parsers.insert(FormatKind::Opaque, Arc::new(FallbackParser));
        Self { parsers }
    }
}

impl FileParser {
    /// Replace the parser used for `kind`
    pub fn with_parser(mut self, kind: FormatKind, parser: Arc<dyn DocumentParser>) -> Self {
        self.parsers.insert(kind, parser);
        self
    }

    /// Parser handling `kind`
    pub fn parser_for(&self, kind: FormatKind) -> Arc<dyn DocumentParser> {
        self.parsers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(FallbackParser) as Arc<dyn DocumentParser>)
    }

    /// Parse a file of the given kind
    pub fn parse(
        &self,
        kind: FormatKind,
        ctx: &ParseContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParsedDocument, ParseError> {
        tracing::debug!(
            "Parsing {} as {:?} ({} bytes)",
            ctx.original_name,
            kind,
            ctx.file_size
        );
        self.parser_for(kind).parse(ctx, progress)
    }
}
