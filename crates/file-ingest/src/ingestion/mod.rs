//! Format detection and parsers for uploaded files

mod csv_parser;
mod detector;
mod fallback;
mod parser;
pub mod pdf;
mod spreadsheet;

pub use csv_parser::{sniff_delimiter, CsvParser};
pub use detector::{FormatDetector, FormatKind};
pub use fallback::FallbackParser;
pub use parser::{
    Checkpoints, DocumentParser, FileParser, ParseContext, ParseError, ProgressSink,
};
pub use pdf::{PageSource, PdfParser};
pub use spreadsheet::SpreadsheetParser;
