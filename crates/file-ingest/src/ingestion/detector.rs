//! Format detection from declared MIME type and filename

use serde::{Deserialize, Serialize};

use crate::config::FormatConfig;

/// Parser family chosen for a file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Csv,
    Spreadsheet,
    Pdf,
    Opaque,
}

/// Maps a declared MIME type and filename to a parser family.
///
/// Rules are checked in order: text/CSV, spreadsheet, PDF, then opaque.
/// Extensions match case-insensitively and MIME parameters are ignored.
#[derive(Debug, Clone, Default)]
pub struct FormatDetector {
    config: FormatConfig,
}

impl FormatDetector {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    /// Detect the format. Never fails; unknown input is opaque.
    pub fn detect(&self, mime_type: &str, filename: &str) -> FormatKind {
        let mime = mime_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        let name = filename.to_lowercase();
        let has_ext = |exts: &[String]| exts.iter().any(|e| name.ends_with(&e.to_lowercase()));
        let mime_in = |types: &[String]| types.iter().any(|t| t.eq_ignore_ascii_case(&mime));

        if (!self.config.text_mime_prefix.is_empty()
            && mime.starts_with(&self.config.text_mime_prefix.to_ascii_lowercase()))
            || has_ext(&self.config.csv_extensions)
        {
            FormatKind::Csv
        } else if mime_in(&self.config.spreadsheet_mime_types)
            || has_ext(&self.config.spreadsheet_extensions)
        {
            FormatKind::Spreadsheet
        } else if mime_in(&self.config.pdf_mime_types) || has_ext(&self.config.pdf_extensions) {
            FormatKind::Pdf
        } else {
            FormatKind::Opaque
        }
    }
}
