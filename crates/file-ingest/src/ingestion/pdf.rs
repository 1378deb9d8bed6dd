//! Page-by-page PDF text extraction

use lopdf::Document;

use super::parser::{Checkpoints, DocumentParser, ParseContext, ParseError, ProgressSink};
use crate::types::{PageText, ParsedDocument};

/// A paginated document that yields text one page at a time
pub trait PageSource {
    /// Number of pages
    fn page_count(&self) -> u32;

    /// Text of a page (1-indexed)
    fn extract_page(&self, page_number: u32) -> Result<String, String>;
}

/// `PageSource` backed by a loaded lopdf document
pub struct LopdfSource {
    doc: Document,
    page_numbers: Vec<u32>,
}

impl LopdfSource {
    /// Load a document from memory
    pub fn load(bytes: &[u8]) -> Result<Self, ParseError> {
        let doc = Document::load_mem(bytes)
            .map_err(|e| ParseError::CorruptDocument(format!("Failed to load PDF: {}", e)))?;
        let page_numbers = doc.get_pages().keys().copied().collect();
        Ok(Self { doc, page_numbers })
    }
}

impl PageSource for LopdfSource {
    fn page_count(&self) -> u32 {
        self.page_numbers.len() as u32
    }

    fn extract_page(&self, page_number: u32) -> Result<String, String> {
        let index = page_number.checked_sub(1).ok_or("page numbers start at 1")?;
        let actual = self
            .page_numbers
            .get(index as usize)
            .ok_or_else(|| format!("page {} out of range", page_number))?;
        self.doc.extract_text(&[*actual]).map_err(|e| e.to_string())
    }
}

/// Parses PDF documents into per-page text
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(
        &self,
        ctx: &ParseContext,
        progress: &mut dyn ProgressSink,
    ) -> Result<ParsedDocument, ParseError> {
        let bytes = std::fs::read(&ctx.path)?;
        let source = LopdfSource::load(&bytes)?;
        tracing::debug!("{} has {} pages", ctx.original_name, source.page_count());
        extract_pages(&source, progress)
    }
}

/// Extract every page in order; one failing page fails the document.
/// After page `i` (0-based) of `n`, reports `30 + i * 50 / n`.
pub fn extract_pages(
    source: &dyn PageSource,
    progress: &mut dyn ProgressSink,
) -> Result<ParsedDocument, ParseError> {
    let mut checkpoints = Checkpoints::new(progress);
    let total = source.page_count();
    let mut pages = Vec::with_capacity(total as usize);

    for i in 0..total {
        let page_number = i + 1;
        let text = source
            .extract_page(page_number)
            .map_err(|message| ParseError::CorruptPage { page: page_number, message })?;
        pages.push(PageText { page_number, text });
        checkpoints.report(30 + (i as usize) * 50 / total as usize);
    }

    Ok(ParsedDocument::text(pages))
}
