//! Metadata-only handling for formats without a parser

use super::parser::{DocumentParser, ParseContext, ParseError, ProgressSink};
use crate::types::ParsedDocument;

/// Records file metadata without reading the bytes
pub struct FallbackParser;

impl DocumentParser for FallbackParser {
    fn parse(
        &self,
        ctx: &ParseContext,
        _progress: &mut dyn ProgressSink,
    ) -> Result<ParsedDocument, ParseError> {
        Ok(ParsedDocument::opaque(
            ctx.original_name.clone(),
            ctx.file_size,
            ctx.mime_type.clone(),
        ))
    }
}
