//! Extraction strategies, one per content kind.
//!
//! Every strategy implements [`Extractor`](crate::contract::Extractor) and reports
//! failures as [`ExtractError`](crate::contract::ExtractError) values; none of them write
//! to the vault.

mod docx;
mod ocr;
mod pdf;
mod spreadsheet;
mod text;

pub use docx::DocxExtractor;
pub use ocr::TesseractOcr;
pub use pdf::PdfExtractor;
pub use spreadsheet::{escape_value, row_front_matter, SpreadsheetExtractor, NOT_ASSIGNED_TAG};
pub use text::{
    decode_text, expand_tabs, language_tag, looks_binary, CodeBlockExtractor,
    MarkdownPassthrough, BINARY_SNIFF_BYTES,
};
