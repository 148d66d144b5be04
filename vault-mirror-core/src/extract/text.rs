//! Text-like sources: Markdown passthrough and fenced code blocks.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use encoding_rs::WINDOWS_1252;

use crate::contract::{ExtractError, ExtractionResult, Extractor};

/// Leading sample inspected by the binary-content heuristic.
pub const BINARY_SNIFF_BYTES: usize = 8000;

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            ExtractError::NotFound(path.to_path_buf())
        } else {
            ExtractError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// UTF-8 first, Windows-1252 (Latin-1 compatible) when that fails.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text).to_string(),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

pub fn expand_tabs(text: &str) -> String {
    text.replace('\t', "    ")
}

/// Extension without the dot, lower-cased; `text` when there is none.
pub fn language_tag(path: &Path) -> String {
    match path.extension() {
        Some(ext) if !ext.is_empty() => ext.to_string_lossy().to_lowercase(),
        _ => "text".to_string(),
    }
}

/// `true` when the leading sample of the file contains a NUL byte.
pub fn looks_binary(path: &Path) -> std::io::Result<bool> {
    let mut sample = Vec::with_capacity(BINARY_SNIFF_BYTES);
    File::open(path)?
        .take(BINARY_SNIFF_BYTES as u64)
        .read_to_end(&mut sample)?;
    Ok(sample.contains(&0))
}

/// Markdown sources are copied through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownPassthrough;

impl Extractor for MarkdownPassthrough {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        let content = decode_text(&read_bytes(path)?);
        Ok(ExtractionResult::single(content, "markdown"))
    }
}

/// Wraps the raw file in a fenced block tagged with its extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeBlockExtractor;

impl Extractor for CodeBlockExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        let content = expand_tabs(&decode_text(&read_bytes(path)?));
        let lang = language_tag(path);
        let fenced = format!("```{lang}\n{content}\n```");
        Ok(ExtractionResult::single(fenced, lang))
    }
}
