use std::path::Path;

use crate::contract::{ExtractError, ExtractionResult, Extractor};

const FORMAT: &str = "PDF";

/// Trims each line and drops the blank ones left over from layout.
pub(crate) fn clean_pdf_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExtractError::NotFound(path.to_path_buf())
            } else {
                ExtractError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Format {
            format: FORMAT,
            path: path.to_path_buf(),
            cause: format!("PDF parsing failed: {e}"),
        })?;

        Ok(ExtractionResult::single(clean_pdf_text(&text), "text"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_noise_is_removed() {
        assert_eq!(
            clean_pdf_text("  Title  \n\n\n   body line\n \t \nend"),
            "Title\nbody line\nend"
        );
    }

    #[test]
    fn invalid_pdf_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.pdf");
        std::fs::write(&path, "This is not a valid PDF file").unwrap();
        match PdfExtractor.extract(&path) {
            Err(ExtractError::Format { format, .. }) => assert_eq!(format, "PDF"),
            other => panic!("expected PDF format error, got {other:?}"),
        }
    }
}
