//! Word-processing documents: paragraph text from `word/document.xml`.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::contract::{ExtractError, ExtractionResult, Extractor};

const FORMAT: &str = "DOCX";

#[derive(Debug, Clone, Copy, Default)]
pub struct DocxExtractor;

impl DocxExtractor {
    /// One line per `w:p`, runs concatenated, `w:tab` as a tab character.
    pub fn paragraphs_from_xml(path: &Path, xml: &str) -> Result<String, ExtractError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut out = String::new();
        let mut paragraph = String::new();
        let mut in_paragraph = false;
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"w:p" => {
                        in_paragraph = true;
                        paragraph.clear();
                    }
                    b"w:t" => in_text = true,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"w:p" => out.push('\n'),
                    b"w:tab" if in_paragraph => paragraph.push('\t'),
                    _ => {}
                },
                Ok(Event::Text(t)) if in_text => {
                    let text = t.unescape().map_err(|e| ExtractError::Format {
                        format: FORMAT,
                        path: path.to_path_buf(),
                        cause: format!("bad text node: {e}"),
                    })?;
                    paragraph.push_str(&text);
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" => {
                        in_paragraph = false;
                        out.push_str(&paragraph);
                        out.push('\n');
                        paragraph.clear();
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ExtractError::Format {
                        format: FORMAT,
                        path: path.to_path_buf(),
                        cause: format!("XML parsing error at {}: {e}", reader.buffer_position()),
                    })
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

impl Extractor for DocxExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        let file = std::fs::File::open(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExtractError::NotFound(path.to_path_buf())
            } else {
                ExtractError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let format_error = |cause: String| ExtractError::Format {
            format: FORMAT,
            path: path.to_path_buf(),
            cause,
        };

        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| format_error(format!("failed to open archive: {e}")))?;
        let mut document = archive
            .by_name("word/document.xml")
            .map_err(|e| format_error(format!("missing word/document.xml: {e}")))?;
        let mut xml = String::new();
        document
            .read_to_string(&mut xml)
            .map_err(|e| format_error(format!("failed to read word/document.xml: {e}")))?;

        let text = Self::paragraphs_from_xml(path, &xml)?;
        Ok(ExtractionResult::single(text, "text"))
    }
}
