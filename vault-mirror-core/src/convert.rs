//! Routing of a source file to its extraction strategy.
//!
//! [`ConversionDispatcher`] is a registry: extensions map to a [`ContentKind`], kinds map
//! to an [`Extractor`]. Adding a kind means registering it, the `convert` control flow
//! stays the same. Extensions with no registered kind are sniffed and treated as plain
//! text when they contain no NUL byte in the leading sample.
//!
//! Every failure comes back as an [`ExtractError`], including panics raised inside an
//! extraction library.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::contract::{ExtractError, ExtractionResult, Extractor};
use crate::extract::{
    looks_binary, CodeBlockExtractor, DocxExtractor, MarkdownPassthrough, PdfExtractor,
    SpreadsheetExtractor, TesseractOcr,
};
use crate::filter::extension_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Markdown,
    PlainText,
    Spreadsheet,
    RichDocument,
    Image,
    Pdf,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Markdown => "markdown",
            ContentKind::PlainText => "plain-text",
            ContentKind::Spreadsheet => "spreadsheet",
            ContentKind::RichDocument => "rich-document",
            ContentKind::Image => "image",
            ContentKind::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_KINDS: &[(&str, ContentKind)] = &[
    (".md", ContentKind::Markdown),
    (".markdown", ContentKind::Markdown),
    (".xlsx", ContentKind::Spreadsheet),
    (".xlsm", ContentKind::Spreadsheet),
    (".docx", ContentKind::RichDocument),
    (".pdf", ContentKind::Pdf),
    (".png", ContentKind::Image),
    (".jpg", ContentKind::Image),
    (".jpeg", ContentKind::Image),
    (".tif", ContentKind::Image),
    (".tiff", ContentKind::Image),
    (".bmp", ContentKind::Image),
    (".gif", ContentKind::Image),
    (".cs", ContentKind::PlainText),
    (".py", ContentKind::PlainText),
    (".js", ContentKind::PlainText),
    (".java", ContentKind::PlainText),
    (".ts", ContentKind::PlainText),
    (".html", ContentKind::PlainText),
    (".css", ContentKind::PlainText),
    (".txt", ContentKind::PlainText),
    (".json", ContentKind::PlainText),
    (".cpp", ContentKind::PlainText),
    (".c", ContentKind::PlainText),
];

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Clone, Default)]
pub struct ConversionDispatcher {
    kinds: HashMap<String, ContentKind>,
    extractors: HashMap<ContentKind, Arc<dyn Extractor>>,
}

impl fmt::Debug for ConversionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionDispatcher")
            .field("kinds", &self.kinds)
            .field("extractors", &self.extractors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConversionDispatcher {
    /// Empty registry. Every file is sniffed and routed to `PlainText`, which has no
    /// extractor until one is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in extension table and extractors.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        for (ext, kind) in DEFAULT_KINDS {
            dispatcher.register_kind(ext, *kind);
        }
        dispatcher
            .register_extractor(ContentKind::Markdown, Arc::new(MarkdownPassthrough))
            .register_extractor(ContentKind::PlainText, Arc::new(CodeBlockExtractor))
            .register_extractor(ContentKind::Spreadsheet, Arc::new(SpreadsheetExtractor))
            .register_extractor(ContentKind::RichDocument, Arc::new(DocxExtractor))
            .register_extractor(ContentKind::Pdf, Arc::new(PdfExtractor))
            .register_extractor(ContentKind::Image, Arc::new(TesseractOcr::default()));
        dispatcher
    }

    /// Maps an extension (with or without the dot, any case) to a kind.
    pub fn register_kind(&mut self, extension: &str, kind: ContentKind) -> &mut Self {
        let ext = extension.trim().trim_start_matches('.').to_lowercase();
        self.kinds.insert(format!(".{ext}"), kind);
        self
    }

    pub fn register_extractor(
        &mut self,
        kind: ContentKind,
        extractor: Arc<dyn Extractor>,
    ) -> &mut Self {
        self.extractors.insert(kind, extractor);
        self
    }

    /// Kind registered for the path's extension, if any. No I/O.
    pub fn classify(&self, path: &Path) -> Option<ContentKind> {
        self.kinds.get(&extension_of(path)).copied()
    }

    pub fn convert(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }

        let kind = match self.classify(path) {
            Some(kind) => kind,
            None => {
                let binary = looks_binary(path).map_err(|source| ExtractError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                if binary {
                    return Err(ExtractError::Binary(path.to_path_buf()));
                }
                ContentKind::PlainText
            }
        };

        let extractor = self
            .extractors
            .get(&kind)
            .ok_or_else(|| ExtractError::Unsupported {
                kind: kind.to_string(),
            })?;

        debug!(path = %path.display(), kind = %kind, "Dispatching to extractor");
        match catch_unwind(AssertUnwindSafe(|| extractor.extract(path))) {
            Ok(result) => result,
            Err(payload) => Err(ExtractError::Panicked {
                path: path.to_path_buf(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}
