//! Image text recognition through the `tesseract` executable.
//!
//! The tool must be on `PATH` (or configured explicitly); when it is missing every image
//! fails with [`ExtractError::Tool`] and the pipeline records it in the skip list.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::contract::{ExtractError, ExtractionResult, Extractor};

pub const DEFAULT_OCR_PROGRAM: &str = "tesseract";
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
    language: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_PROGRAM, DEFAULT_OCR_LANGUAGE)
    }
}

impl TesseractOcr {
    pub fn new(program: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    fn tool_error(&self, cause: String) -> ExtractError {
        ExtractError::Tool {
            tool: self.program.display().to_string(),
            cause,
        }
    }
}

impl Extractor for TesseractOcr {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }

        debug!(path = %path.display(), program = %self.program.display(), "[OCR] Running recognizer");
        let output = Command::new(&self.program)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| self.tool_error(format!("failed to launch: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.tool_error(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(ExtractionResult::single(text, "text"))
    }
}
