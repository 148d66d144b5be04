//! # contract: collaborator interfaces and the data that crosses them
//!
//! The pipeline talks to three kinds of collaborators it does not own:
//! - a version-control backend ([`ChangeSource`]) that reports which paths changed
//!   between two revisions,
//! - one extraction strategy per content kind ([`Extractor`]),
//! - a lock probe ([`AvailabilityProbe`]) that tells whether another process holds a file.
//!
//! All three are blocking by contract. The coordinator moves whole runs onto the
//! blocking pool, so implementations are free to spawn processes or parse large files.
//!
//! ## Mocking & Testing
//! - The traits carry `automock` so unit and integration tests can script git output,
//!   extraction results and lock states without touching a real repository.
//! - Mocks are exported outside the crate behind the `test-export-mocks` feature.

use std::path::{Path, PathBuf};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use thiserror::Error;

/// Status of a changed entry the pipeline cares about. Deletions are never mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeStatus {
    Added,
    Modified,
}

impl ChangeStatus {
    /// Maps a raw `--name-status` code. Anything other than `A` or `M` yields `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "A" => Some(ChangeStatus::Added),
            "M" => Some(ChangeStatus::Modified),
            _ => None,
        }
    }
}

/// One accepted change reported by the VCS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub status: ChangeStatus,
    /// Path relative to the repository root.
    pub source_path: PathBuf,
    /// Lower-cased extension including the leading dot, or empty.
    pub extension: String,
}

/// The two revision endpoints of an incremental diff.
///
/// `since == None` means "the delta introduced by `until` itself".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub since: Option<String>,
    pub until: String,
}

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}: {stderr}")]
    Exit {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Version-control backend.
///
/// `list_changes` returns raw `<status>\t<relativePath>` lines exactly as the backend
/// printed them; parsing and filtering belong to the change detector.
/// Implementations must be deterministic for the same two endpoints.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ChangeSource: Send + Sync {
    /// Resolves the revision currently checked out.
    fn head_revision(&self, repo: &Path) -> Result<String, VcsError>;

    /// Lists changed entries between the two endpoints of `range`.
    fn list_changes(&self, repo: &Path, range: &RevisionRange) -> Result<Vec<String>, VcsError>;
}

/// A single generated document inside a multi-document extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    /// Path relative to the directory derived for the source file, e.g. `Data_001.md`.
    pub relative_path: PathBuf,
    pub content: String,
}

/// Normalised output of every extraction strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Single { content: String, language_tag: String },
    Multiple(Vec<ExtractedDocument>),
}

impl ExtractionResult {
    pub fn single(content: impl Into<String>, language_tag: impl Into<String>) -> Self {
        ExtractionResult::Single {
            content: content.into(),
            language_tag: language_tag.into(),
        }
    }

    /// Number of vault documents this result turns into.
    pub fn document_count(&self) -> usize {
        match self {
            ExtractionResult::Single { .. } => 1,
            ExtractionResult::Multiple(docs) => docs.len(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{format} extraction failed for {}: {cause}", path.display())]
    Format {
        format: &'static str,
        path: PathBuf,
        cause: String,
    },
    #[error("{} looks binary and has no registered extractor", .0.display())]
    Binary(PathBuf),
    #[error("external tool `{tool}` failed: {cause}")]
    Tool { tool: String, cause: String },
    #[error("extractor panicked on {}: {message}", path.display())]
    Panicked { path: PathBuf, message: String },
    #[error("no extractor registered for {kind} content")]
    Unsupported { kind: String },
}

/// Extraction strategy for one content kind.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractionResult, ExtractError>;
}

/// Result of probing a file before reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Locked(String),
}

/// Probes whether a file may be read right now.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait AvailabilityProbe: Send + Sync {
    fn try_acquire_read(&self, path: &Path) -> Availability;
}
