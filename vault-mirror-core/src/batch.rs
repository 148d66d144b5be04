//! Size-bounded, order-preserving batching of changed files.
//!
//! Greedy: files are appended to the open batch until the next one would push the
//! running total past the limit, at which point the batch is closed. A file larger than
//! the limit on its own still gets a batch, alone, so nothing is dropped and the
//! scheduler always terminates.

use std::path::{Path, PathBuf};

/// A file path with the byte size it had when it was scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedFile {
    pub path: PathBuf,
    pub size: u64,
}

impl SizedFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Reads the size from disk. A file that cannot be stat'ed counts as empty; the
    /// per-file stage reports it properly later.
    pub fn from_path(path: &Path) -> Self {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Self::new(path, size)
    }
}

/// A closed group of files. Not mutated after the scheduler hands it out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    files: Vec<SizedFile>,
    total_bytes: u64,
}

impl Batch {
    fn push(&mut self, file: SizedFile) {
        self.total_bytes = self.total_bytes.saturating_add(file.size);
        self.files.push(file);
    }

    pub fn files(&self) -> &[SizedFile] {
        &self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    limit_bytes: u64,
}

impl BatchScheduler {
    pub fn new(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn schedule(&self, files: Vec<SizedFile>) -> Vec<Batch> {
        schedule(files, self.limit_bytes)
    }
}

/// Partitions `files` into batches of at most `limit_bytes`, keeping input order.
pub fn schedule(files: Vec<SizedFile>, limit_bytes: u64) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Batch::default();

    for file in files {
        if !current.is_empty() && current.total_bytes.saturating_add(file.size) > limit_bytes {
            batches.push(std::mem::take(&mut current));
        }
        current.push(file);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
