//! Writes converted documents into the vault.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

/// Raised when the vault output root cannot be created or written to at all.
#[derive(Debug, thiserror::Error)]
#[error("vault output directory {} is not writable: {source}", path.display())]
pub struct VaultUnwritable {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Clone)]
pub struct VaultWriter {
    output_root: PathBuf,
}

impl VaultWriter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Creates the output root and proves it accepts files by creating and removing a
    /// temporary probe file.
    pub fn ensure_writable(&self) -> Result<(), VaultUnwritable> {
        let unwritable = |source| VaultUnwritable {
            path: self.output_root.clone(),
            source,
        };
        fs::create_dir_all(&self.output_root).map_err(unwritable)?;
        let probe = tempfile::Builder::new()
            .prefix(".vault-mirror-probe")
            .tempfile_in(&self.output_root)
            .map_err(|source| {
                error!(error = ?source, path = %self.output_root.display(), "[SYNC] Vault output directory rejected probe file");
                unwritable(source)
            })?;
        drop(probe);
        Ok(())
    }

    /// Writes `content` to `target`, creating parent directories. Overwrites.
    pub fn write(&self, target: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content)?;
        debug!(
            path = %target.strip_prefix(&self.output_root).unwrap_or(target).display(),
            bytes = content.len(),
            "[SYNC] Saved document"
        );
        Ok(())
    }
}
