//! Source path → vault path mapping. Pure, no I/O.
//!
//! `docs/guide.txt` lands at `<vault>/converted/docs/guide.txt.md`; Markdown sources keep
//! their name. A spreadsheet `data/report.xlsx` explodes into
//! `<vault>/converted/data/report/<Sheet>_<NNN>.md`.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_OUTPUT_SUBDIR: &str = "converted";

/// `<sheet>_<NNN>.md`, 1-based and zero-padded to three digits.
pub fn row_file_name(sheet: &str, index: usize) -> String {
    format!("{sheet}_{index:03}.md")
}

/// Keeps only plain path segments so a hostile or absolute input cannot escape the vault.
fn push_normal_components(out: &mut PathBuf, path: &Path) {
    for component in path.components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Output location of a single-document conversion.
pub fn map_path(source_relative: &Path, vault_root: &Path, output_subdir: &str) -> PathBuf {
    let mut out = vault_root.join(output_subdir);
    if let Some(parent) = source_relative.parent() {
        push_normal_components(&mut out, parent);
    }
    let Some(file_name) = source_relative.file_name() else {
        return out;
    };
    if is_markdown(source_relative) {
        out.push(file_name);
    } else {
        let mut name = OsString::from(file_name);
        name.push(".md");
        out.push(name);
    }
    out
}

/// Output location of one document of a multi-document conversion: a directory named
/// after the source's base name, next to where the single document would have gone.
pub fn map_exploded_path(
    source_relative: &Path,
    vault_root: &Path,
    output_subdir: &str,
    document_relative: &Path,
) -> PathBuf {
    let mut out = vault_root.join(output_subdir);
    if let Some(parent) = source_relative.parent() {
        push_normal_components(&mut out, parent);
    }
    if let Some(stem) = source_relative.file_stem() {
        out.push(stem);
    }
    push_normal_components(&mut out, document_relative);
    out
}

/// Mapper bound to one vault root, built per run from the config snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPathMapper {
    vault_root: PathBuf,
    output_subdir: String,
}

impl VaultPathMapper {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self::with_subdir(vault_root, DEFAULT_OUTPUT_SUBDIR)
    }

    pub fn with_subdir(vault_root: impl Into<PathBuf>, output_subdir: impl Into<String>) -> Self {
        Self {
            vault_root: vault_root.into(),
            output_subdir: output_subdir.into(),
        }
    }

    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    /// `<vault>/<subdir>`, the directory every output lives under.
    pub fn output_root(&self) -> PathBuf {
        self.vault_root.join(&self.output_subdir)
    }

    pub fn map_path(&self, source_relative: &Path) -> PathBuf {
        map_path(source_relative, &self.vault_root, &self.output_subdir)
    }

    pub fn map_exploded_path(&self, source_relative: &Path, document_relative: &Path) -> PathBuf {
        map_exploded_path(
            source_relative,
            &self.vault_root,
            &self.output_subdir,
            document_relative,
        )
    }
}
