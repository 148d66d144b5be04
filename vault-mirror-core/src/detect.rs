//! Change detection: which accepted files were added or modified between two revisions.
//!
//! [`GitCli`] is the production [`ChangeSource`]; it shells out to `git` and hands back the
//! raw `--name-status` lines. [`ChangeDetector`] parses those lines, drops everything that is
//! not an addition or modification, and applies the extension filter. Output order is the
//! backend's order, untouched.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::contract::{ChangeRecord, ChangeSource, ChangeStatus, RevisionRange, VcsError};
use crate::filter::{extension_of, ExtensionFilter};

/// Field delimiter of `git diff --name-status` output.
pub const CHANGE_LINE_DELIMITER: char = '\t';

/// Runs the `git` binary found on `PATH` (or an explicit program path).
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run<I, S>(&self, repo: &Path, args: I) -> Result<Vec<String>, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self
            .stdout(repo, args)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_owned)
            .collect())
    }

    /// Runs a `-z` listing and re-joins each `status, path` pair with a tab. Paths come
    /// back verbatim, whatever characters they contain.
    fn run_nul_separated<I, S>(&self, repo: &Path, args: I) -> Result<Vec<String>, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(pair_nul_fields(&self.stdout(repo, args)?))
    }

    fn stdout<I, S>(&self, repo: &Path, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.program);
        command
            .arg("-c")
            .arg("core.quotepath=off")
            .arg("-C")
            .arg(repo)
            .args(args);
        let rendered = format!("{command:?}");
        debug!(command = %rendered, "[GIT] Running");

        let output = command.output().map_err(|source| {
            warn!(error = ?source, command = %rendered, "[GIT] Failed to launch git process");
            VcsError::Spawn {
                command: rendered.clone(),
                source,
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %rendered, status = %output.status, stderr = %stderr, "[GIT] git exited with non-zero code");
            return Err(VcsError::Exit {
                command: rendered,
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Pairs the NUL-separated fields of `--name-status -z` output into `status\tpath` lines.
pub fn pair_nul_fields(raw: &str) -> Vec<String> {
    let mut fields = raw.split('\0').filter(|field| !field.is_empty());
    let mut lines = Vec::new();
    while let Some(status) = fields.next() {
        match fields.next() {
            Some(path) => lines.push(format!("{status}{CHANGE_LINE_DELIMITER}{path}")),
            None => warn!(field = %status, "[GIT] Status without a path, skipping"),
        }
    }
    lines
}

impl ChangeSource for GitCli {
    fn head_revision(&self, repo: &Path) -> Result<String, VcsError> {
        let lines = self.run(repo, ["rev-parse", "HEAD"])?;
        let head = lines.into_iter().next().unwrap_or_default().trim().to_string();
        if head.is_empty() {
            return Err(VcsError::Exit {
                command: "git rev-parse HEAD".to_string(),
                status: "success".to_string(),
                stderr: "empty output".to_string(),
            });
        }
        Ok(head)
    }

    fn list_changes(&self, repo: &Path, range: &RevisionRange) -> Result<Vec<String>, VcsError> {
        match &range.since {
            Some(since) => self.run_nul_separated(
                repo,
                [
                    "diff",
                    "--name-status",
                    "-z",
                    "--no-renames",
                    since.as_str(),
                    range.until.as_str(),
                ],
            ),
            None => self.run_nul_separated(
                repo,
                [
                    "diff-tree",
                    "--root",
                    "-r",
                    "--no-commit-id",
                    "--name-status",
                    "-z",
                    "--no-renames",
                    range.until.as_str(),
                ],
            ),
        }
    }
}

/// Splits one raw change line into `(status, relative_path)` at the first delimiter, so
/// a path may itself contain tabs.
///
/// Returns `None` when the line does not have at least two fields.
pub fn parse_change_line(line: &str) -> Option<(&str, &str)> {
    let (status, path) = line.split_once(CHANGE_LINE_DELIMITER)?;
    let status = status.trim();
    let path = path.trim();
    if status.is_empty() || path.is_empty() {
        return None;
    }
    Some((status, path))
}

/// Turns a `/`-separated repository path into a platform path.
fn normalise_relative(path: &str) -> PathBuf {
    path.split('/').filter(|part| !part.is_empty()).collect()
}

/// Parses raw lines into accepted records, preserving order.
pub fn parse_changes<S: AsRef<str>>(lines: &[S], filter: &ExtensionFilter) -> Vec<ChangeRecord> {
    let mut records = Vec::new();
    for line in lines {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        debug!(line = %line, "[GIT] Output line");

        let Some((code, raw_path)) = parse_change_line(line) else {
            warn!(line = %line, "[GIT] Malformed change line, skipping");
            continue;
        };

        let source_path = normalise_relative(raw_path);
        let extension = extension_of(&source_path);

        match ChangeStatus::from_code(code) {
            Some(status) if filter.accepts(&extension) => {
                debug!(status = ?status, path = %source_path.display(), "[GIT] Accepted change");
                records.push(ChangeRecord {
                    status,
                    source_path,
                    extension,
                });
            }
            _ => {
                debug!(status = code, path = %source_path.display(), extension = %extension, "[GIT] Ignored change");
            }
        }
    }
    records
}

/// Asks the backend for a delta and filters it.
pub struct ChangeDetector<'a> {
    source: &'a dyn ChangeSource,
    filter: &'a ExtensionFilter,
}

impl<'a> ChangeDetector<'a> {
    pub fn new(source: &'a dyn ChangeSource, filter: &'a ExtensionFilter) -> Self {
        Self { source, filter }
    }

    pub fn detect(&self, repo: &Path, range: &RevisionRange) -> Result<Vec<ChangeRecord>, VcsError> {
        info!(
            repo = %repo.display(),
            since = range.since.as_deref().unwrap_or("<parent>"),
            until = %range.until,
            "[GIT] Listing changes"
        );
        let lines = self.source.list_changes(repo, range)?;
        let records = parse_changes(&lines, self.filter);
        info!(raw = lines.len(), accepted = records.len(), "[GIT] Change detection finished");
        Ok(records)
    }
}

/// Every accepted file in the working tree, relative to `repo`, sorted by name.
///
/// The `.git` directory is never entered. Unreadable entries are logged and skipped.
pub fn enumerate_tree(repo: &Path, filter: &ExtensionFilter) -> Vec<PathBuf> {
    let walker = WalkDir::new(repo)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "[SYNC] Skipping unreadable entry during enumeration");
                continue;
            }
        };
        if !entry.file_type().is_file() || !filter.accepts_path(entry.path()) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(repo) {
            files.push(relative.to_path_buf());
        }
    }
    info!(repo = %repo.display(), files = files.len(), "[SYNC] Enumerated working tree");
    files
}
