//! Extension accept-set predicate.

use std::collections::HashSet;
use std::path::Path;

/// Case-insensitive exact match against an accept set.
///
/// An empty set accepts nothing. Substituting defaults is the config loader's job.
pub fn accepts(extension: &str, accept_set: &HashSet<String>) -> bool {
    let wanted = extension.to_lowercase();
    accept_set.iter().any(|candidate| candidate.to_lowercase() == wanted)
}

/// Lower-cased extension of `path` including the leading dot, or `""` when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Pre-normalised accept set, built once per run from the config snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    accepted: HashSet<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            accepted: extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn accepts(&self, extension: &str) -> bool {
        self.accepted.contains(&extension.to_lowercase())
    }

    pub fn accepts_path(&self, path: &Path) -> bool {
        self.accepts(&extension_of(path))
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_regardless_of_case() {
        let accept = set(&[".md", ".TXT"]);
        assert!(accepts(".MD", &accept));
        assert!(accepts(".txt", &accept));
        assert!(accepts(".Txt", &accept));
        assert!(!accepts(".py", &accept));
    }

    #[test]
    fn empty_set_accepts_nothing() {
        let accept = HashSet::new();
        assert!(!accepts(".md", &accept));
        assert!(!accepts("", &accept));
        assert!(ExtensionFilter::default().is_empty());
        assert!(!ExtensionFilter::default().accepts(".md"));
    }

    #[test]
    fn never_panics_on_odd_input() {
        let accept = set(&[".md"]);
        for input in ["", ".", "..", "md", "ÄÖÜ", "\u{0}", ".mD\t", "ǅ"] {
            let _ = accepts(input, &accept);
            let _ = ExtensionFilter::new([".md"]).accepts(input);
        }
    }

    #[test]
    fn exact_match_only() {
        let filter = ExtensionFilter::new([".md"]);
        assert!(!filter.accepts("md"));
        assert!(!filter.accepts(".mdx"));
        assert!(!filter.accepts(".m"));
    }

    #[test]
    fn path_extension_is_lowercased_with_dot() {
        assert_eq!(extension_of(Path::new("docs/Readme.MD")), ".md");
        assert_eq!(extension_of(Path::new("Makefile")), "");
        assert_eq!(extension_of(Path::new("archive.tar.GZ")), ".gz");

        let filter = ExtensionFilter::new([".md", ".txt"]);
        assert!(filter.accepts_path(Path::new("notes/A.Md")));
        assert!(!filter.accepts_path(Path::new("main.rs")));
        assert_eq!(filter.len(), 2);
    }
}
