use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::filter::ExtensionFilter;

/// Accept set used when the config file names none.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".cs", ".py", ".js", ".java", ".ts", ".html", ".css", ".md", ".txt", ".json", ".cpp", ".c",
    ".xlsx", ".docx", ".pdf", ".png", ".jpg", ".jpeg",
];

/// 4 GiB per batch.
pub const DEFAULT_PATCH_LIMIT_BYTES: u64 = 4 * 1024 * 1024 * 1024;

pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

fn default_patch_limit_bytes() -> u64 {
    DEFAULT_PATCH_LIMIT_BYTES
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("repository path is not set")]
    RepositoryNotSet,
    #[error("repository path {} does not exist or is not a directory", .0.display())]
    RepositoryMissing(PathBuf),
    #[error("no git repository found at {} (missing {})", repo.display(), head_log.display())]
    NotAGitRepository { repo: PathBuf, head_log: PathBuf },
    #[error("vault output path is not set")]
    VaultNotSet,
}

/// Operator configuration, as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default)]
    pub repository_path: PathBuf,
    #[serde(default)]
    pub vault_output_path: PathBuf,
    #[serde(default)]
    pub accepted_extensions: Vec<String>,
    #[serde(default = "default_patch_limit_bytes")]
    pub patch_limit_bytes: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository_path: PathBuf::new(),
            vault_output_path: PathBuf::new(),
            accepted_extensions: Vec::new(),
            patch_limit_bytes: DEFAULT_PATCH_LIMIT_BYTES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Reads `path`. A missing file is not an error: defaults apply.
    ///
    /// The returned config always has a non-empty, normalised accept set.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(config_path = %path.display(), "[CONFIG] No config file found, using defaults");
            return Ok(Self::default().with_default_extensions());
        }

        let content = fs::read_to_string(path).map_err(|source| {
            error!(error = ?source, config_path = %path.display(), "[CONFIG] Failed to read config file");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|source| {
            error!(error = ?source, config_path = %path.display(), "[CONFIG] Failed to parse config JSON");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let config = config.with_default_extensions();
        config.trace_loaded();
        Ok(config)
    }

    /// Writes the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(config_path = %path.display(), "[CONFIG] Configuration saved");
        Ok(())
    }

    /// Normalises extensions to lower case with a leading dot and substitutes the
    /// default set when none remain.
    pub fn with_default_extensions(mut self) -> Self {
        let mut normalised: Vec<String> = Vec::with_capacity(self.accepted_extensions.len());
        for ext in &self.accepted_extensions {
            let ext = ext.trim().to_lowercase();
            if ext.is_empty() || ext == "." {
                continue;
            }
            let ext = if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            };
            if !normalised.contains(&ext) {
                normalised.push(ext);
            }
        }
        if normalised.is_empty() {
            normalised = DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        }
        self.accepted_extensions = normalised;
        self
    }

    /// Checks everything a run needs before it starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository_path.as_os_str().is_empty() {
            return Err(ConfigError::RepositoryNotSet);
        }
        if !self.repository_path.is_dir() {
            return Err(ConfigError::RepositoryMissing(self.repository_path.clone()));
        }
        let head_log = self.head_log_path();
        if !head_log.is_file() {
            return Err(ConfigError::NotAGitRepository {
                repo: self.repository_path.clone(),
                head_log,
            });
        }
        if self.vault_output_path.as_os_str().is_empty() {
            return Err(ConfigError::VaultNotSet);
        }
        Ok(())
    }

    /// `<repo>/.git/logs/HEAD`, rewritten by git on every commit, checkout and reset.
    pub fn head_log_path(&self) -> PathBuf {
        self.repository_path.join(".git").join("logs").join("HEAD")
    }

    pub fn extension_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.accepted_extensions)
    }

    pub fn trace_loaded(&self) {
        info!(
            repository = %self.repository_path.display(),
            vault = %self.vault_output_path.display(),
            extensions = self.accepted_extensions.len(),
            patch_limit_bytes = self.patch_limit_bytes,
            "[CONFIG] Loaded config"
        );
        debug!(?self, "[CONFIG] Config loaded (full debug)");
    }
}

/// Copy-on-read handle. Runs capture an `Arc` snapshot; reconfiguration swaps the
/// pointer and never mutates a snapshot a run already holds.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    current: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, config: Config) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(config);
        info!("[CONFIG] Configuration replaced");
    }
}
