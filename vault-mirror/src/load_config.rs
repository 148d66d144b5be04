/// `load_config` module: reads and writes the operator's JSON config at the CLI boundary.
///
/// Parsing, defaults and validation live in [`vault_mirror_core::config`]; this module
/// adds `anyhow` context so failures print as one readable chain.
///
/// # Errors
/// Everything returns `anyhow::Error` with the config path in the message.
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vault_mirror_core::config::Config;

/// Loads the config at `path`. A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = %path_ref.display(), "[CONFIG] Loading configuration from file");
    Config::load(path_ref)
        .with_context(|| format!("Failed to load config file {}", path_ref.display()))
}

/// Loads and validates; the returned config is ready for a pipeline run.
pub fn load_valid_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let config = load_config(&path)?;
    config.validate().with_context(|| {
        format!(
            "Configuration invalid in {}; run `vault-mirror init` to fix it",
            path.as_ref().display()
        )
    })?;
    Ok(config)
}

/// Writes a new config file. Refuses to replace an existing one unless `force` is set.
/// An empty extension list is written out as the full default set.
pub fn init_config<P: AsRef<Path>>(
    path: P,
    repository: PathBuf,
    vault: PathBuf,
    extensions: Vec<String>,
    force: bool,
) -> Result<Config> {
    let path_ref = path.as_ref();
    if path_ref.exists() && !force {
        bail!(
            "Config file {} already exists; pass --force to overwrite it",
            path_ref.display()
        );
    }

    let config = Config {
        repository_path: repository,
        vault_output_path: vault,
        accepted_extensions: extensions,
        ..Config::default()
    }
    .with_default_extensions();

    if let Err(e) = config.validate() {
        warn!(error = %e, "[CONFIG] Refusing to write invalid configuration");
        return Err(e).context("Configuration invalid");
    }

    config
        .save(path_ref)
        .with_context(|| format!("Failed to write config file {}", path_ref.display()))?;
    Ok(config)
}
