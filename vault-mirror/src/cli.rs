///
/// This module implements the CLI for vault-mirror: command parsing, the one-shot
/// pipeline commands and the interactive watch session.
///
/// All pipeline logic (detection, conversion, batching, the run gate) lives in the
/// [`vault-mirror-core`] crate. This module only wires it to the terminal.
///
/// ## How To Use
/// - From a shell: `vault-mirror --config config.json watch`, or `--help`.
/// - From tests: build a [`Cli`] and call [`run`].
///
/// [`vault-mirror-core`]: ../../vault_mirror_core/
use crate::load_config::{init_config, load_config, load_valid_config};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use vault_mirror_core::config::{Config, SharedConfig};
use vault_mirror_core::synchronise::{PipelineCoordinator, RunOutcome, Trigger};
use vault_mirror_core::watch::{run_trigger_loop, HeadLogWatcher, DEFAULT_TRIGGER_CAPACITY};

/// CLI for vault-mirror: keep a note-taking vault in step with a git repository.
#[derive(Parser, Debug)]
#[clap(
    name = "vault-mirror",
    version,
    about = "Mirror files changed by git commits into a Markdown vault"
)]
pub struct Cli {
    /// Path to the JSON config file
    #[clap(
        long,
        global = true,
        env = "VAULT_MIRROR_CONFIG",
        default_value = "config.json"
    )]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mirror the files changed by the latest commit
    Sync,
    /// Mirror every accepted file in the working tree
    FullSync,
    /// Watch for commits and mirror them; reads commands from stdin
    Watch,
    /// Write a config file
    Init {
        /// Repository to mirror (must contain .git/logs/HEAD)
        #[clap(long)]
        repository: PathBuf,
        /// Vault root; documents go to <vault>/converted
        #[clap(long)]
        vault: PathBuf,
        /// Accepted extensions, comma separated; defaults when omitted
        #[clap(long = "extensions", value_delimiter = ',')]
        extensions: Vec<String>,
        /// Overwrite an existing config file
        #[clap(long)]
        force: bool,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

/// Commands accepted on stdin during `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Sync,
    FullResync,
    Reload,
    Quit,
}

pub fn parse_console_command(line: &str) -> Option<ConsoleCommand> {
    match line.trim().to_lowercase().as_str() {
        "s" | "sync" => Some(ConsoleCommand::Sync),
        "i" | "full" => Some(ConsoleCommand::FullResync),
        "r" | "reload" => Some(ConsoleCommand::Reload),
        "q" | "quit" => Some(ConsoleCommand::Quit),
        _ => None,
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!(command = ?cli.command, config = %cli.config.display(), "cli_invoked");

    match cli.command {
        Commands::Sync => run_once(&cli.config, Trigger::Manual).await,
        Commands::FullSync => run_once(&cli.config, Trigger::FullResync).await,
        Commands::Watch => watch(&cli.config).await,
        Commands::Init {
            repository,
            vault,
            extensions,
            force,
        } => {
            let config = init_config(&cli.config, repository, vault, extensions, force)?;
            println!(
                "Wrote {} ({} accepted extensions)",
                cli.config.display(),
                config.accepted_extensions.len()
            );
            Ok(())
        }
        Commands::ShowConfig => {
            let config = load_config(&cli.config)?;
            let json = serde_json::to_string_pretty(&config).context("Failed to render config")?;
            println!("{json}");
            Ok(())
        }
    }
}

async fn run_once(config_path: &Path, trigger: Trigger) -> Result<()> {
    let config = load_valid_config(config_path)?;
    let coordinator = PipelineCoordinator::with_defaults(SharedConfig::new(config));
    match coordinator.run(trigger).await {
        Ok(RunOutcome::Completed(report)) => {
            tracing::info!(run_id = %report.run_id, "Synchronisation complete");
            println!("{}", report.summary());
            Ok(())
        }
        Ok(RunOutcome::Dropped(reason)) => {
            println!("Run skipped: {reason}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Synchronisation failed");
            Err(e).context("Synchronisation failed")
        }
    }
}

fn queue(sender: &mpsc::Sender<Trigger>, trigger: Trigger) {
    if sender.try_send(trigger).is_err() {
        println!("Trigger queue is full, try again shortly");
    }
}

/// Re-reads the config for a running watch session. `restart` is only called when the
/// repository or debounce changed; any failure leaves the session on its old settings.
fn reload<W>(
    config_path: &Path,
    repository: &Path,
    debounce: Duration,
    restart: impl FnOnce(&Path, Duration) -> Result<W>,
) -> Result<(Config, Option<W>)> {
    let config = load_valid_config(config_path)?;
    let new_debounce = Duration::from_millis(config.debounce_ms);
    if config.repository_path == repository && new_debounce == debounce {
        return Ok((config, None));
    }
    let watcher = restart(&config.repository_path, new_debounce)
        .context("Failed to restart commit watcher")?;
    Ok((config, Some(watcher)))
}

async fn watch(config_path: &Path) -> Result<()> {
    let config = load_valid_config(config_path)?;
    let mut repository = config.repository_path.clone();
    let mut debounce = Duration::from_millis(config.debounce_ms);
    let coordinator = PipelineCoordinator::with_defaults(SharedConfig::new(config));

    let (tx, rx) = mpsc::channel(DEFAULT_TRIGGER_CAPACITY);
    let mut watcher = HeadLogWatcher::spawn(&repository, debounce, tx.clone())
        .context("Failed to start commit watcher")?;
    let trigger_loop = tokio::spawn(run_trigger_loop(coordinator.clone(), rx));

    println!("Watching {} for commits.", repository.display());
    println!("Commands: s = sync, i = full resync, r = reload config, q = quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    stdin_open = false;
                    tracing::info!("stdin closed, watching until interrupted");
                    continue;
                };
                match parse_console_command(&line) {
                    Some(ConsoleCommand::Sync) => queue(&tx, Trigger::Manual),
                    Some(ConsoleCommand::FullResync) => queue(&tx, Trigger::FullResync),
                    Some(ConsoleCommand::Reload) => {
                        let restart = |repo: &Path, delay: Duration| {
                            HeadLogWatcher::spawn(repo, delay, tx.clone()).map_err(anyhow::Error::from)
                        };
                        match reload(config_path, &repository, debounce, restart) {
                            Ok((config, restarted)) => {
                                if let Some(restarted) = restarted {
                                    watcher = restarted;
                                    repository = config.repository_path.clone();
                                    debounce = Duration::from_millis(config.debounce_ms);
                                }
                                coordinator.reconfigure(config);
                                println!("Configuration reloaded ({}).", watcher.head_log().display());
                            }
                            Err(e) => {
                                tracing::warn!(error = %format!("{e:#}"), "[CONFIG] Reload rejected");
                                eprintln!("Reload failed, keeping previous configuration: {e:#}");
                            }
                        }
                    }
                    Some(ConsoleCommand::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command {:?}; use s, i, r or q", line.trim()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(watcher);
    drop(tx);
    // Runs already admitted finish on the blocking pool before the runtime shuts down.
    match tokio::time::timeout(Duration::from_secs(1), trigger_loop).await {
        Ok(Ok(())) => tracing::debug!("[WATCH] Trigger loop drained"),
        Ok(Err(e)) => tracing::warn!(error = %e, "[WATCH] Trigger loop ended abnormally"),
        Err(_) => tracing::debug!("[WATCH] Trigger loop still busy at shutdown"),
    }
    println!("Stopped watching.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_commands_accept_short_and_long_forms() {
        struct Case {
            input: &'static str,
            expected: Option<ConsoleCommand>,
        }
        let cases = vec![
            Case { input: "s", expected: Some(ConsoleCommand::Sync) },
            Case { input: " SYNC ", expected: Some(ConsoleCommand::Sync) },
            Case { input: "i", expected: Some(ConsoleCommand::FullResync) },
            Case { input: "full", expected: Some(ConsoleCommand::FullResync) },
            Case { input: "r", expected: Some(ConsoleCommand::Reload) },
            Case { input: "q", expected: Some(ConsoleCommand::Quit) },
            Case { input: "quit", expected: Some(ConsoleCommand::Quit) },
            Case { input: "x", expected: None },
            Case { input: "", expected: None },
        ];
        for case in cases {
            assert_eq!(parse_console_command(case.input), case.expected, "{:?}", case.input);
        }
    }

    fn write_config(dir: &Path, repo: &Path, debounce_ms: u64) -> PathBuf {
        let logs = repo.join(".git").join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("HEAD"), "").unwrap();
        let config = Config {
            repository_path: repo.to_path_buf(),
            vault_output_path: dir.join("vault"),
            debounce_ms,
            ..Config::default()
        }
        .with_default_extensions();
        let path = dir.join("config.json");
        config.save(&path).unwrap();
        path
    }

    #[test]
    fn reload_keeps_the_watcher_when_repository_and_debounce_are_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let path = write_config(dir.path(), &repo, 100);

        let (config, restarted) = reload::<()>(&path, &repo, Duration::from_millis(100), |_, _| {
            panic!("watcher must not be restarted")
        })
        .unwrap();
        assert_eq!(config.repository_path, repo);
        assert!(restarted.is_none());
    }

    #[test]
    fn reload_restarts_the_watcher_for_a_new_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("other");
        let path = write_config(dir.path(), &repo, 250);

        let (config, restarted) = reload(&path, Path::new("/old/repo"), Duration::from_millis(100), |repo, debounce| {
            Ok((repo.to_path_buf(), debounce))
        })
        .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(restarted, Some((repo, Duration::from_millis(250))));
    }

    #[test]
    fn reload_reports_a_watcher_that_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("other");
        let path = write_config(dir.path(), &repo, 100);

        let err = reload::<()>(&path, Path::new("/old/repo"), Duration::from_millis(100), |_, _| {
            anyhow::bail!("inotify watch limit reached")
        })
        .expect_err("a failed restart must be reported, not swallowed");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("Failed to restart commit watcher"), "{rendered}");
        assert!(rendered.contains("inotify watch limit reached"), "{rendered}");
    }

    #[test]
    fn extensions_split_on_commas() {
        let cli = Cli::try_parse_from([
            "vault-mirror",
            "--config",
            "cfg.json",
            "init",
            "--repository",
            "/repo",
            "--vault",
            "/vault",
            "--extensions",
            ".md,.txt",
        ])
        .unwrap();
        match cli.command {
            Commands::Init { extensions, force, .. } => {
                assert_eq!(extensions, vec![".md".to_string(), ".txt".to_string()]);
                assert!(!force);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("cfg.json"));
    }
}
