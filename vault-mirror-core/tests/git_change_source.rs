use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::tempdir;

use vault_mirror_core::availability::ExclusiveOpenProbe;
use vault_mirror_core::config::{Config, SharedConfig};
use vault_mirror_core::contract::{ChangeSource, RevisionRange};
use vault_mirror_core::convert::ConversionDispatcher;
use vault_mirror_core::detect::{ChangeDetector, GitCli};
use vault_mirror_core::filter::ExtensionFilter;
use vault_mirror_core::synchronise::{PipelineCoordinator, RunOutcome, Trigger};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args([
            "-c",
            "user.name=Vault Mirror Tests",
            "-c",
            "user.email=tests@example.invalid",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

fn commit_files(repo: &Path, files: &[(&str, &str)], message: &str) {
    for (relative, content) in files {
        let path = repo.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-q", "-m", message]);
}

fn init_repo(repo: &Path) {
    git(repo, &["init", "-q"]);
    commit_files(repo, &[("README.md", "# readme\n"), ("old.txt", "old")], "initial");
}

fn paths(records: Vec<vault_mirror_core::contract::ChangeRecord>) -> Vec<PathBuf> {
    records.into_iter().map(|r| r.source_path).collect()
}

#[test]
fn first_run_lists_the_root_commit() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    init_repo(dir.path());

    let cli = GitCli::default();
    let head = cli.head_revision(dir.path()).unwrap();
    assert_eq!(head.len(), 40);

    let filter = ExtensionFilter::new([".md", ".txt"]);
    let records = ChangeDetector::new(&cli, &filter)
        .detect(dir.path(), &RevisionRange { since: None, until: head })
        .unwrap();
    assert_eq!(paths(records), vec![PathBuf::from("README.md"), PathBuf::from("old.txt")]);
}

#[test]
fn diff_between_revisions_keeps_only_accepted_additions_and_modifications() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    let cli = GitCli::default();
    let first = cli.head_revision(repo).unwrap();

    std::fs::remove_file(repo.join("old.txt")).unwrap();
    commit_files(
        repo,
        &[("a.md", "a"), ("b.py", "b"), ("c.txt", "c"), ("README.md", "# changed\n")],
        "second",
    );
    let second = cli.head_revision(repo).unwrap();

    let filter = ExtensionFilter::new([".md", ".txt"]);
    let records = ChangeDetector::new(&cli, &filter)
        .detect(
            repo,
            &RevisionRange {
                since: Some(first),
                until: second,
            },
        )
        .unwrap();
    assert_eq!(
        paths(records),
        vec![PathBuf::from("README.md"), PathBuf::from("a.md"), PathBuf::from("c.txt")]
    );
}

#[test]
fn non_ascii_paths_arrive_unquoted() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    commit_files(repo, &[("notizen/über.md", "ü")], "umlaut");

    let cli = GitCli::default();
    let head = cli.head_revision(repo).unwrap();
    let lines = cli
        .list_changes(repo, &RevisionRange { since: None, until: head })
        .unwrap();
    assert_eq!(lines, vec!["A\tnotizen/über.md".to_string()]);
}

#[test]
fn paths_git_would_quote_arrive_verbatim() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    let repo = dir.path();
    init_repo(repo);
    let cli = GitCli::default();
    let first = cli.head_revision(repo).unwrap();
    commit_files(repo, &[("col\tumn.md", "t"), ("say \"hi\".md", "q")], "odd names");
    let second = cli.head_revision(repo).unwrap();

    let filter = ExtensionFilter::new([".md"]);
    let records = ChangeDetector::new(&cli, &filter)
        .detect(
            repo,
            &RevisionRange {
                since: Some(first),
                until: second.clone(),
            },
        )
        .unwrap();
    assert_eq!(
        paths(records),
        vec![PathBuf::from("col\tumn.md"), PathBuf::from("say \"hi\".md")]
    );

    let own_delta = ChangeDetector::new(&cli, &filter)
        .detect(repo, &RevisionRange { since: None, until: second })
        .unwrap();
    assert_eq!(own_delta.len(), 2);
    assert!(own_delta.iter().all(|r| repo.join(&r.source_path).is_file()));
}

#[test]
fn missing_repository_is_a_git_error() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempdir().unwrap();
    assert!(GitCli::default().head_revision(dir.path()).is_err());
}

#[test]
fn coordinator_mirrors_successive_commits() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo_dir = tempdir().unwrap();
    let vault_dir = tempdir().unwrap();
    let repo = repo_dir.path();
    init_repo(repo);

    let config = Config {
        repository_path: repo.to_path_buf(),
        vault_output_path: vault_dir.path().to_path_buf(),
        ..Config::default()
    }
    .with_default_extensions();
    let coordinator = PipelineCoordinator::new(
        SharedConfig::new(config),
        Arc::new(GitCli::default()),
        ConversionDispatcher::with_defaults(),
        Arc::new(ExclusiveOpenProbe),
    );
    let converted = vault_dir.path().join("converted");

    let outcome = coordinator.run_blocking(Trigger::Manual).unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert!(converted.join("README.md").exists());
    assert!(converted.join("old.txt.md").exists());

    commit_files(repo, &[("docs/guide.txt", "guide")], "docs");
    commit_files(repo, &[("src/main.js", "let x;")], "code");

    match coordinator.run_blocking(Trigger::Manual).unwrap() {
        RunOutcome::Completed(report) => {
            assert_eq!(report.files_processed, 2);
            assert!(report.skipped.is_empty());
        }
        other => panic!("expected completed run, got {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(converted.join("docs").join("guide.txt.md")).unwrap(),
        "```txt\nguide\n```"
    );
    assert!(converted.join("src").join("main.js.md").exists());
}
