//! Pipeline orchestration: one trigger in, one mirrored delta out.
//!
//! [`PipelineCoordinator`] owns the process-lifetime [`SyncState`] and runs the stages for
//! a single trigger:
//!   1. resolve the changed-file set (incremental diff against the last processed
//!      revision, or a full tree enumeration),
//!   2. stop early when nothing matched,
//!   3. probe the vault and partition the files into size-bounded batches,
//!   4. per file: availability probe → conversion → path mapping → write, collecting a
//!      skip list instead of failing,
//!   5. log a summary and advance the revision marker.
//!
//! # Gate
//! A single mutex guards both `pipeline_running` and the markers. [`PipelineCoordinator::try_begin`]
//! either admits a trigger (returning a [`RunGuard`]) or drops it as busy or duplicate.
//! Dropped triggers are never queued; the next admitted incremental run diffs against
//! the last *processed* revision, so commits that landed meanwhile are still picked up.
//! The guard releases the gate when dropped, including on unwinding. Markers are only
//! advanced by [`RunGuard::complete`], which a run reaches only after its last batch.
//!
//! # Error Handling
//! - Fatal ([`PipelineError`]): invalid config, git cannot run, vault not writable. The
//!   run aborts and the markers stay put so the same delta is retried.
//! - Per file ([`SkippedFile`]): locks, extraction failures, write failures. Logged at
//!   `warn` and reported; the batch continues.
//!
//! # Callable From
//! - The CLI one-shot commands (`sync`, `full-sync`) through [`PipelineCoordinator::run`]
//! - The watch loop in [`crate::watch`]
//! - Tests, which usually call [`PipelineCoordinator::run_blocking`] with mocked collaborators

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::availability::ExclusiveOpenProbe;
use crate::batch::{BatchScheduler, SizedFile};
use crate::config::{Config, ConfigError, SharedConfig};
use crate::contract::{
    Availability, AvailabilityProbe, ChangeSource, ExtractionResult, RevisionRange, VcsError,
};
use crate::convert::ConversionDispatcher;
use crate::detect::{enumerate_tree, ChangeDetector, GitCli};
use crate::vault_path::VaultPathMapper;
use crate::writer::{VaultUnwritable, VaultWriter};

/// An event asking for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The HEAD log changed; carries its modification time.
    CommitDetected { revision_timestamp: SystemTime },
    /// Operator asked for an incremental sync.
    Manual,
    /// Operator asked to mirror every accepted file in the working tree.
    FullResync,
}

impl Trigger {
    pub fn run_kind(&self) -> RunKind {
        match self {
            Trigger::CommitDetected { .. } | Trigger::Manual => RunKind::Incremental,
            Trigger::FullResync => RunKind::Full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Incremental,
    Full,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Incremental => f.write_str("incremental"),
            RunKind::Full => f.write_str("full"),
        }
    }
}

/// Process-lifetime pipeline state, read and written only under the coordinator gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Modification time of the HEAD log at the last completed run. Never decreases.
    pub last_processed_timestamp: Option<SystemTime>,
    /// HEAD commit the last completed run diffed up to.
    pub last_processed_revision: Option<String>,
    pub pipeline_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Another run holds the gate.
    Busy,
    /// The trigger's revision timestamp is not newer than the last processed one.
    Duplicate,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Busy => f.write_str("a pipeline run is already in progress"),
            DropReason::Duplicate => f.write_str("revision already processed"),
        }
    }
}

/// A file the run could not mirror, with the reason shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: RunKind,
    pub revision: String,
    pub files_considered: usize,
    pub files_processed: usize,
    pub documents_written: usize,
    pub batches: usize,
    pub skipped: Vec<SkippedFile>,
}

impl RunReport {
    fn empty(run_id: Uuid, kind: RunKind, revision: String) -> Self {
        Self {
            run_id,
            kind,
            revision,
            files_considered: 0,
            files_processed: 0,
            documents_written: 0,
            batches: 0,
            skipped: Vec::new(),
        }
    }

    /// Multi-line operator summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} run at {}: {} of {} file(s) processed, {} document(s) written in {} batch(es), {} skipped",
            self.kind,
            self.revision,
            self.files_processed,
            self.files_considered,
            self.documents_written,
            self.batches,
            self.skipped.len()
        );
        for skipped in &self.skipped {
            out.push_str(&format!("\n  skipped {}: {}", skipped.path.display(), skipped.reason));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    Dropped(DropReason),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("version control failure: {0}")]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    VaultUnwritable(#[from] VaultUnwritable),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

fn lock_state(state: &Mutex<SyncState>) -> MutexGuard<'_, SyncState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Modification time of the given file, `None` when it cannot be read.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Admission ticket for one run. Dropping it reopens the gate without touching markers.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<Mutex<SyncState>>,
    since: Option<String>,
    released: bool,
}

impl RunGuard {
    /// Revision the run diffs from, captured at admission.
    pub fn since(&self) -> Option<&str> {
        self.since.as_deref()
    }

    /// Advances the markers and reopens the gate under one lock.
    pub fn complete(mut self, timestamp: Option<SystemTime>, revision: Option<String>) {
        let mut state = lock_state(&self.state);
        if let Some(ts) = timestamp {
            state.last_processed_timestamp = Some(match state.last_processed_timestamp {
                Some(previous) if previous > ts => previous,
                _ => ts,
            });
        }
        if revision.is_some() {
            state.last_processed_revision = revision;
        }
        state.pipeline_running = false;
        self.released = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.released {
            lock_state(&self.state).pipeline_running = false;
        }
    }
}

struct Collaborators {
    config: SharedConfig,
    vcs: Arc<dyn ChangeSource>,
    dispatcher: Arc<ConversionDispatcher>,
    probe: Arc<dyn AvailabilityProbe>,
}

#[derive(Clone)]
pub struct PipelineCoordinator {
    inner: Arc<Collaborators>,
    state: Arc<Mutex<SyncState>>,
}

impl fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("state", &*lock_state(&self.state))
            .finish_non_exhaustive()
    }
}

impl PipelineCoordinator {
    pub fn new(
        config: SharedConfig,
        vcs: Arc<dyn ChangeSource>,
        dispatcher: ConversionDispatcher,
        probe: Arc<dyn AvailabilityProbe>,
    ) -> Self {
        Self {
            inner: Arc::new(Collaborators {
                config,
                vcs,
                dispatcher: Arc::new(dispatcher),
                probe,
            }),
            state: Arc::new(Mutex::new(SyncState::default())),
        }
    }

    /// Real collaborators: `git` on `PATH`, the built-in extractors and the exclusive-open probe.
    pub fn with_defaults(config: SharedConfig) -> Self {
        Self::new(
            config,
            Arc::new(GitCli::default()),
            ConversionDispatcher::with_defaults(),
            Arc::new(ExclusiveOpenProbe),
        )
    }

    /// Starts from the given markers instead of an empty state.
    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = Arc::new(Mutex::new(SyncState {
            pipeline_running: false,
            ..state
        }));
        self
    }

    pub fn state(&self) -> SyncState {
        lock_state(&self.state).clone()
    }

    pub fn config(&self) -> &SharedConfig {
        &self.inner.config
    }

    /// Swaps the configuration for future runs. A run in progress keeps its snapshot.
    pub fn reconfigure(&self, config: Config) {
        self.inner.config.replace(config);
    }

    /// Atomically checks and closes the gate.
    pub fn try_begin(&self, trigger: &Trigger) -> Result<RunGuard, DropReason> {
        let mut state = lock_state(&self.state);
        if state.pipeline_running {
            return Err(DropReason::Busy);
        }
        if let Trigger::CommitDetected { revision_timestamp } = trigger {
            if let Some(last) = state.last_processed_timestamp {
                if *revision_timestamp <= last {
                    return Err(DropReason::Duplicate);
                }
            }
        }
        state.pipeline_running = true;
        Ok(RunGuard {
            state: Arc::clone(&self.state),
            since: state.last_processed_revision.clone(),
            released: false,
        })
    }

    /// Admits the trigger and runs it on the calling thread.
    pub fn run_blocking(&self, trigger: Trigger) -> Result<RunOutcome, PipelineError> {
        match self.try_begin(&trigger) {
            Ok(guard) => self.execute(guard, trigger).map(RunOutcome::Completed),
            Err(reason) => {
                info!(trigger = ?trigger, reason = %reason, "[SYNC] Trigger dropped");
                Ok(RunOutcome::Dropped(reason))
            }
        }
    }

    /// Admits the trigger on the caller's task, then runs the pipeline on the blocking pool
    /// so git, extraction and file I/O never stall the async side.
    pub async fn run(&self, trigger: Trigger) -> Result<RunOutcome, PipelineError> {
        let guard = match self.try_begin(&trigger) {
            Ok(guard) => guard,
            Err(reason) => {
                info!(trigger = ?trigger, reason = %reason, "[SYNC] Trigger dropped");
                return Ok(RunOutcome::Dropped(reason));
            }
        };
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.execute(guard, trigger))
            .await
            .map_err(|e| {
                error!(error = ?e, "[SYNC][ERROR] Pipeline worker terminated abnormally");
                PipelineError::Worker(e.to_string())
            })?
            .map(RunOutcome::Completed)
    }

    fn execute(&self, guard: RunGuard, trigger: Trigger) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let kind = trigger.run_kind();
        let span = info_span!("pipeline_run", run_id = %run_id, kind = %kind);
        let _enter = span.enter();

        let config = self.inner.config.snapshot();
        info!(trigger = ?trigger, repository = %config.repository_path.display(), "[SYNC] Starting pipeline run");

        if let Err(e) = config.validate() {
            error!(error = %e, "[SYNC][ERROR] Configuration invalid, run not started");
            return Err(e.into());
        }

        let repo = config.repository_path.as_path();
        let timestamp = match &trigger {
            Trigger::CommitDetected { revision_timestamp } => Some(*revision_timestamp),
            Trigger::Manual | Trigger::FullResync => modified_time(&config.head_log_path()),
        };

        let head = self.inner.vcs.head_revision(repo).map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Could not resolve HEAD");
            PipelineError::from(e)
        })?;

        let filter = config.extension_filter();
        let relative_paths: Vec<PathBuf> = match kind {
            RunKind::Incremental => {
                let range = RevisionRange {
                    since: guard.since().filter(|since| *since != head).map(str::to_string),
                    until: head.clone(),
                };
                debug!(since = ?range.since, until = %range.until, "[SYNC] Resolving changed files");
                ChangeDetector::new(self.inner.vcs.as_ref(), &filter)
                    .detect(repo, &range)
                    .map_err(|e| {
                        error!(error = %e, "[SYNC][ERROR] Change detection failed");
                        PipelineError::from(e)
                    })?
                    .into_iter()
                    .map(|record| record.source_path)
                    .collect()
            }
            RunKind::Full => enumerate_tree(repo, &filter),
        };

        let mut report = RunReport::empty(run_id, kind, head.clone());
        report.files_considered = relative_paths.len();

        if relative_paths.is_empty() {
            info!("[SYNC] No accepted files changed, nothing to do");
            guard.complete(timestamp, Some(head));
            return Ok(report);
        }

        let mapper = VaultPathMapper::new(&config.vault_output_path);
        let writer = VaultWriter::new(mapper.output_root());
        writer.ensure_writable()?;

        let files: Vec<SizedFile> = relative_paths
            .iter()
            .map(|relative| SizedFile::from_path(&repo.join(relative)))
            .collect();
        let batches = BatchScheduler::new(config.patch_limit_bytes).schedule(files);
        report.batches = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            info!(
                batch = index + 1,
                of = batches.len(),
                files = batch.len(),
                bytes = batch.total_bytes(),
                "[BATCH] Processing batch"
            );
            for absolute in batch.paths() {
                let relative = absolute.strip_prefix(repo).unwrap_or(absolute);
                match self.process_file(absolute, relative, &mapper, &writer) {
                    Ok(documents) => {
                        report.files_processed += 1;
                        report.documents_written += documents;
                    }
                    Err(reason) => {
                        warn!(path = %relative.display(), reason = %reason, "[BATCH] Skipping file");
                        report.skipped.push(SkippedFile {
                            path: relative.to_path_buf(),
                            reason,
                        });
                    }
                }
            }
            info!(batch = index + 1, "[BATCH] Batch completed");
        }

        info!(
            files_processed = report.files_processed,
            documents_written = report.documents_written,
            batches = report.batches,
            skipped = report.skipped.len(),
            "[SYNC] Pipeline run completed"
        );
        guard.complete(timestamp, Some(head));
        Ok(report)
    }

    /// Mirrors one file. Returns the number of documents written, or the skip reason.
    fn process_file(
        &self,
        absolute: &Path,
        relative: &Path,
        mapper: &VaultPathMapper,
        writer: &VaultWriter,
    ) -> Result<usize, String> {
        if let Availability::Locked(reason) = self.inner.probe.try_acquire_read(absolute) {
            return Err(format!("file is locked: {reason}"));
        }

        let result = self
            .inner
            .dispatcher
            .convert(absolute)
            .map_err(|e| e.to_string())?;

        let write = |target: PathBuf, content: &str| {
            writer
                .write(&target, content)
                .map_err(|e| format!("failed to write {}: {e}", target.display()))
        };

        let written = result.document_count();
        match result {
            ExtractionResult::Single { content, .. } => {
                write(mapper.map_path(relative), &content)?;
            }
            ExtractionResult::Multiple(documents) => {
                for document in &documents {
                    write(
                        mapper.map_exploded_path(relative, &document.relative_path),
                        &document.content,
                    )?;
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockAvailabilityProbe, MockChangeSource};
    use std::time::Duration;

    fn coordinator() -> PipelineCoordinator {
        PipelineCoordinator::new(
            SharedConfig::new(Config::default()),
            Arc::new(MockChangeSource::new()),
            ConversionDispatcher::new(),
            Arc::new(MockAvailabilityProbe::new()),
        )
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn second_admission_is_busy_until_guard_drops() {
        let coordinator = coordinator();
        let guard = coordinator.try_begin(&Trigger::Manual).unwrap();
        assert!(coordinator.state().pipeline_running);
        assert_eq!(
            coordinator.try_begin(&Trigger::FullResync).unwrap_err(),
            DropReason::Busy
        );
        drop(guard);
        assert!(!coordinator.state().pipeline_running);
        assert!(coordinator.try_begin(&Trigger::Manual).is_ok());
    }

    #[test]
    fn commit_trigger_not_newer_than_marker_is_duplicate() {
        let coordinator = coordinator().with_state(SyncState {
            last_processed_timestamp: Some(at(100)),
            ..SyncState::default()
        });
        struct Case {
            trigger: Trigger,
            admitted: bool,
        }
        let cases = vec![
            Case {
                trigger: Trigger::CommitDetected { revision_timestamp: at(99) },
                admitted: false,
            },
            Case {
                trigger: Trigger::CommitDetected { revision_timestamp: at(100) },
                admitted: false,
            },
            Case {
                trigger: Trigger::CommitDetected { revision_timestamp: at(101) },
                admitted: true,
            },
            Case {
                trigger: Trigger::Manual,
                admitted: true,
            },
        ];
        for case in cases {
            match coordinator.try_begin(&case.trigger) {
                Ok(_guard) => assert!(case.admitted, "{:?}", case.trigger),
                Err(reason) => {
                    assert!(!case.admitted, "{:?}", case.trigger);
                    assert_eq!(reason, DropReason::Duplicate);
                }
            }
        }
    }

    #[test]
    fn dropped_guard_leaves_markers_untouched() {
        let coordinator = coordinator().with_state(SyncState {
            last_processed_timestamp: Some(at(5)),
            last_processed_revision: Some("abc".into()),
            pipeline_running: true,
        });
        // with_state never starts out busy
        assert!(!coordinator.state().pipeline_running);
        let guard = coordinator.try_begin(&Trigger::Manual).unwrap();
        assert_eq!(guard.since(), Some("abc"));
        drop(guard);
        let state = coordinator.state();
        assert_eq!(state.last_processed_timestamp, Some(at(5)));
        assert_eq!(state.last_processed_revision.as_deref(), Some("abc"));
    }

    #[test]
    fn completion_never_moves_the_timestamp_backwards() {
        let coordinator = coordinator().with_state(SyncState {
            last_processed_timestamp: Some(at(50)),
            ..SyncState::default()
        });
        coordinator
            .try_begin(&Trigger::Manual)
            .unwrap()
            .complete(Some(at(10)), Some("r1".into()));
        let state = coordinator.state();
        assert_eq!(state.last_processed_timestamp, Some(at(50)));
        assert_eq!(state.last_processed_revision.as_deref(), Some("r1"));
        assert!(!state.pipeline_running);

        coordinator
            .try_begin(&Trigger::Manual)
            .unwrap()
            .complete(Some(at(60)), None);
        let state = coordinator.state();
        assert_eq!(state.last_processed_timestamp, Some(at(60)));
        assert_eq!(state.last_processed_revision.as_deref(), Some("r1"));
    }

    #[test]
    fn invalid_config_is_fatal_and_releases_gate() {
        let coordinator = coordinator();
        let err = coordinator.run_blocking(Trigger::Manual).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::RepositoryNotSet)));
        let state = coordinator.state();
        assert!(!state.pipeline_running);
        assert_eq!(state.last_processed_revision, None);
    }

    #[test]
    fn summary_lists_skipped_files() {
        let mut report = RunReport::empty(Uuid::nil(), RunKind::Incremental, "abc123".into());
        report.files_considered = 2;
        report.files_processed = 1;
        report.documents_written = 1;
        report.batches = 1;
        report.skipped.push(SkippedFile {
            path: PathBuf::from("locked.txt"),
            reason: "file is locked: busy".into(),
        });
        let summary = report.summary();
        assert!(summary.starts_with("incremental run at abc123: 1 of 2 file(s) processed"));
        assert!(summary.contains("skipped locked.txt: file is locked: busy"));
    }
}
