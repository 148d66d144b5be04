//! Commit detection and the long-lived trigger loop.
//!
//! Git rewrites `.git/logs/HEAD` on every commit. [`HeadLogWatcher`] watches the `logs`
//! directory through a debouncer, keeps only events for `HEAD` whose modification time
//! moved forward, and pushes a [`Trigger::CommitDetected`] into a bounded channel without
//! ever blocking the notification thread. [`run_trigger_loop`] drains that channel and
//! gives each trigger its own attempt at the coordinator gate.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::synchronise::{modified_time, PipelineCoordinator, RunOutcome, Trigger};

/// Capacity used by callers that do not pick their own.
pub const DEFAULT_TRIGGER_CAPACITY: usize = 16;

const HEAD_LOG_NAME: &str = "HEAD";

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("git log directory {} does not exist", .0.display())]
    MissingLogDir(PathBuf),
    #[error("failed to watch {}: {source}", path.display())]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Drops HEAD log observations whose modification time did not advance.
#[derive(Debug, Clone, Default)]
pub struct AdvanceFilter {
    last_forwarded: Option<SystemTime>,
}

impl AdvanceFilter {
    pub fn starting_at(last_forwarded: Option<SystemTime>) -> Self {
        Self { last_forwarded }
    }

    pub fn observe(&mut self, modified: SystemTime) -> Option<Trigger> {
        if matches!(self.last_forwarded, Some(last) if modified <= last) {
            return None;
        }
        self.last_forwarded = Some(modified);
        Some(Trigger::CommitDetected {
            revision_timestamp: modified,
        })
    }
}

fn forward(sender: &mpsc::Sender<Trigger>, trigger: Trigger) {
    match sender.try_send(trigger) {
        Ok(()) => debug!("[WATCH] Commit trigger queued"),
        Err(TrySendError::Full(_)) => debug!("[WATCH] Trigger channel full, dropping commit trigger"),
        Err(TrySendError::Closed(_)) => warn!("[WATCH] Trigger channel closed, commit trigger lost"),
    }
}

/// Keeps the debouncer alive; watching stops when this is dropped.
pub struct HeadLogWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    head_log: PathBuf,
}

impl std::fmt::Debug for HeadLogWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadLogWatcher")
            .field("head_log", &self.head_log)
            .finish_non_exhaustive()
    }
}

impl HeadLogWatcher {
    /// Starts watching `<repo>/.git/logs`. The current HEAD log time is taken as already
    /// seen, so only commits made after this call produce triggers.
    pub fn spawn(
        repo: &Path,
        debounce: Duration,
        sender: mpsc::Sender<Trigger>,
    ) -> Result<Self, WatchError> {
        let logs_dir = repo.join(".git").join("logs");
        if !logs_dir.is_dir() {
            return Err(WatchError::MissingLogDir(logs_dir));
        }
        let head_log = logs_dir.join(HEAD_LOG_NAME);
        let mut filter = AdvanceFilter::starting_at(modified_time(&head_log));
        let handler_log = head_log.clone();

        let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| match res {
            Ok(events) => {
                let touched_head = events
                    .iter()
                    .any(|event| event.path.file_name().is_some_and(|name| name == HEAD_LOG_NAME));
                if !touched_head {
                    return;
                }
                let Some(modified) = modified_time(&handler_log) else {
                    debug!(path = %handler_log.display(), "[WATCH] HEAD log vanished, ignoring event");
                    return;
                };
                match filter.observe(modified) {
                    Some(trigger) => forward(&sender, trigger),
                    None => debug!("[WATCH] HEAD log time did not advance, ignoring event"),
                }
            }
            Err(e) => warn!(error = ?e, "[WATCH] Watch error"),
        })
        .map_err(|source| WatchError::Notify {
            path: logs_dir.clone(),
            source,
        })?;

        debouncer
            .watcher()
            .watch(&logs_dir, RecursiveMode::NonRecursive)
            .map_err(|source| {
                error!(error = ?source, path = %logs_dir.display(), "[WATCH] Unable to watch git logs");
                WatchError::Notify {
                    path: logs_dir.clone(),
                    source,
                }
            })?;

        info!(path = %head_log.display(), debounce_ms = debounce.as_millis() as u64, "[WATCH] Watching HEAD log for commits");
        Ok(Self {
            _debouncer: debouncer,
            head_log,
        })
    }

    pub fn head_log(&self) -> &Path {
        &self.head_log
    }
}

/// Receives triggers until every sender is gone. Each trigger gets its own task so a
/// trigger arriving mid-run hits the gate and is dropped instead of waiting. A failed
/// run is logged and the loop keeps going.
pub async fn run_trigger_loop(coordinator: PipelineCoordinator, mut triggers: mpsc::Receiver<Trigger>) {
    while let Some(trigger) = triggers.recv().await {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            match coordinator.run(trigger).await {
                Ok(RunOutcome::Completed(report)) => info!(
                    run_id = %report.run_id,
                    files_processed = report.files_processed,
                    skipped = report.skipped.len(),
                    "[WATCH] Run finished"
                ),
                Ok(RunOutcome::Dropped(reason)) => debug!(reason = %reason, "[WATCH] Trigger dropped"),
                Err(e) => error!(error = %e, "[WATCH][ERROR] Run failed, waiting for next trigger"),
            }
        });
    }
    info!("[WATCH] Trigger channel closed, loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn only_advancing_times_are_forwarded() {
        let mut filter = AdvanceFilter::starting_at(Some(at(10)));
        assert_eq!(filter.observe(at(10)), None);
        assert_eq!(filter.observe(at(9)), None);
        assert_eq!(
            filter.observe(at(11)),
            Some(Trigger::CommitDetected { revision_timestamp: at(11) })
        );
        assert_eq!(filter.observe(at(11)), None);
        assert!(AdvanceFilter::default().observe(at(0)).is_some());
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        forward(&tx, Trigger::Manual);
        forward(&tx, Trigger::FullResync);
        assert_eq!(rx.try_recv().unwrap(), Trigger::Manual);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn missing_git_logs_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let err = HeadLogWatcher::spawn(dir.path(), Duration::from_millis(10), tx).unwrap_err();
        assert!(matches!(err, WatchError::MissingLogDir(_)));
    }

    #[tokio::test]
    async fn commit_to_head_log_produces_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join(".git").join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        let head = logs.join("HEAD");
        std::fs::write(&head, "first\n").unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let watcher = HeadLogWatcher::spawn(dir.path(), Duration::from_millis(50), tx).unwrap();
        assert_eq!(watcher.head_log(), head.as_path());

        // mtime granularity on some filesystems is coarse
        tokio::time::sleep(Duration::from_millis(1100)).await;
        std::fs::write(&head, "first\nsecond\n").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        match received {
            Ok(Some(Trigger::CommitDetected { .. })) => {}
            other => panic!("expected commit trigger, got {other:?}"),
        }
    }
}
