//! Lock probe run before a file is read.
//!
//! The probe opens the file for reading without sharing (share mode 0 on Windows) and
//! takes a non-blocking exclusive lock on the handle. Handle and lock live only inside
//! [`ExclusiveOpenProbe::try_acquire_read`]; both are released when it returns, on
//! every path.
//!
//! A missing file is not locked. The probe reports it as available and the read that
//! follows fails with a not-found error.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::contract::{Availability, AvailabilityProbe};

#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveOpenProbe;

impl ExclusiveOpenProbe {
    fn open_unshared(path: &Path) -> std::io::Result<File> {
        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(windows)]
        {
            use std::os::windows::fs::OpenOptionsExt;
            options.share_mode(0);
        }
        options.open(path)
    }
}

impl AvailabilityProbe for ExclusiveOpenProbe {
    fn try_acquire_read(&self, path: &Path) -> Availability {
        let file = match Self::open_unshared(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "File vanished before probing");
                return Availability::Available;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "File could not be opened exclusively");
                return Availability::Locked(e.to_string());
            }
        };
        match file.try_lock() {
            Ok(()) => Availability::Available,
            Err(TryLockError::WouldBlock) => {
                Availability::Locked("file is locked by another process".to_string())
            }
            Err(TryLockError::Error(e)) => Availability::Locked(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unlocked_file_is_available_and_released() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let probe = ExclusiveOpenProbe;
        assert_eq!(probe.try_acquire_read(&path), Availability::Available);
        // A second probe succeeds, so the first one let go.
        assert_eq!(probe.try_acquire_read(&path), Availability::Available);
    }

    #[test]
    fn locked_file_reports_reason() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello").unwrap();

        let holder = File::open(&path).unwrap();
        holder.lock().unwrap();

        match ExclusiveOpenProbe.try_acquire_read(&path) {
            Availability::Locked(reason) => assert!(!reason.is_empty()),
            Availability::Available => panic!("expected the file to be locked"),
        }

        holder.unlock().unwrap();
        assert_eq!(ExclusiveOpenProbe.try_acquire_read(&path), Availability::Available);
    }

    #[test]
    fn missing_file_is_left_to_the_reader() {
        let dir = tempdir().unwrap();
        assert_eq!(
            ExclusiveOpenProbe.try_acquire_read(&dir.path().join("missing.txt")),
            Availability::Available
        );
    }
}
