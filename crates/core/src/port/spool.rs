// Job Spool Port (Interface)
// Durable bookkeeping of job attempts plus duplicate-run detection

use crate::domain::{JobRun, SpoolEntryId};
use std::path::PathBuf;
use thiserror::Error;

/// Spool errors
#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("failed to acquire spool lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create spool directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Distinguished duplicate-run condition. `entry` is the record persisted for the
    /// rejected attempt.
    #[error("a job with the id '{job_id}' is already running")]
    AlreadyRunning { job_id: String, entry: SpoolEntryId },

    #[error("spool entry not found: {0}")]
    NotFound(SpoolEntryId),

    #[error("spool I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode spool entry {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode job run: {0}")]
    Encode(#[source] serde_json::Error),
}

impl SpoolError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SpoolError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Spool interface
///
/// Every call is one short, lock-guarded operation. The lock never spans the lifetime of a
/// child process.
pub trait JobSpool: Send + Sync {
    /// Register a new attempt and detect duplicates
    ///
    /// When another attempt of the same job is running and `forced` is false, the annotation
    /// "a job with the same ID is already running" is appended to `job`, the attempt is filed
    /// directly as finished and `SpoolError::AlreadyRunning` is returned.
    /// When `forced` is true, every running record of the job is deleted first.
    fn new_job(&self, job: &mut JobRun, forced: bool) -> Result<SpoolEntryId, SpoolError>;

    /// Transition a running attempt to finished (rename, then rewrite the body)
    fn finish_job(&self, entry: &SpoolEntryId, job: &JobRun) -> Result<(), SpoolError>;

    /// All finished attempts, with their identity and decoded record
    fn get_finished_jobs(&self) -> Result<Vec<(SpoolEntryId, JobRun)>, SpoolError>;

    /// Delete the given attempts. Already-missing entries are not an error.
    fn remove_jobs(&self, entries: &[SpoolEntryId]) -> Result<(), SpoolError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::application::constants::ALREADY_RUNNING_MESSAGE;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory spool with the same state machine as the filesystem one
    #[derive(Default)]
    pub struct InMemorySpool {
        entries: Mutex<BTreeMap<SpoolEntryId, JobRun>>,
        fail_lock: Mutex<bool>,
    }

    impl InMemorySpool {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every following call fail as if another process held the lock
        pub fn set_lock_failure(&self, fail: bool) {
            *self.fail_lock.lock().unwrap() = fail;
        }

        /// Seed a record, e.g. a stale running attempt left by a crash
        pub fn insert(&self, entry: SpoolEntryId, job: JobRun) {
            self.entries.lock().unwrap().insert(entry, job);
        }

        pub fn entries(&self) -> Vec<(SpoolEntryId, JobRun)> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }

        fn check_lock(&self) -> Result<(), SpoolError> {
            if *self.fail_lock.lock().unwrap() {
                return Err(SpoolError::Lock {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        "lock held by another process",
                    ),
                });
            }
            Ok(())
        }
    }

    impl JobSpool for InMemorySpool {
        fn new_job(&self, job: &mut JobRun, forced: bool) -> Result<SpoolEntryId, SpoolError> {
            self.check_lock()?;
            let mut entries = self.entries.lock().unwrap();

            let running: Vec<SpoolEntryId> = entries
                .keys()
                .filter(|e| !e.finished && e.belongs_to(&job.job_id))
                .cloned()
                .collect();
            let already_running = !running.is_empty();

            if already_running && !forced {
                job.add_error(ALREADY_RUNNING_MESSAGE);
            }
            if forced {
                for entry in &running {
                    entries.remove(entry);
                }
            }

            let rejected = already_running && !forced;
            let entry = SpoolEntryId::new(&job.job_id, job.started_at, rejected);
            entries.insert(entry.clone(), job.clone());

            if rejected {
                return Err(SpoolError::AlreadyRunning {
                    job_id: job.job_id.clone(),
                    entry,
                });
            }
            Ok(entry)
        }

        fn finish_job(&self, entry: &SpoolEntryId, job: &JobRun) -> Result<(), SpoolError> {
            self.check_lock()?;
            let mut entries = self.entries.lock().unwrap();
            if entries.remove(entry).is_none() {
                return Err(SpoolError::NotFound(entry.clone()));
            }
            entries.insert(entry.as_finished(), job.clone());
            Ok(())
        }

        fn get_finished_jobs(&self) -> Result<Vec<(SpoolEntryId, JobRun)>, SpoolError> {
            self.check_lock()?;
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k.finished)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }

        fn remove_jobs(&self, entries: &[SpoolEntryId]) -> Result<(), SpoolError> {
            self.check_lock()?;
            let mut stored = self.entries.lock().unwrap();
            for entry in entries {
                stored.remove(entry);
            }
            Ok(())
        }
    }
}
