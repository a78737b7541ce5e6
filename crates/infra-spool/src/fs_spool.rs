// Filesystem JobSpool Implementation

use crate::lock::SpoolLock;
use hubmon_core::application::constants::ALREADY_RUNNING_MESSAGE;
use hubmon_core::domain::{JobRun, SpoolEntryId};
use hubmon_core::port::{JobSpool, SpoolError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Spool Manager backed by a directory of `{marker}_{start}_{hexid}.json` files
#[derive(Debug, Clone)]
pub struct FsJobSpool {
    dir: PathBuf,
}

impl FsJobSpool {
    /// The directory is created lazily by the first operation
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, entry: &SpoolEntryId) -> PathBuf {
        self.dir.join(entry.file_name())
    }

    /// Every spool entry in the directory. Foreign files (the lock, editor leftovers) are
    /// skipped.
    fn list_entries(&self) -> Result<Vec<SpoolEntryId>, SpoolError> {
        let read_dir = fs::read_dir(&self.dir)
            .map_err(|e| SpoolError::io(format!("listing {}", self.dir.display()), e))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry
                .map_err(|e| SpoolError::io(format!("listing {}", self.dir.display()), e))?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Ok(entry) = SpoolEntryId::parse(name) {
                entries.push(entry);
            }
        }

        entries.sort_by_key(|e| (e.started_at_unix, e.encoded_job_id.clone(), e.finished));
        Ok(entries)
    }

    fn write_entry(&self, entry: &SpoolEntryId, job: &JobRun) -> Result<(), SpoolError> {
        let body = serde_json::to_vec(job).map_err(SpoolError::Encode)?;
        let path = self.entry_path(entry);
        fs::write(&path, body)
            .map_err(|e| SpoolError::io(format!("writing {}", path.display()), e))
    }

    fn read_entry(&self, entry: &SpoolEntryId) -> Result<Option<JobRun>, SpoolError> {
        let path = self.entry_path(entry);
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SpoolError::io(format!("reading {}", path.display()), e)),
        };

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| SpoolError::Decode { path, source })
    }

    /// Delete an entry; a file that is already gone counts as deleted
    fn remove_entry(&self, entry: &SpoolEntryId) -> Result<(), SpoolError> {
        let path = self.entry_path(entry);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(entry = %entry, "Spool entry already removed");
                Ok(())
            }
            Err(e) => Err(SpoolError::io(format!("removing {}", path.display()), e)),
        }
    }
}

impl JobSpool for FsJobSpool {
    fn new_job(&self, job: &mut JobRun, forced: bool) -> Result<SpoolEntryId, SpoolError> {
        let _lock = SpoolLock::acquire(&self.dir)?;

        let running: Vec<SpoolEntryId> = self
            .list_entries()?
            .into_iter()
            .filter(|e| !e.finished && e.belongs_to(&job.job_id))
            .collect();
        let already_running = !running.is_empty();

        if already_running && !forced {
            job.add_error(ALREADY_RUNNING_MESSAGE);
        }

        if forced {
            for entry in &running {
                warn!(job_id = %job.job_id, entry = %entry, "Forced run, removing running record");
                self.remove_entry(entry)?;
            }
        }

        // A rejected duplicate never runs, so it is filed as finished right away
        let rejected = already_running && !forced;
        let entry = SpoolEntryId::new(&job.job_id, job.started_at, rejected);
        self.write_entry(&entry, job)?;

        if rejected {
            warn!(job_id = %job.job_id, entry = %entry, "Job is already running");
            return Err(SpoolError::AlreadyRunning {
                job_id: job.job_id.clone(),
                entry,
            });
        }

        info!(job_id = %job.job_id, entry = %entry, forced, "Job registered in spool");
        Ok(entry)
    }

    fn finish_job(&self, entry: &SpoolEntryId, job: &JobRun) -> Result<(), SpoolError> {
        let _lock = SpoolLock::acquire(&self.dir)?;

        let from = self.entry_path(entry);
        let finished = entry.as_finished();
        let to = self.entry_path(&finished);

        // Rename first: a crash in between leaves a finished file with the running body,
        // never a missing record
        fs::rename(&from, &to).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SpoolError::NotFound(entry.clone())
            } else {
                SpoolError::io(format!("renaming {}", from.display()), e)
            }
        })?;
        self.write_entry(&finished, job)?;

        info!(
            job_id = %job.job_id,
            entry = %finished,
            exit_code = ?job.exit_code,
            duration = ?job.duration,
            "Job finished in spool"
        );
        Ok(())
    }

    fn get_finished_jobs(&self) -> Result<Vec<(SpoolEntryId, JobRun)>, SpoolError> {
        let finished: Vec<SpoolEntryId> = {
            let _lock = SpoolLock::acquire(&self.dir)?;
            self.list_entries()?
                .into_iter()
                .filter(|e| e.finished)
                .collect()
        };

        // Finished files are never rewritten, reading them unlocked is safe
        let mut jobs = Vec::with_capacity(finished.len());
        for entry in finished {
            match self.read_entry(&entry)? {
                Some(job) => jobs.push((entry, job)),
                None => debug!(entry = %entry, "Finished entry consumed concurrently"),
            }
        }

        Ok(jobs)
    }

    fn remove_jobs(&self, entries: &[SpoolEntryId]) -> Result<(), SpoolError> {
        let _lock = SpoolLock::acquire(&self.dir)?;

        for entry in entries {
            self.remove_entry(entry)?;
        }

        debug!(count = entries.len(), "Spool entries removed");
        Ok(())
    }
}
