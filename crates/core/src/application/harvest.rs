// Spool harvester - read-back side of the spool used by the metrics reporter

use crate::domain::JobRun;
use crate::port::{JobSpool, SpoolError};
use std::sync::Arc;
use tracing::{debug, info};

/// Collects finished attempts from the spool so they can be forwarded to the Hub
pub struct SpoolHarvester {
    spool: Arc<dyn JobSpool>,
}

impl SpoolHarvester {
    pub fn new(spool: Arc<dyn JobSpool>) -> Self {
        Self { spool }
    }

    /// Finished attempts, without consuming them
    pub fn peek(&self) -> Result<Vec<JobRun>, SpoolError> {
        Ok(self
            .spool
            .get_finished_jobs()?
            .into_iter()
            .map(|(_, job)| job)
            .collect())
    }

    /// Take every finished attempt out of the spool
    ///
    /// Only the entries returned here are removed; attempts finishing concurrently stay for
    /// the next harvest.
    pub fn harvest(&self) -> Result<Vec<JobRun>, SpoolError> {
        let finished = self.spool.get_finished_jobs()?;
        if finished.is_empty() {
            debug!("No finished jobs in spool");
            return Ok(Vec::new());
        }

        let (entries, jobs): (Vec<_>, Vec<_>) = finished.into_iter().unzip();
        self.spool.remove_jobs(&entries)?;

        info!(count = jobs.len(), "Harvested finished jobs from spool");
        Ok(jobs)
    }
}
