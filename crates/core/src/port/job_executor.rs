// Job Executor Port
// Runs one job attempt end-to-end and produces its terminal record

use crate::application::interrupt::InterruptToken;
use crate::domain::{JobRun, JobRunConfig};
use crate::error::Result;
use async_trait::async_trait;

/// Job Executor trait
///
/// Implementations:
/// - SubprocessJobRunner: spawns the configured command as a child process
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run the job and return its terminal record
    ///
    /// # Errors
    /// - `SpoolError::AlreadyRunning` (wrapped) if another instance holds the job and
    ///   `force` is not set. The command was not executed; a finished record exists.
    /// - Any other spool error: lock or filesystem failures, fatal to the invocation
    ///
    /// Process start/wait problems are NOT errors here, they end up in `JobRun::errors`.
    async fn run_job(&self, config: &JobRunConfig, interrupt: InterruptToken) -> Result<JobRun>;
}
