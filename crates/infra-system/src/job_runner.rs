// Subprocess job runner
// reason: tokio for async process management, timers and signal races
use async_trait::async_trait;
use std::io::{self, Write};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use hubmon_core::application::constants::{
    timeout_message, DEFAULT_CAPTURE_BYTES, DEFAULT_KILL_GRACE, INTERRUPTED_MESSAGE,
};
use hubmon_core::application::{CaptureBuffer, InterruptToken};
use hubmon_core::domain::{JobRun, JobRunConfig};
use hubmon_core::error::Result;
use hubmon_core::port::{JobExecutor, JobSpool, TimeProvider, UserProvider};

use crate::terminator::{PlatformTerminator, ProcessTerminator};

/// How long to keep reading output after the child exited.
/// Bounds the wait when a detached descendant still holds the pipe.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

type SharedCapture = Arc<Mutex<CaptureBuffer<Box<dyn Write + Send>>>>;

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output tails collected from one child process
#[derive(Default)]
struct CapturedOutput {
    stdout: String,
    stderr: String,
}

/// Runs one job attempt end-to-end
///
/// Registers the attempt in the spool, spawns the command, races it against the max
/// execution time and external interruption, then files the terminal record.
pub struct SubprocessJobRunner {
    spool: Arc<dyn JobSpool>,
    time_provider: Arc<dyn TimeProvider>,
    user_provider: Arc<dyn UserProvider>,
    terminator: Arc<dyn ProcessTerminator>,
    capture_bytes: usize,
    kill_grace: Duration,
    tee: bool,
}

impl SubprocessJobRunner {
    /// Create a runner with platform termination, 100 byte capture tails and output tee
    ///
    /// # Example
    /// ```ignore
    /// let runner = SubprocessJobRunner::new(
    ///     Arc::new(FsJobSpool::new("/var/lib/hubmon/jobmon")),
    ///     Arc::new(SystemTimeProvider),
    ///     Arc::new(OsUserProvider),
    /// );
    /// let job = runner.run_job(&config, InterruptToken::never()).await?;
    /// ```
    pub fn new(
        spool: Arc<dyn JobSpool>,
        time_provider: Arc<dyn TimeProvider>,
        user_provider: Arc<dyn UserProvider>,
    ) -> Self {
        Self {
            spool,
            time_provider,
            user_provider,
            terminator: Arc::new(PlatformTerminator::default()),
            capture_bytes: DEFAULT_CAPTURE_BYTES,
            kill_grace: DEFAULT_KILL_GRACE,
            tee: true,
        }
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_capture_bytes(mut self, capture_bytes: usize) -> Self {
        self.capture_bytes = capture_bytes;
        self
    }

    pub fn with_kill_grace(mut self, kill_grace: Duration) -> Self {
        self.kill_grace = kill_grace;
        self
    }

    /// Forward the child's output to our own stdout/stderr (default: on)
    pub fn with_tee(mut self, tee: bool) -> Self {
        self.tee = tee;
        self
    }

    fn destination(&self, stream: Stream) -> Box<dyn Write + Send> {
        match (self.tee, stream) {
            (true, Stream::Stdout) => Box::new(io::stdout()),
            (true, Stream::Stderr) => Box::new(io::stderr()),
            (false, _) => Box::new(io::sink()),
        }
    }

    fn build_command(&self, config: &JobRunConfig) -> Command {
        let mut command = Command::new(&config.command[0]);
        command
            .args(&config.command[1..])
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.terminator.prepare(&mut command);
        command
    }

    /// Spawn and supervise the child. Process problems end up as annotations in `job`.
    async fn execute(
        &self,
        config: &JobRunConfig,
        job: &mut JobRun,
        mut interrupt: InterruptToken,
    ) -> CapturedOutput {
        let mut child = match self.build_command(config).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Failed to start command");
                job.add_error(e.to_string());
                return CapturedOutput::default();
            }
        };

        info!(
            job_id = %job.job_id,
            pid = ?child.id(),
            command = %job.command,
            max_execution_time = ?config.max_execution_time,
            "Job process started"
        );

        let stdout = self.attach(child.stdout.take(), Stream::Stdout);
        let stderr = self.attach(child.stderr.take(), Stream::Stderr);

        let deadline = config
            .max_execution_time
            .and_then(|d| Instant::now().checked_add(d));
        let mut kill_at: Option<Instant> = None;
        let mut terminating = false;

        let status = loop {
            tokio::select! {
                biased;

                status = child.wait() => break status,

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() && !terminating =>
                {
                    terminating = true;
                    if self.terminate(&mut child, &job.job_id) {
                        let limit = config.max_execution_time.unwrap_or_default();
                        warn!(job_id = %job.job_id, limit = ?limit, "Max execution time exceeded");
                        job.add_error(timeout_message(limit));
                        kill_at = Some(Instant::now() + self.kill_grace);
                    }
                }

                _ = interrupt.wait(), if !terminating => {
                    terminating = true;
                    if self.terminate(&mut child, &job.job_id) {
                        warn!(job_id = %job.job_id, "Job interrupted externally");
                        job.add_error(INTERRUPTED_MESSAGE);
                        kill_at = Some(Instant::now() + self.kill_grace);
                    }
                }

                _ = sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() => {
                    kill_at = None;
                    warn!(job_id = %job.job_id, "Process ignored termination, killing");
                    if let Err(e) = self.terminator.kill(&mut child) {
                        error!(job_id = %job.job_id, error = %e, "Failed to kill process");
                    }
                }
            }
        };

        self.record_status(job, status);

        CapturedOutput {
            stdout: Self::collect(stdout).await,
            stderr: Self::collect(stderr).await,
        }
    }

    /// Stop the child unless it already exited. Returns whether a termination was issued.
    fn terminate(&self, child: &mut Child, job_id: &str) -> bool {
        if let Ok(Some(_)) = child.try_wait() {
            debug!(job_id = %job_id, "Process already exited, nothing to terminate");
            return false;
        }

        if let Err(e) = self.terminator.terminate(child) {
            error!(job_id = %job_id, error = %e, "Failed to terminate process");
        }
        true
    }

    fn record_status(&self, job: &mut JobRun, status: io::Result<ExitStatus>) {
        match status {
            Ok(status) => match status.code() {
                Some(code) => job.exit_code = Some(code),
                // Killed by a signal: no exit code to report
                None => job.add_error(status.to_string()),
            },
            Err(e) => job.add_error(e.to_string()),
        }
    }

    fn attach<R>(&self, pipe: Option<R>, stream: Stream) -> Option<(SharedCapture, JoinHandle<()>)>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pipe = pipe?;
        let capture: SharedCapture = Arc::new(Mutex::new(CaptureBuffer::new(
            self.destination(stream),
            self.capture_bytes,
        )));
        let handle = tokio::spawn(pump(pipe, capture.clone()));
        Some((capture, handle))
    }

    async fn collect(attached: Option<(SharedCapture, JoinHandle<()>)>) -> String {
        let Some((capture, handle)) = attached else {
            return String::new();
        };

        let abort = handle.abort_handle();
        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, handle).await.is_err() {
            warn!("Output pipe still open after process exit, stopped reading");
            abort.abort();
        }

        let text = match capture.lock() {
            Ok(buffer) => {
                debug!(bytes = buffer.total_written(), "Child output drained");
                buffer.as_string()
            }
            Err(poisoned) => poisoned.into_inner().as_string(),
        };
        text
    }
}

/// Copy a child pipe into its capture buffer until EOF
async fn pump<R>(mut pipe: R, capture: SharedCapture)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut tee_failed = false;

    loop {
        let n = match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Reading child output failed");
                break;
            }
        };

        let written = match capture.lock() {
            Ok(mut buffer) => buffer.write(&chunk[..n]),
            Err(_) => break,
        };

        // Keep draining so the child never blocks on a full pipe
        if let Err(e) = written {
            if !tee_failed {
                warn!(error = %e, "Forwarding child output failed");
                tee_failed = true;
            }
        }
    }

    if let Ok(mut buffer) = capture.lock() {
        let _ = buffer.flush();
    }
}

#[async_trait]
impl JobExecutor for SubprocessJobRunner {
    async fn run_job(&self, config: &JobRunConfig, interrupt: InterruptToken) -> Result<JobRun> {
        config.validate()?;

        let mut job = JobRun::start(
            config,
            self.user_provider.current_user(),
            self.time_provider.now(),
        );

        // AlreadyRunning: the rejected attempt is already filed, the command must not run
        let entry = self.spool.new_job(&mut job, config.force)?;

        let output = self.execute(config, &mut job, interrupt).await;

        job.finish(self.time_provider.now());
        if config.record_stdout {
            job.stdout = Some(output.stdout);
        }
        if config.record_stderr {
            job.stderr = Some(output.stderr);
        }

        self.spool.finish_job(&entry, &job)?;

        info!(
            job_id = %job.job_id,
            exit_code = ?job.exit_code,
            duration = ?job.duration,
            errors = job.errors.len(),
            "Job run completed"
        );

        Ok(job)
    }
}
