//! jobmon - wraps a scheduled command and records its outcome in the hubmon spool
//!
//! ```text
//! jobmon --id backup --next-run-in 86400 --max-execution-time 3600 -- /usr/local/bin/backup.sh
//! ```

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::{info, warn};

use hubmon_core::application::{interrupt_channel, InterruptSender, SpoolHarvester};
use hubmon_core::domain::{JobRun, JobRunConfig, Severity};
use hubmon_core::port::time_provider::SystemTimeProvider;
use hubmon_core::port::JobExecutor;
use hubmon_infra_spool::FsJobSpool;
use hubmon_infra_system::{OsUserProvider, SubprocessJobRunner};

use crate::config::AgentConfig;

#[derive(Parser, Debug)]
#[command(name = "jobmon")]
#[command(about = "Run a scheduled command and record its outcome for hubmon", long_about = None)]
#[command(version)]
struct Cli {
    /// Job identifier, used to detect duplicate and missed runs
    #[arg(short, long, required_unless_present_any = ["list_finished", "harvest"])]
    id: Option<String>,

    /// Severity reported when the job misbehaves: alert, warning or none [default: from config]
    #[arg(short, long)]
    severity: Option<Severity>,

    /// Run even if a previous run of the same job is still registered as running
    #[arg(short, long)]
    force: bool,

    /// Seconds until the next run is expected (min 60)
    #[arg(short = 'n', long, value_name = "SECS")]
    next_run_in: Option<u64>,

    /// Kill the command after this many seconds (min 1)
    #[arg(short = 'm', long, value_name = "SECS")]
    max_execution_time: Option<u64>,

    /// Keep the tail of stdout in the job record
    #[arg(long)]
    record_stdout: bool,

    /// Keep the tail of stderr in the job record
    #[arg(long)]
    record_stderr: bool,

    /// Configuration file [default: $HUBMON_CONFIG or /etc/hubmon/agent.toml]
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print finished jobs waiting in the spool and exit
    #[arg(long, conflicts_with_all = ["harvest", "command"])]
    list_finished: bool,

    /// Print finished jobs as JSON, remove them from the spool and exit
    #[arg(long, conflicts_with = "command")]
    harvest: bool,

    /// Command to run, after `--`
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND",
        required_unless_present_any = ["list_finished", "harvest"]
    )]
    command: Vec<String>,
}

impl Cli {
    fn job_config(&self, default_severity: Severity) -> Result<JobRunConfig> {
        let job_id = self.id.clone().context("--id is required")?;

        let config = JobRunConfig {
            job_id,
            severity: self.severity.unwrap_or(default_severity),
            next_run_in: self.next_run_in.map(Duration::from_secs),
            max_execution_time: self.max_execution_time.map(Duration::from_secs),
            force: self.force,
            record_stdout: self.record_stdout,
            record_stderr: self.record_stderr,
            command: self.command.clone(),
        };
        config.validate().context("Invalid arguments")?;
        Ok(config)
    }
}

#[derive(Tabled)]
struct FinishedRow {
    id: String,
    started: String,
    duration: String,
    exit_code: String,
    user: String,
    severity: String,
    errors: String,
}

impl From<&JobRun> for FinishedRow {
    fn from(job: &JobRun) -> Self {
        Self {
            id: job.job_id.clone(),
            started: job.started_at.to_rfc3339(),
            duration: job
                .duration
                .map(|d| format!("{}s", d))
                .unwrap_or_else(|| "-".to_string()),
            exit_code: job
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            user: job.user.clone(),
            severity: job.severity.to_string(),
            errors: job.errors.join("; "),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "jobmon:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AgentConfig::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&config)?;

    let spool = Arc::new(FsJobSpool::new(&config.jobmon.spool_dir));

    if cli.list_finished {
        return list_finished(spool);
    }
    if cli.harvest {
        return harvest(spool);
    }

    let job_config = cli.job_config(config.jobmon.severity)?;

    let (interrupt_tx, interrupt) = interrupt_channel();
    tokio::spawn(forward_signals(interrupt_tx));

    let runner = SubprocessJobRunner::new(
        spool,
        Arc::new(SystemTimeProvider),
        Arc::new(OsUserProvider),
    )
    .with_capture_bytes(config.jobmon.capture_bytes)
    .with_kill_grace(config.jobmon.kill_grace());

    let job = runner
        .run_job(&job_config, interrupt)
        .await
        .with_context(|| format!("Job '{}' failed", job_config.job_id))?;

    info!(
        job_id = %job.job_id,
        exit_code = ?job.exit_code,
        succeeded = job.succeeded(),
        "jobmon done"
    );
    Ok(())
}

fn list_finished(spool: Arc<FsJobSpool>) -> Result<()> {
    let jobs = SpoolHarvester::new(spool.clone())
        .peek()
        .with_context(|| format!("Failed to read spool {}", spool.dir().display()))?;

    if jobs.is_empty() {
        println!("{}", "No finished jobs in spool".yellow());
        return Ok(());
    }

    let rows: Vec<FinishedRow> = jobs.iter().map(FinishedRow::from).collect();
    println!("{}", Table::new(rows));
    Ok(())
}

fn harvest(spool: Arc<FsJobSpool>) -> Result<()> {
    let jobs = SpoolHarvester::new(spool.clone())
        .harvest()
        .with_context(|| format!("Failed to harvest spool {}", spool.dir().display()))?;

    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

/// Forward SIGTERM/SIGINT (Ctrl+C elsewhere) to the running job
async fn forward_signals(sender: InterruptSender) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut term, mut int) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = term.recv() => info!("SIGTERM received"),
            _ = int.recv() => info!("SIGINT received"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received");
    }

    sender.interrupt();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::try_parse_from([
            "jobmon",
            "--id",
            "backup",
            "-s",
            "warning",
            "-n",
            "3600",
            "-m",
            "60",
            "--record-stdout",
            "--",
            "tar",
            "-czf",
            "/tmp/x.tgz",
        ])
        .unwrap();

        let config = cli.job_config(Severity::Alert).unwrap();

        assert_eq!(config.job_id, "backup");
        assert_eq!(config.severity, Severity::Warning);
        assert_eq!(config.next_run_in, Some(Duration::from_secs(3600)));
        assert_eq!(config.max_execution_time, Some(Duration::from_secs(60)));
        assert!(config.record_stdout);
        assert!(!config.record_stderr);
        assert!(!config.force);
        assert_eq!(config.command, vec!["tar", "-czf", "/tmp/x.tgz"]);
    }

    #[test]
    fn test_severity_defaults_from_config() {
        let cli = Cli::try_parse_from(["jobmon", "-i", "backup", "--", "true"]).unwrap();
        let config = cli.job_config(Severity::None).unwrap();
        assert_eq!(config.severity, Severity::None);
    }

    #[test]
    fn test_command_required() {
        assert!(Cli::try_parse_from(["jobmon", "--id", "backup"]).is_err());
    }

    #[test]
    fn test_id_required_for_runs() {
        assert!(Cli::try_parse_from(["jobmon", "--", "true"]).is_err());
    }

    #[test]
    fn test_maintenance_modes() {
        let cli = Cli::try_parse_from(["jobmon", "--list-finished"]).unwrap();
        assert!(cli.list_finished);

        let cli = Cli::try_parse_from(["jobmon", "--harvest"]).unwrap();
        assert!(cli.harvest);

        assert!(Cli::try_parse_from(["jobmon", "--harvest", "--", "true"]).is_err());
    }

    #[test]
    fn test_thresholds_validated() {
        let cli = Cli::try_parse_from(["jobmon", "-i", "backup", "-n", "10", "--", "true"]).unwrap();
        assert!(cli.job_config(Severity::Alert).is_err());
    }

    #[test]
    fn test_invalid_severity_rejected() {
        let result = Cli::try_parse_from(["jobmon", "-i", "x", "-s", "critical", "--", "true"]);
        assert!(result.is_err());
    }
}
