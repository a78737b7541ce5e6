// Job Run Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use super::error::{DomainError, Result};

/// Longest accepted job identifier (bytes). The id is hex-encoded into spool file names.
pub const MAX_JOB_ID_LEN: usize = 100;

/// Smallest accepted "next run in" interval
pub const MIN_NEXT_RUN_IN: Duration = Duration::from_secs(60);

/// Smallest accepted maximum execution time
pub const MIN_MAX_EXECUTION_TIME: Duration = Duration::from_secs(1);

/// Severity forwarded to the Hub when a job misbehaves.
/// Descriptive only, jobmon never interprets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Alert,
    Warning,
    None,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Alert => write!(f, "alert"),
            Severity::Warning => write!(f, "warning"),
            Severity::None => write!(f, "none"),
        }
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alert" => Ok(Severity::Alert),
            "warning" => Ok(Severity::Warning),
            "none" => Ok(Severity::None),
            _ => Err(DomainError::InvalidSeverity(s.to_string())),
        }
    }
}

/// Caller-supplied settings for one jobmon invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRunConfig {
    pub job_id: String,
    pub severity: Severity,
    /// When the next invocation is expected (used downstream to detect missed runs)
    pub next_run_in: Option<Duration>,
    pub max_execution_time: Option<Duration>,
    /// Replace stale "running" records of the same job instead of refusing to run
    pub force: bool,
    pub record_stdout: bool,
    pub record_stderr: bool,
    /// Program followed by its arguments
    pub command: Vec<String>,
}

impl JobRunConfig {
    pub fn new(job_id: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            job_id: job_id.into(),
            severity: Severity::default(),
            next_run_in: None,
            max_execution_time: None,
            force: false,
            record_stdout: false,
            record_stderr: false,
            command,
        }
    }

    /// Validate the configuration before anything touches the spool
    pub fn validate(&self) -> Result<()> {
        if self.job_id.is_empty() {
            return Err(DomainError::Validation("job id cannot be empty".to_string()));
        }

        if self.job_id.len() > MAX_JOB_ID_LEN {
            return Err(DomainError::Validation(format!(
                "job id too long (max {} bytes)",
                MAX_JOB_ID_LEN
            )));
        }

        if self.command.is_empty() || self.command[0].is_empty() {
            return Err(DomainError::Validation("command cannot be empty".to_string()));
        }

        if let Some(next_run_in) = self.next_run_in {
            if next_run_in < MIN_NEXT_RUN_IN {
                return Err(DomainError::Validation(format!(
                    "next run in must be at least {}s",
                    MIN_NEXT_RUN_IN.as_secs()
                )));
            }
        }

        if let Some(max_execution_time) = self.max_execution_time {
            if max_execution_time < MIN_MAX_EXECUTION_TIME {
                return Err(DomainError::Validation(format!(
                    "max execution time must be at least {}s",
                    MIN_MAX_EXECUTION_TIME.as_secs()
                )));
            }
        }

        Ok(())
    }

    /// Command line joined for display
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Persisted record of one job attempt.
///
/// Created once when the invocation starts and mutated in place until terminal.
/// Optional fields are omitted from the JSON while absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    #[serde(rename = "id")]
    pub job_id: String,
    pub command: String,
    #[serde(rename = "time")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "end_time", default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl JobRun {
    /// Start a new attempt record from the invocation settings
    pub fn start(config: &JobRunConfig, user: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            job_id: config.job_id.clone(),
            command: config.command_line(),
            started_at: now,
            finished_at: None,
            duration: None,
            user: user.into(),
            exit_code: None,
            severity: config.severity,
            next_run_in: config.next_run_in.map(|d| d.as_secs()),
            max_execution_time: config.max_execution_time.map(|d| d.as_secs()),
            stdout: None,
            stderr: None,
            errors: Vec::new(),
        }
    }

    /// Append a free-text annotation
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record end time and duration rounded to the nearest second
    pub fn finish(&mut self, now: DateTime<Utc>) {
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0);
        self.finished_at = Some(now);
        self.duration = Some(((elapsed_ms + 500) / 1000) as u64);
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Exit code 0 and nothing went wrong around the process
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.errors.is_empty()
    }
}
