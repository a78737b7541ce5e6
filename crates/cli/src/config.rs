//! Layered configuration: defaults -> optional TOML file -> HUBMON_* environment

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hubmon_core::application::constants::{DEFAULT_CAPTURE_BYTES, DEFAULT_KILL_GRACE};
use hubmon_core::domain::Severity;

const DEFAULT_CONFIG_PATH: &str = "/etc/hubmon/agent.toml";
const CONFIG_PATH_ENV: &str = "HUBMON_CONFIG";
const ENV_PREFIX: &str = "HUBMON";

#[cfg(unix)]
const DEFAULT_SPOOL_DIR: &str = "/var/lib/hubmon/jobmon";

#[cfg(not(unix))]
const DEFAULT_SPOOL_DIR: &str = "C:\\ProgramData\\hubmon\\jobmon";

/// Agent configuration (only the parts jobmon consumes)
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub jobmon: JobmonConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobmonConfig {
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,
}

impl Default for JobmonConfig {
    fn default() -> Self {
        Self {
            spool_dir: default_spool_dir(),
            severity: Severity::default(),
            capture_bytes: default_capture_bytes(),
            kill_grace_secs: default_kill_grace_secs(),
        }
    }
}

impl JobmonConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SPOOL_DIR)
}

fn default_capture_bytes() -> usize {
    DEFAULT_CAPTURE_BYTES
}

fn default_kill_grace_secs() -> u64 {
    DEFAULT_KILL_GRACE.as_secs()
}

impl AgentConfig {
    /// Load configuration.
    ///
    /// File lookup: `explicit` (from --config), else `$HUBMON_CONFIG`, else
    /// /etc/hubmon/agent.toml when it exists. An explicitly named file must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());

        let mut builder = Config::builder();
        match named {
            Some(path) => {
                let path = shellexpand::tilde(&path).into_owned();
                builder = builder.add_source(File::new(&path, FileFormat::Toml).required(true));
            }
            None => {
                builder = builder.add_source(
                    File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false),
                );
            }
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?;

        let mut config: AgentConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        config.jobmon.spool_dir = PathBuf::from(
            shellexpand::tilde(&config.jobmon.spool_dir.to_string_lossy()).into_owned(),
        );

        Ok(config)
    }
}
