// Hubmon Infrastructure - System Adapters
// Implements: JobExecutor (subprocess runner), UserProvider

pub mod job_runner;
pub mod terminator;
pub mod user;

pub use job_runner::SubprocessJobRunner;
pub use terminator::{DirectKillTerminator, PlatformTerminator, ProcessTerminator};
pub use user::OsUserProvider;

#[cfg(unix)]
pub use terminator::ProcessGroupTerminator;
