// Process termination capability
// Selected at compile time: process groups on unix, direct kill elsewhere

use std::io;
use tokio::process::{Child, Command};

/// How a job's process (tree) is stopped
pub trait ProcessTerminator: Send + Sync {
    /// Configure the command before it is spawned
    fn prepare(&self, command: &mut Command);

    /// Ask the process and its descendants to stop
    fn terminate(&self, child: &mut Child) -> io::Result<()>;

    /// Stop them for good (after the grace period)
    fn kill(&self, child: &mut Child) -> io::Result<()>;
}

/// Terminator for the current target
#[cfg(unix)]
pub type PlatformTerminator = ProcessGroupTerminator;

#[cfg(not(unix))]
pub type PlatformTerminator = DirectKillTerminator;

/// Runs the child in its own process group and signals the whole group,
/// so anything the job spawned goes down with it
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessGroupTerminator;

#[cfg(unix)]
impl ProcessGroupTerminator {
    fn signal_group(child: &Child, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        // Already reaped
        let Some(pid) = child.id() else {
            return Ok(());
        };

        tracing::debug!(pid = %pid, signal = %signal, "Signalling process group");
        killpg(Pid::from_raw(pid as i32), signal).map_err(io::Error::from)
    }
}

#[cfg(unix)]
impl ProcessTerminator for ProcessGroupTerminator {
    fn prepare(&self, command: &mut Command) {
        command.process_group(0);
    }

    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        Self::signal_group(child, nix::sys::signal::Signal::SIGTERM)
    }

    fn kill(&self, child: &mut Child) -> io::Result<()> {
        Self::signal_group(child, nix::sys::signal::Signal::SIGKILL)
    }
}

/// Kills only the direct child
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectKillTerminator;

impl ProcessTerminator for DirectKillTerminator {
    fn prepare(&self, _command: &mut Command) {}

    fn terminate(&self, child: &mut Child) -> io::Result<()> {
        child.start_kill()
    }

    fn kill(&self, child: &mut Child) -> io::Result<()> {
        child.start_kill()
    }
}
