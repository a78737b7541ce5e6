// Spool directory lock
// reason: fs2 for a portable flock/LockFileEx advisory lock

use fs2::FileExt;
use hubmon_core::port::SpoolError;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock file kept inside the spool directory
pub const LOCK_FILE_NAME: &str = ".lock";

/// Spool directories are shared by every user whose cron runs jobmon
#[cfg(unix)]
const SPOOL_DIR_MODE: u32 = 0o777;

#[cfg(unix)]
const LOCK_FILE_MODE: u32 = 0o666;

/// Exclusive lock over one spool directory, released on drop.
///
/// Serializes directory mutations across processes. Acquisition never waits: if another
/// process holds the lock the call fails right away.
pub struct SpoolLock {
    file: File,
    path: PathBuf,
}

impl SpoolLock {
    /// Create the directory if needed, then try to take the lock
    pub fn acquire(dir: &Path) -> Result<Self, SpoolError> {
        ensure_dir(dir)?;

        let path = dir.join(LOCK_FILE_NAME);
        let file = open_lock_file(&path).map_err(|source| SpoolError::Lock {
            path: path.clone(),
            source,
        })?;

        FileExt::try_lock_exclusive(&file).map_err(|source| SpoolError::Lock {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Spool lock acquired");
        Ok(Self { file, path })
    }
}

impl Drop for SpoolLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release spool lock");
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<(), SpoolError> {
    if dir.is_dir() {
        return Ok(());
    }

    let create_err = |source| SpoolError::CreateDir {
        path: dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(create_err)?;

    // Explicit chmod, the process umask would otherwise narrow the mode
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(SPOOL_DIR_MODE)).map_err(create_err)?;
    }

    debug!(dir = %dir.display(), "Spool directory created");
    Ok(())
}

/// Opens read-write, creating the file. A lock file created by another user may not be
/// writable for us; flock works on a read-only descriptor too.
fn open_lock_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(LOCK_FILE_MODE);
    }

    match options.open(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && path.exists() => {
            OpenOptions::new().read(true).open(path)
        }
        other => other,
    }
}
