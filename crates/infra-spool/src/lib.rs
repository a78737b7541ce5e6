// Hubmon Infrastructure - Filesystem Spool Adapter
// Implements: JobSpool (one JSON file per attempt + cross-process advisory lock)

mod fs_spool;
mod lock;

pub use fs_spool::FsJobSpool;
pub use lock::{SpoolLock, LOCK_FILE_NAME};
