// Domain Layer - Job records and spool identities

pub mod error;
pub mod job_run;
pub mod spool_entry;

// Re-exports
pub use error::DomainError;
pub use job_run::{JobRun, JobRunConfig, Severity};
pub use spool_entry::SpoolEntryId;
