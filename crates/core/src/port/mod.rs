// Port Layer - Interfaces for external dependencies

pub mod job_executor;
pub mod spool;
pub mod time_provider; // For deterministic testing
pub mod user_provider;

// Re-exports
pub use job_executor::JobExecutor;
pub use spool::{JobSpool, SpoolError};
pub use time_provider::TimeProvider;
pub use user_provider::UserProvider;
