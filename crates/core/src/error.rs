// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error(transparent)]
    Spool(#[from] crate::port::SpoolError),
}

impl AppError {
    /// True when the call was rejected because another instance of the job is running
    pub fn is_already_running(&self) -> bool {
        matches!(
            self,
            AppError::Spool(crate::port::SpoolError::AlreadyRunning { .. })
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
