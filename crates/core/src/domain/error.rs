// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid spool entry name: {0}")]
    InvalidSpoolEntry(String),

    #[error("Invalid severity '{0}' (expected alert, warning or none)")]
    InvalidSeverity(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
