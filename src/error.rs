//! Error types for stratadb
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// The main error type for stratadb
#[derive(Error, Debug)]
pub enum Error {
    // ========== Catalog Errors ==========
    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Catalog error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    // ========== Argument Errors ==========
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Storage Errors ==========
    #[error("Storage error: page {0} is full")]
    PageFull(u64),

    #[error("Storage error: row of {0} bytes does not fit in any page")]
    RowTooLarge(usize),

    #[error("Storage error: malformed row: {0}")]
    MalformedRow(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for stratadb operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TableNotFound("users".to_string());
        assert_eq!(err.to_string(), "Catalog error: table 'users' not found");

        let err = Error::RowTooLarge(5000);
        assert_eq!(
            err.to_string(),
            "Storage error: row of 5000 bytes does not fit in any page"
        );
    }
}
