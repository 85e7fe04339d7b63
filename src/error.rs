//! Error types for apuntar
//!
//! Single crate-wide error enum plus a `Result` alias. Contract
//! violations at the distribution-builder boundary surface as
//! `InvalidShape`; configuration problems are caught at pipeline
//! construction as `InvalidConfiguration`; flush failures surface as
//! `IoError` after output handles have been released.

use thiserror::Error;

/// Errors that can occur in apuntar operations
#[derive(Debug, Error)]
pub enum ApuntarError {
    /// Input violates a shape or range contract
    #[error("Invalid shape: {reason}")]
    InvalidShape {
        /// Explanation of the violation
        reason: String,
    },

    /// Data size doesn't match the declared shape
    #[error("Data size {data_size} doesn't match shape {shape:?} (expected {expected})")]
    DataShapeMismatch {
        /// Actual number of elements supplied
        data_size: usize,
        /// Declared shape
        shape: Vec<usize>,
        /// Number of elements the shape requires
        expected: usize,
    },

    /// Operation rejected for the given inputs
    #[error("Unsupported operation '{operation}': {reason}")]
    UnsupportedOperation {
        /// Name of the rejected operation
        operation: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration inconsistency detected at initialization
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Explanation of the inconsistency
        reason: String,
    },

    /// I/O failure (output flush, mapping-file read)
    #[error("I/O error: {message}")]
    IoError {
        /// Underlying failure description
        message: String,
    },
}

/// Result type alias for apuntar operations
pub type Result<T> = std::result::Result<T, ApuntarError>;
