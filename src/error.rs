//! Error types for the CHTM crate.
//!
//! This module provides a unified error type for all region operations,
//! using the `thiserror` crate for ergonomic error handling. Every failure
//! here is a caller error: nothing is retried and no partial update is
//! applied when one is returned.

use thiserror::Error;

/// The main error type for CHTM operations.
#[derive(Error, Debug)]
pub enum ChtmError {
    /// A region was configured with a zero dimension, count or an invalid range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Caller-supplied vector length does not match the region
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which argument was mis-sized
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Next region cannot provide feedback to this region
    #[error("Hierarchy mismatch: {0}")]
    HierarchyMismatch(String),

    /// Index out of bounds
    #[error("Index out of bounds: index {index}, length {length}")]
    IndexOutOfBounds {
        /// The index that was accessed
        index: usize,
        /// The valid length
        length: usize,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary serialization error occurred
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization error occurred
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChtmError {
    /// Shorthand for building a `ShapeMismatch`.
    pub(crate) fn shape(what: &'static str, expected: usize, actual: usize) -> Self {
        ChtmError::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}

/// A specialized `Result` type for CHTM operations.
pub type Result<T> = std::result::Result<T, ChtmError>;

/// Fail with `ShapeMismatch` unless `actual == expected`.
#[inline]
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ChtmError::shape(what, expected, actual))
    }
}
