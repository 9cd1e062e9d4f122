//! Error types for Photodiary core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors, while the command-line layer uses `anyhow` for
//! convenient error handling.
//!
//! Id lookups in the engine return `Ok(None)` on a miss. `NotFound` is for
//! callers that need the entry to exist, such as editing or showing one.

use crate::types::EntryId;
use thiserror::Error;

/// Result type alias using DiaryError
pub type Result<T> = std::result::Result<T, DiaryError>;

/// Core error types for Photodiary operations.
///
/// These errors represent specific failure modes that callers may want to
/// handle differently (e.g., recreating the store on a format mismatch).
#[derive(Error, Debug)]
pub enum DiaryError {
    // === Engine Errors ===
    /// The engine was used before an entry store was attached
    #[error("no entry store attached to the engine")]
    NotInitialized,

    /// No entry exists with the requested id
    #[error("entry not found: {id}")]
    NotFound { id: EntryId },

    // === Store Errors ===
    /// A store read or write failed
    #[error("storage error: {operation} failed: {reason}")]
    Storage { operation: String, reason: String },

    /// The store file was written by an incompatible format version
    #[error("store version mismatch: found {found}, expected {expected}")]
    StoreVersionMismatch { found: u32, expected: u32 },

    /// The store file exists but its framing or checksum is broken
    #[error("store is corrupted: {reason}")]
    StoreCorrupted { reason: String },

    /// The store contents cannot be decoded into diary entries
    #[error("store is unusable: {reason}")]
    StoreUnusable { reason: String },

    // === Query Errors ===
    /// A textual filter could not be parsed
    #[error("invalid filter: {input}: {reason}")]
    InvalidFilter { input: String, reason: String },

    // === Index Errors ===
    /// The derived index disagrees with the store
    #[error("index inconsistency: {reason}")]
    IndexInconsistency { reason: String },

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiaryError {
    /// Returns true if the store must be recreated before it can be used again.
    ///
    /// Any derived index built over such a store is stale and gets rebuilt.
    pub fn requires_recreate(&self) -> bool {
        matches!(
            self,
            DiaryError::StoreVersionMismatch { .. }
                | DiaryError::StoreCorrupted { .. }
                | DiaryError::StoreUnusable { .. }
        )
    }

    /// Returns true if this error is an id lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiaryError::NotFound { .. })
    }

    /// Returns true if this error came from the entry store
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, DiaryError::Storage { .. }) || self.requires_recreate()
    }

    /// Create a storage error
    pub fn storage(operation: impl Into<String>, reason: impl ToString) -> Self {
        DiaryError::Storage {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid filter error
    pub fn invalid_filter(input: impl Into<String>, reason: impl Into<String>) -> Self {
        DiaryError::InvalidFilter {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
