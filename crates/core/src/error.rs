//! Error types for docsync
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Errors fall into two groups:
//! - record-local: a single record could not be serialized or resolved
//!   (`FeedGeneration`, `ResolutionMiss`). Batch operations skip and log these.
//! - operation-global: the operation as a whole cannot proceed
//!   (`Allocation`, `IndexUnavailable`, `StoreUnavailable`, ...). These are
//!   surfaced to the immediate caller.

use std::io;
use thiserror::Error;

/// Result type alias for docsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for docsync
#[derive(Debug, Error)]
pub enum Error {
    /// Search identifier assignment failed; the triggering save must not proceed
    #[error("Allocation failed for {type_name}: {reason}")]
    Allocation {
        /// Record type the identifier was requested for
        type_name: String,
        /// Why the allocation failed
        reason: String,
    },

    /// A single record's fields could not be serialized into the feed
    #[error("Feed generation failed for {type_name}#{search_id}: {reason}")]
    FeedGeneration {
        /// Record type of the skipped record
        type_name: String,
        /// Search identifier of the skipped record (0 when unassigned)
        search_id: u64,
        /// Why the record could not be represented
        reason: String,
    },

    /// External indexer or search daemon unreachable
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// A search match did not resolve to a live record
    #[error("No {type_name} record with search id {search_id}")]
    ResolutionMiss {
        /// Record type named by the match
        type_name: String,
        /// Search identifier named by the match
        search_id: u64,
    },

    /// Record not found in the record store
    #[error("{type_name} not found: {key}")]
    NotFound {
        /// Record type that was looked up
        type_name: String,
        /// Lookup key (record id or search id)
        key: String,
    },

    /// Record store could not complete the operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Write rejected because the record changed or the key is taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Type is not registered for indexing
    #[error("Unknown record type: {0}")]
    UnknownType(String),

    /// Invalid type registration or use of a capability the type lacks
    #[error("Registration error: {0}")]
    Registration(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (feed files, indexer process)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build an `Allocation` error
    pub fn allocation(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Allocation {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Build a `FeedGeneration` error
    pub fn feed_generation(
        type_name: impl Into<String>,
        search_id: u64,
        reason: impl Into<String>,
    ) -> Self {
        Error::FeedGeneration {
            type_name: type_name.into(),
            search_id,
            reason: reason.into(),
        }
    }

    /// Build a `NotFound` error
    pub fn not_found(type_name: impl Into<String>, key: impl ToString) -> Self {
        Error::NotFound {
            type_name: type_name.into(),
            key: key.to_string(),
        }
    }

    /// True for `NotFound` and `ResolutionMiss`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::ResolutionMiss { .. })
    }

    /// True for failures scoped to a single record.
    ///
    /// Batch operations (feeds, query resolution) skip these and continue.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            Error::FeedGeneration { .. } | Error::ResolutionMiss { .. } | Error::NotFound { .. }
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
