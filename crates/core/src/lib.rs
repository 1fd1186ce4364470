//! Core types and traits for docsync
//!
//! This crate defines the foundational types used throughout the system:
//! - TypeName, RecordId, SearchId: identifiers
//! - PartitionKind, IndexPartition: core and delta index segments
//! - Value: field value model
//! - Record, Indexable: stored records and the typed-model capability
//! - TypeRegistry, RegistrationEntry, IndexOptions: per-type indexing setup
//! - DocsyncConfig: configuration loaded from `docsync.toml`
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod record;
pub mod registry;
pub mod types;
pub mod value;

pub use config::{DocsyncConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use record::{fields, Fields, Indexable, Record};
pub use registry::{IndexOptions, RegistrationEntry, TypeRegistry};
pub use types::{IndexPartition, PartitionKind, RecordId, SearchId, TypeName};
pub use value::Value;
