//! Record storage for docsync
//!
//! This crate defines what docsync needs from a record store and ships an
//! in-memory implementation:
//! - RecordStore: find, find-by-search-id, ordered scans, single-write
//!   updates and compare-and-clear of dirty flags
//! - MemoryRecordStore: `RwLock` + `FxHashMap` tables with a `BTreeMap`
//!   search-id index and an `AtomicU64` revision counter

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod traits;

pub use memory::MemoryRecordStore;
pub use traits::{RecordStore, RecordUpdate, ScanFilter};
