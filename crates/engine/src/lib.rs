//! Index sync engine for docsync
//!
//! This crate keeps search partitions in step with the record store:
//! - IdentifierAllocator: per-type search ids
//! - DirtyTracker: which saves invalidate the delta partition
//! - FeedGenerator / Feed: streaming partition contents, xmlpipe2 output
//! - IndexSyncController: coalesced background rebuilds on a worker pool
//! - QueryResolver: queries to records
//! - IndexedStore: the save path tying allocation, dirty marking and
//!   delta rebuilds together
//!
//! The search daemon and the index builder sit behind the `SearchClient`
//! and `Indexer` traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod client;
pub mod command_indexer;
pub mod controller;
pub mod dirty;
pub mod feed;
pub mod indexed_store;
pub mod resolver;
pub mod scheduler;
pub mod xmlpipe;

pub use allocator::IdentifierAllocator;
pub use client::{
    AttrValue, Endpoint, Indexer, MatchMode, QueryRequest, QueryResponse, RawMatch, SearchClient,
    SortMode,
};
pub use command_indexer::CommandIndexer;
pub use controller::{
    IndexSyncController, PartitionStatus, RebuildOutcome, RebuildState, RebuildTicket,
};
pub use dirty::{DirtyTracker, SaveOptions};
pub use feed::{Feed, FeedEntry, FeedGenerator, FeedSnapshot, FeedStats};
pub use indexed_store::IndexedStore;
pub use resolver::{MatchRef, QueryResolver, SearchOptions, SearchOutcome};
pub use scheduler::{JobPriority, RebuildScheduler, Rejected, SchedulerStats};
pub use xmlpipe::{write_feed, XmlDocsetWriter};
