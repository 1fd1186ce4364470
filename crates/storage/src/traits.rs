//! Record store abstraction
//!
//! The record store is an external collaborator: docsync only needs the
//! operations below. `MemoryRecordStore` is the reference implementation;
//! a database-backed store implements the same trait.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use std::collections::BTreeSet;

use docsync_core::{Fields, Record, RecordId, Result, SearchId, TypeName};

/// Which records of a type a scan visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanFilter {
    /// Only records with `dirty == true`
    pub dirty_only: bool,
}

impl ScanFilter {
    /// Every record with a search id
    pub fn all() -> Self {
        ScanFilter { dirty_only: false }
    }

    /// Only dirty records
    pub fn dirty() -> Self {
        ScanFilter { dirty_only: true }
    }
}

/// A single write against one record.
///
/// Field changes and the dirty flag travel together so the store applies
/// them in one write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    /// Fields to set (insert or overwrite)
    pub set: Fields,
    /// Fields to remove
    pub unset: BTreeSet<String>,
    /// New dirty flag; `None` leaves it as is
    pub dirty: Option<bool>,
    /// Reject the write unless the stored revision still equals this
    pub expected_revision: Option<u64>,
}

impl RecordUpdate {
    /// Update that sets the given fields
    pub fn set(fields: Fields) -> Self {
        RecordUpdate {
            set: fields,
            ..RecordUpdate::default()
        }
    }

    /// Builder: also write the dirty flag
    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = Some(dirty);
        self
    }

    /// Builder: only apply if the record is still at `revision`
    pub fn expecting(mut self, revision: u64) -> Self {
        self.expected_revision = Some(revision);
        self
    }
}

/// Storage operations docsync relies on
pub trait RecordStore: Send + Sync {
    /// Persist a new record.
    ///
    /// Returns the stored record with its revision assigned.
    ///
    /// # Errors
    ///
    /// `Conflict` if the record id, or its search id within the type, is taken.
    fn insert(&self, record: Record) -> Result<Record>;

    /// Find a record by primary id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no such record exists.
    fn find(&self, type_name: &TypeName, id: &RecordId) -> Result<Record>;

    /// Find a record by search id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no record of the type carries that search id.
    fn find_by_search_id(&self, type_name: &TypeName, search_id: SearchId) -> Result<Record>;

    /// Highest search id assigned within a type (descending ordered scan)
    fn max_search_id(&self, type_name: &TypeName) -> Result<Option<SearchId>>;

    /// One page of records ordered by ascending search id.
    ///
    /// Returns at most `limit` records with a search id strictly greater
    /// than `after`. Records without a search id are never returned.
    fn scan(
        &self,
        type_name: &TypeName,
        filter: ScanFilter,
        after: Option<SearchId>,
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// Apply an update and return the record as stored afterwards.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record does not exist, `Conflict` if
    /// `expected_revision` is set and no longer matches.
    fn update(&self, type_name: &TypeName, id: &RecordId, update: RecordUpdate) -> Result<Record>;

    /// Compare-and-clear the dirty flag.
    ///
    /// For each `(search_id, revision)` pair, clears `dirty` only if the
    /// record still exists at exactly that revision. Records written after
    /// the pair was captured keep their flag. Returns how many were cleared.
    fn clear_dirty(&self, type_name: &TypeName, snapshot: &[(SearchId, u64)]) -> Result<usize>;
}
