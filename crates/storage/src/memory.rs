//! MemoryRecordStore: in-process record store
//!
//! - One table per record type behind a single `parking_lot::RwLock`
//! - `FxHashMap<RecordId, Record>` primary storage
//! - `BTreeMap<SearchId, RecordId>` secondary index for ordered scans,
//!   `max_search_id` and `find_by_search_id`
//! - `AtomicU64` revision counter shared by all writes
//!
//! Every write (insert, update, dirty clear) happens under the write lock,
//! so a compare-and-clear can never interleave with an update of the same
//! record.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use docsync_core::{Error, Record, RecordId, Result, SearchId, TypeName};

use crate::traits::{RecordStore, RecordUpdate, ScanFilter};

#[derive(Debug, Default)]
struct TypeTable {
    records: FxHashMap<RecordId, Record>,
    by_search_id: BTreeMap<SearchId, RecordId>,
}

/// In-memory `RecordStore`
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<FxHashMap<TypeName, TypeTable>>,
    revision: AtomicU64,
}

impl MemoryRecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of a type
    pub fn count(&self, type_name: &TypeName) -> usize {
        self.tables
            .read()
            .get(type_name)
            .map_or(0, |t| t.records.len())
    }

    /// Number of dirty records of a type
    pub fn dirty_count(&self, type_name: &TypeName) -> usize {
        self.tables
            .read()
            .get(type_name)
            .map_or(0, |t| t.records.values().filter(|r| r.dirty).count())
    }

    /// Latest revision handed out
    pub fn current_revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert(&self, mut record: Record) -> Result<Record> {
        let mut tables = self.tables.write();
        let table = tables.entry(record.type_name.clone()).or_default();

        if table.records.contains_key(&record.id) {
            return Err(Error::Conflict(format!(
                "{} {} already exists",
                record.type_name, record.id
            )));
        }
        if let Some(search_id) = record.search_id {
            if table.by_search_id.contains_key(&search_id) {
                return Err(Error::Conflict(format!(
                    "{} search id {} already assigned",
                    record.type_name, search_id
                )));
            }
            table.by_search_id.insert(search_id, record.id.clone());
        }

        record.revision = self.next_revision();
        trace!(target: "docsync::store", type_name = %record.type_name, id = %record.id, revision = record.revision, "insert");
        table.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn find(&self, type_name: &TypeName, id: &RecordId) -> Result<Record> {
        self.tables
            .read()
            .get(type_name)
            .and_then(|t| t.records.get(id))
            .cloned()
            .ok_or_else(|| Error::not_found(type_name.as_str(), id))
    }

    fn find_by_search_id(&self, type_name: &TypeName, search_id: SearchId) -> Result<Record> {
        let tables = self.tables.read();
        tables
            .get(type_name)
            .and_then(|t| {
                t.by_search_id
                    .get(&search_id)
                    .and_then(|id| t.records.get(id))
            })
            .cloned()
            .ok_or_else(|| Error::not_found(type_name.as_str(), search_id))
    }

    fn max_search_id(&self, type_name: &TypeName) -> Result<Option<SearchId>> {
        Ok(self
            .tables
            .read()
            .get(type_name)
            .and_then(|t| t.by_search_id.keys().next_back().copied()))
    }

    fn scan(
        &self,
        type_name: &TypeName,
        filter: ScanFilter,
        after: Option<SearchId>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        use std::ops::Bound;

        let tables = self.tables.read();
        let table = match tables.get(type_name) {
            Some(t) => t,
            None => return Ok(Vec::new()),
        };
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        Ok(table
            .by_search_id
            .range((lower, Bound::Unbounded))
            .filter_map(|(_, id)| table.records.get(id))
            .filter(|r| !filter.dirty_only || r.dirty)
            .take(limit)
            .cloned()
            .collect())
    }

    fn update(&self, type_name: &TypeName, id: &RecordId, update: RecordUpdate) -> Result<Record> {
        let mut tables = self.tables.write();
        let record = tables
            .get_mut(type_name)
            .and_then(|t| t.records.get_mut(id))
            .ok_or_else(|| Error::not_found(type_name.as_str(), id))?;

        if let Some(expected) = update.expected_revision {
            if record.revision != expected {
                return Err(Error::Conflict(format!(
                    "{} {} is at revision {}, expected {}",
                    type_name, id, record.revision, expected
                )));
            }
        }

        for field in &update.unset {
            record.fields.remove(field);
        }
        record.fields.extend(update.set);
        if let Some(dirty) = update.dirty {
            record.dirty = dirty;
        }
        record.revision = self.next_revision();
        trace!(target: "docsync::store", type_name = %type_name, id = %id, revision = record.revision, dirty = record.dirty, "update");
        Ok(record.clone())
    }

    fn clear_dirty(&self, type_name: &TypeName, snapshot: &[(SearchId, u64)]) -> Result<usize> {
        let mut tables = self.tables.write();
        let table = match tables.get_mut(type_name) {
            Some(t) => t,
            None => return Ok(0),
        };

        let mut cleared = 0;
        for (search_id, revision) in snapshot {
            let record = table
                .by_search_id
                .get(search_id)
                .and_then(|id| table.records.get_mut(id));
            if let Some(record) = record {
                if record.dirty && record.revision == *revision {
                    record.dirty = false;
                    record.revision = self.next_revision();
                    cleared += 1;
                }
            }
        }
        Ok(cleared)
    }
}
