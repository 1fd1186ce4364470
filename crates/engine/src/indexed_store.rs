//! Save path for indexed record types
//!
//! `IndexedStore` wraps a `RecordStore` with the indexing side effects of a
//! save:
//! - new records get a search id before they are persisted
//! - updates that touch indexed fields of a delta type mark the record dirty
//!   in the same store write
//! - a dirty save requests a (coalesced) delta rebuild
//!
//! Rebuild scheduling failures are logged and never fail the save.

use std::sync::Arc;

use tracing::{debug, warn};

use docsync_core::{
    Error, Fields, PartitionKind, Record, RecordId, Result, TypeName, TypeRegistry,
};
use docsync_storage::{RecordStore, RecordUpdate};

use crate::allocator::IdentifierAllocator;
use crate::controller::{IndexSyncController, RebuildTicket};
use crate::dirty::{DirtyTracker, SaveOptions};

const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Record store front end that keeps index bookkeeping current
pub struct IndexedStore {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RecordStore>,
    allocator: IdentifierAllocator,
    controller: Arc<IndexSyncController>,
}

impl IndexedStore {
    /// Create a save path over `store`
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn RecordStore>,
        controller: Arc<IndexSyncController>,
    ) -> Self {
        IndexedStore {
            allocator: IdentifierAllocator::new(Arc::clone(&registry), Arc::clone(&store)),
            registry,
            store,
            controller,
        }
    }

    /// The identifier allocator used for new records
    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    /// Persist a new record.
    ///
    /// Delta-indexed types start dirty and get a delta rebuild requested.
    ///
    /// # Errors
    ///
    /// `UnknownType`, `Allocation` (nothing is persisted), or the store's
    /// insert error.
    pub fn create(&self, type_name: &TypeName, id: RecordId, fields: Fields) -> Result<Record> {
        let entry = self.registry.entry(type_name)?;
        let search_id = self.allocator.allocate(type_name)?;

        let mut record = Record::new(type_name.clone(), id, fields);
        record.search_id = Some(search_id);
        record.dirty = entry.has_delta();
        let stored = self.store.insert(record)?;
        debug!(target: "docsync::save", type_name = %type_name, id = %stored.id, search_id = %search_id, "record created");

        if stored.dirty {
            self.request_delta(type_name);
        }
        Ok(stored)
    }

    /// Merge `fields` into an existing record.
    ///
    /// Field values and the dirty flag are written in one store update. The
    /// update is retried if the record changes between read and write.
    ///
    /// # Errors
    ///
    /// `UnknownType`, `NotFound`, `Conflict` if the record kept changing,
    /// or the store's update error.
    pub fn update(
        &self,
        type_name: &TypeName,
        id: &RecordId,
        fields: Fields,
        options: SaveOptions,
    ) -> Result<Record> {
        let entry = self.registry.entry(type_name)?;

        let mut attempt = 0;
        let (saved, marked) = loop {
            attempt += 1;
            let current = self.store.find(type_name, id)?;

            let mut merged = current.clone();
            merged.fields.extend(fields.clone());
            let changed = DirtyTracker::changed_fields(&current.fields, &merged.fields);
            let marked = DirtyTracker::mark_if_dirty(&mut merged, &changed, entry, &options);

            let mut update = RecordUpdate::set(fields.clone()).expecting(current.revision);
            if marked {
                update = update.with_dirty(true);
            }

            match self.store.update(type_name, id, update) {
                Ok(saved) => break (saved, marked),
                Err(Error::Conflict(reason)) if attempt < MAX_UPDATE_ATTEMPTS => {
                    debug!(target: "docsync::save", type_name = %type_name, id = %id, attempt, reason = %reason, "record changed during save, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        if marked && !options.skip_delta_rebuild {
            self.request_delta(type_name);
        }
        Ok(saved)
    }

    /// Look up a record
    pub fn find(&self, type_name: &TypeName, id: &RecordId) -> Result<Record> {
        self.store.find(type_name, id)
    }

    /// Request a core rebuild of a type
    pub fn reindex_core(&self, type_name: &TypeName) -> Result<RebuildTicket> {
        self.controller.rebuild(type_name, PartitionKind::Core)
    }

    /// Request a delta rebuild of a type
    pub fn reindex_delta(&self, type_name: &TypeName) -> Result<RebuildTicket> {
        self.controller.rebuild(type_name, PartitionKind::Delta)
    }

    fn request_delta(&self, type_name: &TypeName) {
        match self.controller.rebuild(type_name, PartitionKind::Delta) {
            Ok(ticket) => {
                debug!(target: "docsync::save", type_name = %type_name, ticket = ?ticket, "delta rebuild requested");
            }
            Err(e) => {
                warn!(target: "docsync::save", type_name = %type_name, error = %e, "could not request delta rebuild");
            }
        }
    }
}

impl std::fmt::Debug for IndexedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedStore")
            .field("allocator", &self.allocator)
            .field("controller", &self.controller)
            .finish()
    }
}
