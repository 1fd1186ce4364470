//! Search identifier allocation
//!
//! Each registered type gets its own counter. The counter is seeded once
//! from the store's highest assigned `search_id` and then advanced with a
//! single `fetch_add`, so concurrent saves of the same type never receive
//! the same identifier.
//!
//! Seeding happens under a per-type lock. A failed seed is not cached; the
//! next allocation for that type tries the store again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use docsync_core::{Error, Result, SearchId, TypeName, TypeRegistry};
use docsync_storage::RecordStore;

#[derive(Debug, Default)]
struct TypeCounter {
    seeded: AtomicBool,
    seed_lock: Mutex<()>,
    last: AtomicU64,
}

/// Hands out unique, increasing search identifiers per record type
pub struct IdentifierAllocator {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RecordStore>,
    counters: DashMap<TypeName, Arc<TypeCounter>>,
}

impl IdentifierAllocator {
    /// Create an allocator over the given store
    pub fn new(registry: Arc<TypeRegistry>, store: Arc<dyn RecordStore>) -> Self {
        IdentifierAllocator {
            registry,
            store,
            counters: DashMap::new(),
        }
    }

    /// Allocate the next search identifier for `type_name`.
    ///
    /// The first identifier of a type with no stored records is 1.
    ///
    /// # Errors
    ///
    /// - `UnknownType` if the type is not registered
    /// - `Allocation` if the store cannot be read while seeding, or the
    ///   type's `id_size` range is exhausted
    pub fn allocate(&self, type_name: &TypeName) -> Result<SearchId> {
        let entry = self.registry.entry(type_name)?;
        let counter = self.counter(type_name);
        self.ensure_seeded(type_name, &counter)?;

        let id = counter.last.fetch_add(1, Ordering::SeqCst) + 1;
        if id > entry.max_search_id() {
            warn!(target: "docsync::alloc", type_name = %type_name, id, id_size = entry.options().id_size, "identifier space exhausted");
            return Err(Error::allocation(
                type_name.as_str(),
                format!(
                    "identifier space exhausted: {} exceeds the {}-bit limit",
                    id,
                    entry.options().id_size
                ),
            ));
        }

        SearchId::new(id).ok_or_else(|| Error::allocation(type_name.as_str(), "counter wrapped"))
    }

    /// Forget the cached counter for a type.
    ///
    /// The next allocation re-reads the highest stored identifier. Call this
    /// after writing search ids to the store by other means.
    pub fn reset(&self, type_name: &TypeName) {
        if self.counters.remove(type_name).is_some() {
            debug!(target: "docsync::alloc", type_name = %type_name, "counter reset");
        }
    }

    /// Last identifier handed out for a type, if its counter is seeded
    pub fn last_allocated(&self, type_name: &TypeName) -> Option<u64> {
        self.counters
            .get(type_name)
            .filter(|c| c.seeded.load(Ordering::Acquire))
            .map(|c| c.last.load(Ordering::SeqCst))
    }

    fn counter(&self, type_name: &TypeName) -> Arc<TypeCounter> {
        if let Some(counter) = self.counters.get(type_name) {
            return Arc::clone(&counter);
        }
        Arc::clone(&self.counters.entry(type_name.clone()).or_default())
    }

    fn ensure_seeded(&self, type_name: &TypeName, counter: &TypeCounter) -> Result<()> {
        if counter.seeded.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = counter.seed_lock.lock();
        if counter.seeded.load(Ordering::Acquire) {
            return Ok(());
        }

        let max = self.store.max_search_id(type_name).map_err(|e| {
            warn!(target: "docsync::alloc", type_name = %type_name, error = %e, "failed to seed identifier counter");
            Error::allocation(type_name.as_str(), e.to_string())
        })?;
        let start = max.map_or(0, SearchId::get);
        counter.last.store(start, Ordering::SeqCst);
        counter.seeded.store(true, Ordering::Release);
        debug!(target: "docsync::alloc", type_name = %type_name, start, "identifier counter seeded");
        Ok(())
    }
}

impl std::fmt::Debug for IdentifierAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierAllocator")
            .field("types", &self.counters.len())
            .finish()
    }
}
