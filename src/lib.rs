//! docsync - keeps a record store and a full-text search index in sync
//!
//! Records of registered types get a numeric search id when first saved.
//! Saves that touch indexed fields mark the record dirty and schedule a
//! rebuild of the type's small delta partition on a background worker;
//! full core rebuilds are requested explicitly. Queries go to the search
//! daemon and come back as records loaded from the store.
//!
//! # Quick Start
//!
//! ```ignore
//! use docsync::{Docsync, DocsyncConfig, IndexOptions, TypeRegistry};
//!
//! let mut registry = TypeRegistry::new();
//! registry.register("Post", ["title", "body"], IndexOptions::with_delta())?;
//!
//! let docsync = Docsync::with_command_indexer(
//!     DocsyncConfig::from_file("docsync.toml".as_ref())?,
//!     registry,
//!     store,
//!     client,
//! )?;
//!
//! let post = docsync.records().create(&"Post".into(), RecordId::generate(), fields)?;
//! let hits = docsync.search("first @title post", &SearchOptions::for_type("Post"))?;
//! ```
//!
//! # Architecture
//!
//! - `docsync-core`: identifiers, values, records, type registry, config, errors
//! - `docsync-storage`: the `RecordStore` trait and an in-memory store
//! - `docsync-engine`: allocation, dirty tracking, feeds, rebuilds, queries

use std::sync::Arc;

use tracing::info;

pub use docsync_core::*;
pub use docsync_engine::*;
pub use docsync_storage::{MemoryRecordStore, RecordStore, RecordUpdate, ScanFilter};

/// All docsync components wired over one store and one registry
pub struct Docsync {
    config: DocsyncConfig,
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RecordStore>,
    controller: Arc<IndexSyncController>,
    resolver: QueryResolver,
    records: IndexedStore,
}

impl Docsync {
    /// Wire the components.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` does not validate, `Io` if the rebuild
    /// workers cannot be started.
    pub fn open(
        config: DocsyncConfig,
        registry: TypeRegistry,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn SearchClient>,
        indexer: Arc<dyn Indexer>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(registry);

        let controller = Arc::new(IndexSyncController::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            indexer,
            &config,
        )?);
        let resolver = QueryResolver::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            client,
            &config,
        )?;
        let records = IndexedStore::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&controller),
        );

        info!(target: "docsync::init", environment = %config.environment, types = registry.len(), "docsync ready");
        Ok(Docsync {
            config,
            registry,
            store,
            controller,
            resolver,
            records,
        })
    }

    /// Wire the components with the external `indexer` binary from `config`
    pub fn with_command_indexer(
        config: DocsyncConfig,
        registry: TypeRegistry,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn SearchClient>,
    ) -> Result<Self> {
        let indexer = Arc::new(CommandIndexer::from_config(&config));
        Self::open(config, registry, store, client, indexer)
    }

    /// Active configuration
    pub fn config(&self) -> &DocsyncConfig {
        &self.config
    }

    /// Registered types
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Underlying record store
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Save path
    pub fn records(&self) -> &IndexedStore {
        &self.records
    }

    /// Query side
    pub fn resolver(&self) -> &QueryResolver {
        &self.resolver
    }

    /// Rebuild control
    pub fn controller(&self) -> &IndexSyncController {
        &self.controller
    }

    /// Shorthand for `resolver().search`
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchOutcome> {
        self.resolver.search(query, options)
    }

    /// Finish queued rebuilds and stop the workers
    pub fn shutdown(&self) {
        self.controller.shutdown();
    }
}

impl std::fmt::Debug for Docsync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Docsync")
            .field("environment", &self.config.environment)
            .field("types", &self.registry.len())
            .field("controller", &self.controller)
            .finish()
    }
}
