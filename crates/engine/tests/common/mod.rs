//! Test doubles shared by the engine integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use docsync_core::{
    fields, DocsyncConfig, Error, IndexOptions, IndexPartition, Record, RecordId, Result,
    SearchId, TypeName, TypeRegistry,
};
use docsync_engine::{
    AttrValue, Endpoint, Feed, IndexSyncController, IndexedStore, Indexer, QueryRequest,
    QueryResolver, QueryResponse, RawMatch, SearchClient,
};
use docsync_storage::{MemoryRecordStore, RecordStore, RecordUpdate, ScanFilter};

// ============================================================================
// Gate
// ============================================================================

/// One-shot latch
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

// ============================================================================
// Indexer double
// ============================================================================

/// Drains feeds and records what it saw.
///
/// With `hold()`, each call signals `fed` after draining the feed and then
/// blocks until `release` opens.
#[derive(Default)]
pub struct RecordingIndexer {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<(String, Vec<u64>)>>,
    pub fed: Gate,
    pub release: Gate,
    hold: AtomicBool,
    fail: AtomicBool,
}

impl RecordingIndexer {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingIndexer::default())
    }

    pub fn holding() -> Arc<Self> {
        let indexer = RecordingIndexer::default();
        indexer.hold.store(true, Ordering::SeqCst);
        Arc::new(indexer)
    }

    pub fn failing() -> Arc<Self> {
        let indexer = RecordingIndexer::default();
        indexer.fail.store(true, Ordering::SeqCst);
        Arc::new(indexer)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Indexer for RecordingIndexer {
    fn index(&self, partition: &IndexPartition, feed: &mut Feed) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let ids = feed
            .by_ref()
            .map(|entry| entry.map(|e| e.search_id.get()))
            .collect::<Result<Vec<_>>>()?;
        self.seen.lock().push((partition.name(), ids));

        if self.hold.load(Ordering::SeqCst) {
            self.fed.open();
            self.release.wait();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::IndexUnavailable("indexer exited with 1".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Search client double
// ============================================================================

pub enum Script {
    Respond(QueryResponse),
    Unavailable,
}

/// Returns a scripted answer and remembers every request
pub struct ScriptedClient {
    script: Script,
    pub requests: Mutex<Vec<(Endpoint, QueryRequest)>>,
}

impl ScriptedClient {
    pub fn responding(matches: Vec<RawMatch>) -> Arc<Self> {
        Self::new(Script::Respond(QueryResponse {
            status: 0,
            error: None,
            total_found: matches.len() as u64,
            matches,
        }))
    }

    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(ScriptedClient {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_request(&self) -> (Endpoint, QueryRequest) {
        self.requests
            .lock()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl SearchClient for ScriptedClient {
    fn query(&self, endpoint: &Endpoint, request: &QueryRequest) -> Result<QueryResponse> {
        self.requests.lock().push((endpoint.clone(), request.clone()));
        match &self.script {
            Script::Respond(response) => Ok(response.clone()),
            Script::Unavailable => Err(Error::IndexUnavailable("connection refused".to_string())),
        }
    }
}

pub fn hit(classname: &str, doc_id: u64) -> RawMatch {
    RawMatch {
        doc_id,
        weight: 1,
        attributes: vec![(
            "classname".to_string(),
            AttrValue::String(classname.to_string()),
        )],
    }
}

// ============================================================================
// Store double
// ============================================================================

/// MemoryRecordStore that counts lookups and can refuse reads
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryRecordStore,
    pub lookups: AtomicUsize,
    pub offline: AtomicBool,
}

impl CountingStore {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

impl RecordStore for CountingStore {
    fn insert(&self, record: Record) -> Result<Record> {
        self.check()?;
        self.inner.insert(record)
    }

    fn find(&self, type_name: &TypeName, id: &RecordId) -> Result<Record> {
        self.check()?;
        self.inner.find(type_name, id)
    }

    fn find_by_search_id(&self, type_name: &TypeName, search_id: SearchId) -> Result<Record> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_by_search_id(type_name, search_id)
    }

    fn max_search_id(&self, type_name: &TypeName) -> Result<Option<SearchId>> {
        self.check()?;
        self.inner.max_search_id(type_name)
    }

    fn scan(
        &self,
        type_name: &TypeName,
        filter: ScanFilter,
        after: Option<SearchId>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        self.check()?;
        self.inner.scan(type_name, filter, after, limit)
    }

    fn update(&self, type_name: &TypeName, id: &RecordId, update: RecordUpdate) -> Result<Record> {
        self.check()?;
        self.inner.update(type_name, id, update)
    }

    fn clear_dirty(&self, type_name: &TypeName, snapshot: &[(SearchId, u64)]) -> Result<usize> {
        self.check()?;
        self.inner.clear_dirty(type_name, snapshot)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register("Post", ["title", "body"], IndexOptions::with_delta())
        .unwrap();
    registry
        .register(
            "Comment",
            ["text"],
            IndexOptions {
                server: Some("comments.search.internal".to_string()),
                port: Some(9400),
                ..IndexOptions::default()
            },
        )
        .unwrap();
    registry
}

pub struct Harness {
    pub registry: Arc<TypeRegistry>,
    pub store: Arc<CountingStore>,
    pub indexer: Arc<RecordingIndexer>,
    pub client: Arc<ScriptedClient>,
    pub controller: Arc<IndexSyncController>,
    pub records: IndexedStore,
    pub resolver: QueryResolver,
}

impl Harness {
    pub fn new(indexer: Arc<RecordingIndexer>, client: Arc<ScriptedClient>) -> Self {
        let registry = Arc::new(registry());
        let store = Arc::new(CountingStore::default());
        let config = DocsyncConfig {
            feed_batch_size: 4,
            ..DocsyncConfig::default()
        };
        let controller = Arc::new(
            IndexSyncController::new(registry.clone(), store.clone(), indexer.clone(), &config)
                .unwrap(),
        );
        let records = IndexedStore::new(registry.clone(), store.clone(), controller.clone());
        let resolver =
            QueryResolver::new(registry.clone(), store.clone(), client.clone(), &config).unwrap();
        Harness {
            registry,
            store,
            indexer,
            client,
            controller,
            records,
            resolver,
        }
    }

    pub fn with_indexer(indexer: Arc<RecordingIndexer>) -> Self {
        Self::new(indexer, ScriptedClient::responding(Vec::new()))
    }

    pub fn with_client(client: Arc<ScriptedClient>) -> Self {
        Self::new(RecordingIndexer::new(), client)
    }

    /// Insert a record directly, bypassing the save path
    pub fn seed(&self, type_name: &str, id: &str, search_id: u64, dirty: bool) -> Record {
        let mut record = Record::new(
            TypeName::from(type_name),
            RecordId::from(id),
            fields([("title", format!("{} {}", type_name, id))]),
        );
        record.search_id = SearchId::new(search_id);
        record.dirty = dirty;
        self.store.inner.insert(record).unwrap()
    }

    pub fn post() -> TypeName {
        TypeName::from("Post")
    }
}
