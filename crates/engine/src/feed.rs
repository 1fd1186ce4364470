//! Feed generation
//!
//! A `Feed` streams the documents of one index partition out of the record
//! store: every record of the type for a core partition, only dirty records
//! for a delta partition. Records are pulled in pages of `feed_batch_size`
//! with a search-id cursor, so memory stays bounded regardless of how many
//! records the type holds.
//!
//! Each emitted entry is noted in the feed's `FeedSnapshot`
//! (`search_id -> revision`). After a delta rebuild the snapshot bounds the
//! dirty-flag clear: only records still at the captured revision are
//! cleared.
//!
//! Records that cannot be represented are skipped with a warning and counted
//! in `FeedStats::skipped`. A store failure ends the feed with an error item.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use docsync_core::{
    Error, IndexPartition, PartitionKind, Record, RegistrationEntry, Result, SearchId, TypeName,
    TypeRegistry,
};
use docsync_storage::{RecordStore, ScanFilter};

/// One document of a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Engine document id
    pub search_id: SearchId,
    /// Store revision the fields were read at
    pub revision: u64,
    /// Type discriminator
    pub type_name: TypeName,
    /// Indexed field text in registration order; absent fields are empty
    pub fields: Vec<(String, String)>,
}

/// Revisions of every record a feed emitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    revisions: BTreeMap<SearchId, u64>,
}

impl FeedSnapshot {
    fn record(&mut self, search_id: SearchId, revision: u64) {
        self.revisions.insert(search_id, revision);
    }

    /// Revision captured for a record
    pub fn revision_of(&self, search_id: SearchId) -> Option<u64> {
        self.revisions.get(&search_id).copied()
    }

    /// `(search_id, revision)` pairs in ascending search id
    pub fn pairs(&self) -> Vec<(SearchId, u64)> {
        self.revisions.iter().map(|(id, rev)| (*id, *rev)).collect()
    }

    /// Number of captured records
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// True when the feed emitted nothing
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

/// Counters for one feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Entries handed to the consumer
    pub emitted: usize,
    /// Records left out because they could not be represented
    pub skipped: usize,
    /// Store pages fetched
    pub pages: usize,
}

/// Streaming iterator over the documents of one partition
pub struct Feed {
    store: Arc<dyn RecordStore>,
    entry: RegistrationEntry,
    partition: IndexPartition,
    filter: ScanFilter,
    batch_size: usize,
    cursor: Option<SearchId>,
    buffer: VecDeque<Record>,
    exhausted: bool,
    snapshot: FeedSnapshot,
    stats: FeedStats,
}

impl Feed {
    fn new(
        store: Arc<dyn RecordStore>,
        entry: RegistrationEntry,
        kind: PartitionKind,
        batch_size: usize,
    ) -> Self {
        let filter = match kind {
            PartitionKind::Core => ScanFilter::all(),
            PartitionKind::Delta => ScanFilter::dirty(),
        };
        Feed {
            partition: IndexPartition::new(entry.type_name().clone(), kind),
            store,
            entry,
            filter,
            batch_size: batch_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
            snapshot: FeedSnapshot::default(),
            stats: FeedStats::default(),
        }
    }

    /// Partition this feed fills
    pub fn partition(&self) -> &IndexPartition {
        &self.partition
    }

    /// Indexed field names in feed order
    pub fn field_names(&self) -> &[String] {
        self.entry.indexed_fields()
    }

    /// Entries emitted so far
    pub fn snapshot(&self) -> &FeedSnapshot {
        &self.snapshot
    }

    /// Counters so far
    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    /// Consume the feed, keeping its snapshot and counters
    pub fn finish(self) -> (FeedSnapshot, FeedStats) {
        (self.snapshot, self.stats)
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self.store.scan(
            self.entry.type_name(),
            self.filter,
            self.cursor,
            self.batch_size,
        )?;
        self.stats.pages += 1;
        if page.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last().and_then(|r| r.search_id) {
            self.cursor = Some(last);
        }
        self.buffer.extend(page);
        Ok(())
    }

    fn render(&self, record: &Record) -> Result<FeedEntry> {
        let type_name = self.entry.type_name();
        let search_id = record.search_id.ok_or_else(|| {
            Error::feed_generation(type_name.as_str(), 0, "record has no search id")
        })?;

        let mut fields = Vec::with_capacity(self.entry.indexed_fields().len());
        for name in self.entry.indexed_fields() {
            let text = match record.get(name) {
                Some(value) => value.to_feed_text().map_err(|reason| {
                    Error::feed_generation(
                        type_name.as_str(),
                        search_id.get(),
                        format!("field '{}': {}", name, reason),
                    )
                })?,
                None => String::new(),
            };
            fields.push((name.clone(), text));
        }

        Ok(FeedEntry {
            search_id,
            revision: record.revision,
            type_name: type_name.clone(),
            fields,
        })
    }
}

impl Iterator for Feed {
    type Item = Result<FeedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                match self.render(&record) {
                    Ok(entry) => {
                        self.snapshot.record(entry.search_id, entry.revision);
                        self.stats.emitted += 1;
                        return Some(Ok(entry));
                    }
                    Err(e) => {
                        warn!(target: "docsync::feed", partition = %self.partition, id = %record.id, error = %e, "skipping record");
                        self.stats.skipped += 1;
                        continue;
                    }
                }
            }

            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("partition", &self.partition.name())
            .field("cursor", &self.cursor)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Opens feeds for registered types
#[derive(Clone)]
pub struct FeedGenerator {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RecordStore>,
    batch_size: usize,
}

impl FeedGenerator {
    /// Create a generator reading `batch_size` records per store page
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn RecordStore>,
        batch_size: usize,
    ) -> Self {
        FeedGenerator {
            registry,
            store,
            batch_size,
        }
    }

    /// Open a streaming feed for one partition.
    ///
    /// # Errors
    ///
    /// `UnknownType` for an unregistered type, `Registration` for a delta
    /// feed of a type without a delta partition.
    pub fn open(&self, type_name: &TypeName, kind: PartitionKind) -> Result<Feed> {
        let entry = self.registry.entry(type_name)?;
        if kind == PartitionKind::Delta && !entry.has_delta() {
            return Err(Error::Registration(format!(
                "{} has no delta partition",
                type_name
            )));
        }
        debug!(target: "docsync::feed", type_name = %type_name, kind = %kind, batch_size = self.batch_size, "opening feed");
        Ok(Feed::new(
            Arc::clone(&self.store),
            entry.clone(),
            kind,
            self.batch_size,
        ))
    }

    /// Read a whole feed into memory.
    ///
    /// # Errors
    ///
    /// Everything `open` returns, plus the first store error met while
    /// streaming.
    pub fn generate(
        &self,
        type_name: &TypeName,
        kind: PartitionKind,
    ) -> Result<(Vec<FeedEntry>, FeedSnapshot, FeedStats)> {
        let mut feed = self.open(type_name, kind)?;
        let entries = feed.by_ref().collect::<Result<Vec<_>>>()?;
        let (snapshot, stats) = feed.finish();
        Ok((entries, snapshot, stats))
    }
}
