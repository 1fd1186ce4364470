//! Index sync controller
//!
//! Owns rebuild state for every partition. Each `(type, kind)` partition
//! moves through:
//!
//! ```text
//! Idle --rebuild--> Building --job ends--> Idle (last_outcome = Succeeded | Failed)
//! ```
//!
//! A rebuild requested while the partition is `Building` is coalesced into
//! the running one. The job itself runs on the `RebuildScheduler`:
//! 1. open the partition's feed
//! 2. hand it to the `Indexer`
//! 3. for delta partitions, compare-and-clear the dirty flags of exactly
//!    the records the feed emitted, at the revisions it emitted them
//!
//! Records saved while a delta rebuild runs keep their dirty flag and are
//! picked up by the next one.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use docsync_core::{
    DocsyncConfig, Error, IndexPartition, PartitionKind, Result, TypeName, TypeRegistry,
};
use docsync_storage::RecordStore;

use crate::client::Indexer;
use crate::feed::FeedGenerator;
use crate::scheduler::{JobPriority, RebuildScheduler, SchedulerStats};

/// Whether a partition is being rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildState {
    /// No rebuild in flight
    #[default]
    Idle,
    /// A rebuild is queued or running
    Building,
}

/// Result of the last finished rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Indexer accepted the feed
    Succeeded {
        /// Documents handed to the indexer
        indexed: usize,
        /// Records left out of the feed
        skipped: usize,
        /// Dirty flags cleared afterwards (delta only)
        cleared: usize,
        /// Wall time of the job
        duration: Duration,
    },
    /// The job failed; dirty flags were left alone
    Failed(String),
}

impl RebuildOutcome {
    /// True for `Succeeded`
    pub fn is_success(&self) -> bool {
        matches!(self, RebuildOutcome::Succeeded { .. })
    }
}

/// What `rebuild` did with the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildTicket {
    /// A new rebuild was queued
    Scheduled,
    /// A rebuild was already in flight; no new one was queued
    Coalesced,
}

/// Rebuild bookkeeping of one partition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionStatus {
    /// Current state
    pub state: RebuildState,
    /// Outcome of the last finished rebuild
    pub last_outcome: Option<RebuildOutcome>,
    /// Rebuilds finished so far
    pub completed: u64,
    /// When the last rebuild finished
    pub finished_at: Option<DateTime<Utc>>,
}

struct ControllerInner {
    feeds: FeedGenerator,
    store: Arc<dyn RecordStore>,
    indexer: Arc<dyn Indexer>,
    partitions: DashMap<IndexPartition, PartitionStatus>,
}

/// Schedules and tracks partition rebuilds
pub struct IndexSyncController {
    registry: Arc<TypeRegistry>,
    inner: Arc<ControllerInner>,
    scheduler: RebuildScheduler,
}

impl IndexSyncController {
    /// Create a controller with its own worker pool.
    ///
    /// Worker count, queue depth and feed page size come from `config`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` does not validate, `Io` if the workers
    /// cannot be started.
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn RecordStore>,
        indexer: Arc<dyn Indexer>,
        config: &DocsyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let scheduler =
            RebuildScheduler::new(config.indexer_threads, config.indexer_queue_depth)?;
        let feeds = FeedGenerator::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            config.feed_batch_size,
        );
        Ok(IndexSyncController {
            registry,
            inner: Arc::new(ControllerInner {
                feeds,
                store,
                indexer,
                partitions: DashMap::new(),
            }),
            scheduler,
        })
    }

    /// Request a rebuild of one partition. Never waits for the rebuild.
    ///
    /// # Errors
    ///
    /// - `UnknownType` for an unregistered type
    /// - `Registration` for a delta rebuild of a type without delta indexing
    /// - `IndexUnavailable` if the scheduler refuses the job
    pub fn rebuild(&self, type_name: &TypeName, kind: PartitionKind) -> Result<RebuildTicket> {
        let entry = self.registry.entry(type_name)?;
        if kind == PartitionKind::Delta && !entry.has_delta() {
            return Err(Error::Registration(format!(
                "{} has no delta partition",
                type_name
            )));
        }
        let partition = IndexPartition::new(type_name.clone(), kind);

        {
            let mut status = self.inner.partitions.entry(partition.clone()).or_default();
            if status.state == RebuildState::Building {
                debug!(target: "docsync::sync", partition = %partition, "rebuild coalesced");
                return Ok(RebuildTicket::Coalesced);
            }
            status.state = RebuildState::Building;
        }

        let inner = Arc::clone(&self.inner);
        let job_partition = partition.clone();
        let submitted = self
            .scheduler
            .submit(JobPriority::from(kind), move || run_rebuild(&inner, job_partition));

        if let Err(rejected) = submitted {
            if let Some(mut status) = self.inner.partitions.get_mut(&partition) {
                status.state = RebuildState::Idle;
            }
            warn!(target: "docsync::sync", partition = %partition, reason = %rejected, "rebuild rejected");
            return Err(rejected.into());
        }

        info!(target: "docsync::sync", partition = %partition, "rebuild scheduled");
        Ok(RebuildTicket::Scheduled)
    }

    /// Request rebuilds of every registered partition
    pub fn rebuild_all(&self) -> Result<Vec<(IndexPartition, RebuildTicket)>> {
        let mut tickets = Vec::new();
        for entry in self.registry.entries() {
            for partition in entry.partitions() {
                let ticket = self.rebuild(&partition.type_name, partition.kind)?;
                tickets.push((partition, ticket));
            }
        }
        Ok(tickets)
    }

    /// Rebuild bookkeeping of a partition (default status if never built)
    pub fn status(&self, partition: &IndexPartition) -> PartitionStatus {
        self.inner
            .partitions
            .get(partition)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    /// Block until every scheduled rebuild has finished
    pub fn wait_idle(&self) {
        self.scheduler.drain();
    }

    /// Finish queued rebuilds and stop the workers.
    ///
    /// Later `rebuild` calls fail with `IndexUnavailable`.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        info!(target: "docsync::sync", "index sync controller shut down");
    }

    /// Worker pool counters
    pub fn scheduler_stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}

impl fmt::Debug for IndexSyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexSyncController")
            .field("partitions", &self.inner.partitions.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Returns the partition to `Idle` when the job ends, even by panic.
struct BuildingGuard<'a> {
    inner: &'a ControllerInner,
    partition: &'a IndexPartition,
    outcome: Option<RebuildOutcome>,
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| RebuildOutcome::Failed("rebuild job panicked".to_string()));
        if let Some(mut status) = self.inner.partitions.get_mut(self.partition) {
            status.state = RebuildState::Idle;
            status.last_outcome = Some(outcome);
            status.completed += 1;
            status.finished_at = Some(Utc::now());
        }
    }
}

fn run_rebuild(inner: &ControllerInner, partition: IndexPartition) {
    let mut guard = BuildingGuard {
        inner,
        partition: &partition,
        outcome: None,
    };

    let outcome = match rebuild_partition(inner, &partition) {
        Ok(outcome) => {
            if let RebuildOutcome::Succeeded {
                indexed,
                skipped,
                cleared,
                duration,
            } = &outcome
            {
                info!(target: "docsync::sync", partition = %partition, indexed, skipped, cleared, elapsed_ms = duration.as_millis() as u64, "rebuild finished");
            }
            outcome
        }
        Err(e) => {
            warn!(target: "docsync::sync", partition = %partition, error = %e, "rebuild failed");
            RebuildOutcome::Failed(e.to_string())
        }
    };
    guard.outcome = Some(outcome);
}

fn rebuild_partition(inner: &ControllerInner, partition: &IndexPartition) -> Result<RebuildOutcome> {
    let started = Instant::now();
    let mut feed = inner.feeds.open(&partition.type_name, partition.kind)?;
    inner.indexer.index(partition, &mut feed)?;
    let (snapshot, stats) = feed.finish();

    let cleared = match partition.kind {
        PartitionKind::Delta if !snapshot.is_empty() => inner
            .store
            .clear_dirty(&partition.type_name, &snapshot.pairs())?,
        _ => 0,
    };
    if cleared < snapshot.len() && partition.kind == PartitionKind::Delta {
        debug!(target: "docsync::sync", partition = %partition, kept = snapshot.len() - cleared, "records changed during rebuild stay dirty");
    }

    Ok(RebuildOutcome::Succeeded {
        indexed: stats.emitted,
        skipped: stats.skipped,
        cleared,
        duration: started.elapsed(),
    })
}
