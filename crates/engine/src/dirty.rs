//! Dirty tracking for delta-indexed types
//!
//! A record is dirty when an indexed field changed since the last delta
//! rebuild that covered it. The flag is decided here, before the save, and
//! written by the same store update that writes the field changes.

use std::collections::BTreeSet;

use tracing::trace;

use docsync_core::{Fields, Record, RegistrationEntry};

/// Per-save switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Leave the dirty flag alone for this save
    pub skip_dirty_tracking: bool,
    /// Do not request a delta rebuild after this save
    pub skip_delta_rebuild: bool,
}

impl SaveOptions {
    /// Save without touching dirty state or scheduling a rebuild
    pub fn quiet() -> Self {
        SaveOptions {
            skip_dirty_tracking: true,
            skip_delta_rebuild: true,
        }
    }
}

/// Decides when a save makes a record dirty
#[derive(Debug, Clone, Copy, Default)]
pub struct DirtyTracker;

impl DirtyTracker {
    /// Names of fields whose value differs between `before` and `after`.
    ///
    /// A field present on one side only counts as changed.
    pub fn changed_fields(before: &Fields, after: &Fields) -> BTreeSet<String> {
        let mut changed: BTreeSet<String> = before
            .iter()
            .filter(|(name, value)| after.get(*name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            after
                .keys()
                .filter(|name| !before.contains_key(*name))
                .cloned(),
        );
        changed
    }

    /// Set `record.dirty` if an indexed field is among `changed`.
    ///
    /// Returns true when the record was marked. Types without a delta
    /// partition and saves with `skip_dirty_tracking` never mark.
    pub fn mark_if_dirty(
        record: &mut Record,
        changed: &BTreeSet<String>,
        entry: &RegistrationEntry,
        options: &SaveOptions,
    ) -> bool {
        if options.skip_dirty_tracking || !entry.has_delta() {
            return false;
        }
        let touches_index = changed.iter().any(|field| entry.is_indexed(field));
        if touches_index {
            record.dirty = true;
            trace!(target: "docsync::dirty", type_name = %record.type_name, id = %record.id, "marked dirty");
        }
        touches_index
    }
}
