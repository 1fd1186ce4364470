//! Stored records and the `Indexable` capability
//!
//! `Record` is the store's view of one document of a registered type,
//! including the indexing bookkeeping persisted alongside its fields:
//! `search_id`, `dirty` and the store-maintained `revision`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::registry::IndexOptions;
use crate::types::{RecordId, SearchId, TypeName};
use crate::value::Value;

/// Field name → value
pub type Fields = BTreeMap<String, Value>;

/// A stored record of an indexable type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary identifier
    pub id: RecordId,
    /// Record type
    pub type_name: TypeName,
    /// Search identifier, assigned once at first persistence
    pub search_id: Option<SearchId>,
    /// Indexed content changed since the last delta rebuild
    pub dirty: bool,
    /// Store revision, bumped on every write. Zero until first persisted.
    pub revision: u64,
    /// Field values
    pub fields: Fields,
}

impl Record {
    /// Create an unpersisted record
    pub fn new(type_name: TypeName, id: RecordId, fields: Fields) -> Self {
        Record {
            id,
            type_name,
            search_id: None,
            dirty: false,
            revision: 0,
            fields,
        }
    }

    /// Look up a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Capability of a typed model that is kept in a search index.
///
/// Implementors declare their indexed fields and options once;
/// `TypeRegistry::register_type` turns that into a `RegistrationEntry`,
/// and `QueryResolver::search_typed` uses `from_record` to hand back
/// typed results.
///
/// ```ignore
/// struct Post { title: String }
///
/// impl Indexable for Post {
///     const TYPE_NAME: &'static str = "Post";
///
///     fn indexed_fields() -> &'static [&'static str] {
///         &["title", "body"]
///     }
///
///     fn index_options() -> IndexOptions {
///         IndexOptions { delta: true, ..IndexOptions::default() }
///     }
///
///     fn from_record(record: &Record) -> Result<Self> { ... }
/// }
/// ```
pub trait Indexable: Sized {
    /// Registered type name, also the type discriminator in the index
    const TYPE_NAME: &'static str;

    /// Fields fed to the search engine, in feed order
    fn indexed_fields() -> &'static [&'static str];

    /// Registration options (delta indexing, server override, id size)
    fn index_options() -> IndexOptions {
        IndexOptions::default()
    }

    /// Build the typed model from a stored record
    fn from_record(record: &Record) -> Result<Self>;

    /// Type name as a `TypeName`
    fn type_name() -> TypeName {
        TypeName::from(Self::TYPE_NAME)
    }
}

/// Build a `Fields` map from `(name, value)` pairs
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
