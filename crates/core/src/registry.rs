//! Type registry
//!
//! One `RegistrationEntry` per indexable record type, created at registration
//! time and read-only afterwards. The registry is an explicit object: build it
//! at startup, wrap it in an `Arc`, and hand it to every component. Nothing in
//! docsync looks types up through global state, so tests can run several
//! independent registries side by side.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::record::Indexable;
use crate::types::{IndexPartition, TypeName};

/// Default identifier width in bits
pub const DEFAULT_ID_SIZE: u8 = 32;

/// Largest accepted identifier width in bits
pub const MAX_ID_SIZE: u8 = 63;

/// Per-type indexing options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Maintain a delta partition for this type
    #[serde(default)]
    pub delta: bool,
    /// Search daemon host override for single-type queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Search daemon port override for single-type queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Width of allocated search identifiers in bits
    #[serde(default = "default_id_size")]
    pub id_size: u8,
}

fn default_id_size() -> u8 {
    DEFAULT_ID_SIZE
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            delta: false,
            server: None,
            port: None,
            id_size: DEFAULT_ID_SIZE,
        }
    }
}

impl IndexOptions {
    /// Options with delta indexing enabled
    pub fn with_delta() -> Self {
        IndexOptions {
            delta: true,
            ..IndexOptions::default()
        }
    }
}

/// Registration of one record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationEntry {
    type_name: TypeName,
    indexed_fields: Vec<String>,
    options: IndexOptions,
}

impl RegistrationEntry {
    /// Registered type name
    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    /// Indexed fields in feed order
    pub fn indexed_fields(&self) -> &[String] {
        &self.indexed_fields
    }

    /// Whether `field` is one of the indexed fields
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.iter().any(|f| f == field)
    }

    /// Registration options
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Whether the type keeps a delta partition
    pub fn has_delta(&self) -> bool {
        self.options.delta
    }

    /// Largest search identifier the id-size policy allows
    pub fn max_search_id(&self) -> u64 {
        (1u64 << self.options.id_size) - 1
    }

    /// Core partition, then delta partition when enabled
    pub fn partitions(&self) -> Vec<IndexPartition> {
        let mut partitions = vec![IndexPartition::core(self.type_name.clone())];
        if self.has_delta() {
            partitions.push(IndexPartition::delta(self.type_name.clone()));
        }
        partitions
    }
}

/// Registry of indexable record types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    entries: HashMap<TypeName, RegistrationEntry>,
    order: Vec<TypeName>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type.
    ///
    /// # Errors
    ///
    /// `Registration` if the type is already registered, the field list is
    /// empty or has duplicates, a field name is reserved or not of the form
    /// `[A-Za-z_][A-Za-z0-9_]*`, or `id_size` is outside `1..=63`.
    pub fn register<I, S>(
        &mut self,
        type_name: impl Into<TypeName>,
        indexed_fields: I,
        options: IndexOptions,
    ) -> Result<&RegistrationEntry>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let type_name = type_name.into();
        if type_name.as_str().is_empty() {
            return Err(Error::Registration("type name must not be empty".to_string()));
        }
        if self.entries.contains_key(&type_name) {
            return Err(Error::Registration(format!(
                "{} is already registered",
                type_name
            )));
        }

        let mut fields: Vec<String> = Vec::new();
        for field in indexed_fields {
            let field = field.into();
            if !is_field_identifier(&field) || RESERVED_FIELDS.contains(&field.as_str()) {
                return Err(Error::Registration(format!(
                    "{}: invalid indexed field name '{}'",
                    type_name, field
                )));
            }
            if fields.contains(&field) {
                return Err(Error::Registration(format!(
                    "{}: field '{}' listed twice",
                    type_name, field
                )));
            }
            fields.push(field);
        }
        if fields.is_empty() {
            return Err(Error::Registration(format!(
                "{} must declare at least one indexed field",
                type_name
            )));
        }
        if options.id_size == 0 || options.id_size > MAX_ID_SIZE {
            return Err(Error::Registration(format!(
                "{}: id_size must be between 1 and {}, got {}",
                type_name, MAX_ID_SIZE, options.id_size
            )));
        }

        let entry = RegistrationEntry {
            type_name: type_name.clone(),
            indexed_fields: fields,
            options,
        };
        self.order.push(type_name.clone());
        Ok(self.entries.entry(type_name).or_insert(entry))
    }

    /// Register a typed model through its `Indexable` implementation
    pub fn register_type<T: Indexable>(&mut self) -> Result<&RegistrationEntry> {
        self.register(
            T::type_name(),
            T::indexed_fields().iter().copied(),
            T::index_options(),
        )
    }

    /// Look up a type
    pub fn get(&self, type_name: &TypeName) -> Option<&RegistrationEntry> {
        self.entries.get(type_name)
    }

    /// Look up a type, failing with `UnknownType`
    pub fn entry(&self, type_name: &TypeName) -> Result<&RegistrationEntry> {
        self.get(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    /// Resolve a type discriminator read back from the index
    pub fn resolve(&self, discriminator: &str) -> Option<&RegistrationEntry> {
        self.entries.get(&TypeName::from(discriminator))
    }

    /// All registrations in registration order
    pub fn entries(&self) -> impl Iterator<Item = &RegistrationEntry> {
        self.order.iter().filter_map(move |name| self.entries.get(name))
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Field names the feed itself uses
pub const RESERVED_FIELDS: &[&str] = &["id", "classname"];

/// Field names double as xmlpipe2 element names
fn is_field_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
