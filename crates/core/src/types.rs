//! Identifier and partition types
//!
//! - `TypeName`: name of a registered record type ("Post", "BlogPost")
//! - `RecordId`: opaque, store-assigned primary identifier
//! - `SearchId`: numeric identifier a record is known by inside the search engine
//! - `PartitionKind` / `IndexPartition`: core and delta index segments

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of a record type, as registered and as used for the type discriminator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeName(String);

impl TypeName {
    /// Create a type name
    pub fn new(name: impl Into<String>) -> Self {
        TypeName(name.into())
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Snake-case form used for partition names.
    ///
    /// `Post` → `post`, `BlogPost` → `blog_post`, `HTMLPage` → `html_page`,
    /// `Admin::User` → `admin_user`.
    pub fn underscore(&self) -> String {
        let chars: Vec<char> = self.0.replace("::", "_").chars().collect();
        let mut out = String::with_capacity(chars.len() + 4);
        for (i, &c) in chars.iter().enumerate() {
            if c.is_uppercase() {
                let prev = if i > 0 { Some(chars[i - 1]) } else { None };
                let next = chars.get(i + 1).copied();
                let boundary = match prev {
                    Some(p) if p == '_' => false,
                    Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                    Some(p) if p.is_uppercase() => next.map_or(false, |n| n.is_lowercase()),
                    _ => false,
                };
                if boundary {
                    out.push('_');
                }
                out.extend(c.to_lowercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        TypeName(s.to_string())
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        TypeName(s)
    }
}

/// Opaque primary identifier assigned by the record store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        RecordId(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// Search-engine document identifier. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchId(u64);

impl SearchId {
    /// Wrap a raw identifier. Returns `None` for zero.
    pub fn new(id: u64) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(SearchId(id))
        }
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which segment of a type's index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartitionKind {
    /// Every record of the type
    Core,
    /// Only records flagged dirty
    Delta,
}

impl PartitionKind {
    /// Suffix used in partition names
    pub fn suffix(self) -> &'static str {
        match self {
            PartitionKind::Core => "core",
            PartitionKind::Delta => "delta",
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A named index segment: `<snake_type>_core` or `<snake_type>_delta`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPartition {
    /// Record type covered
    pub type_name: TypeName,
    /// Core or delta
    pub kind: PartitionKind,
}

impl IndexPartition {
    /// Create a partition reference
    pub fn new(type_name: TypeName, kind: PartitionKind) -> Self {
        IndexPartition { type_name, kind }
    }

    /// Core partition of a type
    pub fn core(type_name: TypeName) -> Self {
        Self::new(type_name, PartitionKind::Core)
    }

    /// Delta partition of a type
    pub fn delta(type_name: TypeName) -> Self {
        Self::new(type_name, PartitionKind::Delta)
    }

    /// Engine-side partition name
    pub fn name(&self) -> String {
        format!("{}_{}", self.type_name.underscore(), self.kind.suffix())
    }
}

impl fmt::Display for IndexPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
