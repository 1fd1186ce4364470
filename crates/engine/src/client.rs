//! Search engine boundary
//!
//! docsync talks to the search daemon through `SearchClient` and to the
//! index builder through `Indexer`. Both are traits so deployments can plug
//! in a wire client or a process runner, and tests can plug in doubles.

use std::fmt;
use std::str::FromStr;

use docsync_core::{DocsyncConfig, Error, IndexPartition, Result};

use crate::feed::Feed;

/// How the engine interprets the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchMode {
    /// Every word must match
    All,
    /// Any word may match
    Any,
    /// Words must match as a phrase
    Phrase,
    /// Boolean operators
    Boolean,
    /// Full query language, including `@field` restrictions
    #[default]
    Extended,
    /// Extended syntax, second revision
    Extended2,
    /// Filter-only scan
    Fullscan,
}

impl MatchMode {
    /// Lowercase name as used in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::All => "all",
            MatchMode::Any => "any",
            MatchMode::Phrase => "phrase",
            MatchMode::Boolean => "boolean",
            MatchMode::Extended => "extended",
            MatchMode::Extended2 => "extended2",
            MatchMode::Fullscan => "fullscan",
        }
    }
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(MatchMode::All),
            "any" => Ok(MatchMode::Any),
            "phrase" => Ok(MatchMode::Phrase),
            "boolean" => Ok(MatchMode::Boolean),
            "extended" => Ok(MatchMode::Extended),
            "extended2" => Ok(MatchMode::Extended2),
            "fullscan" => Ok(MatchMode::Fullscan),
            other => Err(Error::InvalidConfig(format!("unknown match mode '{}'", other))),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Engine relevance
    #[default]
    Relevance,
    /// SQL-like `sort_by` clause
    Extended,
}

/// Search daemon address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// Default daemon address from configuration
    pub fn from_config(config: &DocsyncConfig) -> Self {
        Endpoint::new(config.address.clone(), config.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One query as sent to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Query text, including any `@classname` restriction
    pub query: String,
    /// Space-separated partition names, or `*`
    pub indexes: String,
    /// Match mode
    pub match_mode: MatchMode,
    /// Sort mode
    pub sort_mode: SortMode,
    /// Sort clause when `sort_mode` is `Extended`
    pub sort_by: Option<String>,
    /// Page size; engine default when `None`
    pub limit: Option<u32>,
    /// Upper bound on matches the engine keeps
    pub max_matches: u32,
}

/// Attribute value of a match
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Integer attribute
    Int(i64),
    /// Float attribute
    Float(f64),
    /// String attribute
    String(String),
    /// Multi-value attribute
    Multi(Vec<i64>),
}

/// One match as returned by the daemon
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    /// Engine document id
    pub doc_id: u64,
    /// Relevance weight
    pub weight: i64,
    /// Attributes by name
    pub attributes: Vec<(String, AttrValue)>,
}

impl RawMatch {
    /// Look up an attribute
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Daemon answer. `status != 0` means no usable results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    /// Zero on success
    pub status: i32,
    /// Error or warning text from the daemon
    pub error: Option<String>,
    /// Matches in engine order
    pub matches: Vec<RawMatch>,
    /// Total matches the engine found
    pub total_found: u64,
}

/// Query access to the search daemon
pub trait SearchClient: Send + Sync {
    /// Run one query.
    ///
    /// # Errors
    ///
    /// `IndexUnavailable` when the daemon cannot be reached.
    fn query(&self, endpoint: &Endpoint, request: &QueryRequest) -> Result<QueryResponse>;
}

/// Builds one partition from a feed. Called on a background worker.
pub trait Indexer: Send + Sync {
    /// Consume `feed` and replace the partition's contents.
    ///
    /// # Errors
    ///
    /// Any error aborts the rebuild; the caller does not clear dirty flags.
    fn index(&self, partition: &IndexPartition, feed: &mut Feed) -> Result<()>;
}
