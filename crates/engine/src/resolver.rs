//! Query resolution
//!
//! Turns a full-text query into records:
//! 1. pick partitions (`<type>_core`, `<type>_delta` per requested type, or `*`)
//! 2. send the query to the daemon
//! 3. decode each match's type discriminator
//! 4. look each match up in the record store by search id
//!
//! Search failures never surface as errors: an unreachable daemon or a
//! non-zero status yields an empty result and a warning. Matches whose
//! discriminator is unknown, or whose record is gone, are dropped.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use docsync_core::{
    DocsyncConfig, Error, Indexable, Record, Result, SearchId, TypeName, TypeRegistry,
};
use docsync_storage::RecordStore;

use crate::client::{
    AttrValue, Endpoint, MatchMode, QueryRequest, RawMatch, SearchClient, SortMode,
};
use crate::xmlpipe::CLASSNAME_ATTR;

/// Per-query options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Types to search; empty searches every partition
    pub types: Vec<TypeName>,
    /// Match mode; configured default when `None`
    pub match_mode: Option<MatchMode>,
    /// Page size
    pub limit: Option<u32>,
    /// Cap on matches the engine keeps; configured default when `None`
    pub max_matches: Option<u32>,
    /// Sort clause; switches the query to extended sorting
    pub sort_by: Option<String>,
    /// Return match references only, without loading records
    pub raw: bool,
}

impl SearchOptions {
    /// Options restricted to one type
    pub fn for_type(type_name: impl Into<TypeName>) -> Self {
        SearchOptions {
            types: vec![type_name.into()],
            ..SearchOptions::default()
        }
    }

    /// Builder: return match references only
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Builder: sort clause
    pub fn sort_by(mut self, clause: impl Into<String>) -> Self {
        self.sort_by = Some(clause.into());
        self
    }

    /// Builder: page size
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A decoded match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRef {
    /// Record type from the discriminator
    pub type_name: TypeName,
    /// Engine document id
    pub search_id: SearchId,
    /// Relevance weight
    pub weight: i64,
}

/// Query result
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Loaded records in engine order
    Records(Vec<Record>),
    /// Match references in engine order
    Raw(Vec<MatchRef>),
}

impl SearchOutcome {
    fn empty(raw: bool) -> Self {
        if raw {
            SearchOutcome::Raw(Vec::new())
        } else {
            SearchOutcome::Records(Vec::new())
        }
    }

    /// Number of results
    pub fn len(&self) -> usize {
        match self {
            SearchOutcome::Records(r) => r.len(),
            SearchOutcome::Raw(r) => r.len(),
        }
    }

    /// True when nothing matched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs queries and resolves matches to records
pub struct QueryResolver {
    registry: Arc<TypeRegistry>,
    store: Arc<dyn RecordStore>,
    client: Arc<dyn SearchClient>,
    endpoint: Endpoint,
    match_mode: MatchMode,
    max_matches: u32,
}

impl QueryResolver {
    /// Create a resolver using the daemon address and defaults in `config`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configured match mode is unknown.
    pub fn new(
        registry: Arc<TypeRegistry>,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn SearchClient>,
        config: &DocsyncConfig,
    ) -> Result<Self> {
        Ok(QueryResolver {
            registry,
            store,
            client,
            endpoint: Endpoint::from_config(config),
            match_mode: config.match_mode.parse()?,
            max_matches: config.max_matches,
        })
    }

    /// Partitions a query over `types` reads.
    ///
    /// Core then delta (if enabled) for each type, in the order given.
    /// `["*"]` when no type is given.
    ///
    /// # Errors
    ///
    /// `UnknownType` if a type is not registered.
    pub fn partition_names(&self, types: &[TypeName]) -> Result<Vec<String>> {
        if types.is_empty() {
            return Ok(vec!["*".to_string()]);
        }
        let mut names = Vec::new();
        for type_name in types {
            let entry = self.registry.entry(type_name)?;
            names.extend(entry.partitions().iter().map(|p| p.name()));
        }
        Ok(names)
    }

    /// Run a query.
    ///
    /// # Errors
    ///
    /// Only `UnknownType` for an unregistered requested type. Daemon
    /// failures produce an empty outcome.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchOutcome> {
        let (endpoint, request) = self.build_request(query, options)?;

        let response = match self.client.query(&endpoint, &request) {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "docsync::query", endpoint = %endpoint, indexes = %request.indexes, error = %e, "search daemon unavailable");
                return Ok(SearchOutcome::empty(options.raw));
            }
        };
        if response.status != 0 {
            warn!(
                target: "docsync::query",
                endpoint = %endpoint,
                status = response.status,
                error = response.error.as_deref().unwrap_or(""),
                "search returned non-zero status"
            );
            return Ok(SearchOutcome::empty(options.raw));
        }

        let refs: Vec<MatchRef> = response
            .matches
            .iter()
            .filter_map(|m| self.decode(m))
            .collect();
        debug!(target: "docsync::query", indexes = %request.indexes, matches = response.matches.len(), decoded = refs.len(), "search finished");

        if options.raw {
            return Ok(SearchOutcome::Raw(refs));
        }
        Ok(SearchOutcome::Records(self.load(&refs)))
    }

    /// `search` returning loaded records
    pub fn search_records(&self, query: &str, options: &SearchOptions) -> Result<Vec<Record>> {
        let options = SearchOptions {
            raw: false,
            ..options.clone()
        };
        match self.search(query, &options)? {
            SearchOutcome::Records(records) => Ok(records),
            SearchOutcome::Raw(_) => Ok(Vec::new()),
        }
    }

    /// `search` returning match references only
    pub fn search_raw(&self, query: &str, options: &SearchOptions) -> Result<Vec<MatchRef>> {
        let options = SearchOptions {
            raw: true,
            ..options.clone()
        };
        match self.search(query, &options)? {
            SearchOutcome::Raw(refs) => Ok(refs),
            SearchOutcome::Records(_) => Ok(Vec::new()),
        }
    }

    /// Search within `T`'s type and convert each record to `T`.
    ///
    /// Records that fail to convert are dropped with a warning.
    pub fn search_typed<T: Indexable>(&self, query: &str, options: &SearchOptions) -> Result<Vec<T>> {
        let options = SearchOptions {
            types: vec![T::type_name()],
            ..options.clone()
        };
        let records = self.search_records(query, &options)?;
        Ok(records
            .iter()
            .filter_map(|record| match T::from_record(record) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!(target: "docsync::query", type_name = T::TYPE_NAME, id = %record.id, error = %e, "dropping record that failed to convert");
                    None
                }
            })
            .collect())
    }

    fn build_request(&self, query: &str, options: &SearchOptions) -> Result<(Endpoint, QueryRequest)> {
        let indexes = self.partition_names(&options.types)?.join(" ");

        let mut endpoint = self.endpoint.clone();
        let mut text = query.to_string();
        if let [only] = options.types.as_slice() {
            let entry = self.registry.entry(only)?;
            if let Some(server) = &entry.options().server {
                endpoint.host = server.clone();
            }
            if let Some(port) = entry.options().port {
                endpoint.port = port;
            }
            text.push_str(&format!(" @{} {}", CLASSNAME_ATTR, only));
        }

        let sort_mode = if options.sort_by.is_some() {
            SortMode::Extended
        } else {
            SortMode::Relevance
        };

        let request = QueryRequest {
            query: text,
            indexes,
            match_mode: options.match_mode.unwrap_or(self.match_mode),
            sort_mode,
            sort_by: options.sort_by.clone(),
            limit: options.limit,
            max_matches: options.max_matches.unwrap_or(self.max_matches),
        };
        Ok((endpoint, request))
    }

    fn decode(&self, raw: &RawMatch) -> Option<MatchRef> {
        let discriminator = match raw.attribute(CLASSNAME_ATTR).and_then(decode_classname) {
            Some(name) => name,
            None => {
                debug!(target: "docsync::query", doc_id = raw.doc_id, "match without readable discriminator");
                return None;
            }
        };
        let entry = match self.registry.resolve(&discriminator) {
            Some(entry) => entry,
            None => {
                debug!(target: "docsync::query", doc_id = raw.doc_id, discriminator = %discriminator, "dropping match of unknown type");
                return None;
            }
        };
        let search_id = SearchId::new(raw.doc_id)?;
        Some(MatchRef {
            type_name: entry.type_name().clone(),
            search_id,
            weight: raw.weight,
        })
    }

    fn load(&self, refs: &[MatchRef]) -> Vec<Record> {
        refs.iter()
            .filter_map(|m| match self.store.find_by_search_id(&m.type_name, m.search_id) {
                Ok(record) => Some(record),
                Err(e) if e.is_not_found() => {
                    let miss = Error::ResolutionMiss {
                        type_name: m.type_name.to_string(),
                        search_id: m.search_id.get(),
                    };
                    trace!(target: "docsync::query", "{}", miss);
                    None
                }
                Err(e) => {
                    warn!(target: "docsync::query", type_name = %m.type_name, search_id = m.search_id.get(), error = %e, "failed to load matched record");
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for QueryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResolver")
            .field("endpoint", &self.endpoint)
            .field("match_mode", &self.match_mode)
            .field("max_matches", &self.max_matches)
            .finish()
    }
}

/// Read a type discriminator: a string attribute, or a multi-value
/// attribute holding one character code per value.
pub fn decode_classname(value: &AttrValue) -> Option<String> {
    match value {
        AttrValue::String(s) if !s.is_empty() => Some(s.clone()),
        AttrValue::Multi(codes) if !codes.is_empty() => codes
            .iter()
            .map(|c| u32::try_from(*c).ok().and_then(char::from_u32))
            .collect(),
        _ => None,
    }
}
