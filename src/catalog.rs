//! The single-backend catalog facade.
//!
//! A [`Catalog`] binds one [`Index`] to an ordered list of [`Dictionary`]s
//! and two permission gates. Its identity is the catalog id alone: two
//! catalogs, or a catalog and a bare id string, are equal when the ids
//! match.
//!
//! Every operation checks the ingest or query gate first. A closed gate,
//! or metadata that no dictionary could translate, is a soft outcome
//! (`None`, `false`, an empty collection) logged at warn level. Backend
//! failures come back as [`MetacatError::Backend`] and dictionary failures
//! as [`MetacatError::Dictionary`].
//!
//! The index, dictionaries and gates can be swapped at runtime. Each swap
//! publishes a complete new configuration, so an operation in flight sees
//! either the old or the new one, never a mix.

pub mod receipt;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dictionary::{Dictionary, flatten_buckets, schemaless_bucket};
use crate::error::{MetacatError, Result};
use crate::index::{
    Capabilities, Index, IngestReceipt, IngestService, Properties, QueryService,
};
use crate::metadata::Metadata;
use crate::paging::PageInfo;
use crate::query::QueryExpression;
use crate::term::TermBucket;
use crate::transaction::{TransactionId, TransactionIdFactory};

pub use receipt::{CatalogReceipt, TransactionReceipt};

/// One published catalog configuration.
#[derive(Debug, Clone)]
struct CatalogState {
    index: Arc<dyn Index>,
    dictionaries: Vec<Arc<dyn Dictionary>>,
    restrict_query_permissions: bool,
    restrict_ingest_permissions: bool,
    capabilities: Capabilities,
}

impl CatalogState {
    fn new(index: Arc<dyn Index>) -> Self {
        let capabilities = index.capabilities();
        CatalogState {
            index,
            dictionaries: Vec::new(),
            restrict_query_permissions: false,
            restrict_ingest_permissions: false,
            capabilities,
        }
    }

    fn ingest_facet(&self) -> Option<&dyn IngestService> {
        if self.capabilities.ingest && !self.restrict_ingest_permissions {
            self.index.ingest_service()
        } else {
            None
        }
    }

    fn query_facet(&self) -> Option<&dyn QueryService> {
        if self.capabilities.query && !self.restrict_query_permissions {
            self.index.query_service()
        } else {
            None
        }
    }
}

/// Summary of a catalog's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    /// Catalog id.
    pub id: String,
    /// Facets the bound index implements.
    pub capabilities: Capabilities,
    /// Query gate.
    pub restrict_query_permissions: bool,
    /// Ingest gate.
    pub restrict_ingest_permissions: bool,
    /// Number of configured dictionaries.
    pub dictionary_count: usize,
    /// Whether queries are currently served.
    pub queriable: bool,
    /// Whether ingests are currently accepted.
    pub ingestable: bool,
}

/// One index plus its dictionaries and permission gates.
#[derive(Debug)]
pub struct Catalog {
    id: String,
    state: RwLock<Arc<CatalogState>>,
}

impl Catalog {
    /// Create a catalog over `index` with no dictionaries and open gates.
    pub fn new<S: Into<String>>(id: S, index: Arc<dyn Index>) -> Self {
        Catalog {
            id: id.into(),
            state: RwLock::new(Arc::new(CatalogState::new(index))),
        }
    }

    /// Append a dictionary.
    pub fn with_dictionary(mut self, dictionary: Arc<dyn Dictionary>) -> Self {
        Arc::make_mut(self.state.get_mut()).dictionaries.push(dictionary);
        self
    }

    /// Replace the dictionaries.
    pub fn with_dictionaries(mut self, dictionaries: Vec<Arc<dyn Dictionary>>) -> Self {
        Arc::make_mut(self.state.get_mut()).dictionaries = dictionaries;
        self
    }

    /// Set the query gate.
    pub fn with_restrict_query_permissions(mut self, restrict: bool) -> Self {
        Arc::make_mut(self.state.get_mut()).restrict_query_permissions = restrict;
        self
    }

    /// Set the ingest gate.
    pub fn with_restrict_ingest_permissions(mut self, restrict: bool) -> Self {
        Arc::make_mut(self.state.get_mut()).restrict_ingest_permissions = restrict;
        self
    }

    /// The catalog id.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn snapshot(&self) -> Arc<CatalogState> {
        Arc::clone(&self.state.read())
    }

    fn publish<F: FnOnce(&mut CatalogState)>(&self, change: F) {
        let mut guard = self.state.write();
        let mut next = CatalogState::clone(&guard);
        change(&mut next);
        *guard = Arc::new(next);
    }

    /// Bind a new index; capabilities are re-read from it.
    pub fn replace_index(&self, index: Arc<dyn Index>) {
        debug!("catalog '{}' rebinding index", self.id);
        self.publish(|state| {
            state.capabilities = index.capabilities();
            state.index = index;
        });
    }

    /// Replace the dictionaries.
    pub fn replace_dictionaries(&self, dictionaries: Vec<Arc<dyn Dictionary>>) {
        self.publish(|state| state.dictionaries = dictionaries);
    }

    /// Append a dictionary.
    pub fn add_dictionary(&self, dictionary: Arc<dyn Dictionary>) {
        self.publish(|state| state.dictionaries.push(dictionary));
    }

    /// Set the query gate.
    pub fn set_restrict_query_permissions(&self, restrict: bool) {
        self.publish(|state| state.restrict_query_permissions = restrict);
    }

    /// Set the ingest gate.
    pub fn set_restrict_ingest_permissions(&self, restrict: bool) {
        self.publish(|state| state.restrict_ingest_permissions = restrict);
    }

    /// The bound index.
    pub fn index(&self) -> Arc<dyn Index> {
        Arc::clone(&self.snapshot().index)
    }

    /// The configured dictionaries.
    pub fn dictionaries(&self) -> Vec<Arc<dyn Dictionary>> {
        self.snapshot().dictionaries.clone()
    }

    /// Query gate.
    pub fn restrict_query_permissions(&self) -> bool {
        self.snapshot().restrict_query_permissions
    }

    /// Ingest gate.
    pub fn restrict_ingest_permissions(&self) -> bool {
        self.snapshot().restrict_ingest_permissions
    }

    /// True iff the index has a query facet and the query gate is open.
    pub fn is_queriable(&self) -> bool {
        self.snapshot().query_facet().is_some()
    }

    /// True iff the index has an ingest facet and the ingest gate is open.
    pub fn is_ingestable(&self) -> bool {
        self.snapshot().ingest_facet().is_some()
    }

    /// Summary of the current configuration.
    pub fn info(&self) -> CatalogInfo {
        let state = self.snapshot();
        CatalogInfo {
            id: self.id.clone(),
            capabilities: state.capabilities,
            restrict_query_permissions: state.restrict_query_permissions,
            restrict_ingest_permissions: state.restrict_ingest_permissions,
            dictionary_count: state.dictionaries.len(),
            queriable: state.query_facet().is_some(),
            ingestable: state.ingest_facet().is_some(),
        }
    }

    /// Whether this catalog should take part in answering `query`.
    ///
    /// Catalogs without dictionaries always take part.
    pub fn is_interested(&self, query: &QueryExpression) -> bool {
        let state = self.snapshot();
        state.dictionaries.is_empty() || state.dictionaries.iter().any(|d| d.understands(query))
    }

    /// The factory of the bound index's transaction ids.
    pub fn transaction_id_factory(&self) -> Arc<dyn TransactionIdFactory> {
        self.snapshot().index.transaction_id_factory()
    }

    /// Parse a backend-local transaction id string.
    pub fn parse_transaction_id(&self, id: &str) -> Result<TransactionId> {
        self.transaction_id_factory().parse(id)
    }

    /// Look up a property of the bound index.
    pub fn property(&self, key: &str) -> Result<Option<String>> {
        self.snapshot()
            .index
            .property(key)
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// All properties of the bound index.
    pub fn properties(&self) -> Result<Properties> {
        self.snapshot()
            .index
            .properties()
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// Store `metadata` as a new record.
    ///
    /// Returns `None` when the catalog is not ingestable or no dictionary
    /// produced a bucket; the index is not called in either case.
    pub fn ingest(&self, metadata: &Metadata) -> Result<Option<CatalogReceipt>> {
        let state = self.snapshot();
        let Some(ingest) = state.ingest_facet() else {
            warn!("catalog '{}' is not ingestable; skipping ingest", self.id);
            return Ok(None);
        };

        let buckets = self.build_buckets(&state, metadata)?;
        if buckets.is_empty() {
            warn!("catalog '{}' found nothing indexable in metadata; skipping ingest", self.id);
            return Ok(None);
        }

        let receipt = ingest
            .ingest(&buckets)
            .map_err(|e| MetacatError::backend(&self.id, e))?;
        Ok(Some(CatalogReceipt::new(self.id.as_str(), receipt)))
    }

    /// Replace the record `id` with `metadata`.
    ///
    /// Returns `None` when the catalog is not ingestable, nothing is
    /// indexable, or the backend has no record `id`.
    pub fn update(&self, id: &TransactionId, metadata: &Metadata) -> Result<Option<CatalogReceipt>> {
        let state = self.snapshot();
        let Some(ingest) = state.ingest_facet() else {
            warn!("catalog '{}' is not ingestable; skipping update of {id}", self.id);
            return Ok(None);
        };

        let buckets = self.build_buckets(&state, metadata)?;
        if buckets.is_empty() {
            warn!("catalog '{}' found nothing indexable in metadata; skipping update of {id}", self.id);
            return Ok(None);
        }

        let receipt = ingest
            .update(id, &buckets)
            .map_err(|e| MetacatError::backend(&self.id, e))?;
        if receipt.is_none() {
            warn!("catalog '{}' has no record {id} to update", self.id);
        }
        Ok(receipt.map(|r| CatalogReceipt::new(self.id.as_str(), r)))
    }

    /// Delete the record `id`; `false` when nothing was deleted.
    pub fn delete(&self, id: &TransactionId) -> Result<bool> {
        let state = self.snapshot();
        let Some(ingest) = state.ingest_facet() else {
            warn!("catalog '{}' is not ingestable; skipping delete of {id}", self.id);
            return Ok(false);
        };

        ingest
            .delete(id)
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// Remove the terms `metadata` translates to from the record `id`.
    ///
    /// Returns `false` when no reduction took place.
    pub fn reduce(&self, id: &TransactionId, metadata: &Metadata) -> Result<bool> {
        let state = self.snapshot();
        let Some(ingest) = state.ingest_facet() else {
            warn!("catalog '{}' is not ingestable; skipping reduce of {id}", self.id);
            return Ok(false);
        };

        let buckets = self.build_buckets(&state, metadata)?;
        if buckets.is_empty() {
            warn!("catalog '{}' found nothing to reduce in metadata for {id}", self.id);
            return Ok(false);
        }

        ingest
            .reduce(id, &buckets)
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// All records matching `query`, in backend order.
    pub fn query(&self, query: &QueryExpression) -> Result<Vec<CatalogReceipt>> {
        let state = self.snapshot();
        let Some(service) = state.query_facet() else {
            warn!("catalog '{}' is not queriable; returning no results", self.id);
            return Ok(Vec::new());
        };

        let receipts = service
            .query(query)
            .map_err(|e| MetacatError::backend(&self.id, e))?;
        Ok(self.tag(receipts))
    }

    /// Matching records `[start, end)` of the backend order.
    pub fn query_range(
        &self,
        query: &QueryExpression,
        start: usize,
        end: usize,
    ) -> Result<Vec<CatalogReceipt>> {
        let state = self.snapshot();
        let Some(service) = state.query_facet() else {
            warn!("catalog '{}' is not queriable; returning no results", self.id);
            return Ok(Vec::new());
        };

        let receipts = service
            .query_range(query, start, end)
            .map_err(|e| MetacatError::backend(&self.id, e))?;
        Ok(self.tag(receipts))
    }

    /// Number of records matching `query`; zero when not queriable.
    pub fn size_of(&self, query: &QueryExpression) -> Result<usize> {
        let state = self.snapshot();
        let Some(service) = state.query_facet() else {
            warn!("catalog '{}' is not queriable; reporting size 0", self.id);
            return Ok(0);
        };

        service
            .size_of(query)
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// Whether the backend stores a record `id`; `false` when not queriable.
    pub fn has_transaction_id(&self, id: &TransactionId) -> Result<bool> {
        let state = self.snapshot();
        if state.query_facet().is_none() {
            return Ok(false);
        }

        state
            .index
            .has_transaction_id(id)
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// One page of the backend's stored ids; empty when not queriable.
    pub fn transaction_ids(&self, page_info: &PageInfo) -> Result<Vec<TransactionId>> {
        let state = self.snapshot();
        if state.query_facet().is_none() {
            return Ok(Vec::new());
        }

        state
            .index
            .page(page_info)
            .map_err(|e| MetacatError::backend(&self.id, e))
    }

    /// Metadata of the record `id`; empty when not queriable or unknown.
    pub fn get_metadata(&self, id: &TransactionId) -> Result<Metadata> {
        let state = self.snapshot();
        let Some(service) = state.query_facet() else {
            warn!("catalog '{}' is not queriable; returning empty metadata", self.id);
            return Ok(Metadata::new());
        };

        let buckets = service
            .buckets(id)
            .map_err(|e| MetacatError::backend(&self.id, e))?;
        self.reverse(&state, &buckets)
    }

    /// Metadata of several records; unknown ids are left out.
    pub fn get_metadata_batch(
        &self,
        ids: &[TransactionId],
    ) -> Result<HashMap<TransactionId, Metadata>> {
        let state = self.snapshot();
        let Some(service) = state.query_facet() else {
            warn!("catalog '{}' is not queriable; returning no metadata", self.id);
            return Ok(HashMap::new());
        };

        let found = service
            .buckets_for(ids)
            .map_err(|e| MetacatError::backend(&self.id, e))?;
        found
            .into_iter()
            .map(|(id, buckets)| Ok((id, self.reverse(&state, &buckets)?)))
            .collect()
    }

    fn tag(&self, receipts: Vec<IngestReceipt>) -> Vec<CatalogReceipt> {
        receipts
            .into_iter()
            .map(|r| CatalogReceipt::new(self.id.as_str(), r))
            .collect()
    }

    fn build_buckets(&self, state: &CatalogState, metadata: &Metadata) -> Result<Vec<TermBucket>> {
        if state.dictionaries.is_empty() {
            warn!(
                "catalog '{}' has no dictionaries; indexing all {} keys schema-less",
                self.id,
                metadata.len()
            );
            return Ok(vec![schemaless_bucket(metadata)]);
        }

        let mut buckets = Vec::with_capacity(state.dictionaries.len());
        for dictionary in &state.dictionaries {
            if let Some(bucket) = dictionary
                .lookup(metadata)
                .map_err(|e| self.dictionary_error(e))?
            {
                buckets.push(bucket);
            }
        }
        Ok(buckets)
    }

    fn reverse(&self, state: &CatalogState, buckets: &[TermBucket]) -> Result<Metadata> {
        if state.dictionaries.is_empty() {
            return Ok(flatten_buckets(buckets));
        }

        let mut metadata = Metadata::new();
        for bucket in buckets {
            for dictionary in &state.dictionaries {
                let partial = dictionary
                    .reverse_lookup(bucket)
                    .map_err(|e| self.dictionary_error(e))?;
                metadata.merge(&partial);
            }
        }
        Ok(metadata)
    }

    fn dictionary_error(&self, error: MetacatError) -> MetacatError {
        match error {
            MetacatError::Dictionary(_) => error,
            other => MetacatError::dictionary(format!("catalog '{}': {other}", self.id)),
        }
    }
}

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Catalog {}

impl PartialEq<str> for Catalog {
    fn eq(&self, other: &str) -> bool {
        self.id == other
    }
}

impl PartialEq<&str> for Catalog {
    fn eq(&self, other: &&str) -> bool {
        self.id == *other
    }
}

impl PartialEq<String> for Catalog {
    fn eq(&self, other: &String) -> bool {
        &self.id == other
    }
}

impl Hash for Catalog {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Borrow<str> for Catalog {
    fn borrow(&self) -> &str {
        &self.id
    }
}
