//! The pluggable backend contract.
//!
//! An [`Index`] always exposes its transaction id factory, a property store,
//! id membership and a listing of stored ids. Ingestion and querying are
//! optional facets: an index opts into them by returning `Some` from
//! [`Index::ingest_service`] and [`Index::query_service`]. A
//! [`Catalog`](crate::catalog::Catalog) reads the resulting
//! [`Capabilities`] once whenever it binds an index.
//!
//! Backends report every failure as an [`IndexError`]; nothing
//! backend-specific crosses the catalog boundary.

pub mod memory;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paging::PageInfo;
use crate::query::QueryExpression;
use crate::term::TermBucket;
use crate::transaction::{TransactionId, TransactionIdFactory};

pub use memory::MemoryIndex;

/// String properties of a backend or dictionary.
pub type Properties = BTreeMap<String, String>;

/// Failure reported by a backend.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Backend I/O failure.
    #[error("Index I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend could not parse stored or supplied data.
    #[error("Index parse error: {0}")]
    Parse(String),

    /// Backend-internal failure.
    #[error("Index internal error: {0}")]
    Internal(String),

    /// Any other backend failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    /// Create a new parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        IndexError::Parse(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        IndexError::Internal(msg.into())
    }
}

/// Result type alias for backend operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Receipt a backend returns for a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestReceipt {
    /// Backend-local id of the record.
    pub transaction_id: TransactionId,

    /// When the record was stored or last updated.
    pub transaction_date: DateTime<Utc>,
}

impl IngestReceipt {
    /// Create a receipt stamped with the current time.
    pub fn now(transaction_id: TransactionId) -> Self {
        IngestReceipt {
            transaction_id,
            transaction_date: Utc::now(),
        }
    }
}

/// Which optional facets an index implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// The index implements [`IngestService`].
    pub ingest: bool,

    /// The index implements [`QueryService`].
    pub query: bool,
}

/// A pluggable storage backend.
pub trait Index: Send + Sync + fmt::Debug {
    /// Factory that creates and parses this backend's transaction ids.
    fn transaction_id_factory(&self) -> Arc<dyn TransactionIdFactory>;

    /// Look up a backend property.
    fn property(&self, key: &str) -> IndexResult<Option<String>>;

    /// All backend properties.
    fn properties(&self) -> IndexResult<Properties>;

    /// Check if the backend stores a record with this id.
    fn has_transaction_id(&self, id: &TransactionId) -> IndexResult<bool>;

    /// One page of stored ids, in the backend's own order.
    fn page(&self, page_info: &PageInfo) -> IndexResult<Vec<TransactionId>>;

    /// The ingest facet, if implemented.
    fn ingest_service(&self) -> Option<&dyn IngestService> {
        None
    }

    /// The query facet, if implemented.
    fn query_service(&self) -> Option<&dyn QueryService> {
        None
    }

    /// Capability record derived from the facets.
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ingest: self.ingest_service().is_some(),
            query: self.query_service().is_some(),
        }
    }
}

/// Write facet of an index.
pub trait IngestService: Send + Sync {
    /// Store a new record.
    fn ingest(&self, buckets: &[TermBucket]) -> IndexResult<IngestReceipt>;

    /// Replace a stored record; `None` when no record has this id.
    fn update(
        &self,
        id: &TransactionId,
        buckets: &[TermBucket],
    ) -> IndexResult<Option<IngestReceipt>>;

    /// Delete a stored record; `false` when nothing was deleted.
    fn delete(&self, id: &TransactionId) -> IndexResult<bool>;

    /// Remove the given terms from a stored record; `false` when nothing
    /// was removed.
    fn reduce(&self, id: &TransactionId, buckets: &[TermBucket]) -> IndexResult<bool>;
}

/// Read facet of an index.
pub trait QueryService: Send + Sync {
    /// All matching records, in backend order.
    fn query(&self, query: &QueryExpression) -> IndexResult<Vec<IngestReceipt>>;

    /// Matching records `[start, end)` of the backend order.
    fn query_range(
        &self,
        query: &QueryExpression,
        start: usize,
        end: usize,
    ) -> IndexResult<Vec<IngestReceipt>>;

    /// Number of matching records, without materialising them.
    fn size_of(&self, query: &QueryExpression) -> IndexResult<usize>;

    /// Buckets of one stored record; empty when the id is unknown.
    fn buckets(&self, id: &TransactionId) -> IndexResult<Vec<TermBucket>>;

    /// Buckets of several stored records; unknown ids are left out.
    fn buckets_for(
        &self,
        ids: &[TransactionId],
    ) -> IndexResult<HashMap<TransactionId, Vec<TermBucket>>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            let buckets = self.buckets(id)?;
            if !buckets.is_empty() {
                found.insert(id.clone(), buckets);
            }
        }
        Ok(found)
    }
}
