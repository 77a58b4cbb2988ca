//! In-memory index backend.
//!
//! Records keep their ingestion order, which is the order queries return
//! them in. Either facet can be switched off to model read-only or
//! write-only backends. The whole store can be saved to and restored from a
//! JSON snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::index::{
    Index, IndexError, IndexResult, IngestReceipt, IngestService, Properties, QueryService,
};
use crate::paging::PageInfo;
use crate::query::QueryExpression;
use crate::term::{Term, TermBucket};
use crate::transaction::{
    SequentialTransactionIdFactory, TransactionId, TransactionIdFactory,
    UuidTransactionIdFactory,
};

/// Property that switches the ingest facet on or off.
pub const INGEST_PROPERTY: &str = "ingest";
/// Property that switches the query facet on or off.
pub const QUERY_PROPERTY: &str = "query";
/// Property naming the id scheme, `uuid` (default) or `sequential`.
pub const ID_SCHEME_PROPERTY: &str = "id_scheme";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    transaction_id: TransactionId,
    transaction_date: DateTime<Utc>,
    buckets: Vec<TermBucket>,
}

impl StoredRecord {
    fn receipt(&self) -> IngestReceipt {
        IngestReceipt {
            transaction_id: self.transaction_id.clone(),
            transaction_date: self.transaction_date,
        }
    }

    fn values(&self, field: &str) -> Option<&[String]> {
        self.buckets
            .iter()
            .find_map(|bucket| bucket.term(field))
            .map(Term::values)
    }

    fn matches(&self, query: &QueryExpression) -> bool {
        query.matches(&|field: &str| self.values(field))
    }
}

#[derive(Debug, Default)]
struct Store {
    order: Vec<TransactionId>,
    records: HashMap<TransactionId, StoredRecord>,
}

impl Store {
    fn iter(&self) -> impl Iterator<Item = &StoredRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }
}

/// Thread-safe in-memory backend.
#[derive(Debug)]
pub struct MemoryIndex {
    store: RwLock<Store>,
    id_factory: Arc<dyn TransactionIdFactory>,
    properties: Properties,
    ingest_enabled: bool,
    query_enabled: bool,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Create an empty index with both facets and UUID ids.
    pub fn new() -> Self {
        MemoryIndex {
            store: RwLock::new(Store::default()),
            id_factory: Arc::new(UuidTransactionIdFactory::new()),
            properties: Properties::new(),
            ingest_enabled: true,
            query_enabled: true,
        }
    }

    /// Create an index from factory properties.
    ///
    /// Recognised keys are [`INGEST_PROPERTY`], [`QUERY_PROPERTY`] and
    /// [`ID_SCHEME_PROPERTY`]; every property stays readable through
    /// [`Index::property`].
    pub fn from_properties(properties: &Properties) -> IndexResult<Self> {
        let flag = |key: &str| -> IndexResult<bool> {
            match properties.get(key).map(|v| v.trim().to_ascii_lowercase()) {
                None => Ok(true),
                Some(v) if v == "true" => Ok(true),
                Some(v) if v == "false" => Ok(false),
                Some(v) => Err(IndexError::parse(format!(
                    "property '{key}' must be true or false, got '{v}'"
                ))),
            }
        };

        let id_factory: Arc<dyn TransactionIdFactory> =
            match properties.get(ID_SCHEME_PROPERTY).map(String::as_str) {
                None | Some("uuid") => Arc::new(UuidTransactionIdFactory::new()),
                Some("sequential") => Arc::new(SequentialTransactionIdFactory::new()),
                Some(other) => {
                    return Err(IndexError::parse(format!("unknown id scheme '{other}'")));
                }
            };

        Ok(MemoryIndex {
            store: RwLock::new(Store::default()),
            id_factory,
            properties: properties.clone(),
            ingest_enabled: flag(INGEST_PROPERTY)?,
            query_enabled: flag(QUERY_PROPERTY)?,
        })
    }

    /// Use sequential ids instead of UUIDs.
    pub fn with_sequential_ids(mut self) -> Self {
        self.id_factory = Arc::new(SequentialTransactionIdFactory::new());
        self
    }

    /// Switch the ingest facet on or off.
    pub fn with_ingest(mut self, enabled: bool) -> Self {
        self.ingest_enabled = enabled;
        self
    }

    /// Switch the query facet on or off.
    pub fn with_query(mut self, enabled: bool) -> Self {
        self.query_enabled = enabled;
        self
    }

    /// Set a property.
    pub fn with_property<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.store.read().order.len()
    }

    /// Check if the index stores no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize every stored record to JSON.
    pub fn snapshot(&self) -> IndexResult<Vec<u8>> {
        let store = self.store.read();
        let records: Vec<&StoredRecord> = store.iter().collect();
        serde_json::to_vec(&records).map_err(|e| IndexError::Other(e.into()))
    }

    /// Replace the stored records with those of a snapshot.
    ///
    /// Sequential id factories are advanced past the highest restored id.
    pub fn restore(&mut self, bytes: &[u8]) -> IndexResult<()> {
        let records: Vec<StoredRecord> = if bytes.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(bytes).map_err(|e| IndexError::parse(e.to_string()))?
        };

        if self.id_factory.scheme() == "sequential" {
            let last = records
                .iter()
                .filter_map(|r| r.transaction_id.as_str().parse::<u64>().ok())
                .max()
                .unwrap_or(0);
            self.id_factory = Arc::new(SequentialTransactionIdFactory::starting_after(last));
        }

        let mut store = Store::default();
        for record in records {
            store.order.push(record.transaction_id.clone());
            store.records.insert(record.transaction_id.clone(), record);
        }
        *self.store.write() = store;
        Ok(())
    }
}

impl Index for MemoryIndex {
    fn transaction_id_factory(&self) -> Arc<dyn TransactionIdFactory> {
        Arc::clone(&self.id_factory)
    }

    fn property(&self, key: &str) -> IndexResult<Option<String>> {
        Ok(self.properties.get(key).cloned())
    }

    fn properties(&self) -> IndexResult<Properties> {
        Ok(self.properties.clone())
    }

    fn has_transaction_id(&self, id: &TransactionId) -> IndexResult<bool> {
        Ok(self.store.read().records.contains_key(id))
    }

    fn page(&self, page_info: &PageInfo) -> IndexResult<Vec<TransactionId>> {
        let store = self.store.read();
        let total = store.order.len();
        let (start, end) = page_info.bounds(page_info.resolve(total), total);
        Ok(store.order[start..end].to_vec())
    }

    fn ingest_service(&self) -> Option<&dyn IngestService> {
        if self.ingest_enabled { Some(self) } else { None }
    }

    fn query_service(&self) -> Option<&dyn QueryService> {
        if self.query_enabled { Some(self) } else { None }
    }
}

impl IngestService for MemoryIndex {
    fn ingest(&self, buckets: &[TermBucket]) -> IndexResult<IngestReceipt> {
        let record = StoredRecord {
            transaction_id: self.id_factory.create(),
            transaction_date: Utc::now(),
            buckets: buckets.to_vec(),
        };
        let receipt = record.receipt();

        let mut store = self.store.write();
        if store.records.contains_key(&record.transaction_id) {
            return Err(IndexError::internal(format!(
                "transaction id {} already in use",
                record.transaction_id
            )));
        }
        store.order.push(record.transaction_id.clone());
        store.records.insert(record.transaction_id.clone(), record);
        Ok(receipt)
    }

    fn update(
        &self,
        id: &TransactionId,
        buckets: &[TermBucket],
    ) -> IndexResult<Option<IngestReceipt>> {
        let mut store = self.store.write();
        let Some(record) = store.records.get_mut(id) else {
            return Ok(None);
        };
        record.buckets = buckets.to_vec();
        record.transaction_date = Utc::now();
        Ok(Some(record.receipt()))
    }

    fn delete(&self, id: &TransactionId) -> IndexResult<bool> {
        let mut store = self.store.write();
        if store.records.remove(id).is_none() {
            return Ok(false);
        }
        store.order.retain(|stored| stored != id);
        Ok(true)
    }

    fn reduce(&self, id: &TransactionId, buckets: &[TermBucket]) -> IndexResult<bool> {
        let mut store = self.store.write();
        let Some(record) = store.records.get_mut(id) else {
            return Ok(false);
        };

        let mut changed = false;
        for removal in buckets {
            let Some(stored) = record
                .buckets
                .iter_mut()
                .find(|bucket| bucket.name() == removal.name())
            else {
                continue;
            };

            let mut reduced = TermBucket::new(stored.name());
            for term in stored.terms() {
                let remaining: Vec<&String> = match removal.term(term.name()) {
                    // A removal term without values drops the whole term.
                    Some(r) if r.values().is_empty() => Vec::new(),
                    Some(r) => term
                        .values()
                        .iter()
                        .filter(|v| !r.values().contains(*v))
                        .collect(),
                    None => term.values().iter().collect(),
                };
                changed |= remaining.len() != term.values().len();
                if !remaining.is_empty() {
                    reduced.add_term(Term::new(term.name(), remaining.into_iter().cloned()));
                }
            }
            *stored = reduced;
        }

        if changed {
            record.transaction_date = Utc::now();
        }
        Ok(changed)
    }
}

impl QueryService for MemoryIndex {
    fn query(&self, query: &QueryExpression) -> IndexResult<Vec<IngestReceipt>> {
        let store = self.store.read();
        Ok(store
            .iter()
            .filter(|record| record.matches(query))
            .map(StoredRecord::receipt)
            .collect())
    }

    fn query_range(
        &self,
        query: &QueryExpression,
        start: usize,
        end: usize,
    ) -> IndexResult<Vec<IngestReceipt>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let store = self.store.read();
        Ok(store
            .iter()
            .filter(|record| record.matches(query))
            .skip(start)
            .take(end - start)
            .map(StoredRecord::receipt)
            .collect())
    }

    fn size_of(&self, query: &QueryExpression) -> IndexResult<usize> {
        let store = self.store.read();
        Ok(store.iter().filter(|record| record.matches(query)).count())
    }

    fn buckets(&self, id: &TransactionId) -> IndexResult<Vec<TermBucket>> {
        Ok(self
            .store
            .read()
            .records
            .get(id)
            .map(|record| record.buckets.clone())
            .unwrap_or_default())
    }
}
