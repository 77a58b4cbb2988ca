//! Test doubles for exercising catalogs and the service.
//!
//! [`RecordingIndex`] wraps a [`MemoryIndex`], counts every backend call and
//! can be told to fail or stall chosen operations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use crate::index::{
    Index, IndexError, IndexResult, IngestReceipt, IngestService, MemoryIndex, Properties,
    QueryService,
};
use crate::paging::PageInfo;
use crate::query::QueryExpression;
use crate::term::TermBucket;
use crate::transaction::{TransactionId, TransactionIdFactory};

/// Backend operations a [`RecordingIndex`] observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ingest,
    Update,
    Delete,
    Reduce,
    Query,
    QueryRange,
    SizeOf,
    Buckets,
}

const OPERATIONS: usize = 8;

impl Operation {
    fn slot(self) -> usize {
        self as usize
    }
}

/// A [`MemoryIndex`] that records calls and injects failures.
#[derive(Debug)]
pub struct RecordingIndex {
    inner: MemoryIndex,
    calls: [AtomicUsize; OPERATIONS],
    failing: RwLock<HashSet<Operation>>,
    delays: RwLock<HashMap<Operation, Duration>>,
}

impl RecordingIndex {
    /// Wrap `inner`.
    pub fn new(inner: MemoryIndex) -> Self {
        RecordingIndex {
            inner,
            calls: Default::default(),
            failing: RwLock::new(HashSet::new()),
            delays: RwLock::new(HashMap::new()),
        }
    }

    /// Wrap a fresh sequential-id [`MemoryIndex`].
    pub fn sequential() -> Self {
        Self::new(MemoryIndex::new().with_sequential_ids())
    }

    /// Number of times `operation` reached the backend.
    pub fn calls(&self, operation: Operation) -> usize {
        self.calls[operation.slot()].load(Ordering::SeqCst)
    }

    /// Total number of backend calls.
    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| c.load(Ordering::SeqCst)).sum()
    }

    /// Make `operation` fail with an internal error.
    pub fn fail(&self, operation: Operation) {
        self.failing.write().insert(operation);
    }

    /// Stop failing `operation`.
    pub fn recover(&self, operation: Operation) {
        self.failing.write().remove(&operation);
    }

    /// Sleep for `delay` before serving `operation`.
    pub fn stall(&self, operation: Operation, delay: Duration) {
        self.delays.write().insert(operation, delay);
    }

    /// The wrapped index.
    pub fn inner(&self) -> &MemoryIndex {
        &self.inner
    }

    fn enter(&self, operation: Operation) -> IndexResult<()> {
        self.calls[operation.slot()].fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.read().get(&operation).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.failing.read().contains(&operation) {
            return Err(IndexError::internal(format!("injected {operation:?} failure")));
        }
        Ok(())
    }
}

impl Index for RecordingIndex {
    fn transaction_id_factory(&self) -> Arc<dyn TransactionIdFactory> {
        self.inner.transaction_id_factory()
    }

    fn property(&self, key: &str) -> IndexResult<Option<String>> {
        self.inner.property(key)
    }

    fn properties(&self) -> IndexResult<Properties> {
        self.inner.properties()
    }

    fn has_transaction_id(&self, id: &TransactionId) -> IndexResult<bool> {
        self.inner.has_transaction_id(id)
    }

    fn page(&self, page_info: &PageInfo) -> IndexResult<Vec<TransactionId>> {
        self.inner.page(page_info)
    }

    fn ingest_service(&self) -> Option<&dyn IngestService> {
        self.inner.ingest_service().map(|_| self as &dyn IngestService)
    }

    fn query_service(&self) -> Option<&dyn QueryService> {
        self.inner.query_service().map(|_| self as &dyn QueryService)
    }
}

impl IngestService for RecordingIndex {
    fn ingest(&self, buckets: &[TermBucket]) -> IndexResult<IngestReceipt> {
        self.enter(Operation::Ingest)?;
        self.inner.ingest(buckets)
    }

    fn update(
        &self,
        id: &TransactionId,
        buckets: &[TermBucket],
    ) -> IndexResult<Option<IngestReceipt>> {
        self.enter(Operation::Update)?;
        self.inner.update(id, buckets)
    }

    fn delete(&self, id: &TransactionId) -> IndexResult<bool> {
        self.enter(Operation::Delete)?;
        self.inner.delete(id)
    }

    fn reduce(&self, id: &TransactionId, buckets: &[TermBucket]) -> IndexResult<bool> {
        self.enter(Operation::Reduce)?;
        self.inner.reduce(id, buckets)
    }
}

impl QueryService for RecordingIndex {
    fn query(&self, query: &QueryExpression) -> IndexResult<Vec<IngestReceipt>> {
        self.enter(Operation::Query)?;
        self.inner.query(query)
    }

    fn query_range(
        &self,
        query: &QueryExpression,
        start: usize,
        end: usize,
    ) -> IndexResult<Vec<IngestReceipt>> {
        self.enter(Operation::QueryRange)?;
        self.inner.query_range(query, start, end)
    }

    fn size_of(&self, query: &QueryExpression) -> IndexResult<usize> {
        self.enter(Operation::SizeOf)?;
        self.inner.size_of(query)
    }

    fn buckets(&self, id: &TransactionId) -> IndexResult<Vec<TermBucket>> {
        self.enter(Operation::Buckets)?;
        self.inner.buckets(id)
    }
}
