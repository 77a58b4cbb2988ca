//! Counters for service operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Point-in-time view of the service counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceMetrics {
    /// Service-level ingests.
    pub ingests: u64,

    /// Service-level updates.
    pub updates: u64,

    /// Service-level deletes.
    pub deletes: u64,

    /// Service-level reduces.
    pub reduces: u64,

    /// Federated queries, paged or not.
    pub queries: u64,

    /// Pages served.
    pub pages_served: u64,

    /// Per-catalog sub-call failures, timeouts included.
    pub catalog_failures: u64,

    /// Per-catalog sub-calls that missed their deadline.
    pub timeouts: u64,

    /// Total time spent in federated queries and page requests.
    pub query_time: Duration,

    /// Longest single federated query or page request.
    pub max_query_time: Duration,
}

/// Operations the collector counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOperation {
    Ingest,
    Update,
    Delete,
    Reduce,
}

/// Thread-safe service counters.
#[derive(Debug)]
pub struct ServiceMetricsCollector {
    ingests: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    reduces: AtomicU64,
    queries: AtomicU64,
    pages_served: AtomicU64,
    catalog_failures: AtomicU64,
    timeouts: AtomicU64,
    query_nanos: AtomicU64,
    max_query_nanos: AtomicU64,

    /// Start time for the collector.
    start_time: Instant,
}

impl ServiceMetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            ingests: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            reduces: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            pages_served: AtomicU64::new(0),
            catalog_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            query_nanos: AtomicU64::new(0),
            max_query_nanos: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count one write operation.
    pub fn record_write(&self, operation: ServiceOperation) {
        let counter = match operation {
            ServiceOperation::Ingest => &self.ingests,
            ServiceOperation::Update => &self.updates,
            ServiceOperation::Delete => &self.deletes,
            ServiceOperation::Reduce => &self.reduces,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one federated query; `page` marks a page request.
    pub fn record_query(&self, elapsed: Duration, page: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if page {
            self.pages_served.fetch_add(1, Ordering::Relaxed);
        }

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.query_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_query_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Count failed sub-calls.
    pub fn record_failures(&self, failures: u64, timeouts: u64) {
        self.catalog_failures.fetch_add(failures, Ordering::Relaxed);
        self.timeouts.fetch_add(timeouts, Ordering::Relaxed);
    }

    /// Get the current metrics snapshot.
    pub fn snapshot(&self) -> ServiceMetrics {
        ServiceMetrics {
            ingests: self.ingests.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            reduces: self.reduces.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            pages_served: self.pages_served.load(Ordering::Relaxed),
            catalog_failures: self.catalog_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            query_time: Duration::from_nanos(self.query_nanos.load(Ordering::Relaxed)),
            max_query_time: Duration::from_nanos(self.max_query_nanos.load(Ordering::Relaxed)),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        for counter in [
            &self.ingests,
            &self.updates,
            &self.deletes,
            &self.reduces,
            &self.queries,
            &self.pages_served,
            &self.catalog_failures,
            &self.timeouts,
            &self.query_nanos,
            &self.max_query_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Get the uptime of this collector.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for ServiceMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
