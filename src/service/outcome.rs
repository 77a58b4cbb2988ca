//! Aggregate outcomes of fan-out operations.

use std::fmt;
use std::sync::Arc;

use crate::error::{MetacatError, Result};

/// How a fan-out over several catalogs went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every participating catalog succeeded, or none participated.
    Complete,

    /// Some catalogs succeeded and some failed.
    Partial,

    /// Every participating catalog failed.
    Failed,
}

impl Outcome {
    /// Derive the outcome from success and failure counts.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Outcome::Complete,
            (0, _) => Outcome::Failed,
            _ => Outcome::Partial,
        }
    }
}

/// One catalog's failure inside a fan-out.
#[derive(Debug, Clone)]
pub struct CatalogFailure {
    /// Catalog that failed.
    pub catalog_id: String,

    /// What went wrong.
    pub error: Arc<MetacatError>,
}

impl CatalogFailure {
    /// Record `error` against `catalog_id`.
    pub fn new<S: Into<String>>(catalog_id: S, error: MetacatError) -> Self {
        CatalogFailure {
            catalog_id: catalog_id.into(),
            error: Arc::new(error),
        }
    }

    /// Whether the sub-call ran past its deadline.
    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

impl fmt::Display for CatalogFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "catalog '{}': {}", self.catalog_id, self.error)
    }
}

/// Turn `failures` into a [`MetacatError::Federated`], if there are any.
pub(crate) fn failures_to_error(failures: &[CatalogFailure]) -> Result<()> {
    match failures.first() {
        None => Ok(()),
        Some(first) => Err(MetacatError::Federated {
            catalog_ids: failures.iter().map(|f| f.catalog_id.clone()).collect(),
            message: first.error.to_string(),
        }),
    }
}

/// Per-catalog values of a fan-out plus the catalogs that failed.
///
/// Values are kept in catalog order.
#[derive(Debug, Clone)]
pub struct FederatedResult<T> {
    values: Vec<(String, T)>,
    failures: Vec<CatalogFailure>,
}

impl<T> FederatedResult<T> {
    /// Assemble a result.
    pub fn new(values: Vec<(String, T)>, failures: Vec<CatalogFailure>) -> Self {
        FederatedResult { values, failures }
    }

    /// A result with no participants.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Overall outcome.
    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.values.len(), self.failures.len())
    }

    /// True when no catalog failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Values of the catalogs that succeeded, tagged with their catalog ids.
    pub fn values(&self) -> &[(String, T)] {
        &self.values
    }

    /// Catalogs that failed.
    pub fn failures(&self) -> &[CatalogFailure] {
        &self.failures
    }

    /// The value one catalog produced.
    pub fn value_of(&self, catalog_id: &str) -> Option<&T> {
        self.values
            .iter()
            .find(|(id, _)| id == catalog_id)
            .map(|(_, value)| value)
    }

    /// The failure recorded against one catalog.
    pub fn failure_of(&self, catalog_id: &str) -> Option<&CatalogFailure> {
        self.failures.iter().find(|f| f.catalog_id == catalog_id)
    }

    /// Split into values and failures.
    pub fn into_parts(self) -> (Vec<(String, T)>, Vec<CatalogFailure>) {
        (self.values, self.failures)
    }

    /// Map every value, keeping failures.
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> FederatedResult<U> {
        FederatedResult {
            values: self.values.into_iter().map(|(id, v)| (id, f(v))).collect(),
            failures: self.failures,
        }
    }

    /// Fail with [`MetacatError::Federated`] if `strict` and any catalog failed.
    pub fn check(self, strict: bool) -> Result<Self> {
        if strict {
            failures_to_error(&self.failures)?;
        }
        Ok(self)
    }
}

impl<T> FederatedResult<Option<T>> {
    /// Values of the catalogs that produced one, in catalog order.
    pub fn present(&self) -> impl Iterator<Item = &T> {
        self.values.iter().filter_map(|(_, value)| value.as_ref())
    }
}

impl<T> FederatedResult<Vec<T>> {
    /// Concatenate every catalog's values in catalog order.
    pub fn flatten(self) -> (Vec<T>, Vec<CatalogFailure>) {
        let values = self.values.into_iter().flat_map(|(_, v)| v).collect();
        (values, self.failures)
    }
}
