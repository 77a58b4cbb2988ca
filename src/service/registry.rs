//! Concurrent catalog registry.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::catalog::Catalog;
use crate::error::{MetacatError, Result};

/// Catalogs keyed by id.
///
/// Locking is per key, so traffic on one catalog never waits for changes to
/// another. Listing the catalogs is not a snapshot: a catalog added or
/// removed during a listing may or may not appear in it.
#[derive(Debug, Default)]
pub struct CatalogRegistry {
    catalogs: DashMap<String, Arc<Catalog>>,
}

impl CatalogRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a catalog under its id.
    pub fn add(&self, catalog: Arc<Catalog>) -> Result<()> {
        match self.catalogs.entry(catalog.id().to_string()) {
            Entry::Occupied(entry) => Err(MetacatError::DuplicateCatalog(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(catalog);
                Ok(())
            }
        }
    }

    /// Register a catalog, replacing any catalog with the same id.
    pub fn replace(&self, catalog: Arc<Catalog>) -> Option<Arc<Catalog>> {
        self.catalogs.insert(catalog.id().to_string(), catalog)
    }

    /// Remove a catalog.
    pub fn remove(&self, id: &str) -> Result<Arc<Catalog>> {
        self.catalogs
            .remove(id)
            .map(|(_, catalog)| catalog)
            .ok_or_else(|| MetacatError::unknown_catalog(id))
    }

    /// Look up a catalog.
    pub fn get(&self, id: &str) -> Result<Arc<Catalog>> {
        self.catalogs
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MetacatError::unknown_catalog(id))
    }

    /// Whether a catalog is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.catalogs.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.catalogs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Every catalog, sorted by id.
    pub fn all(&self) -> Vec<Arc<Catalog>> {
        let mut catalogs: Vec<Arc<Catalog>> =
            self.catalogs.iter().map(|e| Arc::clone(e.value())).collect();
        catalogs.sort_by(|a, b| a.id().cmp(b.id()));
        catalogs
    }

    /// The catalogs named in `ids`, or all of them, sorted by id.
    ///
    /// Fails on the first id that is not registered.
    pub fn select(&self, ids: Option<&[String]>) -> Result<Vec<Arc<Catalog>>> {
        let Some(ids) = ids else {
            return Ok(self.all());
        };

        let mut catalogs = Vec::with_capacity(ids.len());
        for id in ids {
            let catalog = self.get(id)?;
            if !catalogs.iter().any(|c: &Arc<Catalog>| c.id() == catalog.id()) {
                catalogs.push(catalog);
            }
        }
        catalogs.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(catalogs)
    }

    /// Number of registered catalogs.
    pub fn len(&self) -> usize {
        self.catalogs.len()
    }

    /// Check if no catalog is registered.
    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }
}
