//! Service-wide transaction ids.
//!
//! Every `(catalog id, local transaction id)` pair the service hands out is
//! known by one service transaction id. The mapping is kept in both
//! directions and lives as long as the service; nothing is evicted.

use std::sync::Arc;

use dashmap::DashMap;

use crate::catalog::CatalogReceipt;
use crate::error::{MetacatError, Result};
use crate::transaction::{TransactionId, TransactionIdFactory, UuidTransactionIdFactory};

/// A backend-local id qualified by its catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatalogTransactionId {
    /// Owning catalog.
    pub catalog_id: String,

    /// Backend-local id.
    pub transaction_id: TransactionId,
}

impl CatalogTransactionId {
    /// Qualify `transaction_id` with `catalog_id`.
    pub fn new<S: Into<String>>(catalog_id: S, transaction_id: TransactionId) -> Self {
        CatalogTransactionId {
            catalog_id: catalog_id.into(),
            transaction_id,
        }
    }
}

impl From<&CatalogReceipt> for CatalogTransactionId {
    fn from(receipt: &CatalogReceipt) -> Self {
        CatalogTransactionId::new(receipt.catalog_id.as_str(), receipt.transaction_id.clone())
    }
}

/// Bidirectional map between service and catalog transaction ids.
#[derive(Debug)]
pub struct TransactionTable {
    factory: Arc<dyn TransactionIdFactory>,
    by_local: DashMap<CatalogTransactionId, TransactionId>,
    by_global: DashMap<TransactionId, CatalogTransactionId>,
}

impl TransactionTable {
    /// Create a table minting UUID service ids.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(UuidTransactionIdFactory::new()))
    }

    /// Create a table minting service ids with `factory`.
    pub fn with_factory(factory: Arc<dyn TransactionIdFactory>) -> Self {
        TransactionTable {
            factory,
            by_local: DashMap::new(),
            by_global: DashMap::new(),
        }
    }

    /// The service id of `local`.
    ///
    /// Without `generate_new` the existing id is returned, and one is minted
    /// only if the pair was never seen; concurrent callers for the same pair
    /// always agree. With `generate_new` a fresh id is minted and becomes the
    /// pair's current id; earlier ids keep resolving to the pair.
    pub fn global_id(&self, local: &CatalogTransactionId, generate_new: bool) -> TransactionId {
        if generate_new {
            let global = self.factory.create();
            self.by_global.insert(global.clone(), local.clone());
            self.by_local.insert(local.clone(), global.clone());
            return global;
        }

        if let Some(existing) = self.by_local.get(local) {
            return existing.value().clone();
        }

        // The shard lock held by `entry` makes lookup-or-mint atomic per pair.
        self.by_local
            .entry(local.clone())
            .or_insert_with(|| {
                let global = self.factory.create();
                self.by_global.insert(global.clone(), local.clone());
                global
            })
            .value()
            .clone()
    }

    /// The pair behind a service id.
    pub fn resolve(&self, global: &TransactionId) -> Option<CatalogTransactionId> {
        self.by_global.get(global).map(|entry| entry.value().clone())
    }

    /// Like [`resolve`](Self::resolve), failing on unknown ids.
    pub fn require(&self, global: &TransactionId) -> Result<CatalogTransactionId> {
        self.resolve(global)
            .ok_or_else(|| MetacatError::unknown_transaction(global.as_str()))
    }

    /// Parse the string form of a service id.
    pub fn parse(&self, global: &str) -> Result<TransactionId> {
        self.factory.parse(global)
    }

    /// Number of service ids ever minted.
    pub fn len(&self) -> usize {
        self.by_global.len()
    }

    /// Check if no service id was minted yet.
    pub fn is_empty(&self) -> bool {
        self.by_global.is_empty()
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::transaction::SequentialTransactionIdFactory;

    fn local(catalog: &str, id: &str) -> CatalogTransactionId {
        let id = SequentialTransactionIdFactory::new().parse(id).unwrap();
        CatalogTransactionId::new(catalog, id)
    }

    #[test]
    fn test_lookup_is_idempotent() {
        let table = TransactionTable::new();
        let pair = local("cat1", "7");

        let first = table.global_id(&pair, false);
        assert_eq!(table.global_id(&pair, false), first);
        assert_eq!(table.resolve(&first), Some(pair.clone()));
        assert_eq!(table.parse(&first.to_string()).unwrap(), first);

        // Same local id in another catalog is another transaction.
        assert_ne!(table.global_id(&local("cat2", "7"), false), first);
    }

    #[test]
    fn test_generate_new_always_mints() {
        let table = TransactionTable::new();
        let pair = local("cat1", "1");

        let original = table.global_id(&pair, false);
        let fresh = table.global_id(&pair, true);
        assert_ne!(original, fresh);
        assert_eq!(table.global_id(&pair, false), fresh);
        assert_eq!(table.resolve(&original), Some(pair.clone()));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unknown_global_id() {
        let table = TransactionTable::new();
        let unknown = UuidTransactionIdFactory::new().create();
        assert!(table.resolve(&unknown).is_none());
        assert!(matches!(
            table.require(&unknown),
            Err(MetacatError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn test_concurrent_callers_agree() {
        let table = Arc::new(TransactionTable::new());
        let pair = local("cat1", "42");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                let pair = pair.clone();
                thread::spawn(move || table.global_id(&pair, false))
            })
            .collect();

        let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(table.len(), 1);
    }
}
