//! Receipts produced by catalog and service ingests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::IngestReceipt;
use crate::transaction::TransactionId;

/// A backend-local transaction id tagged with the catalog that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CatalogReceipt {
    /// Catalog that stored the record.
    pub catalog_id: String,

    /// Backend-local id of the record.
    pub transaction_id: TransactionId,

    /// When the backend stored or last updated the record.
    pub transaction_date: DateTime<Utc>,
}

impl CatalogReceipt {
    /// Tag a backend receipt with its catalog id.
    pub fn new<S: Into<String>>(catalog_id: S, receipt: IngestReceipt) -> Self {
        CatalogReceipt {
            catalog_id: catalog_id.into(),
            transaction_id: receipt.transaction_id,
            transaction_date: receipt.transaction_date,
        }
    }
}

/// A service transaction id together with the catalog receipts behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Service-wide transaction id.
    pub transaction_id: TransactionId,

    /// Catalog receipts resolved by this id.
    pub receipts: Vec<CatalogReceipt>,
}

impl TransactionReceipt {
    /// Pair a service transaction id with one catalog receipt.
    pub fn new(transaction_id: TransactionId, receipt: CatalogReceipt) -> Self {
        TransactionReceipt {
            transaction_id,
            receipts: vec![receipt],
        }
    }

    /// Ids of the catalogs behind this transaction.
    pub fn catalog_ids(&self) -> impl Iterator<Item = &str> {
        self.receipts.iter().map(|r| r.catalog_id.as_str())
    }
}
