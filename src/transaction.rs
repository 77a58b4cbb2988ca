//! Transaction identifiers and their factories.
//!
//! A [`TransactionId`] is an opaque identifier held in its canonical string
//! form. Only a [`TransactionIdFactory`] creates ids, either fresh or by
//! parsing a previously observed string; factories canonicalise on parse so
//! that `factory.parse(&id.to_string())? == id` for every id they created.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MetacatError, Result};

/// An opaque record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates and parses transaction ids for one id scheme.
pub trait TransactionIdFactory: Send + Sync + fmt::Debug {
    /// Create a fresh, previously unseen id.
    fn create(&self) -> TransactionId;

    /// Parse the string form of an id created by this scheme.
    fn parse(&self, id: &str) -> Result<TransactionId>;

    /// Name of the id scheme.
    fn scheme(&self) -> &'static str;
}

/// Random v4 UUID ids, rendered hyphenated lowercase.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTransactionIdFactory;

impl UuidTransactionIdFactory {
    /// Create a new UUID id factory.
    pub fn new() -> Self {
        UuidTransactionIdFactory
    }
}

impl TransactionIdFactory for UuidTransactionIdFactory {
    fn create(&self) -> TransactionId {
        TransactionId(Uuid::new_v4().hyphenated().to_string())
    }

    fn parse(&self, id: &str) -> Result<TransactionId> {
        let uuid = Uuid::parse_str(id.trim()).map_err(|e| {
            MetacatError::invalid_transaction_id(format!("'{id}' is not a UUID: {e}"))
        })?;
        Ok(TransactionId(uuid.hyphenated().to_string()))
    }

    fn scheme(&self) -> &'static str {
        "uuid"
    }
}

/// Monotonic decimal ids starting at 1.
#[derive(Debug, Default)]
pub struct SequentialTransactionIdFactory {
    last: AtomicU64,
}

impl SequentialTransactionIdFactory {
    /// Create a new sequential id factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory whose next id is `last + 1`.
    pub fn starting_after(last: u64) -> Self {
        SequentialTransactionIdFactory {
            last: AtomicU64::new(last),
        }
    }
}

impl TransactionIdFactory for SequentialTransactionIdFactory {
    fn create(&self) -> TransactionId {
        let next = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        TransactionId(next.to_string())
    }

    fn parse(&self, id: &str) -> Result<TransactionId> {
        let value: u64 = id.trim().parse().map_err(|e| {
            MetacatError::invalid_transaction_id(format!("'{id}' is not a sequence number: {e}"))
        })?;
        Ok(TransactionId(value.to_string()))
    }

    fn scheme(&self) -> &'static str {
        "sequential"
    }
}
