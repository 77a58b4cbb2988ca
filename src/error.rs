//! Error types for the metacat library.
//!
//! All fallible operations return [`MetacatError`] through the crate-wide
//! [`Result`] alias. Backends never surface their own error types: they
//! report through [`IndexError`](crate::index::IndexError), which a
//! [`Catalog`](crate::catalog::Catalog) wraps into [`MetacatError::Backend`]
//! together with the id of the catalog that failed.
//!
//! Conditions the federation layer treats as soft outcomes (an operation
//! against a catalog that is not ingestable or queriable, metadata that no
//! dictionary could translate) are not errors at all; they surface as
//! `None`, `false` or empty collections.
//!
//! # Examples
//!
//! ```
//! use metacat::error::{MetacatError, Result};
//!
//! fn lookup(id: &str) -> Result<()> {
//!     Err(MetacatError::unknown_catalog(id))
//! }
//!
//! assert_eq!(
//!     lookup("cat9").unwrap_err().to_string(),
//!     "Unknown catalog: cat9"
//! );
//! ```

use std::io;

use thiserror::Error;

use crate::index::IndexError;

/// The main error type for metacat operations.
#[derive(Error, Debug)]
pub enum MetacatError {
    /// A catalog's index failed (I/O, parsing, backend-internal).
    #[error("Backend error in catalog '{catalog_id}': {message}")]
    Backend {
        /// Catalog whose index failed.
        catalog_id: String,
        /// Original backend message.
        message: String,
        /// Original backend failure.
        #[source]
        source: IndexError,
    },

    /// A dictionary failed to translate between metadata and term buckets.
    #[error("Dictionary error: {0}")]
    Dictionary(String),

    /// A catalog id that is not present in the registry.
    #[error("Unknown catalog: {0}")]
    UnknownCatalog(String),

    /// A catalog id that is already present in the registry.
    #[error("Duplicate catalog: {0}")]
    DuplicateCatalog(String),

    /// A service transaction id that was never minted.
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    /// A transaction id string that a factory refused to parse.
    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(String),

    /// No factory registered under the requested component type name.
    #[error("Unknown component type: {0}")]
    UnknownComponentType(String),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fan-out in which some catalogs failed, under a policy that treats
    /// any catalog failure as failure of the whole operation.
    #[error("Federated operation failed in catalogs {catalog_ids:?}: {message}")]
    Federated {
        /// Catalogs that failed, in catalog order.
        catalog_ids: Vec<String>,
        /// Message of the first failure.
        message: String,
    },

    /// A fan-out sub-call did not finish in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O errors outside of any backend (config files, CLI input).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal invariant violations.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with [`MetacatError`].
pub type Result<T> = std::result::Result<T, MetacatError>;

impl MetacatError {
    /// Wrap a backend failure with the id of the catalog it came from.
    pub fn backend<S: Into<String>>(catalog_id: S, source: IndexError) -> Self {
        MetacatError::Backend {
            catalog_id: catalog_id.into(),
            message: source.to_string(),
            source,
        }
    }

    /// Create a new dictionary error.
    pub fn dictionary<S: Into<String>>(msg: S) -> Self {
        MetacatError::Dictionary(msg.into())
    }

    /// Create a new unknown catalog error.
    pub fn unknown_catalog<S: Into<String>>(catalog_id: S) -> Self {
        MetacatError::UnknownCatalog(catalog_id.into())
    }

    /// Create a new unknown transaction error.
    pub fn unknown_transaction<S: Into<String>>(id: S) -> Self {
        MetacatError::UnknownTransaction(id.into())
    }

    /// Create a new invalid transaction id error.
    pub fn invalid_transaction_id<S: Into<String>>(msg: S) -> Self {
        MetacatError::InvalidTransactionId(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        MetacatError::InvalidArgument(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MetacatError::Config(msg.into())
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        MetacatError::Timeout(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        MetacatError::Internal(msg.into())
    }

    /// Id of the catalog a backend error came from, if any.
    pub fn catalog_id(&self) -> Option<&str> {
        match self {
            MetacatError::Backend { catalog_id, .. } => Some(catalog_id),
            _ => None,
        }
    }

    /// Whether this error was produced by a fan-out timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MetacatError::Timeout(_))
    }
}
