//! # metacat
//!
//! A federated metadata catalog over pluggable index backends.
//!
//! ## Features
//!
//! - Records are free-form multi-valued [`Metadata`](metadata::Metadata)
//! - Dictionaries translate metadata into backend terms and back
//! - A [`Catalog`](catalog::Catalog) binds one index with its dictionaries
//! - A [`CatalogService`](service::CatalogService) federates many catalogs
//!   behind one transaction id namespace, with concurrent fan-out and
//!   pagination across catalogs

pub mod catalog;
pub mod cli;
pub mod dictionary;
pub mod error;
pub mod factory;
pub mod index;
pub mod metadata;
pub mod paging;
pub mod query;
pub mod service;
pub mod term;
pub mod testing;
pub mod transaction;

pub mod prelude {
    pub use crate::catalog::{Catalog, CatalogReceipt, TransactionReceipt};
    pub use crate::dictionary::{Dictionary, KeyMapDictionary};
    pub use crate::error::{MetacatError, Result};
    pub use crate::index::{Index, IngestService, MemoryIndex, QueryService};
    pub use crate::metadata::Metadata;
    pub use crate::paging::PageInfo;
    pub use crate::query::{QueryExpression, QueryParser};
    pub use crate::service::{CatalogService, FederatedResult, Page, QueryPager, ServiceConfig};
    pub use crate::term::{Term, TermBucket};
    pub use crate::transaction::TransactionId;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
