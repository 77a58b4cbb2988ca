//! Federation over many catalogs.
//!
//! [`CatalogService`] keeps a registry of [`Catalog`](crate::catalog::Catalog)s,
//! mints service-wide transaction ids for the records its catalogs store,
//! fans writes and queries out to the catalogs concurrently, and serves
//! pages over the concatenated results of several catalogs.

pub mod config;
pub mod engine;
pub mod fan_out;
pub mod metrics;
pub mod outcome;
pub mod pagination;
pub mod registry;
pub mod transaction_table;

pub use config::{CatalogConfig, ComponentConfig, ServiceConfig};
pub use engine::{
    CATALOG_IDS_KEY, CATALOG_SERVICE_TRANSACTION_ID_KEY, CatalogService, ENABLE_UPDATE_KEY,
    RecordMetadata,
};
pub use metrics::ServiceMetrics;
pub use outcome::{CatalogFailure, FederatedResult, Outcome};
pub use pagination::{Page, QueryPager};
pub use transaction_table::CatalogTransactionId;
