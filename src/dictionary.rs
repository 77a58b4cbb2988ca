//! Translation between metadata and term buckets.
//!
//! A [`Dictionary`] turns a [`Metadata`] record into the [`TermBucket`] a
//! backend indexes, turns stored buckets back into metadata, and tells the
//! federation layer whether it understands a query. Catalogs without any
//! dictionary fall back to the schema-less helpers in this module.

pub mod key_map;

use std::fmt;

use crate::error::Result;
use crate::metadata::Metadata;
use crate::query::QueryExpression;
use crate::term::{Term, TermBucket};

pub use key_map::KeyMapDictionary;

/// Bucket name used when no dictionary is configured.
pub const DEFAULT_BUCKET_NAME: &str = "default";

/// Translator between metadata and term buckets.
pub trait Dictionary: Send + Sync + fmt::Debug {
    /// Build the bucket this dictionary contributes for `metadata`.
    ///
    /// `None` means the record holds nothing this dictionary cares about,
    /// which is different from contributing an empty bucket.
    fn lookup(&self, metadata: &Metadata) -> Result<Option<TermBucket>>;

    /// Best-effort translation of a stored bucket back into metadata.
    fn reverse_lookup(&self, bucket: &TermBucket) -> Result<Metadata>;

    /// Whether this dictionary can translate `query`. Must not do I/O.
    fn understands(&self, query: &QueryExpression) -> bool;
}

/// Pack every key of `metadata` into one bucket, one term per key.
pub fn schemaless_bucket(metadata: &Metadata) -> TermBucket {
    let mut bucket = TermBucket::new(DEFAULT_BUCKET_NAME);
    for (key, values) in metadata {
        bucket.add_term(Term::new(key.as_str(), values.iter().map(String::as_str)));
    }
    bucket
}

/// Flatten the terms of `buckets` back into metadata verbatim.
pub fn flatten_buckets(buckets: &[TermBucket]) -> Metadata {
    let mut metadata = Metadata::new();
    for bucket in buckets {
        for term in bucket.terms() {
            metadata.add_values(term.name(), term.values().iter().map(String::as_str));
        }
    }
    metadata
}
