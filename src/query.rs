//! Query expressions routed to dictionaries and indexes.
//!
//! The federation layer treats a [`QueryExpression`] as opaque: it only
//! hands it to [`Dictionary::understands`](crate::dictionary::Dictionary::understands)
//! to decide catalog participation and to the index's query service. The
//! AST and its evaluator exist for backends such as
//! [`MemoryIndex`](crate::index::memory::MemoryIndex) that evaluate
//! expressions directly over term buckets.

pub mod expression;
pub mod parser;

pub use expression::{Comparison, QueryExpression};
pub use parser::QueryParser;
