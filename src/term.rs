//! Backend-facing record shapes.
//!
//! A [`Term`] is a named, multi-valued field; a [`TermBucket`] is a named
//! collection of terms with unique names. Dictionaries produce fresh
//! buckets for every ingest, update and reduce call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named field with ordered values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    name: String,
    values: Vec<String>,
}

impl Term {
    /// Create a new term.
    pub fn new<S, I, V>(name: S, values: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Term {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// The term name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The term values.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// A named set of terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermBucket {
    name: String,
    terms: BTreeMap<String, Term>,
}

impl TermBucket {
    /// Create a new empty bucket.
    pub fn new<S: Into<String>>(name: S) -> Self {
        TermBucket {
            name: name.into(),
            terms: BTreeMap::new(),
        }
    }

    /// The bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a term, replacing any term of the same name.
    pub fn add_term(&mut self, term: Term) -> Option<Term> {
        self.terms.insert(term.name.clone(), term)
    }

    /// Builder-style [`add_term`](Self::add_term).
    pub fn with_term(mut self, term: Term) -> Self {
        self.add_term(term);
        self
    }

    /// Get a term by name.
    pub fn term(&self, name: &str) -> Option<&Term> {
        self.terms.get(name)
    }

    /// All terms, ordered by name.
    pub fn terms(&self) -> impl Iterator<Item = &Term> {
        self.terms.values()
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check if the bucket holds no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}
