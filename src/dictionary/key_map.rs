//! Dictionary that renames a fixed set of metadata keys into terms.

use std::collections::{BTreeMap, BTreeSet};

use crate::dictionary::{DEFAULT_BUCKET_NAME, Dictionary};
use crate::error::{MetacatError, Result};
use crate::index::Properties;
use crate::metadata::Metadata;
use crate::query::QueryExpression;
use crate::term::{Term, TermBucket};

/// Property naming the bucket this dictionary fills.
pub const BUCKET_PROPERTY: &str = "bucket";
/// Property listing `key` or `key=term` entries, comma-separated.
pub const KEYS_PROPERTY: &str = "keys";
/// Property listing keys a relevant record must carry, comma-separated.
pub const REQUIRED_PROPERTY: &str = "required";

/// Maps metadata keys to term names inside one named bucket.
///
/// Records carrying none of the mapped keys are not relevant to this
/// dictionary. A relevant record that lacks one of the required keys is a
/// translation error.
#[derive(Debug, Clone)]
pub struct KeyMapDictionary {
    bucket: String,
    key_to_term: BTreeMap<String, String>,
    term_to_key: BTreeMap<String, String>,
    required: BTreeSet<String>,
}

impl KeyMapDictionary {
    /// Create a dictionary filling the bucket `bucket`.
    pub fn new<S: Into<String>>(bucket: S) -> Self {
        KeyMapDictionary {
            bucket: bucket.into(),
            key_to_term: BTreeMap::new(),
            term_to_key: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }

    /// Map `key` to a term of the same name.
    pub fn with_key<S: Into<String>>(self, key: S) -> Self {
        let key = key.into();
        self.with_mapping(key.clone(), key)
    }

    /// Map `key` to the term `term`.
    pub fn with_mapping<K: Into<String>, T: Into<String>>(mut self, key: K, term: T) -> Self {
        let (key, term) = (key.into(), term.into());
        self.term_to_key.insert(term.clone(), key.clone());
        self.key_to_term.insert(key, term);
        self
    }

    /// Require `key` on every relevant record.
    pub fn with_required<S: Into<String>>(mut self, key: S) -> Self {
        self.required.insert(key.into());
        self
    }

    /// Build a dictionary from factory properties.
    pub fn from_properties(properties: &Properties) -> Result<Self> {
        let bucket = properties
            .get(BUCKET_PROPERTY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_BUCKET_NAME);
        let mut dictionary = KeyMapDictionary::new(bucket);

        let keys = properties
            .get(KEYS_PROPERTY)
            .ok_or_else(|| MetacatError::config("key_map dictionary needs a 'keys' property"))?;
        for entry in split_list(keys) {
            dictionary = match entry.split_once('=') {
                Some((key, term)) if !key.trim().is_empty() && !term.trim().is_empty() => {
                    dictionary.with_mapping(key.trim(), term.trim())
                }
                Some(_) => {
                    return Err(MetacatError::config(format!(
                        "invalid key mapping '{entry}'"
                    )));
                }
                None => dictionary.with_key(entry),
            };
        }
        if dictionary.key_to_term.is_empty() {
            return Err(MetacatError::config("key_map dictionary maps no keys"));
        }

        if let Some(required) = properties.get(REQUIRED_PROPERTY) {
            for key in split_list(required) {
                dictionary = dictionary.with_required(key);
            }
        }

        Ok(dictionary)
    }

    /// The bucket this dictionary fills.
    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }
}

impl Dictionary for KeyMapDictionary {
    fn lookup(&self, metadata: &Metadata) -> Result<Option<TermBucket>> {
        let mut bucket = TermBucket::new(self.bucket.as_str());
        for (key, term) in &self.key_to_term {
            if let Some(values) = metadata.values(key) {
                bucket.add_term(Term::new(term.as_str(), values.iter().map(String::as_str)));
            }
        }

        if bucket.is_empty() {
            return Ok(None);
        }

        if let Some(missing) = self.required.iter().find(|key| !metadata.contains_key(key)) {
            return Err(MetacatError::dictionary(format!(
                "record for bucket '{}' is missing required key '{missing}'",
                self.bucket
            )));
        }

        Ok(Some(bucket))
    }

    fn reverse_lookup(&self, bucket: &TermBucket) -> Result<Metadata> {
        let mut metadata = Metadata::new();
        if bucket.name() != self.bucket {
            return Ok(metadata);
        }

        for term in bucket.terms() {
            if let Some(key) = self.term_to_key.get(term.name()) {
                metadata.add_values(key.as_str(), term.values().iter().map(String::as_str));
            }
        }
        Ok(metadata)
    }

    /// Queries address stored term names; metadata key names never reach
    /// the index and are not understood.
    fn understands(&self, query: &QueryExpression) -> bool {
        query
            .fields()
            .into_iter()
            .all(|field| self.term_to_key.contains_key(field))
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> KeyMapDictionary {
        KeyMapDictionary::new("product")
            .with_key("title")
            .with_mapping("ProductType", "product_type")
    }

    #[test]
    fn test_lookup_absent_when_no_keys_match() {
        let metadata = Metadata::new().with_value("unrelated", "x");
        assert!(dictionary().lookup(&metadata).unwrap().is_none());
    }

    #[test]
    fn test_lookup_and_reverse_lookup() {
        let metadata = Metadata::new()
            .with_value("title", "t")
            .with_value("ProductType", "image")
            .with_value("ignored", "x");

        let bucket = dictionary().lookup(&metadata).unwrap().unwrap();
        assert_eq!(bucket.name(), "product");
        assert_eq!(bucket.term("product_type").unwrap().values(), ["image"]);
        assert!(bucket.term("ignored").is_none());

        let reversed = dictionary().reverse_lookup(&bucket).unwrap();
        assert_eq!(reversed, metadata.retain_keys(&["title", "ProductType"]));

        let foreign = TermBucket::new("other").with_term(Term::new("title", ["t"]));
        assert!(dictionary().reverse_lookup(&foreign).unwrap().is_empty());
    }

    #[test]
    fn test_required_key_missing_is_error() {
        let dictionary = dictionary().with_required("ProductType");
        let metadata = Metadata::new().with_value("title", "t");
        let err = dictionary.lookup(&metadata).unwrap_err();
        assert!(matches!(err, MetacatError::Dictionary(_)));
    }

    #[test]
    fn test_understands() {
        let dictionary = dictionary();
        assert!(dictionary.understands(&QueryExpression::term("title", "x")));
        assert!(dictionary.understands(&QueryExpression::term("product_type", "x")));
        assert!(dictionary.understands(&QueryExpression::All));
        assert!(!dictionary.understands(&QueryExpression::term("ProductType", "x")));
        assert!(!dictionary.understands(&QueryExpression::And(vec![
            QueryExpression::term("title", "x"),
            QueryExpression::term("author", "y"),
        ])));
    }

    #[test]
    fn test_from_properties() {
        let mut properties = Properties::new();
        properties.insert(BUCKET_PROPERTY.into(), "product".into());
        properties.insert(KEYS_PROPERTY.into(), "title, ProductType=product_type".into());
        properties.insert(REQUIRED_PROPERTY.into(), "title".into());

        let dictionary = KeyMapDictionary::from_properties(&properties).unwrap();
        assert_eq!(dictionary.bucket_name(), "product");
        assert!(dictionary.understands(&QueryExpression::term("product_type", "x")));

        properties.insert(KEYS_PROPERTY.into(), "=oops".into());
        assert!(KeyMapDictionary::from_properties(&properties).is_err());

        properties.remove(KEYS_PROPERTY);
        assert!(KeyMapDictionary::from_properties(&properties).is_err());
    }
}
