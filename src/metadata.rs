//! Schema-free, multi-valued property records.
//!
//! [`Metadata`] is the universal interchange record of the catalog: every
//! key maps to an ordered list of string values. Key order carries no
//! meaning (keys are kept sorted so that translation into term buckets is
//! deterministic), value order per key does.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

/// A multi-valued string map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    /// Create a new empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to `key`, creating the key if needed.
    pub fn add_value<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Append several values to `key`, creating the key if needed.
    pub fn add_values<K, I, V>(&mut self, key: K, values: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.entries
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Replace all values of `key`.
    pub fn replace_values<K, I, V>(&mut self, key: K, values: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.entries
            .insert(key.into(), values.into_iter().map(Into::into).collect());
    }

    /// Builder-style [`add_value`](Self::add_value).
    pub fn with_value<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.add_value(key, value);
        self
    }

    /// All values of `key`, in insertion order.
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// The first value of `key`.
    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Check if the record has `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove `key` and return its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over `(key, values)` pairs.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.entries.iter()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the record has no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union `other` into this record.
    ///
    /// Values of keys present in both records are appended, skipping values
    /// this record already holds for that key.
    pub fn merge(&mut self, other: &Metadata) {
        for (key, values) in other.iter() {
            let existing = self.entries.entry(key.clone()).or_default();
            for value in values {
                if !existing.contains(value) {
                    existing.push(value.clone());
                }
            }
        }
    }

    /// A copy holding only the listed keys.
    pub fn retain_keys<S: AsRef<str>>(&self, keys: &[S]) -> Metadata {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| keys.iter().any(|k| k.as_ref() == key.as_str()))
            .map(|(key, values)| (key.clone(), values.clone()))
            .collect();
        Metadata { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.add_value(key, value);
        }
        metadata
    }
}

impl IntoIterator for Metadata {
    type Item = (String, Vec<String>);
    type IntoIter = btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_keep_insertion_order() {
        let mut metadata = Metadata::new();
        metadata.add_value("author", "b");
        metadata.add_value("author", "a");
        metadata.add_values("tag", ["x", "y"]);

        assert_eq!(metadata.values("author").unwrap(), ["b", "a"]);
        assert_eq!(metadata.first_value("tag"), Some("x"));
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_merge_skips_duplicate_values() {
        let mut left = Metadata::new().with_value("k", "1").with_value("k", "2");
        let right = Metadata::new().with_value("k", "2").with_value("k", "3").with_value("j", "x");

        left.merge(&right);

        assert_eq!(left.values("k").unwrap(), ["1", "2", "3"]);
        assert_eq!(left.values("j").unwrap(), ["x"]);
    }

    #[test]
    fn test_retain_keys() {
        let metadata: Metadata = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        let reduced = metadata.retain_keys(&["a", "c", "missing"]);

        assert_eq!(reduced.keys().collect::<Vec<_>>(), ["a", "c"]);
    }

    #[test]
    fn test_json_shape() {
        let metadata = Metadata::new().with_value("title", "x");
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"title":["x"]}"#);
    }
}
