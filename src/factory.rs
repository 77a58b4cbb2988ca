//! Name-keyed constructors for indexes and dictionaries.
//!
//! Backends and dictionaries are resolved by a type name when a service is
//! built from configuration or when an operator registers a new backend at
//! run time. The registry starts with the built-in `"memory"` index and
//! `"key_map"` dictionary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::dictionary::{Dictionary, KeyMapDictionary};
use crate::error::{MetacatError, Result};
use crate::index::{Index, MemoryIndex, Properties};

/// Type name of the built-in in-memory index.
pub const MEMORY_INDEX_TYPE: &str = "memory";
/// Type name of the built-in key-map dictionary.
pub const KEY_MAP_DICTIONARY_TYPE: &str = "key_map";

/// Constructor for an index type.
pub type IndexFactory = Arc<dyn Fn(&Properties) -> Result<Arc<dyn Index>> + Send + Sync>;

/// Constructor for a dictionary type.
pub type DictionaryFactory = Arc<dyn Fn(&Properties) -> Result<Arc<dyn Dictionary>> + Send + Sync>;

/// Registry of index and dictionary constructors.
pub struct ComponentRegistry {
    indexes: RwLock<HashMap<String, IndexFactory>>,
    dictionaries: RwLock<HashMap<String, DictionaryFactory>>,
}

impl ComponentRegistry {
    /// Create a registry holding the built-in component types.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_index(MEMORY_INDEX_TYPE, |properties| {
            let index = MemoryIndex::from_properties(properties)
                .map_err(|e| MetacatError::config(format!("memory index: {e}")))?;
            Ok(Arc::new(index) as Arc<dyn Index>)
        });
        registry.register_dictionary(KEY_MAP_DICTIONARY_TYPE, |properties| {
            Ok(Arc::new(KeyMapDictionary::from_properties(properties)?) as Arc<dyn Dictionary>)
        });
        registry
    }

    /// Create a registry with no component types.
    pub fn empty() -> Self {
        ComponentRegistry {
            indexes: RwLock::new(HashMap::new()),
            dictionaries: RwLock::new(HashMap::new()),
        }
    }

    /// Register an index constructor; replaces any previous one of that name.
    pub fn register_index<S, F>(&self, kind: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&Properties) -> Result<Arc<dyn Index>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!("registering index type '{kind}'");
        self.indexes.write().insert(kind, Arc::new(factory));
    }

    /// Register a dictionary constructor; replaces any previous one of that name.
    pub fn register_dictionary<S, F>(&self, kind: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&Properties) -> Result<Arc<dyn Dictionary>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!("registering dictionary type '{kind}'");
        self.dictionaries.write().insert(kind, Arc::new(factory));
    }

    /// Build an index of type `kind`.
    pub fn create_index(&self, kind: &str, properties: &Properties) -> Result<Arc<dyn Index>> {
        // Release the lock before running the constructor.
        let factory = self
            .indexes
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| MetacatError::UnknownComponentType(kind.to_string()))?;
        factory(properties)
    }

    /// Build a dictionary of type `kind`.
    pub fn create_dictionary(
        &self,
        kind: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn Dictionary>> {
        let factory = self
            .dictionaries
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| MetacatError::UnknownComponentType(kind.to_string()))?;
        factory(properties)
    }

    /// Registered index type names, sorted.
    pub fn index_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.indexes.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Registered dictionary type names, sorted.
    pub fn dictionary_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.dictionaries.read().keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("indexes", &self.index_types())
            .field("dictionaries", &self.dictionary_types())
            .finish()
    }
}
