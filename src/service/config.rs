//! Configuration for the catalog service.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MetacatError, Result};
use crate::index::Properties;

/// A component resolved by type name through the
/// [`ComponentRegistry`](crate::factory::ComponentRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Registered type name.
    pub kind: String,

    /// Constructor properties.
    #[serde(default)]
    pub properties: Properties,
}

impl ComponentConfig {
    /// A component of type `kind` with no properties.
    pub fn new<S: Into<String>>(kind: S) -> Self {
        ComponentConfig {
            kind: kind.into(),
            properties: Properties::new(),
        }
    }

    /// Set one property.
    pub fn with_property<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Configuration of one catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog id.
    pub id: String,

    /// The catalog's index.
    pub index: ComponentConfig,

    /// The catalog's dictionaries, in lookup order.
    #[serde(default)]
    pub dictionaries: Vec<ComponentConfig>,

    /// Close the query gate.
    #[serde(default)]
    pub restrict_query_permissions: bool,

    /// Close the ingest gate.
    #[serde(default)]
    pub restrict_ingest_permissions: bool,
}

impl CatalogConfig {
    /// A catalog `id` over `index` with no dictionaries.
    pub fn new<S: Into<String>>(id: S, index: ComponentConfig) -> Self {
        CatalogConfig {
            id: id.into(),
            index,
            dictionaries: Vec::new(),
            restrict_query_permissions: false,
            restrict_ingest_permissions: false,
        }
    }

    /// Append a dictionary.
    pub fn with_dictionary(mut self, dictionary: ComponentConfig) -> Self {
        self.dictionaries.push(dictionary);
        self
    }

    /// Set the query gate.
    pub fn with_restrict_query_permissions(mut self, restrict: bool) -> Self {
        self.restrict_query_permissions = restrict;
        self
    }

    /// Set the ingest gate.
    pub fn with_restrict_ingest_permissions(mut self, restrict: bool) -> Self {
        self.restrict_ingest_permissions = restrict;
        self
    }
}

/// Configuration for [`CatalogService`](crate::service::CatalogService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Fan-out worker threads.
    /// If None, uses the number of CPU cores.
    pub fan_out_threads: Option<usize>,

    /// Deadline of each fan-out sub-call, measured from its start.
    pub sub_call_timeout: Option<Duration>,

    /// Turn any catalog failure inside a fan-out into an error.
    pub one_catalog_fails_all_fail: bool,

    /// Close the service-wide ingest gate.
    pub restrict_ingest_permissions: bool,

    /// Close the service-wide query gate.
    pub restrict_query_permissions: bool,

    /// Whether to enable metrics collection.
    pub enable_metrics: bool,

    /// Catalogs created at start-up.
    pub catalogs: Vec<CatalogConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fan_out_threads: None,
            sub_call_timeout: None,
            one_catalog_fails_all_fail: false,
            restrict_ingest_permissions: false,
            restrict_query_permissions: false,
            enable_metrics: true,
            catalogs: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ServiceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.fan_out_threads == Some(0) {
            return Err(MetacatError::config("fan_out_threads must be positive"));
        }
        if self.sub_call_timeout == Some(Duration::ZERO) {
            return Err(MetacatError::config("sub_call_timeout must be positive"));
        }

        let mut seen = HashSet::new();
        for catalog in &self.catalogs {
            if catalog.id.trim().is_empty() {
                return Err(MetacatError::config("catalog id must not be empty"));
            }
            if !seen.insert(catalog.id.as_str()) {
                return Err(MetacatError::config(format!(
                    "catalog '{}' is configured twice",
                    catalog.id
                )));
            }
        }
        Ok(())
    }

    /// Number of fan-out threads to start.
    pub fn resolved_fan_out_threads(&self) -> usize {
        self.fan_out_threads.unwrap_or_else(num_cpus::get)
    }

    /// Set the number of fan-out threads.
    pub fn with_fan_out_threads(mut self, threads: usize) -> Self {
        self.fan_out_threads = Some(threads);
        self
    }

    /// Set the per-sub-call timeout.
    pub fn with_sub_call_timeout(mut self, timeout: Duration) -> Self {
        self.sub_call_timeout = Some(timeout);
        self
    }

    /// Set whether any catalog failure fails the whole fan-out.
    pub fn with_one_catalog_fails_all_fail(mut self, strict: bool) -> Self {
        self.one_catalog_fails_all_fail = strict;
        self
    }

    /// Set the service-wide ingest gate.
    pub fn with_restrict_ingest_permissions(mut self, restrict: bool) -> Self {
        self.restrict_ingest_permissions = restrict;
        self
    }

    /// Set the service-wide query gate.
    pub fn with_restrict_query_permissions(mut self, restrict: bool) -> Self {
        self.restrict_query_permissions = restrict;
        self
    }

    /// Set whether to collect metrics.
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Append a catalog.
    pub fn with_catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalogs.push(catalog);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert!(config.resolved_fan_out_threads() > 0);
        assert!(config.sub_call_timeout.is_none());
        assert!(!config.one_catalog_fails_all_fail);
        assert!(config.enable_metrics);
        assert!(config.catalogs.is_empty());
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "fan_out_threads": 2,
            "sub_call_timeout": { "secs": 5, "nanos": 0 },
            "catalogs": [
                {
                    "id": "products",
                    "index": { "kind": "memory", "properties": { "id_scheme": "sequential" } },
                    "dictionaries": [
                        { "kind": "key_map", "properties": { "keys": "title" } }
                    ],
                    "restrict_ingest_permissions": true
                }
            ]
        }"#;

        let config = ServiceConfig::from_json_str(json).unwrap();
        assert_eq!(config.fan_out_threads, Some(2));
        assert_eq!(config.sub_call_timeout, Some(Duration::from_secs(5)));
        assert!(config.enable_metrics);

        let catalog = &config.catalogs[0];
        assert_eq!(catalog.index.kind, "memory");
        assert_eq!(catalog.dictionaries.len(), 1);
        assert!(catalog.restrict_ingest_permissions);
        assert!(!catalog.restrict_query_permissions);
    }

    #[test]
    fn test_validation() {
        let memory = ComponentConfig::new("memory");
        let duplicate = ServiceConfig::default()
            .with_catalog(CatalogConfig::new("a", memory.clone()))
            .with_catalog(CatalogConfig::new("a", memory));
        assert!(matches!(duplicate.validate(), Err(MetacatError::Config(_))));

        let no_threads = ServiceConfig::default().with_fan_out_threads(0);
        assert!(no_threads.validate().is_err());

        assert!(ServiceConfig::from_json_str("{ not json").is_err());
    }
}
