//! The federating catalog service.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::{Catalog, CatalogReceipt, TransactionReceipt};
use crate::dictionary::Dictionary;
use crate::error::{MetacatError, Result};
use crate::factory::ComponentRegistry;
use crate::index::{Index, Properties};
use crate::metadata::Metadata;
use crate::paging::PageInfo;
use crate::query::QueryExpression;
use crate::service::config::{CatalogConfig, ServiceConfig};
use crate::service::fan_out::FanOut;
use crate::service::metrics::{ServiceMetrics, ServiceMetricsCollector, ServiceOperation};
use crate::service::outcome::{CatalogFailure, FederatedResult, failures_to_error};
use crate::service::pagination::{Page, QueryPager, plan_page};
use crate::service::registry::CatalogRegistry;
use crate::service::transaction_table::{CatalogTransactionId, TransactionTable};
use crate::transaction::TransactionId;

/// Metadata key carrying a service transaction id on ingest.
pub const CATALOG_SERVICE_TRANSACTION_ID_KEY: &str = "CatalogServiceTransactionId";
/// Metadata key that, set to `true`, turns an ingest into an update of the
/// record named by [`CATALOG_SERVICE_TRANSACTION_ID_KEY`].
pub const ENABLE_UPDATE_KEY: &str = "EnableUpdate";
/// Metadata key restricting an ingest to the listed catalogs.
pub const CATALOG_IDS_KEY: &str = "CatalogIds";

/// Routing instructions carried inside ingested metadata.
#[derive(Debug, Default)]
struct Directives {
    update_of: Option<String>,
    catalog_ids: Option<Vec<String>>,
}

impl Directives {
    /// Strip the reserved keys off `metadata`.
    fn extract(metadata: &Metadata) -> (Metadata, Directives) {
        let mut stripped = metadata.clone();
        let transaction_id = stripped
            .remove(CATALOG_SERVICE_TRANSACTION_ID_KEY)
            .and_then(|values| values.into_iter().next());
        let enable_update = stripped
            .remove(ENABLE_UPDATE_KEY)
            .is_some_and(|values| values.iter().any(|v| v.trim().eq_ignore_ascii_case("true")));
        let catalog_ids = stripped.remove(CATALOG_IDS_KEY);

        let update_of = match (transaction_id, enable_update) {
            (Some(id), true) => Some(id),
            (Some(id), false) => {
                debug!("ignoring {CATALOG_SERVICE_TRANSACTION_ID_KEY}={id} without {ENABLE_UPDATE_KEY}");
                None
            }
            (None, _) => None,
        };

        (stripped, Directives {
            update_of,
            catalog_ids,
        })
    }
}

/// Metadata of one record, addressed by its service transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMetadata {
    /// Service transaction id.
    pub transaction_id: TransactionId,

    /// Catalog holding the record.
    pub catalog_id: String,

    /// The record's metadata.
    pub metadata: Metadata,
}

/// Registry of catalogs plus the federation operations over them.
///
/// The service owns the service-wide transaction id namespace. Every
/// operation addressing several catalogs runs on the fan-out pool; one
/// catalog's failure is recorded against that catalog and never discards
/// the others' results, unless `one_catalog_fails_all_fail` is configured.
pub struct CatalogService {
    config: ServiceConfig,
    catalogs: CatalogRegistry,
    transactions: TransactionTable,
    components: ComponentRegistry,
    fan_out: FanOut,
    metrics: ServiceMetricsCollector,
    restrict_ingest_permissions: AtomicBool,
    restrict_query_permissions: AtomicBool,
}

impl CatalogService {
    /// Create a service with the built-in component types.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Self::from_config(config, ComponentRegistry::new())
    }

    /// Create a service, building the configured catalogs through `components`.
    pub fn from_config(config: ServiceConfig, components: ComponentRegistry) -> Result<Self> {
        config.validate()?;
        let fan_out = FanOut::new(config.resolved_fan_out_threads(), config.sub_call_timeout)?;

        let service = CatalogService {
            restrict_ingest_permissions: AtomicBool::new(config.restrict_ingest_permissions),
            restrict_query_permissions: AtomicBool::new(config.restrict_query_permissions),
            catalogs: CatalogRegistry::new(),
            transactions: TransactionTable::new(),
            components,
            fan_out,
            metrics: ServiceMetricsCollector::new(),
            config,
        };

        for catalog in &service.config.catalogs {
            let built = service.build_catalog(catalog)?;
            service.catalogs.add(Arc::new(built))?;
        }
        info!(
            "catalog service started with {} catalogs on {} fan-out threads",
            service.catalogs.len(),
            service.fan_out.threads()
        );
        Ok(service)
    }

    /// The configuration the service was built from.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The component registry used to resolve index and dictionary types.
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Build a catalog from configuration without registering it.
    pub fn build_catalog(&self, config: &CatalogConfig) -> Result<Catalog> {
        let index = self
            .components
            .create_index(&config.index.kind, &config.index.properties)?;
        let dictionaries = config
            .dictionaries
            .iter()
            .map(|d| self.components.create_dictionary(&d.kind, &d.properties))
            .collect::<Result<Vec<_>>>()?;

        Ok(Catalog::new(config.id.as_str(), index)
            .with_dictionaries(dictionaries)
            .with_restrict_query_permissions(config.restrict_query_permissions)
            .with_restrict_ingest_permissions(config.restrict_ingest_permissions))
    }

    /// Register an index type, resolvable by name from then on.
    pub fn register_index_factory<S, F>(&self, kind: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&Properties) -> Result<Arc<dyn Index>> + Send + Sync + 'static,
    {
        self.components.register_index(kind, factory);
    }

    /// Register a dictionary type, resolvable by name from then on.
    pub fn register_dictionary_factory<S, F>(&self, kind: S, factory: F)
    where
        S: Into<String>,
        F: Fn(&Properties) -> Result<Arc<dyn Dictionary>> + Send + Sync + 'static,
    {
        self.components.register_dictionary(kind, factory);
    }

    /// Build an index of a registered type.
    pub fn create_index(&self, kind: &str, properties: &Properties) -> Result<Arc<dyn Index>> {
        self.components.create_index(kind, properties)
    }

    // Registry operations

    /// Register a catalog; fails if its id is taken.
    pub fn add_catalog(&self, catalog: Catalog) -> Result<()> {
        debug!("adding catalog '{}'", catalog.id());
        self.catalogs.add(Arc::new(catalog))
    }

    /// Build and register a catalog from configuration.
    pub fn add_catalog_from_config(&self, config: &CatalogConfig) -> Result<()> {
        let catalog = self.build_catalog(config)?;
        self.add_catalog(catalog)
    }

    /// Register a catalog, replacing any catalog with the same id.
    pub fn replace_catalog(&self, catalog: Catalog) -> Option<Arc<Catalog>> {
        debug!("replacing catalog '{}'", catalog.id());
        self.catalogs.replace(Arc::new(catalog))
    }

    /// Unregister a catalog.
    pub fn remove_catalog(&self, catalog_id: &str) -> Result<Arc<Catalog>> {
        debug!("removing catalog '{catalog_id}'");
        self.catalogs.remove(catalog_id)
    }

    /// Append a dictionary to a catalog.
    pub fn add_dictionary(&self, catalog_id: &str, dictionary: Arc<dyn Dictionary>) -> Result<()> {
        self.catalogs.get(catalog_id)?.add_dictionary(dictionary);
        Ok(())
    }

    /// Replace a catalog's dictionaries.
    pub fn replace_dictionaries(
        &self,
        catalog_id: &str,
        dictionaries: Vec<Arc<dyn Dictionary>>,
    ) -> Result<()> {
        self.catalogs.get(catalog_id)?.replace_dictionaries(dictionaries);
        Ok(())
    }

    /// Rebind a catalog to another index.
    pub fn replace_index(&self, catalog_id: &str, index: Arc<dyn Index>) -> Result<()> {
        self.catalogs.get(catalog_id)?.replace_index(index);
        Ok(())
    }

    /// Set a catalog's ingest gate.
    pub fn modify_ingest_permission(&self, catalog_id: &str, restrict: bool) -> Result<()> {
        self.catalogs
            .get(catalog_id)?
            .set_restrict_ingest_permissions(restrict);
        Ok(())
    }

    /// Set a catalog's query gate.
    pub fn modify_query_permission(&self, catalog_id: &str, restrict: bool) -> Result<()> {
        self.catalogs
            .get(catalog_id)?
            .set_restrict_query_permissions(restrict);
        Ok(())
    }

    /// Registered catalog ids, sorted.
    pub fn get_current_catalog_ids(&self) -> Vec<String> {
        self.catalogs.ids()
    }

    /// Look up a catalog.
    pub fn catalog(&self, catalog_id: &str) -> Result<Arc<Catalog>> {
        self.catalogs.get(catalog_id)
    }

    /// Every catalog, sorted by id.
    pub fn catalogs(&self) -> Vec<Arc<Catalog>> {
        self.catalogs.all()
    }

    /// A property of a catalog's index.
    pub fn get_catalog_property(&self, catalog_id: &str, key: &str) -> Result<Option<String>> {
        self.catalogs.get(catalog_id)?.property(key)
    }

    // Service gates

    /// Whether the service accepts ingests at all.
    pub fn is_ingestable(&self) -> bool {
        !self.restrict_ingest_permissions.load(Ordering::SeqCst)
    }

    /// Whether the service answers queries at all.
    pub fn is_queriable(&self) -> bool {
        !self.restrict_query_permissions.load(Ordering::SeqCst)
    }

    /// Set the service-wide ingest gate.
    pub fn set_restrict_ingest_permissions(&self, restrict: bool) {
        self.restrict_ingest_permissions.store(restrict, Ordering::SeqCst);
    }

    /// Set the service-wide query gate.
    pub fn set_restrict_query_permissions(&self, restrict: bool) {
        self.restrict_query_permissions.store(restrict, Ordering::SeqCst);
    }

    // Transaction ids

    /// The service transaction id of a catalog receipt.
    ///
    /// See [`TransactionTable::global_id`] for the meaning of `generate_new`.
    pub fn get_catalog_service_transaction_id(
        &self,
        receipt: &CatalogReceipt,
        generate_new: bool,
    ) -> TransactionId {
        self.transactions.global_id(&receipt.into(), generate_new)
    }

    /// The service transaction id of a backend-local id of `catalog_id`.
    pub fn get_catalog_service_transaction_id_for(
        &self,
        catalog_transaction_id: &TransactionId,
        catalog_id: &str,
    ) -> Result<TransactionId> {
        let catalog = self.catalogs.get(catalog_id)?;
        let local = CatalogTransactionId::new(catalog.id(), catalog_transaction_id.clone());
        Ok(self.transactions.global_id(&local, false))
    }

    /// The catalog and backend-local id behind a service transaction id.
    pub fn get_catalog_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<CatalogTransactionId> {
        self.transactions.require(transaction_id)
    }

    /// Parse the string form of a service transaction id.
    pub fn parse_transaction_id(&self, transaction_id: &str) -> Result<TransactionId> {
        self.transactions.parse(transaction_id)
    }

    fn transaction_receipt(&self, receipt: CatalogReceipt) -> TransactionReceipt {
        let global = self.transactions.global_id(&(&receipt).into(), false);
        TransactionReceipt::new(global, receipt)
    }

    // Writes

    /// Ingest `metadata` into every ingestable catalog.
    ///
    /// Each catalog that stores the record yields its own receipt under its
    /// own service transaction id; catalogs with nothing to index yield
    /// `None`. The reserved keys [`CATALOG_IDS_KEY`],
    /// [`CATALOG_SERVICE_TRANSACTION_ID_KEY`] and [`ENABLE_UPDATE_KEY`]
    /// steer routing and never reach a dictionary.
    pub fn ingest(&self, metadata: &Metadata) -> Result<FederatedResult<Option<TransactionReceipt>>> {
        if !self.is_ingestable() {
            warn!("service is not ingestable; skipping ingest");
            return Ok(FederatedResult::empty());
        }

        let (metadata, directives) = Directives::extract(metadata);
        if let Some(id) = directives.update_of {
            let global = self.transactions.parse(&id)?;
            let receipt = self.update(&global, &metadata)?;
            let catalog_id = self.transactions.require(&global)?.catalog_id;
            return Ok(FederatedResult::new(vec![(catalog_id, receipt)], Vec::new()));
        }

        let targets: Vec<Arc<Catalog>> = self
            .catalogs
            .select(directives.catalog_ids.as_deref())?
            .into_iter()
            .filter(|c| c.is_ingestable())
            .collect();
        debug!(
            "ingesting into {:?}",
            targets.iter().map(|c| c.id()).collect::<Vec<_>>()
        );

        let result = self.fan_out.run(&targets, move |c| c.ingest(&metadata));
        self.record_write(ServiceOperation::Ingest, result.failures());

        result
            .map(|receipt| receipt.map(|r| self.transaction_receipt(r)))
            .check(self.config.one_catalog_fails_all_fail)
    }

    /// Replace the record behind `transaction_id` with `metadata`.
    ///
    /// Returns `None` when the service or the catalog is not ingestable, or
    /// when the catalog has nothing to index or no such record.
    pub fn update(
        &self,
        transaction_id: &TransactionId,
        metadata: &Metadata,
    ) -> Result<Option<TransactionReceipt>> {
        if !self.is_ingestable() {
            warn!("service is not ingestable; skipping update of {transaction_id}");
            return Ok(None);
        }

        let (metadata, _) = Directives::extract(metadata);
        let local = self.transactions.require(transaction_id)?;
        let catalog = self.catalogs.get(&local.catalog_id)?;
        self.metrics_write(ServiceOperation::Update);

        let Some(receipt) = catalog.update(&local.transaction_id, &metadata)? else {
            return Ok(None);
        };
        if receipt.transaction_id == local.transaction_id {
            Ok(Some(TransactionReceipt::new(transaction_id.clone(), receipt)))
        } else {
            Ok(Some(self.transaction_receipt(receipt)))
        }
    }

    /// Delete the record behind `transaction_id`.
    pub fn delete(&self, transaction_id: &TransactionId) -> Result<bool> {
        if !self.is_ingestable() {
            warn!("service is not ingestable; skipping delete of {transaction_id}");
            return Ok(false);
        }

        let local = self.transactions.require(transaction_id)?;
        let catalog = self.catalogs.get(&local.catalog_id)?;
        self.metrics_write(ServiceOperation::Delete);
        catalog.delete(&local.transaction_id)
    }

    /// Remove the terms `metadata` translates to from the record behind
    /// `transaction_id`.
    pub fn reduce(&self, transaction_id: &TransactionId, metadata: &Metadata) -> Result<bool> {
        if !self.is_ingestable() {
            warn!("service is not ingestable; skipping reduce of {transaction_id}");
            return Ok(false);
        }

        let (metadata, _) = Directives::extract(metadata);
        let local = self.transactions.require(transaction_id)?;
        let catalog = self.catalogs.get(&local.catalog_id)?;
        self.metrics_write(ServiceOperation::Reduce);
        catalog.reduce(&local.transaction_id, &metadata)
    }

    // Queries

    fn participants(
        &self,
        query: &QueryExpression,
        catalog_ids: Option<&[String]>,
    ) -> Result<Vec<Arc<Catalog>>> {
        let participants: Vec<Arc<Catalog>> = self
            .catalogs
            .select(catalog_ids)?
            .into_iter()
            .filter(|c| c.is_queriable() && c.is_interested(query))
            .collect();
        debug!(
            "query {query} routed to {:?}",
            participants.iter().map(|c| c.id()).collect::<Vec<_>>()
        );
        Ok(participants)
    }

    /// Every match of `query`, per catalog, in catalog order.
    ///
    /// `catalog_ids` narrows the catalogs asked; `None` asks all of them.
    pub fn query(
        &self,
        query: &QueryExpression,
        catalog_ids: Option<&[String]>,
    ) -> Result<FederatedResult<Vec<TransactionReceipt>>> {
        if !self.is_queriable() {
            warn!("service is not queriable; returning no results");
            return Ok(FederatedResult::empty());
        }

        let started = Instant::now();
        let participants = self.participants(query, catalog_ids)?;
        let expr = query.clone();
        let result = self.fan_out.run(&participants, move |c| c.query(&expr));
        self.record_query(started, false, result.failures());

        result
            .map(|receipts| {
                receipts
                    .into_iter()
                    .map(|r| self.transaction_receipt(r))
                    .collect()
            })
            .check(self.config.one_catalog_fails_all_fail)
    }

    /// Serve one page of `pager`'s virtual result sequence.
    ///
    /// A page number past the end is clamped to the last page.
    pub fn get_page(&self, page_info: &PageInfo, pager: &QueryPager) -> Result<Page> {
        if page_info.page_size == 0 {
            return Err(MetacatError::invalid_argument("page size must be positive"));
        }
        if !self.is_queriable() {
            warn!("service is not queriable; returning an empty page");
            let plan = plan_page(page_info, &[]);
            return Ok(Page::new(
                pager.clone(),
                &plan,
                page_info.page_size,
                Vec::new(),
                Vec::new(),
                Vec::new(),
            ));
        }

        let started = Instant::now();
        let strict = self.config.one_catalog_fails_all_fail;
        let participants = self.participants(&pager.query, pager.catalog_ids.as_deref())?;

        // A catalog whose size is unknown contributes nothing to the page.
        let expr = pager.query.clone();
        let counted = self.fan_out.run(&participants, move |c| c.size_of(&expr));
        let mut failures = counted.failures().to_vec();
        if strict {
            failures_to_error(&failures)?;
        }
        let sizes: Vec<usize> = participants
            .iter()
            .map(|c| counted.value_of(c.id()).copied().unwrap_or(0))
            .collect();

        let plan = plan_page(page_info, &sizes);
        let implicated: Vec<Arc<Catalog>> = plan
            .ranges
            .iter()
            .map(|r| Arc::clone(&participants[r.catalog]))
            .collect();
        let ranges: HashMap<String, (usize, usize)> = plan
            .ranges
            .iter()
            .map(|r| (participants[r.catalog].id().to_string(), (r.start, r.end)))
            .collect();

        let expr = pager.query.clone();
        let fetched = self.fan_out.run(&implicated, move |c| {
            let (start, end) = ranges.get(c.id()).copied().unwrap_or_default();
            c.query_range(&expr, start, end)
        });
        let (receipts, fetch_failures) = fetched.flatten();
        if strict {
            failures_to_error(&fetch_failures)?;
        }
        failures.extend(fetch_failures);
        self.record_query(started, true, &failures);

        let receipts = receipts
            .into_iter()
            .map(|r| self.transaction_receipt(r))
            .collect();
        let ids = participants.iter().map(|c| c.id().to_string()).collect();
        Ok(Page::new(pager.clone(), &plan, page_info.page_size, ids, receipts, failures))
    }

    /// The first page.
    pub fn get_first_page(&self, pager: &QueryPager, page_size: usize) -> Result<Page> {
        self.get_page(&PageInfo::first(page_size), pager)
    }

    /// The last page.
    pub fn get_last_page(&self, pager: &QueryPager, page_size: usize) -> Result<Page> {
        self.get_page(&PageInfo::last(page_size), pager)
    }

    /// The page after `page`, re-derived from current catalog contents.
    ///
    /// Asking past the last page serves the last page again.
    pub fn get_next_page(&self, page: &Page) -> Result<Page> {
        self.get_page(&page.next_page_info(), page.pager())
    }

    /// Every page, first to last.
    pub fn get_all_pages(&self, pager: &QueryPager, page_size: usize) -> Result<Vec<Page>> {
        let mut page = self.get_first_page(pager, page_size)?;
        let mut pages = Vec::new();
        loop {
            let done = page.is_last();
            let current = page.page_num();
            pages.push(page);
            if done {
                break;
            }

            let Some(last) = pages.last() else { break };
            page = self.get_next_page(last)?;
            // Totals may shrink between pages.
            if page.page_num() <= current {
                break;
            }
        }
        Ok(pages)
    }

    // Metadata retrieval

    /// Metadata of the records behind `transaction_ids`.
    ///
    /// Records are grouped per catalog in catalog order and keep the
    /// requested order inside each group. Records a catalog no longer
    /// holds are left out; a catalog no longer registered is reported as
    /// that catalog's failure.
    pub fn get_metadata(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Result<FederatedResult<Vec<RecordMetadata>>> {
        if !self.is_queriable() {
            warn!("service is not queriable; returning no metadata");
            return Ok(FederatedResult::empty());
        }

        let mut wanted: HashMap<String, Vec<(TransactionId, TransactionId)>> = HashMap::new();
        for global in transaction_ids {
            let local = self.transactions.require(global)?;
            wanted
                .entry(local.catalog_id)
                .or_default()
                .push((global.clone(), local.transaction_id));
        }

        // A catalog removed since the ids were minted fails on its own.
        let mut ids: Vec<&String> = wanted.keys().collect();
        ids.sort();
        let mut catalogs = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.catalogs.get(id) {
                Ok(catalog) => catalogs.push(catalog),
                Err(e) => {
                    warn!("records of catalog '{id}' requested after its removal");
                    missing.push(CatalogFailure::new(id.as_str(), e));
                }
            }
        }
        let locals: HashMap<String, Vec<TransactionId>> = wanted
            .iter()
            .map(|(id, pairs)| (id.clone(), pairs.iter().map(|(_, l)| l.clone()).collect()))
            .collect();

        let result = self.fan_out.run(&catalogs, move |c| {
            let ids = locals.get(c.id()).map(Vec::as_slice).unwrap_or_default();
            c.get_metadata_batch(ids)
        });
        let (values, mut failures) = result.into_parts();
        failures.extend(missing);
        if self.config.one_catalog_fails_all_fail {
            failures_to_error(&failures)?;
        }

        let values = values
            .into_iter()
            .map(|(catalog_id, mut found)| {
                let records = wanted
                    .get(&catalog_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|(global, local)| {
                        found.remove(local).map(|metadata| RecordMetadata {
                            transaction_id: global.clone(),
                            catalog_id: catalog_id.clone(),
                            metadata,
                        })
                    })
                    .collect();
                (catalog_id, records)
            })
            .collect();
        Ok(FederatedResult::new(values, failures))
    }

    /// [`get_metadata`](Self::get_metadata) for string forms of service ids.
    pub fn get_metadata_from_transaction_id_strings<S: AsRef<str>>(
        &self,
        transaction_ids: &[S],
    ) -> Result<FederatedResult<Vec<RecordMetadata>>> {
        let ids = transaction_ids
            .iter()
            .map(|id| self.transactions.parse(id.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.get_metadata(&ids)
    }

    /// Metadata of every record on `page`.
    pub fn get_metadata_for_page(&self, page: &Page) -> Result<FederatedResult<Vec<RecordMetadata>>> {
        self.get_metadata(&page.transaction_ids())
    }

    /// Metadata of every record on `page`, keeping only `keys`.
    pub fn get_reduced_metadata_for_page<S: AsRef<str>>(
        &self,
        page: &Page,
        keys: &[S],
    ) -> Result<FederatedResult<Vec<RecordMetadata>>> {
        Ok(self.get_metadata_for_page(page)?.map(|records| {
            records
                .into_iter()
                .map(|record| RecordMetadata {
                    metadata: record.metadata.retain_keys(keys),
                    ..record
                })
                .collect()
        }))
    }

    // Metrics

    /// Get current metrics snapshot.
    pub fn metrics(&self) -> ServiceMetrics {
        self.metrics.snapshot()
    }

    /// Reset metrics.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn metrics_write(&self, operation: ServiceOperation) {
        if self.config.enable_metrics {
            self.metrics.record_write(operation);
        }
    }

    fn record_write(&self, operation: ServiceOperation, failures: &[CatalogFailure]) {
        if self.config.enable_metrics {
            self.metrics.record_write(operation);
            self.record_failures(failures);
        }
    }

    fn record_query(&self, started: Instant, page: bool, failures: &[CatalogFailure]) {
        if self.config.enable_metrics {
            self.metrics.record_query(started.elapsed(), page);
            self.record_failures(failures);
        }
    }

    fn record_failures(&self, failures: &[CatalogFailure]) {
        let timeouts = failures.iter().filter(|f| f.is_timeout()).count();
        self.metrics
            .record_failures(failures.len() as u64, timeouts as u64);
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("catalogs", &self.catalogs.ids())
            .field("transactions", &self.transactions.len())
            .field("fan_out", &self.fan_out)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::KeyMapDictionary;
    use crate::index::MemoryIndex;
    use crate::service::outcome::Outcome;
    use crate::testing::{Operation, RecordingIndex};

    fn service() -> CatalogService {
        CatalogService::new(ServiceConfig::default().with_fan_out_threads(4)).unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> Metadata {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_ingest_fans_out_to_ingestable_catalogs() {
        let service = service();
        service.add_catalog(Catalog::new("a", Arc::new(MemoryIndex::new()))).unwrap();
        service.add_catalog(Catalog::new("b", Arc::new(MemoryIndex::new()))).unwrap();
        service
            .add_catalog(Catalog::new("c", Arc::new(MemoryIndex::new())).with_restrict_ingest_permissions(true))
            .unwrap();

        let result = service.ingest(&record(&[("title", "x")])).unwrap();
        assert_eq!(result.outcome(), Outcome::Complete);
        let receipts: Vec<_> = result.present().collect();
        assert_eq!(receipts.len(), 2);
        assert_ne!(receipts[0].transaction_id, receipts[1].transaction_id);
        assert_eq!(receipts[0].receipts[0].catalog_id, "a");
    }

    #[test]
    fn test_reserved_keys_route_and_are_stripped() {
        let service = service();
        service.add_catalog(Catalog::new("a", Arc::new(MemoryIndex::new()))).unwrap();
        service.add_catalog(Catalog::new("b", Arc::new(MemoryIndex::new()))).unwrap();

        let metadata = record(&[("title", "x"), (CATALOG_IDS_KEY, "b")]);
        let result = service.ingest(&metadata).unwrap();
        let receipt = result.present().next().unwrap().clone();
        assert_eq!(result.values().len(), 1);
        assert_eq!(receipt.receipts[0].catalog_id, "b");

        let stored = service.get_metadata(&[receipt.transaction_id.clone()]).unwrap();
        let (records, _) = stored.flatten();
        assert_eq!(records[0].metadata, record(&[("title", "x")]));

        let update = record(&[
            ("title", "y"),
            (CATALOG_SERVICE_TRANSACTION_ID_KEY, receipt.transaction_id.as_str()),
            (ENABLE_UPDATE_KEY, "true"),
        ]);
        let updated = service.ingest(&update).unwrap();
        let updated = updated.present().next().unwrap().clone();
        assert_eq!(updated.transaction_id, receipt.transaction_id);

        let (records, _) = service.get_metadata(&[receipt.transaction_id]).unwrap().flatten();
        assert_eq!(records[0].metadata, record(&[("title", "y")]));
    }

    #[test]
    fn test_unknown_transaction() {
        let service = service();
        let unknown = service.parse_transaction_id(&uuid::Uuid::new_v4().to_string()).unwrap();
        assert!(matches!(
            service.delete(&unknown),
            Err(MetacatError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn test_service_gates() {
        let service = service();
        let index = Arc::new(RecordingIndex::sequential());
        service.add_catalog(Catalog::new("a", index.clone() as Arc<dyn Index>)).unwrap();

        service.set_restrict_ingest_permissions(true);
        assert!(!service.is_ingestable());
        let result = service.ingest(&record(&[("k", "v")])).unwrap();
        assert!(result.values().is_empty());
        assert_eq!(index.total_calls(), 0);

        service.set_restrict_query_permissions(true);
        let page = service.get_first_page(&QueryPager::new(QueryExpression::All), 10).unwrap();
        assert!(page.is_empty());
        assert_eq!(index.total_calls(), 0);
    }

    #[test]
    fn test_registry_operations() {
        let service = service();
        service.add_catalog(Catalog::new("a", Arc::new(MemoryIndex::new()))).unwrap();
        assert!(matches!(
            service.add_catalog(Catalog::new("a", Arc::new(MemoryIndex::new()))),
            Err(MetacatError::DuplicateCatalog(_))
        ));

        service
            .add_dictionary("a", Arc::new(KeyMapDictionary::new("b").with_key("title")))
            .unwrap();
        assert_eq!(service.catalog("a").unwrap().dictionaries().len(), 1);
        service.replace_dictionaries("a", Vec::new()).unwrap();
        assert!(service.catalog("a").unwrap().dictionaries().is_empty());

        service.modify_query_permission("a", true).unwrap();
        assert!(!service.catalog("a").unwrap().is_queriable());
        service.modify_ingest_permission("a", true).unwrap();
        assert!(!service.catalog("a").unwrap().is_ingestable());

        service
            .replace_index("a", Arc::new(MemoryIndex::new().with_property("flavour", "plain")))
            .unwrap();
        assert_eq!(
            service.get_catalog_property("a", "flavour").unwrap().as_deref(),
            Some("plain")
        );

        assert!(matches!(
            service.modify_query_permission("zzz", true),
            Err(MetacatError::UnknownCatalog(_))
        ));
        service.remove_catalog("a").unwrap();
        assert!(service.get_current_catalog_ids().is_empty());
    }

    #[test]
    fn test_metrics_follow_operations() {
        let service = service();
        let index = Arc::new(RecordingIndex::sequential());
        service.add_catalog(Catalog::new("a", index.clone() as Arc<dyn Index>)).unwrap();
        service.add_catalog(Catalog::new("b", Arc::new(MemoryIndex::new()))).unwrap();
        index.fail(Operation::Query);

        service.ingest(&record(&[("k", "v")])).unwrap();
        let result = service.query(&QueryExpression::All, None).unwrap();
        assert_eq!(result.outcome(), Outcome::Partial);

        let metrics = service.metrics();
        assert_eq!(metrics.ingests, 1);
        assert_eq!(metrics.queries, 1);
        assert_eq!(metrics.catalog_failures, 1);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let service = service();
        let err = service
            .get_page(&PageInfo::first(0), &QueryPager::new(QueryExpression::All))
            .unwrap_err();
        assert!(matches!(err, MetacatError::InvalidArgument(_)));
    }
}
