//! In-memory catalog world shared by the engine's unit tests.
//!
//! ```text
//!   Item (code, thumbnail → Media)
//!    ├── Product (picture → Media, gallery → [Media] localized,
//!    │    │       supercategories → [Category])
//!    │    └── VariantProduct
//!    ├── Category (supercategories → [Category])   hierarchical
//!    └── Media
//!
//!   staged ──r1──► online      (roots: Product, Category, Media)
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeZone, Utc};

use catsync_core::{
    AccessContext, AttributeDescriptor, AttributeValue, CatalogRepository, ExecutionKind, ItemKey,
    Multiplicity, Principal, ReplicaVersion, RuleId, StaticSchema, SyncRule, VersionedItem,
};
use catsync_store::{
    JobWorker, MemoryCatalog, MemoryLedger, QueuedJobRuntime, StaticAuthorization,
    DEFAULT_QUEUE_CAPACITY,
};

use crate::config::{EngineConfig, InitialSyncCheck, ReferenceSettings};
use crate::dispatcher::SyncDispatcher;
use crate::evaluator::ConsistencyEvaluator;
use crate::rules::RuleSelector;
use crate::walker::ReferenceWalker;
use crate::Collaborators;

pub const RULE: &str = "r1";

/// Ledger keys used by [`World::mark_executed`]; never present in the catalog.
const MARKER_SOURCE: u64 = 900_000;
const MARKER_TARGET: u64 = 900_001;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

pub fn editor() -> AccessContext {
    AccessContext::new(Principal::new("editor"))
}

pub fn schema() -> StaticSchema {
    StaticSchema::builder()
        .root("Item")
        .subtype("Product", "Item")
        .subtype("VariantProduct", "Product")
        .subtype("Category", "Item")
        .subtype("Media", "Item")
        .attribute(AttributeDescriptor::scalar("Item", "code"))
        .attribute(AttributeDescriptor::reference("Item", "thumbnail", "Media"))
        .attribute(AttributeDescriptor::reference("Product", "picture", "Media"))
        .attribute(
            AttributeDescriptor::reference("Product", "gallery", "Media")
                .many(Multiplicity::List)
                .localized(),
        )
        .attribute(
            AttributeDescriptor::reference("Product", "supercategories", "Category")
                .many(Multiplicity::List),
        )
        .attribute(
            AttributeDescriptor::reference("Category", "supercategories", "Category")
                .many(Multiplicity::List),
        )
        .build()
        .expect("valid test schema")
}

pub struct World {
    pub schema: Arc<StaticSchema>,
    pub catalog: Arc<MemoryCatalog>,
    pub ledger: Arc<MemoryLedger>,
    pub authorization: Arc<StaticAuthorization>,
    pub jobs: Arc<QueuedJobRuntime>,
    worker: Mutex<Option<JobWorker>>,
}

impl World {
    pub fn new() -> Self {
        Self::build(StaticAuthorization::allow_all(), ExecutionKind::VersionSync, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_authorization(authorization: StaticAuthorization) -> Self {
        Self::build(authorization, ExecutionKind::VersionSync, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_kind(kind: ExecutionKind) -> Self {
        Self::build(StaticAuthorization::allow_all(), kind, DEFAULT_QUEUE_CAPACITY)
    }

    /// A world whose job queue holds at most `capacity` waiting executions.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self::build(StaticAuthorization::allow_all(), ExecutionKind::VersionSync, capacity)
    }

    fn build(authorization: StaticAuthorization, kind: ExecutionKind, capacity: usize) -> Self {
        let catalog = MemoryCatalog::new().with_locales(["en", "de"]);
        catalog.add_version(ReplicaVersion::new("staged"));
        catalog.add_version(ReplicaVersion::new("online"));
        catalog.add_rule(
            SyncRule::new(RULE, "staged", "online")
                .with_root_type("Product")
                .with_root_type("Category")
                .with_root_type("Media"),
        );

        let (jobs, worker, _handle) = QueuedJobRuntime::with_capacity(kind, capacity);

        World {
            schema: Arc::new(schema()),
            catalog: Arc::new(catalog),
            ledger: Arc::new(MemoryLedger::new()),
            authorization: Arc::new(authorization),
            jobs: Arc::new(jobs),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn ports(&self) -> Collaborators {
        Collaborators {
            schema: self.schema.clone(),
            catalog: self.catalog.clone(),
            ledger: self.ledger.clone(),
            values: self.catalog.clone(),
            authorizer: self.authorization.clone(),
            jobs: self.jobs.clone(),
        }
    }

    // =========================================================================
    // Components
    // =========================================================================

    pub fn selector(&self, check: InitialSyncCheck) -> RuleSelector {
        RuleSelector::new(self.ports(), check)
    }

    pub fn walker(&self, settings: &ReferenceSettings) -> ReferenceWalker {
        ReferenceWalker::new(self.ports(), settings).expect("valid reference settings")
    }

    pub fn evaluator(&self, settings: ReferenceSettings) -> ConsistencyEvaluator {
        self.evaluator_with(EngineConfig {
            references: settings,
            ..EngineConfig::default()
        })
    }

    pub fn evaluator_with(&self, config: EngineConfig) -> ConsistencyEvaluator {
        ConsistencyEvaluator::new(
            self.ports(),
            Arc::new(self.selector(config.initial_sync.check)),
            Arc::new(self.walker(&config.references)),
            config.access.disable_restrictions,
        )
    }

    pub fn dispatcher(&self, settings: ReferenceSettings) -> SyncDispatcher {
        let config = EngineConfig::default();
        SyncDispatcher::new(
            self.ports(),
            Arc::new(self.selector(config.initial_sync.check)),
            Arc::new(self.walker(&settings)),
            config.access.disable_restrictions,
        )
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    pub fn add(&self, item: VersionedItem) -> VersionedItem {
        self.catalog.add_item(item.clone());
        item
    }

    pub fn add_restricted(&self, item: VersionedItem) -> VersionedItem {
        self.catalog.add_restricted_item(item.clone());
        item
    }

    pub fn add_rule(&self, rule: SyncRule) {
        self.catalog.add_rule(rule);
    }

    pub fn product(&self, key: u64, modified: i64) -> VersionedItem {
        self.add(VersionedItem::new(ItemKey::new(key), "Product", at(modified)).in_version("staged"))
    }

    pub fn variant(&self, key: u64, modified: i64) -> VersionedItem {
        self.add(
            VersionedItem::new(ItemKey::new(key), "VariantProduct", at(modified))
                .in_version("staged"),
        )
    }

    pub fn media(&self, key: u64) -> VersionedItem {
        self.add(VersionedItem::new(ItemKey::new(key), "Media", at(1)).in_version("staged"))
    }

    pub fn category(&self, key: u64) -> VersionedItem {
        self.add(
            VersionedItem::new(ItemKey::new(key), "Category", at(1))
                .in_version("staged")
                .hierarchical(),
        )
    }

    /// Copies a staged item into "online" under `target` and links the pair.
    pub fn online_copy(&self, source: u64, target: u64) -> VersionedItem {
        let mut copy = self.item(source);
        copy.key = ItemKey::new(target);
        copy.version = Some("online".into());
        let copy = self.add(copy);
        self.catalog
            .link_counterpart(ItemKey::new(source), copy.key)
            .expect("linkable items");
        copy
    }

    pub fn item(&self, key: u64) -> VersionedItem {
        self.catalog.item(ItemKey::new(key)).expect("known item")
    }

    pub fn rule(&self, id: &str) -> SyncRule {
        self.catalog.rule(&RuleId::new(id)).expect("known rule")
    }

    pub fn set(&self, key: u64, attribute: &str, value: AttributeValue) {
        self.catalog
            .set_value(ItemKey::new(key), attribute, value)
            .expect("known item");
    }

    pub fn set_localized(&self, key: u64, attribute: &str, locale: &str, value: AttributeValue) {
        self.catalog
            .set_localized_value(ItemKey::new(key), attribute, locale, value)
            .expect("known item");
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Makes the rule count as executed under both initial-sync strategies.
    pub fn mark_executed(&self, rule: &str) {
        self.ledger.record(
            ItemKey::new(MARKER_SOURCE),
            ItemKey::new(MARKER_TARGET),
            rule,
            at(0),
        );
        self.jobs.record_completed(rule, 1);
    }

    /// Runs every queued execution.
    pub fn drain_jobs(&self) -> usize {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .map_or(0, JobWorker::drain)
    }

    /// Drops the worker so later submissions fail.
    pub fn stop_worker(&self) {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
