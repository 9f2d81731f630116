//! # Sync Engine
//!
//! Facade owning one instance of every engine component, built once from an
//! [`EngineConfig`] and a set of [`Collaborators`].
//!
//! ## Component Wiring
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            SyncEngine                                   │
//! │                                                                         │
//! │   Collaborators ──┬──────────────┬───────────────┬──────────────┐       │
//! │                   ▼              ▼               ▼              ▼       │
//! │            ReferenceWalker  RuleSelector   LedgerNavigator  (ports)    │
//! │                   │              │                                      │
//! │                   └──────┬───────┘                                      │
//! │                          ▼                                              │
//! │             ConsistencyEvaluator ──► SyncContextBuilder                 │
//! │                          │                     │                        │
//! │                          └─────────┬───────────┘                        │
//! │                                    ▼                                    │
//! │                             SyncDispatcher ──► JobRuntime               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every query takes the caller's [`AccessContext`]. Read operations are
//! `&self` and may run concurrently across items.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use catsync_core::{
    AccessContext, RuleId, RuleSet, SyncRule, SyncStatus, TypeCode, VersionId, VersionedItem,
};

use crate::config::EngineConfig;
use crate::context::{SyncContext, SyncContextBuilder};
use crate::dispatcher::{DispatchReport, DispatchRequest, ItemInput, SyncDispatcher};
use crate::error::SyncResult;
use crate::evaluator::{ConsistencyEvaluator, PullEvaluation, PushEvaluation};
use crate::navigation::LedgerNavigator;
use crate::rules::{RuleScope, RuleSelector, RuleSummary};
use crate::walker::ReferenceWalker;
use crate::Collaborators;

/// The catalog synchronization engine.
pub struct SyncEngine {
    config: EngineConfig,
    walker: Arc<ReferenceWalker>,
    rules: Arc<RuleSelector>,
    evaluator: Arc<ConsistencyEvaluator>,
    contexts: SyncContextBuilder,
    dispatcher: SyncDispatcher,
    navigator: LedgerNavigator,
}

impl SyncEngine {
    /// Validates the configuration and wires the components.
    pub fn new(ports: Collaborators, config: EngineConfig) -> SyncResult<Self> {
        config.validate()?;

        let disable_restrictions = config.access.disable_restrictions;
        let walker = Arc::new(ReferenceWalker::new(ports.clone(), &config.references)?);
        let rules = Arc::new(RuleSelector::new(ports.clone(), config.initial_sync.check));
        let evaluator = Arc::new(ConsistencyEvaluator::new(
            ports.clone(),
            Arc::clone(&rules),
            Arc::clone(&walker),
            disable_restrictions,
        ));
        let contexts = SyncContextBuilder::new(Arc::clone(&evaluator), Arc::clone(&rules));
        let dispatcher = SyncDispatcher::new(
            ports.clone(),
            Arc::clone(&rules),
            Arc::clone(&walker),
            disable_restrictions,
        );
        let navigator = LedgerNavigator::new(ports);

        info!(
            check = %config.initial_sync.check,
            max_depth = config.references.max_depth,
            configured_types = config.references.types.len(),
            "Sync engine ready"
        );

        Ok(SyncEngine {
            config,
            walker,
            rules,
            evaluator,
            contexts,
            dispatcher,
            navigator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Reference Closure
    // =========================================================================

    /// Items reachable from `item` through the configured references.
    pub fn closure(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        self.walker.closure(item)
    }

    pub fn closure_with_depth(&self, item: &VersionedItem, max_depth: usize) -> Vec<VersionedItem> {
        self.walker.closure_with_depth(item, max_depth)
    }

    /// Drops every memoized descriptor set (e.g. after a schema reload).
    pub fn invalidate_descriptor_cache(&self) {
        self.walker.invalidate_all();
    }

    /// Drops the memoized descriptor sets involving one type.
    pub fn invalidate_descriptors_for(&self, type_code: &TypeCode) {
        self.walker.invalidate(type_code);
    }

    // =========================================================================
    // Rules
    // =========================================================================

    pub fn applicable_rules(&self, item: &VersionedItem, ctx: &AccessContext) -> RuleSet {
        self.rules.applicable_rules(item, ctx)
    }

    pub fn rules_for_scope(
        &self,
        scope: RuleScope<'_>,
        type_filter: Option<&TypeCode>,
        ctx: &AccessContext,
    ) -> RuleSet {
        self.rules.rules_for_scope(scope, type_filter, ctx)
    }

    pub fn rule_summary(&self, items: &[VersionedItem], ctx: &AccessContext) -> RuleSummary {
        self.rules.rule_summary(items, ctx)
    }

    pub fn has_multiple_rules(&self, items: &[VersionedItem]) -> bool {
        self.rules.has_multiple_rules(items)
    }

    pub fn version_synchronized_at_least_once(&self, version: &VersionId) -> bool {
        self.rules.version_synchronized_at_least_once(version)
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Aggregated push status.
    pub fn status(&self, item: &VersionedItem, ctx: &AccessContext) -> SyncStatus {
        self.evaluator.status(item, ctx)
    }

    pub fn evaluate(&self, item: &VersionedItem, ctx: &AccessContext) -> PushEvaluation {
        self.evaluator.evaluate(item, ctx)
    }

    pub fn pull_status(&self, target: &VersionedItem, ctx: &AccessContext) -> PullEvaluation {
        self.evaluator.pull_status(target, ctx)
    }

    /// Codes of the given rules the item and its closure are in sync under.
    pub fn in_sync_rule_codes(
        &self,
        rules: &[SyncRule],
        item: &VersionedItem,
        ctx: &AccessContext,
    ) -> Vec<String> {
        self.evaluator.in_sync_rule_codes(rules, item, ctx)
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    pub fn sync_context(&self, item: &VersionedItem, ctx: &AccessContext) -> SyncContext {
        self.contexts.push(item, ctx)
    }

    pub fn pull_context(&self, target: &VersionedItem, ctx: &AccessContext) -> SyncContext {
        self.contexts.pull(target, ctx)
    }

    /// Push contexts for several items, in input order.
    pub fn sync_contexts(&self, items: &[VersionedItem], ctx: &AccessContext) -> Vec<SyncContext> {
        items.iter().map(|item| self.contexts.push(item, ctx)).collect()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub fn dispatch(
        &self,
        request: DispatchRequest,
        ctx: &AccessContext,
    ) -> SyncResult<DispatchReport> {
        self.dispatcher.dispatch(request, ctx)
    }

    pub fn dispatch_versions(
        &self,
        versions: &[VersionId],
        rule_ids: Option<&[RuleId]>,
        target: Option<&VersionId>,
        qualifier: Option<&str>,
        ctx: &AccessContext,
    ) -> SyncResult<DispatchReport> {
        self.dispatcher
            .dispatch_versions(versions, rule_ids, target, qualifier, ctx)
    }

    /// Re-synchronizes target-side items from their single pull source.
    ///
    /// Sources are grouped by the target's version and dispatched toward it.
    pub fn dispatch_pull(
        &self,
        targets: &[VersionedItem],
        ctx: &AccessContext,
    ) -> SyncResult<DispatchReport> {
        let mut groups: BTreeMap<VersionId, Vec<ItemInput>> = BTreeMap::new();
        for target in targets {
            let Some(version) = &target.version else {
                debug!(item = %target.key, "Pull target has no replica version");
                continue;
            };
            let context = self.contexts.pull(target, ctx);
            match context.source_items.as_slice() {
                [source] => groups
                    .entry(version.clone())
                    .or_default()
                    .push(ItemInput::Item(source.clone())),
                _ => debug!(item = %target.key, "No single pull source"),
            }
        }

        let mut report = DispatchReport::default();
        for (version, sources) in groups {
            let request = DispatchRequest {
                items: sources,
                target: Some(version),
                ..DispatchRequest::default()
            };
            report.merge(self.dispatcher.dispatch(request, ctx)?);
        }
        Ok(report)
    }

    // =========================================================================
    // Ledger Navigation
    // =========================================================================

    pub fn sync_sources(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        self.navigator.sync_sources(item)
    }

    pub fn sync_targets(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        self.navigator.sync_targets(item)
    }

    pub fn sync_sources_and_targets(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        self.navigator.sync_sources_and_targets(item)
    }

    pub fn last_target_sync_time(&self, item: &VersionedItem) -> Option<DateTime<Utc>> {
        self.navigator.last_target_sync_time(item)
    }
}
