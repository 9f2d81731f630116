//! # Sync Dispatcher
//!
//! Pools items by resolved rule and submits one execution per pool to the
//! job runtime.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Dispatch Flow                                  │
//! │                                                                         │
//! │  inputs ──► normalize (unrecognized: warn, drop)                       │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  working set = inputs ∪ closure(input)   (closure once per input)      │
//! │                │                                                        │
//! │       ┌────────┴─────────────────────────┐                              │
//! │       ▼                                  ▼                              │
//! │  single-rule mode                   multi-rule mode                     │
//! │  (no rule ids)                      (explicit rule ids)                 │
//! │  item ──► default rule or           rule ──► items whose version        │
//! │           rule toward target                  declares it               │
//! │  skip never-synced versions         skip never-synced versions          │
//! │       └────────┬─────────────────────────┘                              │
//! │                ▼                                                        │
//! │  per pool:  new_execution(rule)                                        │
//! │             hierarchical ──► add_with_descendants (elevated, once)     │
//! │             flat ──────────► pending items (bulk for version sync)     │
//! │             submit(execution, RuleCompletionAdapter)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Submission returns once the runtime has queued the execution; job
//! outcomes are never awaited here.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use catsync_core::{
    AccessContext, CompletionInfo, CoreError, EntityKind, Execution, ExecutionConfigurator,
    ExecutionId, ExecutionKind, ItemKey, JobRuntime, PendingItem, RuleId, SyncRule, VersionId,
    VersionedItem,
};

use crate::error::{SyncError, SyncResult};
use crate::rules::RuleSelector;
use crate::walker::ReferenceWalker;
use crate::Collaborators;

// =============================================================================
// Inputs
// =============================================================================

/// A raw dispatch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemInput {
    /// An already resolved item.
    Item(VersionedItem),

    /// An item key, resolved through the catalog.
    Key(ItemKey),

    /// Anything else the caller could not classify.
    Unrecognized(String),
}

impl From<VersionedItem> for ItemInput {
    fn from(item: VersionedItem) -> Self {
        ItemInput::Item(item)
    }
}

impl From<ItemKey> for ItemInput {
    fn from(key: ItemKey) -> Self {
        ItemInput::Key(key)
    }
}

/// What to dispatch and toward which rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRequest {
    pub items: Vec<ItemInput>,

    /// Explicit rules (multi-rule mode). `None` resolves one rule per item.
    pub rule_ids: Option<Vec<RuleId>>,

    /// Target version for single-rule resolution.
    pub target: Option<VersionId>,

    /// Rule code narrowing single-rule resolution toward `target`.
    pub qualifier: Option<String>,
}

impl DispatchRequest {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemInput>,
    {
        DispatchRequest {
            items: items.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_rules<I, R>(mut self, rule_ids: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RuleId>,
    {
        self.rule_ids = Some(rule_ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn toward(mut self, target: impl Into<VersionId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

// =============================================================================
// Report
// =============================================================================

/// One submitted execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedExecution {
    pub execution: ExecutionId,
    pub rule: RuleId,
    pub kind: ExecutionKind,

    /// Flat items queued as pending items.
    pub items: Vec<ItemKey>,

    /// Hierarchical roots queued with their descendants.
    pub hierarchical_roots: Vec<ItemKey>,
}

/// Outcome of a dispatch call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub submitted: Vec<SubmittedExecution>,

    /// Inputs that could not be normalized.
    pub dropped_inputs: usize,

    /// Items left out of every pool.
    pub skipped: Vec<ItemKey>,

    /// Pools the runtime refused, with the reason.
    pub failed: Vec<(RuleId, String)>,
}

impl DispatchReport {
    /// Every item queued on a submitted execution.
    pub fn dispatched_items(&self) -> BTreeSet<ItemKey> {
        self.submitted
            .iter()
            .flat_map(|s| s.items.iter().chain(&s.hierarchical_roots))
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }

    /// Appends another report.
    pub fn merge(&mut self, other: DispatchReport) {
        self.submitted.extend(other.submitted);
        self.dropped_inputs += other.dropped_inputs;
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }
}

// =============================================================================
// Completion Adapter
// =============================================================================

/// Configurator attached to every execution: logs the configuration and
/// forwards completion queries to the runtime.
pub struct RuleCompletionAdapter {
    rule: SyncRule,
    execution: ExecutionId,
    jobs: Arc<dyn JobRuntime>,
}

impl RuleCompletionAdapter {
    pub fn new(rule: SyncRule, execution: ExecutionId, jobs: Arc<dyn JobRuntime>) -> Self {
        RuleCompletionAdapter {
            rule,
            execution,
            jobs,
        }
    }
}

impl ExecutionConfigurator for RuleCompletionAdapter {
    fn configure(&self, execution: &Execution) {
        info!(
            rule = %self.rule.id,
            execution = %execution.id,
            "Using default synchronization configuration"
        );
    }

    fn completion_info(&self) -> Option<CompletionInfo> {
        debug!(rule = %self.rule.id, execution = %self.execution, "Completion info requested");
        self.jobs.completion_info(self.execution)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Batches items into rule executions.
pub struct SyncDispatcher {
    ports: Collaborators,
    rules: Arc<RuleSelector>,
    walker: Arc<ReferenceWalker>,
    disable_restrictions: bool,
}

impl SyncDispatcher {
    pub fn new(
        ports: Collaborators,
        rules: Arc<RuleSelector>,
        walker: Arc<ReferenceWalker>,
        disable_restrictions: bool,
    ) -> Self {
        SyncDispatcher {
            ports,
            rules,
            walker,
            disable_restrictions,
        }
    }

    /// Dispatches items and their closures.
    ///
    /// Only a stopped runtime aborts the call; every other problem is
    /// logged and reported.
    pub fn dispatch(
        &self,
        request: DispatchRequest,
        ctx: &AccessContext,
    ) -> SyncResult<DispatchReport> {
        let mut report = DispatchReport::default();
        if request.items.is_empty() {
            return Ok(report);
        }

        let working = self.working_set(request.items, &mut report);
        let pools = match &request.rule_ids {
            None => self.single_rule_pools(
                &working,
                request.target.as_ref(),
                request.qualifier.as_deref(),
                ctx,
                &mut report,
            ),
            Some(rule_ids) => self.multi_rule_pools(&working, rule_ids, ctx, &mut report),
        };

        for (rule, items) in pools {
            self.submit_pool(&rule, items, ctx, &mut report)?;
        }
        Ok(report)
    }

    /// Full-version executions with no pending items.
    ///
    /// With explicit rule ids, one execution per rule declared by one of the
    /// versions; otherwise one per version's resolved rule.
    pub fn dispatch_versions(
        &self,
        versions: &[VersionId],
        rule_ids: Option<&[RuleId]>,
        target: Option<&VersionId>,
        qualifier: Option<&str>,
        ctx: &AccessContext,
    ) -> SyncResult<DispatchReport> {
        for version in versions {
            if self.ports.catalog.version(version).is_none() {
                return Err(SyncError::UnknownVersion(version.clone()));
            }
        }

        let mut rules: BTreeMap<RuleId, SyncRule> = BTreeMap::new();
        match rule_ids {
            Some(rule_ids) => {
                for id in rule_ids {
                    let rule = self
                        .ports
                        .catalog
                        .rule(id)
                        .ok_or_else(|| SyncError::UnknownRule(id.clone()))?;
                    if versions.contains(&rule.source_version) {
                        rules.insert(rule.id.clone(), rule);
                    } else {
                        debug!(rule = %id, "Rule does not belong to a requested version");
                    }
                }
            }
            None => {
                for version in versions {
                    match self.rules.resolve_single_rule(version, target, qualifier) {
                        Some(rule) => {
                            rules.insert(rule.id.clone(), rule);
                        }
                        None => warn!(version = %version, "No rule resolved for version"),
                    }
                }
            }
        }

        let mut report = DispatchReport::default();
        for rule in rules.into_values() {
            if !self.rules.is_authorized(ctx.principal(), &rule) {
                warn!(rule = %rule.id, principal = %ctx.principal().id, "Not authorized to run rule");
                continue;
            }
            let execution = self.ports.jobs.new_execution(&rule);
            self.submit(&rule, execution, Vec::new(), Vec::new(), &mut report)?;
        }
        Ok(report)
    }

    // =========================================================================
    // Working Set
    // =========================================================================

    fn working_set(
        &self,
        inputs: Vec<ItemInput>,
        report: &mut DispatchReport,
    ) -> BTreeMap<ItemKey, VersionedItem> {
        let mut working = BTreeMap::new();
        for input in inputs {
            let item = match input {
                ItemInput::Item(item) => item,
                ItemInput::Key(key) => match self.ports.catalog.item(key) {
                    Some(item) => item,
                    None => {
                        warn!(item = %key, "Dropping unknown item from dispatch");
                        report.dropped_inputs += 1;
                        continue;
                    }
                },
                ItemInput::Unrecognized(raw) => {
                    warn!(input = %raw, "Dropping unrecognized dispatch input");
                    report.dropped_inputs += 1;
                    continue;
                }
            };

            for member in self.walker.closure(&item) {
                working.entry(member.key).or_insert(member);
            }
            working.insert(item.key, item);
        }
        working
    }

    // =========================================================================
    // Pools
    // =========================================================================

    fn single_rule_pools(
        &self,
        working: &BTreeMap<ItemKey, VersionedItem>,
        target: Option<&VersionId>,
        qualifier: Option<&str>,
        ctx: &AccessContext,
        report: &mut DispatchReport,
    ) -> Vec<(SyncRule, Vec<VersionedItem>)> {
        let mut pools: BTreeMap<RuleId, (SyncRule, Vec<VersionedItem>)> = BTreeMap::new();
        let mut resolved: BTreeMap<VersionId, Option<SyncRule>> = BTreeMap::new();

        for item in working.values() {
            let Some(version) = &item.version else {
                debug!(item = %item.key, "Skipping item without replica version");
                report.skipped.push(item.key);
                continue;
            };

            let rule = resolved
                .entry(version.clone())
                .or_insert_with(|| self.resolve_for_version(version, target, qualifier, ctx));
            let Some(rule) = rule else {
                report.skipped.push(item.key);
                continue;
            };

            pools
                .entry(rule.id.clone())
                .or_insert_with(|| (rule.clone(), Vec::new()))
                .1
                .push(item.clone());
        }

        pools.into_values().collect()
    }

    fn resolve_for_version(
        &self,
        version: &VersionId,
        target: Option<&VersionId>,
        qualifier: Option<&str>,
        ctx: &AccessContext,
    ) -> Option<SyncRule> {
        if !self.rules.version_synchronized_at_least_once(version) {
            debug!(version = %version, "Version never synchronized, skipping its items");
            return None;
        }
        let Some(rule) = self.rules.resolve_single_rule(version, target, qualifier) else {
            warn!(
                version = %version,
                target = ?target.map(VersionId::as_str),
                qualifier = ?qualifier,
                "No synchronization rule resolved"
            );
            return None;
        };
        if !self.rules.is_authorized(ctx.principal(), &rule) {
            warn!(rule = %rule.id, principal = %ctx.principal().id, "Not authorized to run rule");
            return None;
        }
        Some(rule)
    }

    fn multi_rule_pools(
        &self,
        working: &BTreeMap<ItemKey, VersionedItem>,
        rule_ids: &[RuleId],
        ctx: &AccessContext,
        report: &mut DispatchReport,
    ) -> Vec<(SyncRule, Vec<VersionedItem>)> {
        let mut pools = Vec::new();
        let mut pooled = BTreeSet::new();

        for id in rule_ids {
            let Some(rule) = self.ports.catalog.rule(id) else {
                warn!(rule = %id, "Unknown rule in dispatch request");
                continue;
            };
            if !self.rules.is_authorized(ctx.principal(), &rule) {
                warn!(rule = %id, principal = %ctx.principal().id, "Not authorized to run rule");
                continue;
            }

            let items: Vec<VersionedItem> = working
                .values()
                .filter(|item| self.declares_and_synchronized(item, &rule))
                .cloned()
                .collect();
            if items.is_empty() {
                debug!(rule = %id, "No items for rule");
                continue;
            }
            pooled.extend(items.iter().map(|item| item.key));
            pools.push((rule, items));
        }

        report
            .skipped
            .extend(working.keys().filter(|key| !pooled.contains(*key)));
        pools
    }

    fn declares_and_synchronized(&self, item: &VersionedItem, rule: &SyncRule) -> bool {
        let Some(version) = &item.version else {
            return false;
        };
        self.rules.version_synchronized_at_least_once(version)
            && self
                .ports
                .catalog
                .version(version)
                .is_some_and(|replica| replica.declares(&rule.id))
    }

    // =========================================================================
    // Submission
    // =========================================================================

    fn submit_pool(
        &self,
        rule: &SyncRule,
        items: Vec<VersionedItem>,
        ctx: &AccessContext,
        report: &mut DispatchReport,
    ) -> SyncResult<()> {
        let mut execution = self.ports.jobs.new_execution(rule);

        let (hierarchical, flat): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| item.kind == EntityKind::Hierarchical);
        let roots: Vec<ItemKey> = hierarchical.iter().map(|item| item.key).collect();
        let flat: Vec<ItemKey> = flat.iter().map(|item| item.key).collect();

        if !roots.is_empty() {
            let scope = ctx.elevate(self.disable_restrictions);
            self.ports
                .jobs
                .add_with_descendants(&mut execution, roots.clone(), &scope);
        }

        if !flat.is_empty() {
            let pending: Vec<PendingItem> =
                flat.iter().copied().map(PendingItem::all_locales).collect();
            match execution.kind {
                ExecutionKind::VersionSync => {
                    self.ports
                        .jobs
                        .add_pending_items_versioned(&mut execution, pending)
                }
                ExecutionKind::Generic => self.ports.jobs.add_pending_items(&mut execution, pending),
            }
        }

        self.submit(rule, execution, flat, roots, report)
    }

    fn submit(
        &self,
        rule: &SyncRule,
        execution: Execution,
        items: Vec<ItemKey>,
        hierarchical_roots: Vec<ItemKey>,
        report: &mut DispatchReport,
    ) -> SyncResult<()> {
        let kind = execution.kind;
        let adapter =
            RuleCompletionAdapter::new(rule.clone(), execution.id, Arc::clone(&self.ports.jobs));

        match self.ports.jobs.submit(execution, Box::new(adapter)) {
            Ok(id) => {
                info!(
                    rule = %rule.id,
                    execution = %id,
                    items = items.len(),
                    hierarchical = hierarchical_roots.len(),
                    "Submitted synchronization execution"
                );
                report.submitted.push(SubmittedExecution {
                    execution: id,
                    rule: rule.id.clone(),
                    kind,
                    items,
                    hierarchical_roots,
                });
                Ok(())
            }
            Err(CoreError::RuntimeStopped) => Err(SyncError::ShuttingDown),
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "Execution submission failed");
                report.failed.push((rule.id.clone(), e.to_string()));
                Ok(())
            }
        }
    }
}
