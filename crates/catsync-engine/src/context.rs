//! # Sync Context
//!
//! One value object per query, bundling what a caller needs to render an
//! item's synchronization state.
//!
//! ```text
//!   push(item)                         pull(target)
//!   ──────────                         ────────────
//!   source_versions = {item.version}   source_versions = {source.version}
//!   rules           = applicable       rules           = (empty)
//!   push_status     = aggregated       push_status     = NOT_AVAILABLE
//!   pull_status     = NOT_AVAILABLE    pull_status     = ledger comparison
//!   affected_items  = counterparts     source_items    = 0 or 1 item
//!                     ∪ closure
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use catsync_core::{AccessContext, ItemKey, RuleSet, SyncStatus, VersionId, VersionedItem};

use crate::evaluator::ConsistencyEvaluator;
use crate::rules::RuleSelector;

/// Synchronization state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncContext {
    pub item: ItemKey,
    pub pull_status: SyncStatus,
    pub source_versions: BTreeSet<VersionId>,
    pub rules: RuleSet,
    pub push_status: SyncStatus,

    /// Resolved pull source; never more than one.
    pub source_items: Vec<VersionedItem>,

    pub affected_items: Vec<VersionedItem>,
}

impl SyncContext {
    fn empty(item: &VersionedItem) -> Self {
        SyncContext {
            item: item.key,
            pull_status: SyncStatus::NotAvailable,
            source_versions: BTreeSet::new(),
            rules: RuleSet::default(),
            push_status: SyncStatus::NotAvailable,
            source_items: Vec::new(),
            affected_items: Vec::new(),
        }
    }

    /// The single pull source, if one was resolved.
    pub fn source_item(&self) -> Option<&VersionedItem> {
        self.source_items.first()
    }
}

/// Assembles [`SyncContext`]s from the evaluator and the rule selector.
pub struct SyncContextBuilder {
    evaluator: Arc<ConsistencyEvaluator>,
    rules: Arc<RuleSelector>,
}

impl SyncContextBuilder {
    pub fn new(evaluator: Arc<ConsistencyEvaluator>, rules: Arc<RuleSelector>) -> Self {
        SyncContextBuilder { evaluator, rules }
    }

    /// Push-direction context.
    pub fn push(&self, item: &VersionedItem, ctx: &AccessContext) -> SyncContext {
        let evaluation = self.evaluator.evaluate(item, ctx);
        SyncContext {
            source_versions: item.version.iter().cloned().collect(),
            rules: self.rules.applicable_rules(item, ctx),
            push_status: evaluation.status,
            affected_items: evaluation.affected,
            ..SyncContext::empty(item)
        }
    }

    /// Pull-direction context for a target-side item.
    pub fn pull(&self, target: &VersionedItem, ctx: &AccessContext) -> SyncContext {
        let pull = self.evaluator.pull_status(target, ctx);
        let source_versions = pull
            .source
            .iter()
            .filter_map(|source| source.version.clone())
            .collect();
        SyncContext {
            pull_status: pull.status,
            source_versions,
            source_items: pull.source.into_iter().collect(),
            ..SyncContext::empty(target)
        }
    }
}
