//! # Ports
//!
//! Interfaces to the collaborators the engine consumes but does not own.
//!
//! ## Collaborators
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         catsync-engine                                  │
//! │                                                                         │
//! │      ┌──────────────┬──────────────┬──────────────┬──────────────┐     │
//! │      ▼              ▼              ▼              ▼              ▼     │
//! │  Catalog       Timestamp       Value          Authorizer     Job        │
//! │  Repository    Ledger          Reader                        Runtime    │
//! │  ──────────    ──────────      ──────────     ──────────     ────────   │
//! │  items         find            locales        is_admin       new exec   │
//! │  versions      by target       read attr      can_sync       pending    │
//! │  rules         by source                                     submit     │
//! │  counterpart   per rule                                      history    │
//! │                                                                         │
//! │  + SchemaRegistry (see schema.rs)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All ports are `Send + Sync` and used through `Arc<dyn _>`; queries may run
//! concurrently for independent items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::{AccessContext, Principal};
use crate::error::CoreResult;
use crate::schema::AttributeDescriptor;
use crate::types::{
    ExecutionId, ItemKey, Locale, PendingItem, ReplicaVersion, RuleId, SyncRule, SyncTimestamp,
    VersionId, VersionedItem,
};
use crate::value::AttributeValue;

// =============================================================================
// Catalog Repository
// =============================================================================

/// Read access to items, versions and rules.
pub trait CatalogRepository: Send + Sync {
    fn item(&self, key: ItemKey) -> Option<VersionedItem>;

    fn version(&self, id: &VersionId) -> Option<ReplicaVersion>;

    fn rule(&self, id: &RuleId) -> Option<SyncRule>;

    /// The item corresponding to `item` in `target`. Items hidden by
    /// visibility restrictions are only returned when
    /// `ctx.restrictions_disabled()`.
    fn counterpart(
        &self,
        item: &VersionedItem,
        target: &VersionId,
        ctx: &AccessContext,
    ) -> Option<VersionedItem>;
}

// =============================================================================
// Timestamp Ledger
// =============================================================================

/// Records of which source/target pairs were synchronized, and when.
pub trait TimestampLedger: Send + Sync {
    fn find(&self, source: ItemKey, target: ItemKey, rule: &RuleId) -> Option<DateTime<Utc>>;

    /// Records whose target is `target`.
    fn find_by_target(&self, target: ItemKey) -> Vec<SyncTimestamp>;

    /// Records whose source is `source`.
    fn find_by_source(&self, source: ItemKey) -> Vec<SyncTimestamp>;

    /// True if the rule has written at least one record.
    fn has_records_for_rule(&self, rule: &RuleId) -> bool;
}

// =============================================================================
// Value Reader
// =============================================================================

/// Attribute value access, used for reference attributes only.
pub trait ValueReader: Send + Sync {
    /// Locales localized attributes are read for.
    fn available_locales(&self) -> Vec<Locale>;

    /// Reads the current value. `locale` is set for localized attributes.
    fn read_attribute(
        &self,
        item: &VersionedItem,
        attribute: &AttributeDescriptor,
        locale: Option<&Locale>,
    ) -> CoreResult<AttributeValue>;
}

// =============================================================================
// Authorizer
// =============================================================================

/// Authorization decisions. Only the call contract is used here.
pub trait Authorizer: Send + Sync {
    fn is_admin(&self, principal: &Principal) -> bool;

    fn can_sync(&self, principal: &Principal, rule: &SyncRule) -> bool;
}

// =============================================================================
// Job Runtime
// =============================================================================

/// Execution flavour chosen by the runtime for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    /// Version-aware execution with a bulk pending-item API.
    VersionSync,

    /// Generic execution.
    Generic,
}

/// One run of a rule, populated by the dispatcher before submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub rule: RuleId,
    pub kind: ExecutionKind,

    /// Explicit (item, slot) pairs for flat entities.
    #[serde(default)]
    pub pending: Vec<PendingItem>,

    /// Roots of hierarchical entities.
    #[serde(default)]
    pub hierarchical_roots: Vec<ItemKey>,

    /// Whether `hierarchical_roots` include their descendants.
    #[serde(default)]
    pub include_descendants: bool,
}

impl Execution {
    pub fn new(rule: RuleId, kind: ExecutionKind) -> Self {
        Execution {
            id: ExecutionId::generate(),
            rule,
            kind,
            pending: Vec::new(),
            hierarchical_roots: Vec::new(),
            include_descendants: false,
        }
    }

    /// True if nothing item-specific was queued (a full-version run).
    pub fn is_full_run(&self) -> bool {
        self.pending.is_empty() && self.hierarchical_roots.is_empty()
    }
}

/// Progress of a submitted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompletionInfo {
    pub finished: bool,
    pub items_done: usize,
    pub items_failed: usize,
}

/// Hook attached to an execution before submission.
pub trait ExecutionConfigurator: Send + Sync {
    /// Called by the runtime when the execution starts.
    fn configure(&self, execution: &Execution);

    /// Completion progress of the execution this configurator belongs to.
    fn completion_info(&self) -> Option<CompletionInfo>;
}

/// The external job-execution runtime.
pub trait JobRuntime: Send + Sync {
    fn new_execution(&self, rule: &SyncRule) -> Execution;

    /// Generic pending-item API.
    fn add_pending_items(&self, execution: &mut Execution, items: Vec<PendingItem>);

    /// Bulk variant for [`ExecutionKind::VersionSync`] executions.
    fn add_pending_items_versioned(&self, execution: &mut Execution, items: Vec<PendingItem>);

    /// Adds hierarchical roots together with their descendants. Called inside
    /// an elevated read scope.
    fn add_with_descendants(
        &self,
        execution: &mut Execution,
        roots: Vec<ItemKey>,
        ctx: &AccessContext,
    );

    /// Queues the execution for asynchronous run and returns immediately.
    fn submit(
        &self,
        execution: Execution,
        configurator: Box<dyn ExecutionConfigurator>,
    ) -> CoreResult<ExecutionId>;

    fn completion_info(&self, execution: ExecutionId) -> Option<CompletionInfo>;

    /// Completed executions recorded for the rule.
    fn completed_executions(&self, rule: &RuleId) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_execution_is_full_run() {
        let mut execution = Execution::new(RuleId::new("r1"), ExecutionKind::Generic);
        assert!(execution.is_full_run());
        execution.pending.push(PendingItem::all_locales(ItemKey::new(1)));
        assert!(!execution.is_full_run());
    }
}
