//! # Rule Selector & Permission Gate
//!
//! Enumerates the rules that apply to an item or a version and partitions
//! them for the acting principal.
//!
//! ## Partition
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Rules of the item's version                        │
//! │                                                                         │
//! │   authorized? ── no ──► dropped (absent from both lists)               │
//! │        │ yes                                                            │
//! │   type applicable? ── no ──► dropped                                   │
//! │        │ yes                                                            │
//! │   ever executed? ── no ──► forbidden   (needs an initial run)          │
//! │        │ yes                                                            │
//! │   has a target? ── no ──► dropped                                      │
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │    accessible                                                           │
//! │                                                                         │
//! │   Version scope skips the "ever executed" gate.                        │
//! │   Administrators pass the authorization check for every rule.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use catsync_core::{
    AccessContext, Principal, RuleId, RuleSet, SyncRule, TypeCode, VersionId, VersionedItem,
};

use crate::config::InitialSyncCheck;
use crate::Collaborators;

/// What rules are listed for.
#[derive(Debug, Clone, Copy)]
pub enum RuleScope<'a> {
    /// A whole replica version. Never-run rules count as accessible.
    Version(&'a VersionId),

    /// A single item. Never-run rules are forbidden.
    Item(&'a VersionedItem),
}

/// Rule labels collected over several inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub accessible: BTreeMap<RuleId, String>,
    pub forbidden: BTreeMap<RuleId, String>,
}

/// Rule applicability and authorization.
pub struct RuleSelector {
    ports: Collaborators,
    check: InitialSyncCheck,
}

impl RuleSelector {
    pub fn new(ports: Collaborators, check: InitialSyncCheck) -> Self {
        RuleSelector { ports, check }
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Administrators may run every rule; others need an explicit grant.
    pub fn is_authorized(&self, principal: &Principal, rule: &SyncRule) -> bool {
        self.ports.authorizer.is_admin(principal) || self.ports.authorizer.can_sync(principal, rule)
    }

    /// True if the rule has completed at least one run.
    pub fn ever_executed(&self, rule: &SyncRule) -> bool {
        match self.check {
            InitialSyncCheck::Timestamps => self.ports.ledger.has_records_for_rule(&rule.id),
            InitialSyncCheck::Executions => self.ports.jobs.completed_executions(&rule.id) > 0,
        }
    }

    /// True if `type_code` is assignable to one of the rule's root types.
    pub fn is_type_applicable(&self, rule: &SyncRule, type_code: &TypeCode) -> bool {
        rule.root_types
            .iter()
            .any(|root| self.ports.schema.is_assignable(type_code, root))
    }

    /// True if any rule of the version has completed a run.
    pub fn version_synchronized_at_least_once(&self, version: &VersionId) -> bool {
        self.rules_of(version).iter().any(|rule| self.ever_executed(rule))
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    /// Outgoing rules of a version, in declaration order.
    pub fn rules_of(&self, version: &VersionId) -> Vec<SyncRule> {
        let Some(replica) = self.ports.catalog.version(version) else {
            trace!(version = %version, "Unknown replica version");
            return Vec::new();
        };
        replica
            .rules
            .iter()
            .filter_map(|id| {
                let rule = self.ports.catalog.rule(id);
                if rule.is_none() {
                    debug!(version = %version, rule = %id, "Declared rule not found");
                }
                rule
            })
            .collect()
    }

    /// Rules of the item's version applicable to its type.
    pub fn type_applicable_rules(&self, item: &VersionedItem) -> Vec<SyncRule> {
        let Some(version) = &item.version else {
            return Vec::new();
        };
        self.rules_of(version)
            .into_iter()
            .filter(|rule| self.is_type_applicable(rule, &item.type_code))
            .collect()
    }

    /// Partitions the rules of a scope into accessible and forbidden.
    ///
    /// `type_filter` narrows the rules to those applicable to that type; for
    /// item scope it defaults to the item's own type.
    pub fn rules_for_scope(
        &self,
        scope: RuleScope<'_>,
        type_filter: Option<&TypeCode>,
        ctx: &AccessContext,
    ) -> RuleSet {
        let (version, type_filter, gate) = match scope {
            RuleScope::Version(version) => (Some(version), type_filter, false),
            RuleScope::Item(item) => (
                item.version.as_ref(),
                Some(type_filter.unwrap_or(&item.type_code)),
                true,
            ),
        };

        let mut set = RuleSet::default();
        let Some(version) = version else {
            return set;
        };

        for rule in self.rules_of(version) {
            if !self.is_authorized(ctx.principal(), &rule) {
                trace!(rule = %rule.id, principal = %ctx.principal().id, "Rule not authorized");
                continue;
            }
            if let Some(type_code) = type_filter {
                if !self.is_type_applicable(&rule, type_code) {
                    continue;
                }
            }
            if gate && !self.ever_executed(&rule) {
                set.forbidden.push(rule);
                continue;
            }
            if rule.target_version.is_none() {
                debug!(rule = %rule.id, "Rule without target version");
                continue;
            }
            set.accessible.push(rule);
        }
        set
    }

    /// Accessible and forbidden rules for one item.
    pub fn applicable_rules(&self, item: &VersionedItem, ctx: &AccessContext) -> RuleSet {
        self.rules_for_scope(RuleScope::Item(item), None, ctx)
    }

    /// Rule labels over many items. A rule accessible for any item is not
    /// listed as forbidden.
    pub fn rule_summary(&self, items: &[VersionedItem], ctx: &AccessContext) -> RuleSummary {
        let mut summary = RuleSummary::default();
        for item in items {
            let set = self.applicable_rules(item, ctx);
            for rule in set.accessible {
                summary.forbidden.remove(&rule.id);
                let label = rule.label();
                summary.accessible.insert(rule.id, label);
            }
            for rule in set.forbidden {
                if !summary.accessible.contains_key(&rule.id) {
                    let label = rule.label();
                    summary.forbidden.insert(rule.id, label);
                }
            }
        }
        summary
    }

    /// True if any item's version declares more than one outgoing rule.
    pub fn has_multiple_rules(&self, items: &[VersionedItem]) -> bool {
        items.iter().any(|item| {
            item.version
                .as_ref()
                .and_then(|version| self.ports.catalog.version(version))
                .is_some_and(|replica| replica.rules.len() > 1)
        })
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// The single rule an item of `version` synchronizes with.
    ///
    /// - no target: the version's sole outgoing rule, if there is exactly one
    /// - target: the first rule toward it, matching `qualifier` when given
    pub fn resolve_single_rule(
        &self,
        version: &VersionId,
        target: Option<&VersionId>,
        qualifier: Option<&str>,
    ) -> Option<SyncRule> {
        let rules = self.rules_of(version);
        match target {
            None => {
                if rules.len() == 1 {
                    rules.into_iter().next()
                } else {
                    debug!(
                        version = %version,
                        rules = rules.len(),
                        "No default rule: version needs a target"
                    );
                    None
                }
            }
            Some(target) => rules.into_iter().find(|rule| {
                rule.target_version.as_ref() == Some(target)
                    && qualifier.map_or(true, |code| rule.code == code)
            }),
        }
    }

    /// First rule from `source` toward `target`.
    pub fn rule_between(&self, source: &VersionId, target: &VersionId) -> Option<SyncRule> {
        self.resolve_single_rule(source, Some(target), None)
    }
}
