//! # Consistency Evaluator
//!
//! Per-item push status, closure aggregation and the pull-direction status
//! of a target-side item.
//!
//! ## Push Direction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        own status of item I                             │
//! │                                                                         │
//! │  I has no version ─────────────────────────────► NOT_AVAILABLE         │
//! │  no rule applicable to I's type ───────────────► NOT_AVAILABLE         │
//! │  no applicable rule ever executed ─────────────► NEEDS_INITIAL_SYNC    │
//! │  no authorized executed rule ──────────────────► NOT_AVAILABLE         │
//! │                                                                         │
//! │  for each authorized, executed rule R (elevated scope):                │
//! │     counterpart C of I in R.target   missing ──► NOT_OK (stop)         │
//! │     ledger(I, C, R)                  missing ──► NOT_OK (stop)         │
//! │     ledger time < I.modified_at              ──► NOT_OK (stop)         │
//! │  all rules passed ─────────────────────────────► OK                    │
//! │                                                                         │
//! │  aggregated = NOT_OK if any closure member's own status is NOT_OK,     │
//! │               unless I has no version or no applicable rule            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pull Direction
//! The ledger is read backwards from the target item. Several distinct
//! sources resolve to the lowest item key.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use catsync_core::{AccessContext, ItemKey, SyncRule, SyncStatus, VersionedItem};

use crate::rules::RuleSelector;
use crate::walker::ReferenceWalker;
use crate::Collaborators;

// =============================================================================
// Results
// =============================================================================

/// Push-direction result for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEvaluation {
    /// Status from the item's own rules only.
    pub own_status: SyncStatus,

    /// Own status folded with the closure members' own statuses.
    pub status: SyncStatus,

    /// Counterparts discovered for the item plus every closure member,
    /// sorted by key.
    pub affected: Vec<VersionedItem>,
}

/// Pull-direction result for one target item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullEvaluation {
    pub status: SyncStatus,

    /// The source the status was computed against.
    pub source: Option<VersionedItem>,
}

impl PullEvaluation {
    fn unavailable() -> Self {
        PullEvaluation {
            status: SyncStatus::NotAvailable,
            source: None,
        }
    }
}

struct OwnStatus {
    status: SyncStatus,
    counterparts: Vec<VersionedItem>,
    /// False when the item has no version or no type-applicable rule.
    has_rules: bool,
}

// =============================================================================
// Evaluator
// =============================================================================

/// Computes push and pull statuses.
pub struct ConsistencyEvaluator {
    ports: Collaborators,
    rules: Arc<RuleSelector>,
    walker: Arc<ReferenceWalker>,
    disable_restrictions: bool,
}

impl ConsistencyEvaluator {
    pub fn new(
        ports: Collaborators,
        rules: Arc<RuleSelector>,
        walker: Arc<ReferenceWalker>,
        disable_restrictions: bool,
    ) -> Self {
        ConsistencyEvaluator {
            ports,
            rules,
            walker,
            disable_restrictions,
        }
    }

    /// Aggregated push status.
    pub fn status(&self, item: &VersionedItem, ctx: &AccessContext) -> SyncStatus {
        self.evaluate(item, ctx).status
    }

    /// Push status of the item alone, ignoring its closure.
    pub fn own_status(&self, item: &VersionedItem, ctx: &AccessContext) -> SyncStatus {
        self.own(item, ctx).status
    }

    /// Full push evaluation: own status, aggregated status, affected items.
    pub fn evaluate(&self, item: &VersionedItem, ctx: &AccessContext) -> PushEvaluation {
        let own = self.own(item, ctx);
        let closure = self.walker.closure(item);

        // An item without rules stays NOT_AVAILABLE whatever it references.
        let mut status = own.status;
        if own.has_rules {
            if let Some(member) = closure
                .iter()
                .find(|member| self.own(member, ctx).status.is_not_ok())
            {
                debug!(item = %item.key, referenced = %member.key, "Referenced item out of sync");
                status = SyncStatus::NotOk;
            }
        }

        let affected: BTreeMap<ItemKey, VersionedItem> = own
            .counterparts
            .into_iter()
            .chain(closure)
            .map(|i| (i.key, i))
            .collect();

        PushEvaluation {
            own_status: own.status,
            status,
            affected: affected.into_values().collect(),
        }
    }

    fn own(&self, item: &VersionedItem, ctx: &AccessContext) -> OwnStatus {
        let without_rules = OwnStatus {
            status: SyncStatus::NotAvailable,
            counterparts: Vec::new(),
            has_rules: false,
        };

        if item.version.is_none() {
            trace!(item = %item.key, "Item has no replica version");
            return without_rules;
        }

        let applicable = self.rules.type_applicable_rules(item);
        if applicable.is_empty() {
            return without_rules;
        }

        let executed: Vec<SyncRule> = applicable
            .into_iter()
            .filter(|rule| self.rules.ever_executed(rule))
            .collect();
        if executed.is_empty() {
            return OwnStatus {
                status: SyncStatus::NeedsInitialSync,
                counterparts: Vec::new(),
                has_rules: true,
            };
        }

        let candidates: Vec<SyncRule> = executed
            .into_iter()
            .filter(|rule| self.rules.is_authorized(ctx.principal(), rule))
            .collect();

        let scope = ctx.elevate(self.disable_restrictions);
        let mut counterparts = Vec::new();
        let mut evaluated = 0;
        for rule in &candidates {
            let Some(target) = &rule.target_version else {
                continue;
            };
            evaluated += 1;

            let Some(counterpart) = self.ports.catalog.counterpart(item, target, &scope) else {
                debug!(item = %item.key, rule = %rule.id, "No counterpart in target version");
                return OwnStatus {
                    status: SyncStatus::NotOk,
                    counterparts,
                    has_rules: true,
                };
            };

            let status = self.compare(item, &counterpart, rule);
            counterparts.push(counterpart);
            if status.is_not_ok() {
                return OwnStatus {
                    status,
                    counterparts,
                    has_rules: true,
                };
            }
        }

        OwnStatus {
            status: if evaluated == 0 {
                SyncStatus::NotAvailable
            } else {
                SyncStatus::Ok
            },
            counterparts,
            has_rules: true,
        }
    }

    /// Ledger comparison of a source item against a known counterpart.
    pub fn compare(
        &self,
        source: &VersionedItem,
        counterpart: &VersionedItem,
        rule: &SyncRule,
    ) -> SyncStatus {
        match self.ports.ledger.find(source.key, counterpart.key, &rule.id) {
            None => {
                trace!(item = %source.key, counterpart = %counterpart.key, rule = %rule.id, "Never synchronized");
                SyncStatus::NotOk
            }
            Some(synced_at) if synced_at < source.modified_at => {
                trace!(item = %source.key, %synced_at, modified_at = %source.modified_at, "Modified since last sync");
                SyncStatus::NotOk
            }
            Some(_) => SyncStatus::Ok,
        }
    }

    // =========================================================================
    // Per-Rule Status
    // =========================================================================

    /// Codes of the rules for which the item and every closure member are
    /// up to date. A member without a counterpart in the rule's target
    /// removes the rule.
    pub fn in_sync_rule_codes(
        &self,
        rules: &[SyncRule],
        item: &VersionedItem,
        ctx: &AccessContext,
    ) -> Vec<String> {
        let mut members = vec![item.clone()];
        members.extend(self.walker.closure(item));

        let scope = ctx.elevate(self.disable_restrictions);
        rules
            .iter()
            .filter(|rule| {
                let Some(target) = &rule.target_version else {
                    return false;
                };
                members.iter().all(|member| {
                    self.ports
                        .catalog
                        .counterpart(member, target, &scope)
                        .is_some_and(|counterpart| self.compare(member, &counterpart, rule).is_ok())
                })
            })
            .map(|rule| rule.code.clone())
            .collect()
    }

    // =========================================================================
    // Pull Direction
    // =========================================================================

    /// Status of a target-side item against its source.
    pub fn pull_status(&self, target: &VersionedItem, ctx: &AccessContext) -> PullEvaluation {
        let sources: BTreeSet<ItemKey> = self
            .ports
            .ledger
            .find_by_target(target.key)
            .into_iter()
            .map(|record| record.source_item)
            .collect();

        let Some(source_key) = sources.first().copied() else {
            return PullEvaluation::unavailable();
        };
        if sources.len() > 1 {
            debug!(
                item = %target.key,
                sources = sources.len(),
                chosen = %source_key,
                "Several sync sources, using the lowest key"
            );
        }

        let Some(source) = self.ports.catalog.item(source_key) else {
            debug!(item = %target.key, source = %source_key, "Sync source no longer exists");
            return PullEvaluation::unavailable();
        };

        let (Some(source_version), Some(target_version)) = (&source.version, &target.version)
        else {
            return PullEvaluation::unavailable();
        };
        if source_version == target_version {
            return PullEvaluation::unavailable();
        }

        let Some(rule) = self.rules.rule_between(source_version, target_version) else {
            debug!(source = %source_version, target = %target_version, "No rule between versions");
            return PullEvaluation::unavailable();
        };
        if !self.rules.is_authorized(ctx.principal(), &rule) {
            return PullEvaluation::unavailable();
        }

        PullEvaluation {
            status: self.compare(&source, target, &rule),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReferenceSettings;
    use crate::test_support::{at, editor, World, RULE};
    use catsync_core::Principal;
    use catsync_store::StaticAuthorization;

    fn evaluator(world: &World) -> ConsistencyEvaluator {
        world.evaluator(ReferenceSettings::default())
    }

    #[test]
    fn test_modification_scenario() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        let evaluator = evaluator(&world);

        assert_eq!(evaluator.status(&a, &editor()), SyncStatus::NotOk);

        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(150));
        assert_eq!(evaluator.status(&a, &editor()), SyncStatus::Ok);

        world.catalog.touch(ItemKey::new(1), at(200)).unwrap();
        let a = world.item(1);
        assert_eq!(evaluator.status(&a, &editor()), SyncStatus::NotOk);
    }

    #[test]
    fn test_timestamp_boundary_is_ok() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(100));

        assert_eq!(evaluator(&world).status(&a, &editor()), SyncStatus::Ok);
    }

    #[test]
    fn test_status_is_idempotent() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(120));
        let evaluator = evaluator(&world);

        let first = evaluator.evaluate(&a, &editor());
        let second = evaluator.evaluate(&a, &editor());
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_counterpart_is_not_ok() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        assert_eq!(evaluator(&world).status(&a, &editor()), SyncStatus::NotOk);
    }

    #[test]
    fn test_no_applicable_rule_is_not_available() {
        let world = World::new();
        world.mark_executed(RULE);
        let loose = world.add(VersionedItem::new(ItemKey::new(1), "Item", at(1)).in_version("staged"));
        let unversioned = world.add(VersionedItem::new(ItemKey::new(2), "Product", at(1)));
        let evaluator = evaluator(&world);

        assert_eq!(evaluator.status(&loose, &editor()), SyncStatus::NotAvailable);
        assert_eq!(evaluator.status(&unversioned, &editor()), SyncStatus::NotAvailable);
    }

    #[test]
    fn test_no_rule_is_not_available_regardless_of_closure() {
        let world = World::new();
        world.mark_executed(RULE);
        let item = world.add(VersionedItem::new(ItemKey::new(1), "Item", at(1)).in_version("staged"));
        let media = world.media(2);
        world.set(1, "Item.thumbnail", ItemKey::new(2).into());
        let evaluator = world.evaluator(ReferenceSettings::default().with_type("Item", ["Media"]));

        // The referenced media is out of sync, but the item has no rule.
        assert_eq!(evaluator.own_status(&media, &editor()), SyncStatus::NotOk);
        let evaluation = evaluator.evaluate(&item, &editor());
        assert_eq!(evaluation.status, SyncStatus::NotAvailable);
        assert_eq!(evaluation.affected, vec![media]);
    }

    #[test]
    fn test_never_run_rule_needs_initial_sync() {
        let world = World::new();
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        assert_eq!(evaluator(&world).status(&a, &editor()), SyncStatus::NeedsInitialSync);
    }

    #[test]
    fn test_unauthorized_rules_are_not_available() {
        let world = World::with_authorization(StaticAuthorization::new());
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        assert_eq!(evaluator(&world).status(&a, &editor()), SyncStatus::NotAvailable);
    }

    #[test]
    fn test_restricted_counterpart_found_in_elevated_scope() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.add_restricted(VersionedItem::new(ItemKey::new(101), "Product", at(1)).in_version("online"));
        world.catalog.link_counterpart(ItemKey::new(1), ItemKey::new(101)).unwrap();
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(150));
        let ctx = editor();

        assert_eq!(evaluator(&world).status(&a, &ctx), SyncStatus::Ok);
        assert!(!ctx.restrictions_disabled());

        let mut config = crate::config::EngineConfig::default();
        config.access.disable_restrictions = false;
        let strict = world.evaluator_with(config);
        assert_eq!(strict.status(&a, &ctx), SyncStatus::NotOk);
    }

    #[test]
    fn test_aggregation_with_out_of_sync_reference() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(150));
        world.media(2);
        world.online_copy(2, 102);
        world.set(1, "Product.picture", ItemKey::new(2).into());
        let evaluator = world.evaluator(ReferenceSettings::default().with_type("Product", ["Media"]));

        let evaluation = evaluator.evaluate(&a, &editor());
        assert_eq!(evaluation.own_status, SyncStatus::Ok);
        assert_eq!(evaluation.status, SyncStatus::NotOk);
        let affected: Vec<u64> = evaluation.affected.iter().map(|i| i.key.get()).collect();
        assert_eq!(affected, vec![2, 101]);

        world.ledger.record(ItemKey::new(2), ItemKey::new(102), RULE, at(150));
        assert_eq!(evaluator.status(&a, &editor()), SyncStatus::Ok);
    }

    /// Product 1 lives in "draft", whose only rule never ran; it references
    /// staged media 2, which has no online counterpart.
    fn draft_product_with_stale_media(world: &World) -> VersionedItem {
        world.mark_executed(RULE);
        world.add_rule(SyncRule::new("r0", "draft", "staged").with_root_type("Product"));
        let draft = world.add(
            VersionedItem::new(ItemKey::new(1), "Product", at(100)).in_version("draft"),
        );
        world.media(2);
        world.set(1, "Product.picture", ItemKey::new(2).into());
        draft
    }

    #[test]
    fn test_stale_reference_overrides_needs_initial_sync() {
        let world = World::new();
        let draft = draft_product_with_stale_media(&world);
        let evaluator = world.evaluator(ReferenceSettings::default().with_type("Product", ["Media"]));

        assert_eq!(evaluator.own_status(&world.item(2), &editor()), SyncStatus::NotOk);
        let evaluation = evaluator.evaluate(&draft, &editor());
        assert_eq!(evaluation.own_status, SyncStatus::NeedsInitialSync);
        assert_eq!(evaluation.status, SyncStatus::NotOk);
    }

    #[test]
    fn test_stale_reference_overrides_unauthorized_rules() {
        let world = World::with_authorization(StaticAuthorization::new().grant("editor", RULE));
        let draft = draft_product_with_stale_media(&world);
        world.jobs.record_completed("r0", 1);
        world.ledger.record(ItemKey::new(900_002), ItemKey::new(900_003), "r0", at(0));
        let evaluator = world.evaluator(ReferenceSettings::default().with_type("Product", ["Media"]));

        let evaluation = evaluator.evaluate(&draft, &editor());
        assert_eq!(evaluation.own_status, SyncStatus::NotAvailable);
        assert_eq!(evaluation.status, SyncStatus::NotOk);
    }

    #[test]
    fn test_in_sync_rule_codes() {
        let world = World::new();
        world.mark_executed(RULE);
        world.add_rule(
            SyncRule::new("r2", "staged", "preview")
                .with_code("stagedToPreview")
                .with_root_type("Product"),
        );
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(150));
        let evaluator = evaluator(&world);

        let rules = vec![world.rule(RULE), world.rule("r2")];
        assert_eq!(
            evaluator.in_sync_rule_codes(&rules, &a, &editor()),
            vec![world.rule(RULE).code]
        );
    }

    #[test]
    fn test_in_sync_rule_codes_cover_members_of_other_versions() {
        let world = World::new();
        world.mark_executed(RULE);
        let a = world.product(1, 100);
        world.online_copy(1, 101);
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(150));
        world.add(VersionedItem::new(ItemKey::new(2), "Media", at(1)).in_version("draft"));
        world.set(1, "Product.picture", ItemKey::new(2).into());
        let evaluator = world.evaluator(ReferenceSettings::default().with_type("Product", ["Media"]));

        let rules = vec![world.rule(RULE)];
        assert!(evaluator.in_sync_rule_codes(&rules, &a, &editor()).is_empty());
    }

    // =========================================================================
    // Pull Direction
    // =========================================================================

    #[test]
    fn test_pull_status() {
        let world = World::new();
        world.product(1, 100);
        let target = world.online_copy(1, 101);
        let evaluator = evaluator(&world);

        assert_eq!(evaluator.pull_status(&target, &editor()), PullEvaluation::unavailable());

        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(90));
        let pull = evaluator.pull_status(&target, &editor());
        assert_eq!(pull.status, SyncStatus::NotOk);
        assert_eq!(pull.source.map(|s| s.key), Some(ItemKey::new(1)));

        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(100));
        assert_eq!(evaluator.pull_status(&target, &editor()).status, SyncStatus::Ok);
    }

    #[test]
    fn test_pull_picks_lowest_source_key() {
        let world = World::new();
        world.product(5, 100);
        world.product(3, 100);
        let target = world.online_copy(5, 101);
        world.ledger.record(ItemKey::new(5), ItemKey::new(101), RULE, at(50));
        world.ledger.record(ItemKey::new(3), ItemKey::new(101), RULE, at(150));

        let pull = evaluator(&world).pull_status(&target, &editor());
        assert_eq!(pull.source.map(|s| s.key), Some(ItemKey::new(3)));
        assert_eq!(pull.status, SyncStatus::Ok);
    }

    #[test]
    fn test_pull_same_version_or_unauthorized_is_unavailable() {
        let world = World::new();
        let a = world.product(1, 100);
        world.product(2, 100);
        world.ledger.record(ItemKey::new(2), ItemKey::new(1), RULE, at(150));
        assert_eq!(evaluator(&world).pull_status(&a, &editor()).status, SyncStatus::NotAvailable);

        let locked = World::with_authorization(StaticAuthorization::new());
        locked.product(1, 100);
        let target = locked.online_copy(1, 101);
        locked.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(150));
        let pull = evaluator(&locked).pull_status(&target, &AccessContext::new(Principal::new("x")));
        assert_eq!(pull, PullEvaluation::unavailable());
    }
}
