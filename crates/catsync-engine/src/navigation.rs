//! Ledger navigation: which items an item was synchronized from or to.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::trace;

use catsync_core::{ItemKey, VersionedItem};

use crate::Collaborators;

/// Resolves ledger records back to catalog items.
pub struct LedgerNavigator {
    ports: Collaborators,
}

impl LedgerNavigator {
    pub fn new(ports: Collaborators) -> Self {
        LedgerNavigator { ports }
    }

    /// Items the given item was synchronized from, ordered by key.
    pub fn sync_sources(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        let keys = self
            .ports
            .ledger
            .find_by_target(item.key)
            .into_iter()
            .map(|record| record.source_item);
        self.resolve(keys)
    }

    /// Items the given item was synchronized to, ordered by key.
    pub fn sync_targets(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        let keys = self
            .ports
            .ledger
            .find_by_source(item.key)
            .into_iter()
            .map(|record| record.target_item);
        self.resolve(keys)
    }

    /// Union of sources and targets.
    pub fn sync_sources_and_targets(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        let sources = self.ports.ledger.find_by_target(item.key);
        let targets = self.ports.ledger.find_by_source(item.key);
        let keys = sources
            .into_iter()
            .map(|record| record.source_item)
            .chain(targets.into_iter().map(|record| record.target_item));
        self.resolve(keys)
    }

    /// Latest time the item was written as a synchronization target.
    pub fn last_target_sync_time(&self, item: &VersionedItem) -> Option<DateTime<Utc>> {
        self.ports
            .ledger
            .find_by_target(item.key)
            .into_iter()
            .map(|record| record.last_sync_time)
            .max()
    }

    fn resolve(&self, keys: impl Iterator<Item = ItemKey>) -> Vec<VersionedItem> {
        let mut items = BTreeMap::new();
        for key in keys {
            if items.contains_key(&key) {
                continue;
            }
            match self.ports.catalog.item(key) {
                Some(item) => {
                    items.insert(key, item);
                }
                None => trace!(item = %key, "Ledger references an unknown item"),
            }
        }
        items.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, World, RULE};
    use pretty_assertions::assert_eq;

    fn keys(items: &[VersionedItem]) -> Vec<u64> {
        items.iter().map(|i| i.key.get()).collect()
    }

    #[test]
    fn test_sources_and_targets() {
        let world = World::new();
        let staged = world.product(1, 100);
        let online = world.online_copy(1, 101);
        world.online_copy(1, 102);
        world.ledger.record(ItemKey::new(1), ItemKey::new(102), RULE, at(10));
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(20));
        world.ledger.record(ItemKey::new(1), ItemKey::new(101), "r2", at(30));
        let navigator = LedgerNavigator::new(world.ports());

        assert_eq!(keys(&navigator.sync_targets(&staged)), vec![101, 102]);
        assert_eq!(keys(&navigator.sync_sources(&online)), vec![1]);
        assert!(navigator.sync_sources(&staged).is_empty());
        assert_eq!(keys(&navigator.sync_sources_and_targets(&online)), vec![1]);
    }

    #[test]
    fn test_unknown_ledger_items_are_skipped() {
        let world = World::new();
        let staged = world.product(1, 100);
        world.ledger.record(ItemKey::new(1), ItemKey::new(404), RULE, at(10));
        let navigator = LedgerNavigator::new(world.ports());

        assert!(navigator.sync_targets(&staged).is_empty());
    }

    #[test]
    fn test_last_target_sync_time() {
        let world = World::new();
        world.product(1, 100);
        world.product(2, 100);
        let online = world.online_copy(1, 101);
        let navigator = LedgerNavigator::new(world.ports());
        assert_eq!(navigator.last_target_sync_time(&online), None);

        world.ledger.record(ItemKey::new(1), ItemKey::new(101), RULE, at(20));
        world.ledger.record(ItemKey::new(2), ItemKey::new(101), RULE, at(50));
        world.ledger.record(ItemKey::new(101), ItemKey::new(1), RULE, at(90));
        assert_eq!(navigator.last_target_sync_time(&online), Some(at(50)));
    }
}
