//! # Memory Catalog
//!
//! In-memory catalog: versions, rules, items, counterpart links and
//! attribute values.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         MemoryCatalog                                   │
//! │                                                                         │
//! │  versions     VersionId ──► ReplicaVersion (ordered rule ids)          │
//! │  rules        RuleId    ──► SyncRule                                   │
//! │  items        ItemKey   ──► StoredItem { item, restricted, values }    │
//! │  counterparts (ItemKey, target VersionId) ──► ItemKey                  │
//! │                                                                         │
//! │  Restricted items are invisible to counterpart lookups unless the      │
//! │  access context has restrictions disabled.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::debug;

use catsync_core::{
    AccessContext, AttributeDescriptor, AttributeValue, CatalogRepository, CoreError, CoreResult,
    ItemKey, Locale, ReplicaVersion, RuleId, SyncRule, ValueReader, VersionId, VersionedItem,
};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredItem {
    item: VersionedItem,
    restricted: bool,
    values: HashMap<(String, Option<Locale>), AttributeValue>,
}

#[derive(Debug, Default)]
struct CatalogState {
    versions: HashMap<VersionId, ReplicaVersion>,
    rules: HashMap<RuleId, SyncRule>,
    items: HashMap<ItemKey, StoredItem>,
    counterparts: HashMap<(ItemKey, VersionId), ItemKey>,
    failing_reads: HashSet<(ItemKey, String)>,
}

/// In-memory catalog implementing [`CatalogRepository`] and [`ValueReader`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
    locales: Vec<Locale>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the locales localized attributes are read for.
    pub fn with_locales<I, L>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Locale>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Versions and Rules
    // =========================================================================

    pub fn add_version(&self, version: ReplicaVersion) {
        self.write().versions.insert(version.id.clone(), version);
    }

    /// Adds a rule and declares it on its source version (created if
    /// missing).
    pub fn add_rule(&self, rule: SyncRule) {
        let mut state = self.write();
        let version = state
            .versions
            .entry(rule.source_version.clone())
            .or_insert_with(|| ReplicaVersion::new(rule.source_version.clone()));
        if !version.declares(&rule.id) {
            version.rules.push(rule.id.clone());
        }
        state.rules.insert(rule.id.clone(), rule);
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub fn add_item(&self, item: VersionedItem) {
        self.insert_item(item, false);
    }

    /// Adds an item hidden from restricted lookups.
    pub fn add_restricted_item(&self, item: VersionedItem) {
        self.insert_item(item, true);
    }

    fn insert_item(&self, item: VersionedItem, restricted: bool) {
        let key = item.key;
        self.write().items.insert(
            key,
            StoredItem {
                item,
                restricted,
                values: HashMap::new(),
            },
        );
    }

    /// Updates the modification time of an item.
    pub fn touch(&self, key: ItemKey, modified_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.write();
        let stored = state
            .items
            .get_mut(&key)
            .ok_or(StoreError::UnknownItem(key))?;
        stored.item.modified_at = modified_at;
        debug!(item = %key, %modified_at, "Item touched");
        Ok(())
    }

    /// Declares `target` as the counterpart of `source` in the target's
    /// version.
    pub fn link_counterpart(&self, source: ItemKey, target: ItemKey) -> StoreResult<()> {
        let mut state = self.write();
        if !state.items.contains_key(&source) {
            return Err(StoreError::UnknownItem(source));
        }
        let version = state
            .items
            .get(&target)
            .ok_or(StoreError::UnknownItem(target))?
            .item
            .version
            .clone()
            .ok_or(StoreError::MissingVersion(target))?;
        state.counterparts.insert((source, version), target);
        Ok(())
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Sets a non-localized value, keyed by `Owner.attribute`.
    pub fn set_value(
        &self,
        key: ItemKey,
        attribute: impl Into<String>,
        value: AttributeValue,
    ) -> StoreResult<()> {
        self.store_value(key, attribute.into(), None, value)
    }

    /// Sets the value of a localized attribute for one locale.
    pub fn set_localized_value(
        &self,
        key: ItemKey,
        attribute: impl Into<String>,
        locale: impl Into<Locale>,
        value: AttributeValue,
    ) -> StoreResult<()> {
        self.store_value(key, attribute.into(), Some(locale.into()), value)
    }

    fn store_value(
        &self,
        key: ItemKey,
        attribute: String,
        locale: Option<Locale>,
        value: AttributeValue,
    ) -> StoreResult<()> {
        let mut state = self.write();
        let stored = state
            .items
            .get_mut(&key)
            .ok_or(StoreError::UnknownItem(key))?;
        stored.values.insert((attribute, locale), value);
        Ok(())
    }

    /// Makes every read of the attribute on the item fail.
    pub fn fail_reads(&self, key: ItemKey, attribute: impl Into<String>) {
        self.write().failing_reads.insert((key, attribute.into()));
    }

    /// Number of stored items.
    pub fn item_count(&self) -> usize {
        self.read().items.len()
    }
}

impl CatalogRepository for MemoryCatalog {
    fn item(&self, key: ItemKey) -> Option<VersionedItem> {
        self.read().items.get(&key).map(|stored| stored.item.clone())
    }

    fn version(&self, id: &VersionId) -> Option<ReplicaVersion> {
        self.read().versions.get(id).cloned()
    }

    fn rule(&self, id: &RuleId) -> Option<SyncRule> {
        self.read().rules.get(id).cloned()
    }

    fn counterpart(
        &self,
        item: &VersionedItem,
        target: &VersionId,
        ctx: &AccessContext,
    ) -> Option<VersionedItem> {
        let state = self.read();
        let key = state.counterparts.get(&(item.key, target.clone()))?;
        let stored = state.items.get(key)?;
        if stored.restricted && !ctx.restrictions_disabled() {
            debug!(item = %item.key, counterpart = %key, "Counterpart hidden by restrictions");
            return None;
        }
        Some(stored.item.clone())
    }
}

impl ValueReader for MemoryCatalog {
    fn available_locales(&self) -> Vec<Locale> {
        self.locales.clone()
    }

    fn read_attribute(
        &self,
        item: &VersionedItem,
        attribute: &AttributeDescriptor,
        locale: Option<&Locale>,
    ) -> CoreResult<AttributeValue> {
        let state = self.read();
        let name = attribute.qualified_name();
        if state.failing_reads.contains(&(item.key, name.clone())) {
            return Err(CoreError::ReadFailed {
                item: item.key,
                attribute: name,
                reason: "read denied".to_string(),
            });
        }
        let stored = state
            .items
            .get(&item.key)
            .ok_or(CoreError::ItemNotFound(item.key))?;
        Ok(stored
            .values
            .get(&(name, locale.cloned()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catsync_core::Principal;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_add_rule_declares_on_source_version() {
        let catalog = MemoryCatalog::new();
        catalog.add_rule(SyncRule::new("r1", "v1", "v2"));
        catalog.add_rule(SyncRule::new("r2", "v1", "v3"));
        let version = catalog.version(&VersionId::new("v1")).unwrap();
        assert_eq!(version.rules, vec![RuleId::new("r1"), RuleId::new("r2")]);
    }

    #[test]
    fn test_restricted_counterpart_needs_elevation() {
        let catalog = MemoryCatalog::new();
        let source = VersionedItem::new(ItemKey::new(1), "Product", at(0)).in_version("v1");
        catalog.add_item(source.clone());
        catalog.add_restricted_item(VersionedItem::new(ItemKey::new(2), "Product", at(0)).in_version("v2"));
        catalog.link_counterpart(ItemKey::new(1), ItemKey::new(2)).unwrap();

        let ctx = AccessContext::new(Principal::new("editor"));
        let target = VersionId::new("v2");
        assert!(catalog.counterpart(&source, &target, &ctx).is_none());

        let scope = ctx.elevate(true);
        assert_eq!(
            catalog.counterpart(&source, &target, &scope).map(|i| i.key),
            Some(ItemKey::new(2))
        );
    }

    #[test]
    fn test_link_counterpart_requires_target_version() {
        let catalog = MemoryCatalog::new();
        catalog.add_item(VersionedItem::new(ItemKey::new(1), "Product", at(0)));
        catalog.add_item(VersionedItem::new(ItemKey::new(2), "Product", at(0)));
        assert!(matches!(
            catalog.link_counterpart(ItemKey::new(1), ItemKey::new(2)),
            Err(StoreError::MissingVersion(_))
        ));
    }

    #[test]
    fn test_read_values_and_failures() {
        let catalog = MemoryCatalog::new().with_locales(["en", "de"]);
        let item = VersionedItem::new(ItemKey::new(1), "Product", at(0));
        catalog.add_item(item.clone());
        catalog
            .set_localized_value(ItemKey::new(1), "Product.gallery", "de", ItemKey::new(9).into())
            .unwrap();

        let gallery = AttributeDescriptor::reference("Product", "gallery", "Media").localized();
        let de = Locale::new("de");
        let en = Locale::new("en");
        assert_eq!(
            catalog.read_attribute(&item, &gallery, Some(&de)).unwrap(),
            AttributeValue::Reference(ItemKey::new(9))
        );
        assert!(catalog.read_attribute(&item, &gallery, Some(&en)).unwrap().is_null());

        catalog.fail_reads(ItemKey::new(1), "Product.gallery");
        assert!(catalog.read_attribute(&item, &gallery, Some(&de)).is_err());
    }

    #[test]
    fn test_touch_updates_modification_time() {
        let catalog = MemoryCatalog::new();
        catalog.add_item(VersionedItem::new(ItemKey::new(1), "Product", at(100)));
        catalog.touch(ItemKey::new(1), at(200)).unwrap();
        assert_eq!(catalog.item(ItemKey::new(1)).unwrap().modified_at, at(200));
        assert!(catalog.touch(ItemKey::new(5), at(1)).is_err());
    }
}
