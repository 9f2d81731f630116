//! # Reference Graph Walker
//!
//! Computes the reference closure of an item: every item reachable over
//! the configured reference attributes, bounded by depth.
//!
//! ## Traversal
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Closure of Product P (depth 2)                     │
//! │                                                                         │
//! │   config: Product = ["Media", "Product.supercategories"]               │
//! │                                                                         │
//! │   depth 2    P ──picture──► M1          (Media assignable to Media)    │
//! │              P ──supercategories──► C1  (named explicitly)             │
//! │              P ──name──► (scalar, never followed)                      │
//! │                                                                         │
//! │   depth 1    C1 ──supercategories──► C2                                │
//! │              M1 ──(no relevant attributes)                             │
//! │                                                                         │
//! │   depth 0    stop                                                       │
//! │                                                                         │
//! │   closure(P) = {M1, C1, C2}        P itself is never part of it        │
//! │                                                                         │
//! │   `visited` is shared across the whole recursion: an item is added    │
//! │   and expanded at most once, so cyclic graphs terminate.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Relevant Descriptors
//! For a type, the relevant attributes are the reference attributes that are
//! either named by an `Owner.attribute` entry or whose value type is
//! assignable to one of the configured type entries. The result is cached
//! per (configured type, item type) in a concurrent map; racing first
//! computations produce equal values, so the last write wins.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use catsync_core::{
    AttributeDescriptor, ItemKey, Locale, ReferenceEntry, TypeCode, VersionedItem,
};

use crate::config::ReferenceSettings;
use crate::error::SyncResult;
use crate::Collaborators;

/// Configured entries resolved for an item's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntries<'a> {
    /// Type whose configuration applies (the item's own type or a supertype).
    pub configured_type: &'a TypeCode,
    pub entries: &'a [ReferenceEntry],
}

/// Depth-bounded reference closure computation.
pub struct ReferenceWalker {
    ports: Collaborators,
    settings: ReferenceSettings,
    entries: HashMap<TypeCode, Vec<ReferenceEntry>>,
    descriptors: DashMap<(TypeCode, TypeCode), Arc<[AttributeDescriptor]>>,
}

impl ReferenceWalker {
    /// Creates a walker, parsing the configured reference entries.
    pub fn new(ports: Collaborators, settings: &ReferenceSettings) -> SyncResult<Self> {
        Ok(ReferenceWalker {
            ports,
            entries: settings.parsed()?,
            settings: settings.clone(),
            descriptors: DashMap::new(),
        })
    }

    // =========================================================================
    // Configuration Lookup
    // =========================================================================

    /// Entries configured for `type_code`, falling back to the nearest
    /// configured supertype.
    pub fn configured_entries(&self, type_code: &TypeCode) -> Option<ResolvedEntries<'_>> {
        std::iter::once(type_code.clone())
            .chain(self.ports.schema.supertypes_of(type_code))
            .find_map(|candidate| self.entries.get_key_value(&candidate))
            .map(|(configured_type, entries)| ResolvedEntries {
                configured_type,
                entries,
            })
    }

    // =========================================================================
    // Closure
    // =========================================================================

    /// Reference closure with the configured depth. Sorted by key.
    pub fn closure(&self, item: &VersionedItem) -> Vec<VersionedItem> {
        match self.configured_entries(&item.type_code) {
            Some(resolved) if !resolved.entries.is_empty() => {
                let depth = self.settings.depth_for(resolved.entries.len());
                self.walk(item, &resolved, depth)
            }
            _ => {
                trace!(item = %item.key, type_code = %item.type_code, "No reference configuration");
                Vec::new()
            }
        }
    }

    /// Reference closure with an explicit depth bound.
    pub fn closure_with_depth(&self, item: &VersionedItem, max_depth: usize) -> Vec<VersionedItem> {
        match self.configured_entries(&item.type_code) {
            Some(resolved) => self.walk(item, &resolved, max_depth),
            None => Vec::new(),
        }
    }

    fn walk(
        &self,
        item: &VersionedItem,
        resolved: &ResolvedEntries<'_>,
        max_depth: usize,
    ) -> Vec<VersionedItem> {
        let locales = self.ports.values.available_locales();
        let mut visited = HashSet::from([item.key]);
        let mut found = BTreeMap::new();
        self.lookup(item, resolved, &locales, max_depth, &mut visited, &mut found);

        debug!(
            item = %item.key,
            depth = max_depth,
            closure = found.len(),
            "Computed reference closure"
        );
        found.into_values().collect()
    }

    fn lookup(
        &self,
        item: &VersionedItem,
        resolved: &ResolvedEntries<'_>,
        locales: &[Locale],
        depth: usize,
        visited: &mut HashSet<ItemKey>,
        found: &mut BTreeMap<ItemKey, VersionedItem>,
    ) {
        if depth == 0 {
            return;
        }

        let mut discovered = Vec::new();
        for descriptor in self.relevant_descriptors(resolved, &item.type_code).iter() {
            for key in self.read_references(item, descriptor, locales) {
                if !visited.insert(key) {
                    continue;
                }
                match self.ports.catalog.item(key) {
                    Some(referenced) => discovered.push(referenced),
                    None => debug!(item = %key, "Referenced item not found"),
                }
            }
        }

        for referenced in &discovered {
            found.insert(referenced.key, referenced.clone());
        }
        for referenced in &discovered {
            self.lookup(referenced, resolved, locales, depth - 1, visited, found);
        }
    }

    /// Referenced keys of one attribute. Failed reads contribute nothing.
    fn read_references(
        &self,
        item: &VersionedItem,
        descriptor: &AttributeDescriptor,
        locales: &[Locale],
    ) -> Vec<ItemKey> {
        let slots: Vec<Option<&Locale>> = if descriptor.localized {
            locales.iter().map(Some).collect()
        } else {
            vec![None]
        };

        let mut keys = Vec::new();
        for locale in slots {
            match self.ports.values.read_attribute(item, descriptor, locale) {
                Ok(value) => keys.extend(value.references()),
                Err(e) => warn!(
                    item = %item.key,
                    attribute = %descriptor.qualified_name(),
                    locale = ?locale,
                    error = %e,
                    "Skipping unreadable reference attribute"
                ),
            }
        }
        keys
    }

    // =========================================================================
    // Descriptor Cache
    // =========================================================================

    /// Reference attributes of `type_code` that the resolved entries select.
    pub fn relevant_descriptors(
        &self,
        resolved: &ResolvedEntries<'_>,
        type_code: &TypeCode,
    ) -> Arc<[AttributeDescriptor]> {
        let key = (resolved.configured_type.clone(), type_code.clone());
        if let Some(cached) = self.descriptors.get(&key) {
            return Arc::clone(cached.value());
        }

        let computed = self.compute_descriptors(resolved.entries, type_code);
        self.descriptors.insert(key, Arc::clone(&computed));
        computed
    }

    fn compute_descriptors(
        &self,
        entries: &[ReferenceEntry],
        type_code: &TypeCode,
    ) -> Arc<[AttributeDescriptor]> {
        let named: HashSet<String> = entries
            .iter()
            .filter_map(ReferenceEntry::qualified_name)
            .collect();
        let targets: Vec<&TypeCode> = entries
            .iter()
            .filter_map(|entry| match entry {
                ReferenceEntry::Type(code) => Some(code),
                ReferenceEntry::Attribute { .. } => None,
            })
            .collect();

        let schema = &self.ports.schema;
        let relevant: Vec<AttributeDescriptor> = schema
            .attributes_of(type_code)
            .into_iter()
            .filter(|descriptor| match descriptor.reference_target() {
                Some(value_type) => {
                    named.contains(&descriptor.qualified_name())
                        || targets
                            .iter()
                            .any(|target| schema.is_assignable(value_type, target))
                }
                None => false,
            })
            .collect();

        trace!(type_code = %type_code, relevant = relevant.len(), "Computed relevant descriptors");
        relevant.into()
    }

    /// Drops every cached descriptor set.
    pub fn invalidate_all(&self) {
        self.descriptors.clear();
    }

    /// Drops cached descriptor sets involving `type_code`.
    pub fn invalidate(&self, type_code: &TypeCode) {
        self.descriptors
            .retain(|(configured, item_type), _| configured != type_code && item_type != type_code);
    }

    /// Number of cached descriptor sets.
    pub fn cached_descriptor_sets(&self) -> usize {
        self.descriptors.len()
    }
}
