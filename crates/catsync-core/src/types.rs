//! # Domain Types
//!
//! Core domain types used throughout catsync.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ VersionedItem   │   │ ReplicaVersion  │   │   SyncRule      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  key (u64)      │   │  id             │   │  id, code       │       │
//! │  │  type_code      │──►│  catalog        │──►│  source_version │       │
//! │  │  version        │   │  rules (ordered)│   │  target_version │       │
//! │  │  modified_at    │   └─────────────────┘   │  root_types     │       │
//! │  │  kind           │                          └────────┬────────┘       │
//! │  └─────────────────┘                                   │                │
//! │                                                         ▼                │
//! │                                          ┌─────────────────────────┐    │
//! │                                          │     SyncTimestamp       │    │
//! │                                          │  (source, target, rule, │    │
//! │                                          │   last_sync_time)       │    │
//! │                                          └─────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All of these are owned and persisted by surrounding application code; the
//! engine only reads them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Stable numeric key of a versioned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(u64);

impl ItemKey {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        ItemKey(raw)
    }

    #[inline]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

string_id!(
    /// Code of a type in the schema registry (e.g. `Product`, `Category`).
    TypeCode
);
string_id!(
    /// Identifier of a replica version (e.g. `apparel:Staged`).
    VersionId
);
string_id!(
    /// Identifier of a synchronization rule.
    RuleId
);
string_id!(
    /// ISO code of a localization slot.
    Locale
);

/// Identifier of a single rule execution handed out by the job runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn generate() -> Self {
        ExecutionId(Uuid::new_v4())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Versioned Item
// =============================================================================

/// Whether an entity is synchronized on its own or together with its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Plain entity, synchronized as a single pending item.
    #[default]
    Flat,

    /// Taxonomy node (e.g. a category), synchronized with its descendants.
    Hierarchical,
}

/// An item living inside a replica version.
///
/// Identity is the `(key, type_code)` pair; content is owned externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedItem {
    /// Stable numeric key.
    pub key: ItemKey,

    /// Concrete type of the item.
    pub type_code: TypeCode,

    /// Replica version the item belongs to, if any.
    #[serde(default)]
    pub version: Option<VersionId>,

    /// Last modification time of the item content.
    pub modified_at: DateTime<Utc>,

    /// Flat or hierarchical entity.
    #[serde(default)]
    pub kind: EntityKind,
}

impl VersionedItem {
    /// Creates a flat item with no version.
    pub fn new(key: ItemKey, type_code: impl Into<TypeCode>, modified_at: DateTime<Utc>) -> Self {
        VersionedItem {
            key,
            type_code: type_code.into(),
            version: None,
            modified_at,
            kind: EntityKind::Flat,
        }
    }

    /// Places the item in a replica version.
    pub fn in_version(mut self, version: impl Into<VersionId>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Marks the item as hierarchical.
    pub fn hierarchical(mut self) -> Self {
        self.kind = EntityKind::Hierarchical;
        self
    }

    #[inline]
    pub fn is_hierarchical(&self) -> bool {
        self.kind == EntityKind::Hierarchical
    }
}

// =============================================================================
// Replica Version
// =============================================================================

/// A named partition of content ("catalog version"), e.g. staged vs. online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaVersion {
    pub id: VersionId,

    /// Catalog the version belongs to.
    #[serde(default)]
    pub catalog: String,

    /// Version name inside the catalog (e.g. `Staged`).
    #[serde(default)]
    pub version: String,

    /// Outgoing rules, in declaration order.
    #[serde(default)]
    pub rules: Vec<RuleId>,
}

impl ReplicaVersion {
    pub fn new(id: impl Into<VersionId>) -> Self {
        ReplicaVersion {
            id: id.into(),
            catalog: String::new(),
            version: String::new(),
            rules: Vec::new(),
        }
    }

    /// Returns true if the given rule is declared on this version.
    pub fn declares(&self, rule: &RuleId) -> bool {
        self.rules.contains(rule)
    }
}

// =============================================================================
// Sync Rule
// =============================================================================

/// A configured directive: which root types synchronize from one version to
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: RuleId,

    /// Human-readable code.
    pub code: String,

    /// The single version this rule belongs to.
    pub source_version: VersionId,

    /// Target version; a rule without target cannot be offered to callers.
    #[serde(default)]
    pub target_version: Option<VersionId>,

    /// Types (and their subtypes) the rule synchronizes.
    #[serde(default)]
    pub root_types: Vec<TypeCode>,
}

impl SyncRule {
    pub fn new(
        id: impl Into<RuleId>,
        source_version: impl Into<VersionId>,
        target_version: impl Into<VersionId>,
    ) -> Self {
        let id = id.into();
        SyncRule {
            code: id.as_str().to_string(),
            id,
            source_version: source_version.into(),
            target_version: Some(target_version.into()),
            root_types: Vec::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_root_type(mut self, type_code: impl Into<TypeCode>) -> Self {
        self.root_types.push(type_code.into());
        self
    }

    /// Readable label: `source → target (code)`.
    pub fn label(&self) -> String {
        let target = self
            .target_version
            .as_ref()
            .map(VersionId::as_str)
            .unwrap_or("?");
        format!("{} \u{2192} {} ({})", self.source_version, target, self.code)
    }
}

// =============================================================================
// Sync Timestamp
// =============================================================================

/// Ledger record: when a source/target pair was last synchronized by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTimestamp {
    pub source_item: ItemKey,
    pub target_item: ItemKey,
    pub rule: RuleId,
    pub last_sync_time: DateTime<Utc>,
}

// =============================================================================
// Pending Item
// =============================================================================

/// An (item, localization slot) pair queued on an execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingItem {
    pub item: ItemKey,
    #[serde(default)]
    pub localization_slot: Option<Locale>,
}

impl PendingItem {
    /// Pending item for all localizations.
    pub fn all_locales(item: ItemKey) -> Self {
        PendingItem {
            item,
            localization_slot: None,
        }
    }
}

// =============================================================================
// Rule Set
// =============================================================================

/// Rules partitioned for a caller: usable now vs. awaiting an initial run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Authorized, applicable and already executed at least once.
    pub accessible: Vec<SyncRule>,

    /// Authorized and applicable, but never executed.
    pub forbidden: Vec<SyncRule>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.accessible.is_empty() && self.forbidden.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rule_label() {
        let rule = SyncRule::new("r1", "apparel:Staged", "apparel:Online").with_code("stagedToOnline");
        assert_eq!(rule.label(), "apparel:Staged → apparel:Online (stagedToOnline)");
    }

    #[test]
    fn test_rule_label_without_target() {
        let mut rule = SyncRule::new("r1", "a", "b");
        rule.target_version = None;
        assert_eq!(rule.label(), "a → ? (r1)");
    }

    #[test]
    fn test_item_builders() {
        let at = Utc.timestamp_opt(100, 0).unwrap();
        let item = VersionedItem::new(ItemKey::new(7), "Category", at)
            .in_version("v1")
            .hierarchical();
        assert!(item.is_hierarchical());
        assert_eq!(item.version, Some(VersionId::new("v1")));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&RuleId::new("r1")).unwrap();
        assert_eq!(json, "\"r1\"");
        let json = serde_json::to_string(&ItemKey::new(5)).unwrap();
        assert_eq!(json, "5");
    }

    #[test]
    fn test_version_declares_rule() {
        let mut version = ReplicaVersion::new("v1");
        version.rules.push(RuleId::new("r1"));
        assert!(version.declares(&RuleId::new("r1")));
        assert!(!version.declares(&RuleId::new("r2")));
    }
}
