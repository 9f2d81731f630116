//! # Catalog Fixtures
//!
//! A serde description of a complete catalog world: schema, versions,
//! rules, items with their values and counterparts, ledger records and
//! grants. Fixtures are TOML or JSON, picked by file extension.
//!
//! ## TOML Shape
//! ```toml
//! locales = ["en", "de"]
//! admins = ["admin"]
//!
//! [[types]]
//! code = "Product"
//! extends = "Item"
//! attributes = [{ name = "picture", references = "Media" }]
//!
//! [[rules]]
//! id = "staged-online"
//! code = "stagedToOnline"
//! source_version = "apparel:Staged"
//! target_version = "apparel:Online"
//! root_types = ["Product"]
//!
//! [[items]]
//! key = 1
//! type_code = "Product"
//! version = "apparel:Staged"
//! modified_at = "2024-05-01T10:00:00Z"
//! counterparts = [2]
//! values = { "Product.picture" = { reference = 3 } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use catsync_core::schema::SchemaBuilder;
use catsync_core::{
    AttributeDescriptor, AttributeValue, EntityKind, ItemKey, Locale, Multiplicity,
    ReplicaVersion, RuleId, StaticSchema, SyncRule, SyncTimestamp, TypeCode, VersionId,
    VersionedItem,
};

use crate::auth::StaticAuthorization;
use crate::catalog::MemoryCatalog;
use crate::error::{StoreError, StoreResult};
use crate::ledger::MemoryLedger;

// =============================================================================
// Fixture Model
// =============================================================================

/// Complete description of a catalog world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFixture {
    pub locales: Vec<Locale>,
    pub types: Vec<TypeFixture>,
    pub versions: Vec<ReplicaVersion>,
    pub rules: Vec<SyncRule>,
    pub items: Vec<ItemFixture>,
    pub timestamps: Vec<SyncTimestamp>,
    pub admins: Vec<String>,
    pub grants: Vec<GrantFixture>,

    /// Completed executions per rule, for the execution-history check.
    pub completed_executions: BTreeMap<RuleId, usize>,
}

/// A schema type and the attributes it declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeFixture {
    pub code: TypeCode,
    #[serde(default)]
    pub extends: Option<TypeCode>,
    #[serde(default)]
    pub attributes: Vec<AttributeFixture>,
}

/// An attribute declaration. `references` makes it a reference attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFixture {
    pub name: String,
    #[serde(default)]
    pub references: Option<TypeCode>,
    #[serde(default)]
    pub multiplicity: Multiplicity,
    #[serde(default)]
    pub localized: bool,
}

/// An item with its values and counterparts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFixture {
    pub key: ItemKey,
    pub type_code: TypeCode,
    #[serde(default)]
    pub version: Option<VersionId>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default)]
    pub restricted: bool,

    /// Keys of this item's counterparts in other versions.
    #[serde(default)]
    pub counterparts: Vec<ItemKey>,

    /// Non-localized values by `Owner.attribute`.
    #[serde(default)]
    pub values: BTreeMap<String, AttributeValue>,

    /// Localized values by `Owner.attribute`, then locale.
    #[serde(default)]
    pub localized_values: BTreeMap<String, BTreeMap<Locale, AttributeValue>>,
}

impl ItemFixture {
    fn to_item(&self) -> VersionedItem {
        VersionedItem {
            key: self.key,
            type_code: self.type_code.clone(),
            version: self.version.clone(),
            modified_at: self.modified_at,
            kind: self.kind,
        }
    }
}

/// Permission for a principal to run a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFixture {
    pub principal: String,
    pub rule: RuleId,
}

/// Adapters built from a fixture.
#[derive(Debug)]
pub struct FixtureParts {
    pub schema: StaticSchema,
    pub catalog: MemoryCatalog,
    pub ledger: MemoryLedger,
    pub authorization: StaticAuthorization,
    pub completed_executions: BTreeMap<RuleId, usize>,
}

// =============================================================================
// Loading
// =============================================================================

impl CatalogFixture {
    /// Loads a fixture file; `.json` files are JSON, anything else TOML.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::FixtureIo {
            path: path.to_path_buf(),
            source,
        })?;

        let fixture = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content)?,
            _ => Self::from_toml_str(&content)?,
        };

        info!(
            path = %path.display(),
            items = fixture.items.len(),
            rules = fixture.rules.len(),
            "Loaded catalog fixture"
        );
        Ok(fixture)
    }

    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// Builds the schema and every in-process adapter.
    pub fn build(self) -> StoreResult<FixtureParts> {
        let schema = self.build_schema()?;

        let catalog = MemoryCatalog::new().with_locales(self.locales);
        for version in self.versions {
            catalog.add_version(version);
        }
        for rule in self.rules {
            catalog.add_rule(rule);
        }

        for fixture in &self.items {
            if fixture.restricted {
                catalog.add_restricted_item(fixture.to_item());
            } else {
                catalog.add_item(fixture.to_item());
            }
        }
        for fixture in &self.items {
            for (attribute, value) in &fixture.values {
                catalog.set_value(fixture.key, attribute.clone(), value.clone())?;
            }
            for (attribute, slots) in &fixture.localized_values {
                for (locale, value) in slots {
                    catalog.set_localized_value(
                        fixture.key,
                        attribute.clone(),
                        locale.clone(),
                        value.clone(),
                    )?;
                }
            }
            for counterpart in &fixture.counterparts {
                catalog.link_counterpart(fixture.key, *counterpart)?;
            }
        }

        let ledger = MemoryLedger::new();
        for timestamp in self.timestamps {
            ledger.insert(timestamp);
        }

        let mut authorization = StaticAuthorization::new();
        for admin in self.admins {
            authorization = authorization.with_admin(admin);
        }
        for grant in self.grants {
            authorization = authorization.grant(grant.principal, grant.rule);
        }

        Ok(FixtureParts {
            schema,
            catalog,
            ledger,
            authorization,
            completed_executions: self.completed_executions,
        })
    }

    fn build_schema(&self) -> StoreResult<StaticSchema> {
        let mut builder = SchemaBuilder::default();
        for declared in &self.types {
            builder = match &declared.extends {
                Some(supertype) => builder.subtype(declared.code.clone(), supertype.clone()),
                None => builder.root(declared.code.clone()),
            };
            for attribute in &declared.attributes {
                let descriptor = match &attribute.references {
                    Some(target) => AttributeDescriptor::reference(
                        declared.code.clone(),
                        attribute.name.clone(),
                        target.clone(),
                    ),
                    None => AttributeDescriptor::scalar(declared.code.clone(), attribute.name.clone()),
                }
                .many(attribute.multiplicity);
                let descriptor = if attribute.localized {
                    descriptor.localized()
                } else {
                    descriptor
                };
                builder = builder.attribute(descriptor);
            }
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catsync_core::{
        AccessContext, Authorizer, CatalogRepository, Principal, SchemaRegistry, TimestampLedger,
        ValueReader,
    };
    use pretty_assertions::assert_eq;

    const WORLD: &str = r#"
locales = ["en", "de"]
admins = ["admin"]
grants = [{ principal = "editor", rule = "staged-online" }]

[completed_executions]
staged-online = 1

[[types]]
code = "Item"

[[types]]
code = "Media"
extends = "Item"

[[types]]
code = "Product"
extends = "Item"
attributes = [
    { name = "picture", references = "Media" },
    { name = "gallery", references = "Media", multiplicity = "list", localized = true },
    { name = "name", localized = true },
]

[[rules]]
id = "staged-online"
code = "stagedToOnline"
source_version = "staged"
target_version = "online"
root_types = ["Product", "Media"]

[[items]]
key = 1
type_code = "Product"
version = "staged"
modified_at = "2024-05-01T10:00:00Z"
counterparts = [2]
values = { "Product.picture" = { reference = 3 } }
localized_values = { "Product.gallery" = { de = { collection = [{ reference = 3 }] } } }

[[items]]
key = 2
type_code = "Product"
version = "online"
modified_at = "2024-05-01T10:00:00Z"
restricted = true

[[items]]
key = 3
type_code = "Media"
version = "staged"
modified_at = "2024-05-01T09:00:00Z"

[[timestamps]]
source_item = 1
target_item = 2
rule = "staged-online"
last_sync_time = "2024-05-01T11:00:00Z"
"#;

    #[test]
    fn test_toml_fixture_builds_all_adapters() {
        let parts = CatalogFixture::from_toml_str(WORLD).unwrap().build().unwrap();

        assert_eq!(parts.schema.len(), 3);
        assert!(parts
            .schema
            .is_assignable(&TypeCode::new("Product"), &TypeCode::new("Item")));
        assert_eq!(parts.catalog.item_count(), 3);
        assert_eq!(
            parts.catalog.version(&VersionId::new("staged")).unwrap().rules,
            vec![RuleId::new("staged-online")]
        );
        assert_eq!(parts.completed_executions.get(&RuleId::new("staged-online")), Some(&1));

        let ctx = AccessContext::new(Principal::new("editor"));
        let source = parts.catalog.item(ItemKey::new(1)).unwrap();
        let online = VersionId::new("online");
        assert!(parts.catalog.counterpart(&source, &online, &ctx).is_none());
        let scope = ctx.elevate(true);
        assert!(parts.catalog.counterpart(&source, &online, &scope).is_some());
        drop(scope);

        let gallery = parts.schema.attribute("Product.gallery").unwrap();
        let de = Locale::new("de");
        assert_eq!(
            parts
                .catalog
                .read_attribute(&source, &gallery, Some(&de))
                .unwrap()
                .references(),
            vec![ItemKey::new(3)]
        );

        assert!(parts.ledger.has_records_for_rule(&RuleId::new("staged-online")));
        assert!(parts.authorization.is_admin(&Principal::new("admin")));
        let rule = parts.catalog.rule(&RuleId::new("staged-online")).unwrap();
        assert!(parts.authorization.can_sync(&Principal::new("editor"), &rule));
    }

    #[test]
    fn test_json_fixture() {
        let json = r#"{
            "types": [{ "code": "Product" }],
            "rules": [{ "id": "r1", "code": "r1", "source_version": "a", "target_version": "b" }],
            "items": [{ "key": 7, "type_code": "Product", "version": "a",
                        "modified_at": "2024-01-01T00:00:00Z", "kind": "hierarchical" }]
        }"#;
        let parts = CatalogFixture::from_json_str(json).unwrap().build().unwrap();
        assert!(parts.catalog.item(ItemKey::new(7)).unwrap().is_hierarchical());
    }

    #[test]
    fn test_unknown_counterpart_is_rejected() {
        let json = r#"{
            "items": [{ "key": 1, "type_code": "Product", "version": "a",
                        "modified_at": "2024-01-01T00:00:00Z", "counterparts": [99] }]
        }"#;
        let err = CatalogFixture::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(err, StoreError::UnknownItem(key) if key == ItemKey::new(99)));
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let json = r#"{ "types": [{ "code": "Product", "extends": "Missing" }] }"#;
        let err = CatalogFixture::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_malformed_fixture() {
        assert!(matches!(
            CatalogFixture::from_toml_str("items = 5"),
            Err(StoreError::FixtureParse(_))
        ));
    }
}
