//! # Schema Registry
//!
//! Explicit, typed description of the item types the engine walks over:
//! their inheritance chain and the declared kind of every attribute.
//!
//! ## Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Schema Registry                                 │
//! │                                                                         │
//! │   Item ◄──── Product ◄──── VariantProduct                              │
//! │    │            │                                                       │
//! │    │            ├── name            Scalar, localized                   │
//! │    │            ├── picture         Reference(Media), single            │
//! │    │            ├── supercategories Reference(Category), list           │
//! │    │            └── galleryImages   Reference(Media), list, localized   │
//! │    │                                                                    │
//! │    └── attributes of Item are inherited by every subtype               │
//! │                                                                         │
//! │  supertypes_of(VariantProduct) = [Product, Item]   (nearest first)     │
//! │  is_assignable(VariantProduct, Product) = true                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine only consumes the [`SchemaRegistry`] trait; [`StaticSchema`]
//! is the in-memory implementation built with [`SchemaBuilder`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::TypeCode;
use crate::validation::validate_type_code;

// =============================================================================
// Attribute Descriptors
// =============================================================================

/// Declared kind of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueKind {
    /// Text, numbers, flags: never followed by the reference walker.
    Scalar,

    /// Reference to items of `target` (or a subtype).
    Reference { target: TypeCode },
}

/// Cardinality of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    #[default]
    Single,
    List,
    Set,
}

/// Declaration of one attribute on a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Type declaring the attribute.
    pub owner: TypeCode,

    /// Attribute name, unqualified.
    pub qualifier: String,

    pub kind: ValueKind,

    #[serde(default)]
    pub multiplicity: Multiplicity,

    /// Localized attributes hold one value per locale.
    #[serde(default)]
    pub localized: bool,
}

impl AttributeDescriptor {
    pub fn scalar(owner: impl Into<TypeCode>, qualifier: impl Into<String>) -> Self {
        AttributeDescriptor {
            owner: owner.into(),
            qualifier: qualifier.into(),
            kind: ValueKind::Scalar,
            multiplicity: Multiplicity::Single,
            localized: false,
        }
    }

    pub fn reference(
        owner: impl Into<TypeCode>,
        qualifier: impl Into<String>,
        target: impl Into<TypeCode>,
    ) -> Self {
        AttributeDescriptor {
            owner: owner.into(),
            qualifier: qualifier.into(),
            kind: ValueKind::Reference {
                target: target.into(),
            },
            multiplicity: Multiplicity::Single,
            localized: false,
        }
    }

    pub fn many(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    /// `Owner.qualifier`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.qualifier)
    }

    /// Value type for reference attributes (element type for collections).
    pub fn reference_target(&self) -> Option<&TypeCode> {
        match &self.kind {
            ValueKind::Reference { target } => Some(target),
            ValueKind::Scalar => None,
        }
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, ValueKind::Reference { .. })
    }
}

// =============================================================================
// Registry Trait
// =============================================================================

/// Type and attribute metadata consumed by the engine.
pub trait SchemaRegistry: Send + Sync {
    /// All supertypes of `type_code`, nearest first. Empty for unknown types.
    fn supertypes_of(&self, type_code: &TypeCode) -> Vec<TypeCode>;

    /// Attributes declared on `type_code` or inherited from its supertypes.
    fn attributes_of(&self, type_code: &TypeCode) -> Vec<AttributeDescriptor>;

    /// Looks up an attribute by `Owner.qualifier`.
    fn attribute(&self, qualified_name: &str) -> Option<AttributeDescriptor> {
        let (owner, qualifier) = qualified_name.split_once('.')?;
        self.attributes_of(&TypeCode::new(owner))
            .into_iter()
            .find(|descriptor| descriptor.qualifier == qualifier)
    }

    /// True if `type_code` is `target` or one of its subtypes.
    fn is_assignable(&self, type_code: &TypeCode, target: &TypeCode) -> bool {
        type_code == target || self.supertypes_of(type_code).iter().any(|s| s == target)
    }
}

// =============================================================================
// Static Schema
// =============================================================================

#[derive(Debug, Clone, Default)]
struct TypeDefinition {
    supertype: Option<TypeCode>,
    attributes: Vec<AttributeDescriptor>,
}

/// In-memory schema registry with single inheritance.
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    types: HashMap<TypeCode, TypeDefinition>,
}

impl StaticSchema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn contains(&self, type_code: &TypeCode) -> bool {
        self.types.contains_key(type_code)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl SchemaRegistry for StaticSchema {
    fn supertypes_of(&self, type_code: &TypeCode) -> Vec<TypeCode> {
        let mut chain = Vec::new();
        let mut current = self.types.get(type_code).and_then(|t| t.supertype.clone());
        while let Some(next) = current {
            // Builder rejects cycles, this guard only protects hand-built maps.
            if chain.contains(&next) || &next == type_code {
                break;
            }
            current = self.types.get(&next).and_then(|t| t.supertype.clone());
            chain.push(next);
        }
        chain
    }

    fn attributes_of(&self, type_code: &TypeCode) -> Vec<AttributeDescriptor> {
        let mut attributes = Vec::new();
        let lineage = std::iter::once(type_code.clone()).chain(self.supertypes_of(type_code));
        for code in lineage {
            if let Some(definition) = self.types.get(&code) {
                for descriptor in &definition.attributes {
                    // Nearest declaration shadows an inherited one.
                    if !attributes
                        .iter()
                        .any(|a: &AttributeDescriptor| a.qualifier == descriptor.qualifier)
                    {
                        attributes.push(descriptor.clone());
                    }
                }
            }
        }
        attributes
    }
}

// =============================================================================
// Schema Builder
// =============================================================================

/// Builds a [`StaticSchema`], validating the declarations on `build`.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    types: Vec<(TypeCode, Option<TypeCode>)>,
    attributes: Vec<AttributeDescriptor>,
}

impl SchemaBuilder {
    /// Declares a root type.
    pub fn root(mut self, code: impl Into<TypeCode>) -> Self {
        self.types.push((code.into(), None));
        self
    }

    /// Declares a type extending `supertype`.
    pub fn subtype(mut self, code: impl Into<TypeCode>, supertype: impl Into<TypeCode>) -> Self {
        self.types.push((code.into(), Some(supertype.into())));
        self
    }

    /// Declares an attribute on its owner type.
    pub fn attribute(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes.push(descriptor);
        self
    }

    pub fn build(self) -> Result<StaticSchema, ValidationError> {
        let mut types: HashMap<TypeCode, TypeDefinition> = HashMap::new();

        for (code, supertype) in &self.types {
            validate_type_code(code.as_str())?;
            if types.contains_key(code) {
                return Err(ValidationError::Duplicate {
                    field: "type".to_string(),
                    value: code.to_string(),
                });
            }
            types.insert(
                code.clone(),
                TypeDefinition {
                    supertype: supertype.clone(),
                    attributes: Vec::new(),
                },
            );
        }

        for (code, supertype) in &self.types {
            if let Some(supertype) = supertype {
                if !types.contains_key(supertype) {
                    return Err(ValidationError::UnknownType(supertype.to_string()));
                }
                // Walk up to detect inheritance cycles.
                let mut seen = vec![code.clone()];
                let mut current = Some(supertype.clone());
                while let Some(next) = current {
                    if seen.contains(&next) {
                        return Err(ValidationError::InvalidFormat {
                            field: "supertype".to_string(),
                            reason: format!("inheritance cycle through '{next}'"),
                        });
                    }
                    current = types.get(&next).and_then(|t| t.supertype.clone());
                    seen.push(next);
                }
            }
        }

        for descriptor in self.attributes {
            if let Some(target) = descriptor.reference_target() {
                if !types.contains_key(target) {
                    return Err(ValidationError::UnknownType(target.to_string()));
                }
            }
            let definition = types
                .get_mut(&descriptor.owner)
                .ok_or_else(|| ValidationError::UnknownType(descriptor.owner.to_string()))?;
            if definition
                .attributes
                .iter()
                .any(|a| a.qualifier == descriptor.qualifier)
            {
                return Err(ValidationError::Duplicate {
                    field: "attribute".to_string(),
                    value: descriptor.qualified_name(),
                });
            }
            definition.attributes.push(descriptor);
        }

        Ok(StaticSchema { types })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
