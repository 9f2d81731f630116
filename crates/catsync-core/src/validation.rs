//! # Validation
//!
//! Parsing and validation of configured reference entries.
//!
//! A reference configuration maps a type code to a list of entries. Each
//! entry is either a type code (`Media`: follow every reference attribute
//! whose value type is assignable to `Media`) or an attribute qualifier
//! (`Product.supercategories`: follow exactly that attribute).

use crate::error::ValidationError;
use crate::types::TypeCode;

/// A parsed reference configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceEntry {
    /// Follow reference attributes whose value type is assignable to this type.
    Type(TypeCode),

    /// Follow exactly this attribute.
    Attribute { owner: TypeCode, attribute: String },
}

impl ReferenceEntry {
    /// Qualified `Owner.attribute` name for attribute entries.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            ReferenceEntry::Attribute { owner, attribute } => Some(format!("{owner}.{attribute}")),
            ReferenceEntry::Type(_) => None,
        }
    }
}

/// Classifies a configured entry.
pub fn parse_reference_entry(raw: &str) -> Result<ReferenceEntry, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "reference entry".to_string(),
        });
    }

    match trimmed.split_once('.') {
        None => Ok(ReferenceEntry::Type(TypeCode::new(trimmed))),
        Some((owner, attribute)) => {
            if owner.is_empty() || attribute.is_empty() || attribute.contains('.') {
                return Err(ValidationError::InvalidFormat {
                    field: "reference entry".to_string(),
                    reason: format!("'{trimmed}' is not of the form Type.attribute"),
                });
            }
            Ok(ReferenceEntry::Attribute {
                owner: TypeCode::new(owner),
                attribute: attribute.to_string(),
            })
        }
    }
}

/// Validates a type code used as a configuration key.
pub fn validate_type_code(raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "type code".to_string(),
        });
    }
    if raw.contains('.') {
        return Err(ValidationError::InvalidFormat {
            field: "type code".to_string(),
            reason: format!("'{raw}' must not contain '.'"),
        });
    }
    Ok(())
}
