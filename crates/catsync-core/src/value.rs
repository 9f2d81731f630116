//! # Attribute Values
//!
//! Values returned by the value-access layer. Only references matter to the
//! engine; everything else is carried as an opaque scalar.

use serde::{Deserialize, Serialize};

use crate::types::ItemKey;

/// Current value of one attribute (for one locale, when localized).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    #[default]
    Null,
    Scalar(String),
    Reference(ItemKey),
    Collection(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Referenced item keys, in value order. Nulls and scalars are dropped.
    pub fn references(&self) -> Vec<ItemKey> {
        let mut keys = Vec::new();
        self.collect_references(&mut keys);
        keys
    }

    fn collect_references(&self, keys: &mut Vec<ItemKey>) {
        match self {
            AttributeValue::Reference(key) => keys.push(*key),
            AttributeValue::Collection(values) => {
                for value in values {
                    value.collect_references(keys);
                }
            }
            AttributeValue::Null | AttributeValue::Scalar(_) => {}
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl From<ItemKey> for AttributeValue {
    fn from(key: ItemKey) -> Self {
        AttributeValue::Reference(key)
    }
}

impl FromIterator<ItemKey> for AttributeValue {
    fn from_iter<I: IntoIterator<Item = ItemKey>>(iter: I) -> Self {
        AttributeValue::Collection(iter.into_iter().map(AttributeValue::Reference).collect())
    }
}
