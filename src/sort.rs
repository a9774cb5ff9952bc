//! Multi-key sort specifications
//!
//! Nulls compare as larger than every other value, then the key's direction
//! flips the result. Values without a natural ordering fall back to a hash
//! comparison so the order stays deterministic.

use crate::schema::RecordSchema;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn default_ascending() -> bool {
    true
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub property: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(property: &str) -> Self {
        SortKey {
            property: property.to_string(),
            ascending: true,
        }
    }

    pub fn descending(property: &str) -> Self {
        SortKey {
            property: property.to_string(),
            ascending: false,
        }
    }
}

/// Ordered list of sort keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel name/flag slices. Missing flags default to
    /// ascending.
    pub fn from_parts(properties: &[&str], ascending: &[bool]) -> Self {
        SortSpec {
            keys: properties
                .iter()
                .enumerate()
                .map(|(i, p)| SortKey {
                    property: p.to_string(),
                    ascending: ascending.get(i).copied().unwrap_or(true),
                })
                .collect(),
        }
    }

    pub fn then(mut self, property: &str, ascending: bool) -> Self {
        self.keys.push(SortKey {
            property: property.to_string(),
            ascending,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Column indices and direction flags against `schema`.
    pub fn resolve(&self, schema: &RecordSchema) -> Result<Vec<(usize, bool)>, String> {
        self.keys
            .iter()
            .map(|key| {
                schema
                    .index_of(&key.property)
                    .map(|index| (index, key.ascending))
                    .ok_or_else(|| format!("unknown sort property '{}'", key.property))
            })
            .collect()
    }
}

fn hash_of(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Compare two values under one key direction.
pub fn compare_values(a: &Value, b: &Value, ascending: bool) -> Ordering {
    let ordering = match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a
            .natural_cmp(b)
            .unwrap_or_else(|| hash_of(a).cmp(&hash_of(b))),
    };
    if ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

/// Compare two extracted key rows; the first non-equal key decides.
pub fn compare_rows(a: &[Value], b: &[Value], directions: &[bool]) -> Ordering {
    a.iter()
        .zip(b)
        .zip(directions)
        .map(|((x, y), &ascending)| compare_values(x, y, ascending))
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}
