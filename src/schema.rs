//! Record schemas
//!
//! A [`RecordSchema`] is an ordered, interned list of property schemas.
//! Parsing the same text twice, or building from the same property
//! sequence, returns the same shared instance, so schema identity is
//! `Arc::ptr_eq`. Schemas never change after construction; `append` and
//! `replace` hand out other interned instances.

use crate::dsl;
use crate::error::{Result, TabulaError};
use crate::property::{PropertyRef, PropertySchema};
use crate::types::Value;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub type SchemaRef = Arc<RecordSchema>;

pub struct RecordSchema {
    /// Canonical text, one canonical property line per line
    source_text: String,
    properties: Vec<PropertyRef>,
    name_to_index: HashMap<String, usize>,
    primary_key: Vec<usize>,
    /// Hex SHA-256 of the canonical text
    fingerprint: String,
}

static SCHEMA_CACHE: OnceLock<DashMap<String, SchemaRef>> = OnceLock::new();
static FINGERPRINTS: OnceLock<DashMap<String, SchemaRef>> = OnceLock::new();

fn cache() -> &'static DashMap<String, SchemaRef> {
    SCHEMA_CACHE.get_or_init(DashMap::new)
}

fn fingerprints() -> &'static DashMap<String, SchemaRef> {
    FINGERPRINTS.get_or_init(DashMap::new)
}

fn fingerprint_of(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RecordSchema {
    /// Parse newline-separated property lines.
    pub fn parse(text: &str) -> Result<SchemaRef> {
        if let Some(hit) = cache().get(text) {
            return Ok(Arc::clone(hit.value()));
        }
        let properties = dsl::schema_lines(text)
            .map(PropertySchema::parse_line)
            .collect::<Result<Vec<_>>>()?;
        Self::intern(properties, Some(text))
    }

    /// Build from an explicit property sequence.
    pub fn from_properties(properties: Vec<PropertyRef>) -> Result<SchemaRef> {
        Self::intern(properties, None)
    }

    /// Look up an already interned schema by fingerprint.
    pub fn by_fingerprint(fingerprint: &str) -> Option<SchemaRef> {
        fingerprints()
            .get(fingerprint)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn intern(properties: Vec<PropertyRef>, raw: Option<&str>) -> Result<SchemaRef> {
        let canonical = properties
            .iter()
            .map(|p| p.to_line())
            .collect::<Vec<_>>()
            .join("\n");

        let existing = cache().get(&canonical).map(|hit| Arc::clone(hit.value()));
        let schema = match existing {
            Some(schema) => schema,
            None => {
                let built = Arc::new(Self::build(properties, canonical.clone())?);
                debug!(
                    fingerprint = %built.fingerprint,
                    properties = built.len(),
                    "interned record schema"
                );
                let schema = Arc::clone(cache().entry(canonical).or_insert(built).value());
                fingerprints()
                    .entry(schema.fingerprint.clone())
                    .or_insert_with(|| Arc::clone(&schema));
                schema
            }
        };
        if let Some(raw) = raw {
            cache()
                .entry(raw.to_string())
                .or_insert_with(|| Arc::clone(&schema));
        }
        Ok(schema)
    }

    fn build(properties: Vec<PropertyRef>, source_text: String) -> Result<RecordSchema> {
        let mut name_to_index = HashMap::with_capacity(properties.len());
        let mut primary_key = Vec::new();
        for (index, property) in properties.iter().enumerate() {
            if name_to_index.insert(property.name().to_string(), index).is_some() {
                return Err(TabulaError::schema(
                    property.to_line(),
                    format!("duplicate property name '{}'", property.name()),
                ));
            }
            if property.is_primary_key() {
                primary_key.push(index);
            }
        }
        let fingerprint = fingerprint_of(&source_text);
        Ok(RecordSchema {
            source_text,
            properties,
            name_to_index,
            primary_key,
            fingerprint,
        })
    }

    /// Canonical schema text; parsing it yields this same instance.
    pub fn to_text(&self) -> &str {
        &self.source_text
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn properties(&self) -> &[PropertyRef] {
        &self.properties
    }

    pub fn property(&self, index: usize) -> Option<&PropertyRef> {
        self.properties.get(index)
    }

    pub fn property_by_name(&self, name: &str) -> Option<&PropertyRef> {
        self.index_of(name).and_then(|i| self.properties.get(i))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name())
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Column indices of the primary key, in declaration order.
    pub fn primary_key_indices(&self) -> &[usize] {
        &self.primary_key
    }

    pub fn primary_key_properties(&self) -> impl Iterator<Item = &PropertyRef> {
        self.primary_key.iter().map(move |&i| &self.properties[i])
    }

    /// Schema with `additional` lines appended. Appending nothing returns
    /// this schema.
    pub fn append(&self, additional: &str) -> Result<SchemaRef> {
        if dsl::schema_lines(additional).next().is_none() {
            return Self::parse(&self.source_text);
        }
        if self.source_text.is_empty() {
            return Self::parse(additional);
        }
        Self::parse(&format!("{}\n{}", self.source_text, additional))
    }

    /// Every property kept by name must be re-declared with the same type
    /// or a supertype.
    pub fn check_replaceable(&self, replacement: &RecordSchema) -> Result<()> {
        for old in &self.properties {
            if let Some(new) = replacement.property_by_name(old.name()) {
                if !new.value_type().is_assignable_from(old.value_type()) {
                    return Err(TabulaError::schema(
                        new.to_line(),
                        format!(
                            "type {} of '{}' is not a supertype of {}",
                            new.value_type(),
                            new.name(),
                            old.value_type()
                        ),
                    ));
                }
                if old.nested_list() != new.nested_list() {
                    return Err(TabulaError::schema(
                        new.to_line(),
                        format!("nested list of '{}' cannot change", new.name()),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checked replacement; returns `replacement` for chaining.
    pub fn replace(&self, replacement: &SchemaRef) -> Result<SchemaRef> {
        self.check_replaceable(replacement)?;
        Ok(Arc::clone(replacement))
    }

    /// Map a value row of this schema onto `target` by property name.
    /// Dropped columns disappear, new columns get their zero value.
    pub fn carry_values(&self, target: &RecordSchema, values: &[Value]) -> Vec<Value> {
        target
            .properties
            .iter()
            .map(|property| {
                if property.is_read_only() {
                    return Value::Null;
                }
                self.index_of(property.name())
                    .and_then(|i| values.get(i).cloned())
                    .unwrap_or_else(|| property.value_type().zero_value())
            })
            .collect()
    }
}

impl PartialEq for RecordSchema {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.source_text == other.source_text
    }
}

impl Eq for RecordSchema {}

impl fmt::Debug for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchema")
            .field("properties", &self.names().collect::<Vec<_>>())
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

impl fmt::Display for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let schema = RecordSchema::parse(":id,long,,,,1\n:name,String\n:tags,String[]").unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("name"), Some(1));
        assert_eq!(schema.index_of("missing"), None);
        assert_eq!(schema.primary_key_indices(), &[0]);
        assert_eq!(schema.fingerprint().len(), 64);
    }

    #[test]
    fn test_interning_identity() {
        let a = RecordSchema::parse(":x1,int\n:y1,String").unwrap();
        let b = RecordSchema::parse(":x1,int\n:y1,String").unwrap();
        let c = RecordSchema::parse("x1,int\n\ny1,String\n").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));

        let rebuilt = RecordSchema::from_properties(a.properties().to_vec()).unwrap();
        assert!(Arc::ptr_eq(&a, &rebuilt));

        let round_trip = RecordSchema::parse(a.to_text()).unwrap();
        assert!(Arc::ptr_eq(&a, &round_trip));
        assert!(Arc::ptr_eq(&a, &RecordSchema::by_fingerprint(a.fingerprint()).unwrap()));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = RecordSchema::parse("dup,int\ndup,String").unwrap_err();
        match err {
            TabulaError::SchemaDefinition { line, cause } => {
                assert_eq!(line, "dup,String");
                assert!(cause.contains("duplicate"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_append_is_pure() {
        let base = RecordSchema::parse("ap1,int").unwrap();
        let extended = base.append("ap2,String").unwrap();
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(Arc::ptr_eq(&extended, &base.append("ap2,String").unwrap()));
        assert!(Arc::ptr_eq(&base, &base.append("").unwrap()));
        assert!(base.append("ap1,long").is_err());
    }

    #[test]
    fn test_replace_requires_supertypes() {
        let old = RecordSchema::parse("r1,int\nr2,String").unwrap();
        let widened = RecordSchema::parse("r1,java.lang.Number\nr3,double").unwrap();
        let narrowed = RecordSchema::parse("r1,short\nr2,String").unwrap();

        assert!(old.replace(&widened).is_ok());
        assert_eq!(old.replace(&narrowed).unwrap_err().kind(), "schema_definition");

        let carried = old.carry_values(&widened, &[Value::Int(4), Value::from("x")]);
        assert_eq!(carried, vec![Value::Int(4), Value::Double(0.0)]);
    }
}
