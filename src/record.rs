//! Records
//!
//! A [`Record`] is a cheap, clonable handle to one row: a schema reference
//! plus a lazily allocated value slot array. Clones share the same row.
//! A record owned by a [`RecordList`] routes its writes through the list so
//! the list's indexes are maintained under the list lock.

use crate::error::{Result, TabulaError};
use crate::expression::Dataset;
use crate::index::IndexKey;
use crate::list::{ListShared, RecordList, SlotWrite};
use crate::property::PropertyRef;
use crate::schema::{RecordSchema, SchemaRef};
use crate::types::{Value, ValueType};
use chrono::NaiveDateTime;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, Weak};

/// Property addressed by name or by column index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Name(String),
    Index(usize),
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        PropertyKey::Name(name.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        PropertyKey::Name(name)
    }
}

impl From<&String> for PropertyKey {
    fn from(name: &String) -> Self {
        PropertyKey::Name(name.clone())
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey::Index(index)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Name(name) => f.write_str(name),
            PropertyKey::Index(index) => write!(f, "#{}", index),
        }
    }
}

impl PropertyKey {
    fn resolve(&self, schema: &RecordSchema) -> std::result::Result<usize, String> {
        match self {
            PropertyKey::Name(name) => schema
                .index_of(name)
                .ok_or_else(|| format!("unknown property '{}'", name)),
            PropertyKey::Index(index) if *index < schema.len() => Ok(*index),
            PropertyKey::Index(index) => Err(format!(
                "property index {} out of range for {} properties",
                index,
                schema.len()
            )),
        }
    }
}

struct RecordState {
    schema: Option<SchemaRef>,
    /// Absent until the first write
    values: Option<Vec<Value>>,
    /// -1 when detached
    position: isize,
    owner: Weak<ListShared>,
}

impl RecordState {
    fn slot(&self, index: usize) -> Value {
        self.values
            .as_ref()
            .and_then(|values| values.get(index).cloned())
            .unwrap_or(Value::Null)
    }

    fn put(&mut self, index: usize, value: Value) {
        let len = self.schema.as_ref().map_or(0, |schema| schema.len());
        let values = self.values.get_or_insert_with(|| vec![Value::Null; len]);
        if let Some(slot) = values.get_mut(index) {
            *slot = value;
        }
    }

    fn snapshot(&self) -> Vec<Value> {
        match (&self.values, &self.schema) {
            (Some(values), _) => values.clone(),
            (None, Some(schema)) => vec![Value::Null; schema.len()],
            (None, None) => Vec::new(),
        }
    }
}

/// One row of a record schema
#[derive(Clone)]
pub struct Record {
    cell: Arc<RwLock<RecordState>>,
}

impl Record {
    /// Empty record of `schema`; no slot is allocated until the first write.
    pub fn new(schema: &SchemaRef) -> Self {
        Self::from_state(Some(Arc::clone(schema)), None)
    }

    /// Record without a schema. Every property access fails until a schema
    /// is assigned with [`Record::set_schema`].
    pub fn unbound() -> Self {
        Self::from_state(None, None)
    }

    /// Record holding `values` in schema order, each coerced by its property.
    pub fn with_values(schema: &SchemaRef, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(TabulaError::set(
                "values",
                format!("expected {} values, got {}", schema.len(), values.len()),
            ));
        }
        let slots = schema
            .properties()
            .iter()
            .zip(values)
            .map(|(property, value)| {
                if property.is_read_only() {
                    Ok(Value::Null)
                } else {
                    property.set(value)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_state(Some(Arc::clone(schema)), Some(slots)))
    }

    /// Record with the given properties set, all others null.
    pub fn with_properties<K, V>(schema: &SchemaRef, pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: Into<PropertyKey>,
        V: Into<Value>,
    {
        let record = Record::new(schema);
        for (key, value) in pairs {
            record.set_property(key, value.into())?;
        }
        Ok(record)
    }

    fn from_state(schema: Option<SchemaRef>, values: Option<Vec<Value>>) -> Self {
        Record {
            cell: Arc::new(RwLock::new(RecordState {
                schema,
                values,
                position: -1,
                owner: Weak::new(),
            })),
        }
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.cell.read().schema.clone()
    }

    /// Position in the owning list, `None` when detached.
    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.cell.read().position).ok()
    }

    pub fn owner(&self) -> Option<RecordList> {
        self.cell.read().owner.upgrade().map(RecordList::from_shared)
    }

    pub fn is_owned(&self) -> bool {
        self.cell.read().owner.strong_count() > 0
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.cell
            .read()
            .schema
            .as_ref()
            .map_or(false, |schema| schema.index_of(name).is_some())
    }

    fn locate(&self, key: &PropertyKey, wrap: fn(String, String) -> TabulaError) -> Result<(usize, PropertyRef)> {
        let (_, index, property) = self.locate_in_schema(key, wrap)?;
        Ok((index, property))
    }

    /// Like `locate`, also returning the schema the slot was resolved in.
    fn locate_in_schema(
        &self,
        key: &PropertyKey,
        wrap: fn(String, String) -> TabulaError,
    ) -> Result<(SchemaRef, usize, PropertyRef)> {
        let state = self.cell.read();
        let schema = state
            .schema
            .as_ref()
            .ok_or_else(|| wrap(key.to_string(), "record schema is not initialized".to_string()))?;
        let index = key.resolve(schema).map_err(|cause| wrap(key.to_string(), cause))?;
        Ok((Arc::clone(schema), index, Arc::clone(&schema.properties()[index])))
    }

    /// Current value of a property. Computed columns are evaluated against
    /// the owning list (if any) and this record.
    pub fn get_property(&self, key: impl Into<PropertyKey>) -> Result<Value> {
        let owner = self.owner();
        self.read_property(key.into(), owner.as_ref().map(|list| list as &dyn Dataset))
    }

    /// Like [`Record::get_property`], with an explicit dataset for
    /// computed columns.
    pub fn get_property_in(&self, key: impl Into<PropertyKey>, dataset: &dyn Dataset) -> Result<Value> {
        self.read_property(key.into(), Some(dataset))
    }

    fn read_property(&self, key: PropertyKey, dataset: Option<&dyn Dataset>) -> Result<Value> {
        let (index, property) = self.locate(&key, |p, c| TabulaError::get(p, c))?;
        if property.is_read_only() {
            // evaluated without holding the slot lock
            return property.compute(self, dataset);
        }
        Ok(self.cell.read().slot(index))
    }

    /// Coerce `value` through the property and store it. Owned records
    /// keep their list's indexes in step with the write.
    pub fn set_property(&self, key: impl Into<PropertyKey>, value: Value) -> Result<()> {
        let key = key.into();
        loop {
            let (schema, index, property) = self.locate_in_schema(&key, |p, c| TabulaError::set(p, c))?;
            let coerced = property.set(value.clone())?;
            if self.store(&schema, index, coerced)? {
                return Ok(());
            }
        }
    }

    /// Parse an external representation through the parse codec, then set.
    pub fn parse_property(&self, key: impl Into<PropertyKey>, external: Value) -> Result<()> {
        let key = key.into();
        loop {
            let (schema, index, property) = self.locate_in_schema(&key, |p, c| TabulaError::set(p, c))?;
            let parsed = property.parse(external.clone())?;
            if self.store(&schema, index, parsed)? {
                return Ok(());
            }
        }
    }

    /// External representation of a property through its format codec.
    pub fn format_property(&self, key: impl Into<PropertyKey>) -> Result<Value> {
        let key = key.into();
        let (_, property) = self.locate(&key, |p, c| TabulaError::get(p, c))?;
        let value = self.get_property(key)?;
        property.format(&value)
    }

    /// Write a slot resolved against `schema`. Returns false, writing
    /// nothing, when the record was rebound to another schema meanwhile.
    /// Ownership is re-checked under the lock that guards the write.
    fn store(&self, schema: &SchemaRef, index: usize, value: Value) -> Result<bool> {
        let mut value = value;
        loop {
            if let Some(list) = self.owner() {
                match list.update_slot(self, schema, index, value)? {
                    SlotWrite::Written => return Ok(true),
                    SlotWrite::SchemaChanged => return Ok(false),
                    SlotWrite::NotOwned(returned) => {
                        value = returned;
                        continue;
                    }
                }
            }
            let mut state = self.cell.write();
            if state.owner.strong_count() > 0 {
                // adopted by a list since the owner check
                continue;
            }
            if !state.schema.as_ref().map_or(false, |current| Arc::ptr_eq(current, schema)) {
                return Ok(false);
            }
            state.put(index, value);
            return Ok(true);
        }
    }

    /// Validate every property in column order, stopping at the first
    /// failure.
    pub fn validate(&self) -> Result<bool> {
        let schema = match self.schema() {
            Some(schema) => schema,
            None => return Err(TabulaError::validate("*", "record schema is not initialized")),
        };
        for (index, property) in schema.properties().iter().enumerate() {
            if !property.has_constraint() {
                continue;
            }
            let value = self.get_property(index)?;
            if !property.validate(&value)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn validate_property(&self, key: impl Into<PropertyKey>) -> Result<bool> {
        let key = key.into();
        let (_, property) = self.locate(&key, |p, c| TabulaError::validate(p, c))?;
        let value = self.get_property(key)?;
        property.validate(&value)
    }

    /// Lenient integral read with a range check.
    fn integral(&self, key: PropertyKey, min: i64, max: i64) -> Result<i64> {
        let value = self.get_property(key.clone())?;
        let n = value
            .coerce_i64()
            .map_err(|cause| TabulaError::get(key.to_string(), cause))?;
        if n < min || n > max {
            return Err(TabulaError::get(
                key.to_string(),
                format!("{} is out of range [{}, {}]", n, min, max),
            ));
        }
        Ok(n)
    }

    pub fn get_bool(&self, key: impl Into<PropertyKey>) -> Result<bool> {
        let key = key.into();
        self.get_property(key.clone())?
            .coerce_bool()
            .map_err(|cause| TabulaError::get(key.to_string(), cause))
    }

    pub fn get_char(&self, key: impl Into<PropertyKey>) -> Result<char> {
        let key = key.into();
        match self.get_property(key.clone())? {
            Value::Null => Ok('\0'),
            Value::Char(c) => Ok(c),
            Value::String(s) if s.chars().count() == 1 => s
                .chars()
                .next()
                .ok_or_else(|| TabulaError::get(key.to_string(), "empty string")),
            other => other
                .as_i64()
                .and_then(|n| u32::try_from(n).ok())
                .and_then(char::from_u32)
                .ok_or_else(|| TabulaError::get(key.to_string(), format!("{} is not a char", other))),
        }
    }

    pub fn get_byte(&self, key: impl Into<PropertyKey>) -> Result<i8> {
        Ok(self.integral(key.into(), i64::from(i8::MIN), i64::from(i8::MAX))? as i8)
    }

    pub fn get_short(&self, key: impl Into<PropertyKey>) -> Result<i16> {
        Ok(self.integral(key.into(), i64::from(i16::MIN), i64::from(i16::MAX))? as i16)
    }

    pub fn get_int(&self, key: impl Into<PropertyKey>) -> Result<i32> {
        Ok(self.integral(key.into(), i64::from(i32::MIN), i64::from(i32::MAX))? as i32)
    }

    pub fn get_long(&self, key: impl Into<PropertyKey>) -> Result<i64> {
        self.integral(key.into(), i64::MIN, i64::MAX)
    }

    pub fn get_float(&self, key: impl Into<PropertyKey>) -> Result<f32> {
        Ok(self.get_double(key)? as f32)
    }

    pub fn get_double(&self, key: impl Into<PropertyKey>) -> Result<f64> {
        let key = key.into();
        self.get_property(key.clone())?
            .coerce_f64()
            .map_err(|cause| TabulaError::get(key.to_string(), cause))
    }

    pub fn get_big_integer(&self, key: impl Into<PropertyKey>) -> Result<Option<BigInt>> {
        let key = key.into();
        match self.get_property(key.clone())? {
            Value::Null => Ok(None),
            Value::String(s) => BigInt::from_str(s.trim())
                .map(Some)
                .map_err(|e| TabulaError::get(key.to_string(), format!("'{}': {}", s, e))),
            Value::Bool(b) => Ok(Some(BigInt::from(u8::from(b)))),
            other => match other.as_big_int() {
                Some(n) => Ok(Some(n)),
                None => other
                    .as_decimal()
                    .and_then(|d| d.trunc().to_i128())
                    .map(|n| Some(BigInt::from(n)))
                    .ok_or_else(|| TabulaError::get(key.to_string(), format!("{} is not numeric", other))),
            },
        }
    }

    pub fn get_decimal(&self, key: impl Into<PropertyKey>) -> Result<Option<Decimal>> {
        let key = key.into();
        match self.get_property(key.clone())? {
            Value::Null => Ok(None),
            Value::String(s) => ValueType::BigDecimal
                .parse_text(&s)
                .map(|v| v.as_decimal())
                .map_err(|cause| TabulaError::get(key.to_string(), cause)),
            Value::Bool(b) => Ok(Some(Decimal::from(u8::from(b)))),
            other => other
                .as_decimal()
                .map(Some)
                .ok_or_else(|| TabulaError::get(key.to_string(), format!("{} is not numeric", other))),
        }
    }

    pub fn get_string(&self, key: impl Into<PropertyKey>) -> Result<Option<String>> {
        Ok(match self.get_property(key)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    pub fn get_date(&self, key: impl Into<PropertyKey>) -> Result<Option<NaiveDateTime>> {
        let key = key.into();
        match self.get_property(key.clone())? {
            Value::Null => Ok(None),
            Value::Date(d) => Ok(Some(d)),
            Value::String(s) => match ValueType::Date.parse_text(&s) {
                Ok(Value::Date(d)) => Ok(Some(d)),
                Ok(_) => Ok(None),
                Err(cause) => Err(TabulaError::get(key.to_string(), cause)),
            },
            other => Err(TabulaError::get(key.to_string(), format!("{} is not a date", other))),
        }
    }

    /// Detached record sharing the schema, with no values.
    pub fn clone_schema_only(&self) -> Record {
        Self::from_state(self.schema(), None)
    }

    /// Detached record with deep copies of every value. Nested records and
    /// lists are copied too.
    pub fn clone_with_data(&self) -> Record {
        let (schema, values) = {
            let state = self.cell.read();
            (state.schema.clone(), state.values.clone())
        };
        Self::from_state(schema, values.map(|values| values.into_iter().map(deep_copy).collect()))
    }

    /// Raw slot values in column order (computed columns read as null).
    pub fn values(&self) -> Vec<Value> {
        self.cell.read().snapshot()
    }

    /// `(name, value)` pairs in column order, computed columns evaluated.
    pub fn entries(&self) -> Result<Vec<(String, Value)>> {
        let schema = match self.schema() {
            Some(schema) => schema,
            None => return Ok(Vec::new()),
        };
        schema
            .properties()
            .iter()
            .enumerate()
            .map(|(index, property)| Ok((property.name().to_string(), self.get_property(index)?)))
            .collect()
    }

    /// Primary-key tuple, `None` if the schema declares no primary key.
    pub fn primary_key(&self) -> Option<IndexKey> {
        IndexKey::primary_of(self)
    }

    /// Fill every path-bearing column from a nested source value. Returns
    /// how many columns were set.
    pub fn extract_from(&self, source: &Value) -> Result<usize> {
        let schema = self
            .schema()
            .ok_or_else(|| TabulaError::set("*", "record schema is not initialized"))?;
        let mut count = 0;
        for (index, property) in schema.properties().iter().enumerate() {
            if let Some(value) = property.extract(source) {
                self.set_property(index, value)?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Assign or replace the schema of a detached record, carrying values
    /// over by property name.
    pub fn set_schema(&self, schema: &SchemaRef) -> Result<()> {
        let mut state = self.cell.write();
        if state.owner.strong_count() > 0 {
            return Err(TabulaError::schema(
                schema.to_text(),
                "cannot change the schema of a record owned by a list",
            ));
        }
        if let Some(current) = state.schema.clone() {
            if Arc::ptr_eq(&current, schema) {
                return Ok(());
            }
            current.check_replaceable(schema)?;
            state.values = state.values.take().map(|values| current.carry_values(schema, &values));
        }
        state.schema = Some(Arc::clone(schema));
        Ok(())
    }

    pub(crate) fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Address of the shared row, stable for the row's lifetime.
    pub(crate) fn identity(&self) -> *const () {
        Arc::as_ptr(&self.cell) as *const ()
    }

    pub(crate) fn is_owned_by(&self, list: &Arc<ListShared>) -> bool {
        std::ptr::eq(self.cell.read().owner.as_ptr(), Arc::as_ptr(list))
    }

    pub(crate) fn attach(&self, list: &Arc<ListShared>, position: usize) {
        let mut state = self.cell.write();
        state.owner = Arc::downgrade(list);
        state.position = position as isize;
    }

    pub(crate) fn detach(&self) {
        let mut state = self.cell.write();
        state.owner = Weak::new();
        state.position = -1;
    }

    pub(crate) fn set_position(&self, position: usize) {
        self.cell.write().position = position as isize;
    }

    /// Raw slot value, never computed.
    pub(crate) fn value_at(&self, index: usize) -> Value {
        self.cell.read().slot(index)
    }

    pub(crate) fn write_slot(&self, index: usize, value: Value) {
        self.cell.write().put(index, value);
    }

    /// Rebind a row to a replacement schema, used by the owning list.
    pub(crate) fn rebind(&self, schema: &SchemaRef, values: Vec<Value>) {
        let mut state = self.cell.write();
        state.schema = Some(Arc::clone(schema));
        state.values = Some(values);
    }
}

fn deep_copy(value: Value) -> Value {
    match value {
        Value::Record(record) => Value::Record(record.clone_with_data()),
        Value::List(list) => Value::List(list.deep_copy_waiting()),
        Value::Array(items) => Value::Array(items.into_iter().map(deep_copy).collect()),
        other => other,
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        // one lock at a time
        let (schema_a, values_a) = {
            let state = self.cell.read();
            (state.schema.clone(), state.snapshot())
        };
        let (schema_b, values_b) = {
            let state = other.cell.read();
            (state.schema.clone(), state.snapshot())
        };
        let same_schema = match (&schema_a, &schema_b) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        same_schema && values_a == values_b
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (schema, values) = {
            let guard = self.cell.read();
            (guard.schema.clone(), guard.snapshot())
        };
        if let Some(schema) = schema {
            schema.fingerprint().hash(state);
        }
        values.hash(state);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (schema, values) = {
            let state = self.cell.read();
            (state.schema.clone(), state.snapshot())
        };
        let mut map = f.debug_map();
        if let Some(schema) = schema {
            for (name, value) in schema.names().zip(values.iter()) {
                map.entry(&name, value);
            }
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_refuses_a_stale_schema() {
        let old = RecordSchema::parse("ss_a,int\nss_b,String").unwrap();
        let new = RecordSchema::parse("ss_b,String\nss_a,int").unwrap();
        let record = Record::with_values(&old, vec![Value::Int(1), Value::from("b")]).unwrap();
        record.set_schema(&new).unwrap();

        assert!(!record.store(&old, 0, Value::Int(2)).unwrap());
        assert_eq!(record.values(), vec![Value::from("b"), Value::Int(1)]);

        // resolved again by name against the current schema
        record.set_property("ss_a", Value::Int(2)).unwrap();
        assert_eq!(record.values(), vec![Value::from("b"), Value::Int(2)]);
    }

    fn people() -> SchemaRef {
        RecordSchema::parse(
            "rc_id,long,,,,1\nrc_name,String\nrc_age,int,,,expr{@value@ >= 0}\nrc_flag,boolean\nrc_when,java.util.Date",
        )
        .unwrap()
    }

    #[test]
    fn test_lazy_slots_and_equality() {
        let schema = people();
        let blank = Record::new(&schema);
        let nulls = Record::with_values(&schema, vec![Value::Null; 5]).unwrap();
        assert_eq!(blank, nulls);
        assert_eq!(blank.get_property("rc_name").unwrap(), Value::Null);
        assert_eq!(blank.position(), None);
        assert!(blank.owner().is_none());
    }

    #[test]
    fn test_set_coerces_to_declared_type() {
        let schema = people();
        let record = Record::new(&schema);
        record.set_property("rc_age", Value::Byte(7)).unwrap();
        assert_eq!(record.get_property("rc_age").unwrap(), Value::Int(7));
        record.set_property("rc_id", Value::from("42")).unwrap();
        assert_eq!(record.get_property(0).unwrap(), Value::Long(42));

        let err = record.set_property("rc_age", Value::from("abc")).unwrap_err();
        assert_eq!(err.kind(), "property_set");
        let err = record.set_property("missing", Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), "property_set");
        let err = record.get_property(99usize).unwrap_err();
        assert_eq!(err.kind(), "property_get");
    }

    #[test]
    fn test_typed_accessors_are_lenient() {
        let schema = RecordSchema::parse("ta_any\nta_text,String\nta_flag,boolean").unwrap();
        let record = Record::new(&schema);
        record.set_property("ta_text", Value::from("12")).unwrap();
        assert_eq!(record.get_int("ta_text").unwrap(), 12);
        assert_eq!(record.get_double("ta_text").unwrap(), 12.0);
        record.set_property("ta_flag", Value::Bool(true)).unwrap();
        assert_eq!(record.get_int("ta_flag").unwrap(), 1);
        assert_eq!(record.get_long("ta_any").unwrap(), 0);
        assert!(!record.get_bool("ta_any").unwrap());
        assert_eq!(record.get_string("ta_any").unwrap(), None);

        record.set_property("ta_any", Value::from("300")).unwrap();
        assert!(record.get_byte("ta_any").is_err());
        assert_eq!(record.get_short("ta_any").unwrap(), 300);
        assert_eq!(record.get_big_integer("ta_any").unwrap(), Some(BigInt::from(300)));
    }

    #[test]
    fn test_validate_short_circuits() {
        let schema = people();
        let record = Record::new(&schema);
        // null is not comparable, so the range constraint fails
        assert!(!record.validate().unwrap());
        record.set_property("rc_age", Value::Int(5)).unwrap();
        assert!(record.validate().unwrap());
        record.set_property("rc_age", Value::Int(-1)).unwrap();
        assert!(!record.validate().unwrap());
        assert!(!record.validate_property("rc_age").unwrap());
    }

    #[test]
    fn test_clone_variants() {
        let schema = people();
        let record = Record::with_properties(&schema, vec![("rc_id", Value::Long(1)), ("rc_name", Value::from("ann"))])
            .unwrap();

        let empty = record.clone_schema_only();
        assert!(Arc::ptr_eq(&empty.schema().unwrap(), &schema));
        assert_eq!(empty.get_property("rc_id").unwrap(), Value::Null);

        let copy = record.clone_with_data();
        assert_eq!(copy, record);
        assert!(!copy.ptr_eq(&record));
        copy.set_property("rc_name", Value::from("bob")).unwrap();
        assert_eq!(record.get_string("rc_name").unwrap().as_deref(), Some("ann"));
    }

    #[test]
    fn test_unbound_record_rejects_access() {
        let record = Record::unbound();
        assert_eq!(record.get_property("x").unwrap_err().kind(), "property_get");
        assert_eq!(record.set_property("x", Value::Int(1)).unwrap_err().kind(), "property_set");

        let schema = RecordSchema::parse("ub_x,int").unwrap();
        record.set_schema(&schema).unwrap();
        record.set_property("ub_x", Value::Int(1)).unwrap();
        assert_eq!(record.get_int("ub_x").unwrap(), 1);
    }

    #[test]
    fn test_set_schema_carries_values() {
        let old = RecordSchema::parse("ss_a,int\nss_b,String").unwrap();
        let new = RecordSchema::parse("ss_a,long\nss_c,String").unwrap();
        let record = Record::with_values(&old, vec![Value::Int(3), Value::from("x")]).unwrap();
        // int -> long is not a supertype relation between primitives
        assert!(record.set_schema(&new).is_err());

        let wider = RecordSchema::parse("ss_a,java.lang.Number\nss_c,String").unwrap();
        record.set_schema(&wider).unwrap();
        assert_eq!(record.get_property("ss_a").unwrap(), Value::Int(3));
        assert_eq!(record.get_property("ss_c").unwrap(), Value::Null);
    }

    #[test]
    fn test_primary_key_and_entries() {
        let schema = people();
        let record = Record::with_properties(&schema, vec![("rc_id", Value::Long(5))]).unwrap();
        assert_eq!(record.primary_key(), Some(IndexKey::from(vec![Value::Long(5)])));
        let entries = record.entries().unwrap();
        assert_eq!(entries[0], ("rc_id".to_string(), Value::Long(5)));
        assert_eq!(format!("{:?}", record).contains("rc_id"), true);
    }
}
