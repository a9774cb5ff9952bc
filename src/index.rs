//! Index Implementation
//!
//! Ordered (B-tree) indexes over the rows of a record list. The index
//! manager keeps one reserved primary-key index (unique) and any number of
//! named secondary indexes (non-unique), keyed either by a list of
//! properties or by a caller-supplied key function.

use crate::record::Record;
use crate::schema::RecordSchema;
use crate::types::Value;
use chrono::NaiveDateTime;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Name of the reserved primary-key index
pub const PRIMARY_KEY_INDEX: &str = "primaryKey";

/// One component of an index key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Char(char),
    Integer(BigInt),
    Float(OrderedFloat),
    Decimal(Decimal),
    String(String),
    Date(NaiveDateTime),
    Array(Vec<KeyPart>),
    /// Nested records and lists, keyed by content hash
    Opaque(u64),
}

/// Wrapper for f64 to make it Ord (required for BTreeMap keys)
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for OrderedFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Char(c) => KeyPart::Char(*c),
            Value::Float(f) => KeyPart::Float(OrderedFloat(f64::from(*f))),
            Value::Double(f) => KeyPart::Float(OrderedFloat(*f)),
            Value::BigDecimal(d) => KeyPart::Decimal(d.normalize()),
            Value::String(s) => KeyPart::String(s.clone()),
            Value::Date(d) => KeyPart::Date(*d),
            Value::Array(items) => KeyPart::Array(items.iter().map(KeyPart::from).collect()),
            Value::Record(_) | Value::List(_) => {
                let mut hasher = DefaultHasher::new();
                value.hash(&mut hasher);
                KeyPart::Opaque(hasher.finish())
            }
            integral => KeyPart::Integer(integral.as_big_int().unwrap_or_default()),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => write!(f, "null"),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Char(c) => write!(f, "'{}'", c),
            KeyPart::Integer(n) => write!(f, "{}", n),
            KeyPart::Float(x) => write!(f, "{}", x.0),
            KeyPart::Decimal(d) => write!(f, "{}", d),
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Date(d) => write!(f, "{}", d),
            KeyPart::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            KeyPart::Opaque(h) => write!(f, "#{:016x}", h),
        }
    }
}

/// Ordered tuple of key parts
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey(pub Vec<KeyPart>);

impl IndexKey {
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        IndexKey(values.into_iter().map(KeyPart::from).collect())
    }

    /// Primary-key tuple of a record, `None` if its schema declares none.
    pub fn primary_of(record: &Record) -> Option<IndexKey> {
        let schema = record.schema()?;
        if !schema.has_primary_key() {
            return None;
        }
        Some(KeyExtractor::Properties(schema.primary_key_indices().to_vec()).key_of(record))
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl From<Vec<Value>> for IndexKey {
    fn from(values: Vec<Value>) -> Self {
        IndexKey::from_values(values.iter())
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, ")")
    }
}

/// Caller-supplied key derivation
pub type KeyFn = Arc<dyn Fn(&Record) -> Option<IndexKey> + Send + Sync>;

/// How an index derives a key from a record
#[derive(Clone)]
pub enum KeyExtractor {
    /// Raw slot values at these column indices
    Properties(Vec<usize>),
    /// `None` leaves the record out of the index
    Custom(KeyFn),
}

impl KeyExtractor {
    pub fn key_of(&self, record: &Record) -> IndexKey {
        match self {
            KeyExtractor::Properties(columns) => IndexKey(
                columns
                    .iter()
                    .map(|&i| KeyPart::from(&record.value_at(i)))
                    .collect(),
            ),
            KeyExtractor::Custom(f) => f(record).unwrap_or(IndexKey(Vec::new())),
        }
    }

    fn key_for(&self, record: &Record) -> Option<IndexKey> {
        match self {
            KeyExtractor::Properties(_) => Some(self.key_of(record)),
            KeyExtractor::Custom(f) => f(record),
        }
    }

    /// Key of a prospective value row (property extractors only).
    pub fn key_from_values(&self, values: &[Value]) -> Option<IndexKey> {
        match self {
            KeyExtractor::Properties(columns) => Some(IndexKey(
                columns
                    .iter()
                    .map(|&i| values.get(i).map(KeyPart::from).unwrap_or(KeyPart::Null))
                    .collect(),
            )),
            KeyExtractor::Custom(_) => None,
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyExtractor::Properties(columns) => f.debug_tuple("Properties").field(columns).finish(),
            KeyExtractor::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// B-tree index for fast lookups
#[derive(Clone)]
pub struct Index {
    /// Index name
    name: String,
    /// Indexed property names, for property indexes
    properties: Option<Vec<String>>,
    extractor: KeyExtractor,
    /// B-tree mapping key to the records holding it
    tree: BTreeMap<IndexKey, Vec<Record>>,
    /// Whether index is unique
    unique: bool,
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub name: String,
    pub unique: bool,
    pub properties: Option<Vec<String>>,
    pub distinct_keys: usize,
    pub entries: usize,
}

impl Index {
    /// Create a new empty index
    pub fn new(name: &str, properties: Option<Vec<String>>, extractor: KeyExtractor, unique: bool) -> Self {
        Index {
            name: name.to_string(),
            properties,
            extractor,
            tree: BTreeMap::new(),
            unique,
        }
    }

    /// Property index resolved against `schema`.
    pub fn on_properties(
        name: &str,
        schema: &RecordSchema,
        properties: &[&str],
        unique: bool,
    ) -> Result<Self, String> {
        if properties.is_empty() {
            return Err(format!("index '{}' needs at least one property", name));
        }
        let columns = properties
            .iter()
            .map(|p| {
                let column = schema
                    .index_of(p)
                    .ok_or_else(|| format!("unknown property '{}'", p))?;
                if schema.properties()[column].is_read_only() {
                    return Err(format!("computed property '{}' cannot be indexed", p));
                }
                Ok(column)
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Index::new(
            name,
            Some(properties.iter().map(|p| p.to_string()).collect()),
            KeyExtractor::Properties(columns),
            unique,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn properties(&self) -> Option<&[String]> {
        self.properties.as_deref()
    }

    pub fn extractor(&self) -> &KeyExtractor {
        &self.extractor
    }

    /// Insert a record. A unique index refuses a key held by another record
    /// and reports that key.
    pub fn insert(&mut self, record: &Record) -> Result<(), IndexKey> {
        let key = match self.extractor.key_for(record) {
            Some(key) => key,
            None => return Ok(()),
        };

        if self.unique {
            if let Some(holders) = self.tree.get(&key) {
                if holders.iter().any(|r| !r.ptr_eq(record)) {
                    return Err(key);
                }
            }
            self.tree.insert(key, vec![record.clone()]);
        } else {
            let holders = self.tree.entry(key).or_default();
            if !holders.iter().any(|r| r.ptr_eq(record)) {
                holders.push(record.clone());
            }
        }

        Ok(())
    }

    /// Remove a record under its current key.
    pub fn remove(&mut self, record: &Record) {
        let key = match self.extractor.key_for(record) {
            Some(key) => key,
            None => return,
        };

        if let Some(holders) = self.tree.get_mut(&key) {
            holders.retain(|r| !r.ptr_eq(record));
            if holders.is_empty() {
                self.tree.remove(&key);
            }
        }
    }

    /// Lookup records by exact key match
    pub fn lookup(&self, key: &IndexKey) -> Vec<Record> {
        self.tree.get(key).cloned().unwrap_or_default()
    }

    pub fn first(&self, key: &IndexKey) -> Option<Record> {
        self.tree.get(key).and_then(|holders| holders.first().cloned())
    }

    /// Range scan over `[start, end]`
    pub fn range(&self, start: &IndexKey, end: &IndexKey) -> Vec<Record> {
        if start > end {
            return Vec::new();
        }
        self.tree
            .range(start.clone()..=end.clone())
            .flat_map(|(_, holders)| holders.iter().cloned())
            .collect()
    }

    pub fn contains_key(&self, key: &IndexKey) -> bool {
        self.tree.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.name.clone(),
            unique: self.unique,
            properties: self.properties.clone(),
            distinct_keys: self.tree.len(),
            entries: self.tree.values().map(Vec::len).sum(),
        }
    }

    /// Empty copy with the same definition
    pub fn empty_copy(&self) -> Index {
        Index::new(&self.name, self.properties.clone(), self.extractor.clone(), self.unique)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("extractor", &self.extractor)
            .field("unique", &self.unique)
            .field("keys", &self.tree.len())
            .finish()
    }
}

/// Primary-key index plus named secondary indexes
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    primary: Option<Index>,
    secondary: BTreeMap<String, Index>,
}

impl IndexManager {
    pub fn new(schema: Option<&RecordSchema>) -> Self {
        let mut manager = IndexManager::default();
        manager.reset_primary(schema);
        manager
    }

    /// Recreate the (empty) primary index for `schema`.
    pub fn reset_primary(&mut self, schema: Option<&RecordSchema>) {
        self.primary = schema.filter(|s| s.has_primary_key()).map(|s| {
            Index::new(
                PRIMARY_KEY_INDEX,
                Some(s.primary_key_properties().map(|p| p.name().to_string()).collect()),
                KeyExtractor::Properties(s.primary_key_indices().to_vec()),
                true,
            )
        });
    }

    pub fn primary(&self) -> Option<&Index> {
        self.primary.as_ref()
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub fn primary_key_of(&self, record: &Record) -> Option<IndexKey> {
        self.primary.as_ref().map(|p| p.extractor.key_of(record))
    }

    pub fn find_primary(&self, key: &IndexKey) -> Option<Record> {
        self.primary.as_ref().and_then(|p| p.first(key))
    }

    /// Primary key `record` would collide on, ignoring `replacing`.
    pub fn collision(&self, record: &Record, replacing: Option<&Record>) -> Option<IndexKey> {
        let primary = self.primary.as_ref()?;
        let key = primary.extractor.key_of(record);
        let holder = primary.first(&key)?;
        if holder.ptr_eq(record) || replacing.map_or(false, |r| holder.ptr_eq(r)) {
            None
        } else {
            Some(key)
        }
    }

    /// Primary key collision of a prospective value row for `record`.
    pub fn collision_for_values(&self, record: &Record, values: &[Value]) -> Option<IndexKey> {
        let primary = self.primary.as_ref()?;
        let key = primary.extractor.key_from_values(values)?;
        match primary.first(&key) {
            Some(holder) if !holder.ptr_eq(record) => Some(key),
            _ => None,
        }
    }

    /// Add a record to every index; fails only on a primary-key collision,
    /// in which case no index was touched.
    pub fn insert(&mut self, record: &Record) -> Result<(), IndexKey> {
        if let Some(primary) = self.primary.as_mut() {
            primary.insert(record)?;
        }
        for index in self.secondary.values_mut() {
            // secondary indexes are non-unique
            let _ = index.insert(record);
        }
        Ok(())
    }

    pub fn remove(&mut self, record: &Record) {
        if let Some(primary) = self.primary.as_mut() {
            primary.remove(record);
        }
        for index in self.secondary.values_mut() {
            index.remove(record);
        }
    }

    pub fn clear(&mut self) {
        if let Some(primary) = self.primary.as_mut() {
            primary.clear();
        }
        for index in self.secondary.values_mut() {
            index.clear();
        }
    }

    /// Clear and re-add every row. Returns the primary keys found more
    /// than once; only the first holder of such a key stays indexed.
    pub fn rebuild(&mut self, rows: &[Record]) -> Vec<IndexKey> {
        self.clear();
        let mut duplicates = Vec::new();
        for row in rows {
            if let Err(key) = self.insert(row) {
                for index in self.secondary.values_mut() {
                    let _ = index.insert(row);
                }
                duplicates.push(key);
            }
        }
        duplicates
    }

    /// Register a secondary index and fill it from `rows`.
    pub fn create(&mut self, mut index: Index, rows: &[Record]) -> Result<(), String> {
        if index.name == PRIMARY_KEY_INDEX {
            return Err(format!("index name '{}' is reserved", PRIMARY_KEY_INDEX));
        }
        if self.secondary.contains_key(&index.name) {
            return Err(format!("index '{}' already exists", index.name));
        }
        for row in rows {
            let _ = index.insert(row);
        }
        self.secondary.insert(index.name.clone(), index);
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.secondary.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Index> {
        if name == PRIMARY_KEY_INDEX {
            return self.primary.as_ref();
        }
        self.secondary.get(name)
    }

    pub fn secondary(&self) -> impl Iterator<Item = &Index> {
        self.secondary.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(self.secondary.values())
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn stats(&self) -> Vec<IndexStats> {
        self.primary
            .iter()
            .chain(self.secondary.values())
            .map(Index::stats)
            .collect()
    }

    /// Index keyed by exactly these columns, in this order.
    pub fn find_by_columns(&self, columns: &[usize]) -> Option<&Index> {
        self.primary
            .iter()
            .chain(self.secondary.values())
            .find(|index| matches!(&index.extractor, KeyExtractor::Properties(c) if c.as_slice() == columns))
    }

    /// Empty manager with the same index definitions
    pub fn empty_copy(&self) -> IndexManager {
        IndexManager {
            primary: self.primary.as_ref().map(Index::empty_copy),
            secondary: self
                .secondary
                .iter()
                .map(|(name, index)| (name.clone(), index.empty_copy()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordSchema;

    fn schema() -> crate::schema::SchemaRef {
        RecordSchema::parse("ix_id,long,,,,1\nix_city,String\nix_score,double").unwrap()
    }

    fn row(schema: &crate::schema::SchemaRef, id: i64, city: &str, score: f64) -> Record {
        Record::with_values(
            schema,
            vec![Value::Long(id), Value::from(city), Value::Double(score)],
        )
        .unwrap()
    }

    #[test]
    fn test_key_ordering() {
        let a = IndexKey::from(vec![Value::Long(1), Value::from("b")]);
        let b = IndexKey::from(vec![Value::Long(2), Value::from("a")]);
        assert!(a < b);
        assert_eq!(
            IndexKey::from(vec![Value::Int(7)]),
            IndexKey::from(vec![Value::Long(7)])
        );
        assert!(OrderedFloat(-0.5) < OrderedFloat(0.25));
        assert_eq!(a.to_string(), "(1, \"b\")");
    }

    #[test]
    fn test_unique_index_rejects_second_holder() {
        let schema = schema();
        let mut manager = IndexManager::new(Some(&schema));
        let first = row(&schema, 1, "NYC", 1.0);
        let clash = row(&schema, 1, "LA", 2.0);

        manager.insert(&first).unwrap();
        // re-inserting the same record is idempotent
        manager.insert(&first).unwrap();
        let key = manager.insert(&clash).unwrap_err();
        assert_eq!(key, IndexKey::from(vec![Value::Long(1)]));
        assert_eq!(manager.collision(&clash, None), Some(key));
        assert_eq!(manager.collision(&clash, Some(&first)), None);
    }

    #[test]
    fn test_secondary_index_lookup_and_range() {
        let schema = schema();
        let rows = vec![
            row(&schema, 1, "NYC", 1.0),
            row(&schema, 2, "NYC", 5.0),
            row(&schema, 3, "LA", 3.0),
        ];
        let mut manager = IndexManager::new(Some(&schema));
        for r in &rows {
            manager.insert(r).unwrap();
        }
        let by_city = Index::on_properties("by_city", &schema, &["ix_city"], false).unwrap();
        manager.create(by_city, &rows).unwrap();
        let by_score = Index::on_properties("by_score", &schema, &["ix_score"], false).unwrap();
        manager.create(by_score, &rows).unwrap();

        let nyc = manager
            .get("by_city")
            .unwrap()
            .lookup(&IndexKey::from(vec![Value::from("NYC")]));
        assert_eq!(nyc.len(), 2);

        let mid = manager.get("by_score").unwrap().range(
            &IndexKey::from(vec![Value::Double(2.0)]),
            &IndexKey::from(vec![Value::Double(5.0)]),
        );
        assert_eq!(mid.len(), 2);

        assert_eq!(manager.names(), vec!["primaryKey", "by_city", "by_score"]);
        assert!(manager.find_by_columns(&[1]).is_some());
        assert!(manager.find_by_columns(&[1, 2]).is_none());

        manager.remove(&rows[0]);
        let stats = manager.get("by_city").unwrap().stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.distinct_keys, 2);
        assert!(manager.drop_index("by_city"));
        assert!(!manager.drop_index("by_city"));
    }

    #[test]
    fn test_rebuild_reports_duplicates() {
        let schema = schema();
        let rows = vec![row(&schema, 1, "A", 0.0), row(&schema, 1, "B", 0.0)];
        let mut manager = IndexManager::new(Some(&schema));
        let duplicates = manager.rebuild(&rows);
        assert_eq!(duplicates, vec![IndexKey::from(vec![Value::Long(1)])]);
    }

    #[test]
    fn test_custom_key_function() {
        let schema = schema();
        let key_fn: KeyFn = Arc::new(|record: &Record| {
            let city = record.get_string("ix_city").ok().flatten()?;
            Some(IndexKey::from(vec![Value::from(city.to_lowercase())]))
        });
        let mut index = Index::new("lower_city", None, KeyExtractor::Custom(key_fn), false);
        let r = row(&schema, 9, "Paris", 0.0);
        index.insert(&r).unwrap();
        assert_eq!(index.lookup(&IndexKey::from(vec![Value::from("paris")])).len(), 1);
        assert!(Index::on_properties("bad", &schema, &["nope"], false).is_err());
    }
}
