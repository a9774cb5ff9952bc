//! Record Lists
//!
//! An ordered, schema-homogeneous collection of records with a primary-key
//! index, named secondary indexes, predicate scans, stable multi-key sorts
//! and change-set reconciliation.
//!
//! Every structural mutation runs as one critical section over the rows and
//! the index manager:
//! 1. probe the primary-key index for a collision
//! 2. mutate the backing sequence
//! 3. renumber the shifted records
//! 4. update the index manager
//! 5. bump the modification counter
//!
//! Iterators snapshot the modification counter and fail fast with
//! [`TabulaError::ConcurrentModification`] once another path changed the
//! list's structure.
//!
//! Lock order is list before record. Expressions and computed columns are
//! always evaluated outside the list lock. Custom index key functions run
//! under it and must not read computed columns of the list's own rows.

use crate::changeset::{ChangeSet, UpdateKind};
use crate::config::ListConfig;
use crate::error::{Result, TabulaError};
use crate::expression::{Program, RecordScope};
use crate::index::{Index, IndexKey, IndexManager, IndexStats, KeyExtractor, KeyFn};
use crate::record::Record;
use crate::schema::SchemaRef;
use crate::sort::{compare_rows, SortSpec};
use crate::types::Value;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Locking strategy, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncMode {
    /// Every operation blocks on the list mutex.
    Guarded,
    /// The caller promises exclusive access; contention is reported as a
    /// concurrent modification instead of blocking.
    Unguarded,
}

impl SyncMode {
    pub fn is_synchronized(&self) -> bool {
        *self == SyncMode::Guarded
    }
}

/// Outcome of a slot write routed through the owning list
pub(crate) enum SlotWrite {
    Written,
    /// The row was rebound to another schema since the caller resolved
    /// the slot.
    SchemaChanged,
    /// The row left this list; the value is handed back.
    NotOwned(Value),
}

struct ListState {
    rows: Vec<Record>,
    indexes: IndexManager,
    sort_spec: Option<SortSpec>,
}

pub(crate) struct ListShared {
    name: String,
    mode: SyncMode,
    state: Mutex<ListState>,
    /// Written only while `state` is held
    schema: RwLock<Option<SchemaRef>>,
    modifications: AtomicU64,
    length: AtomicUsize,
}

/// Shared handle to a list; clones refer to the same list.
#[derive(Clone)]
pub struct RecordList {
    shared: Arc<ListShared>,
}

fn renumber(rows: &[Record], from: usize) {
    for (position, row) in rows.iter().enumerate().skip(from) {
        row.set_position(position);
    }
}

impl RecordList {
    /// Guarded list without a schema; the first inserted record's schema
    /// is adopted.
    pub fn new(name: &str) -> Self {
        Self::with_mode(name, None, SyncMode::Guarded)
    }

    pub fn with_schema(name: &str, schema: &SchemaRef) -> Self {
        Self::with_mode(name, Some(schema), SyncMode::Guarded)
    }

    pub fn unguarded(name: &str, schema: &SchemaRef) -> Self {
        Self::with_mode(name, Some(schema), SyncMode::Unguarded)
    }

    pub fn with_mode(name: &str, schema: Option<&SchemaRef>, mode: SyncMode) -> Self {
        RecordList {
            shared: Arc::new(ListShared {
                name: name.to_string(),
                mode,
                state: Mutex::new(ListState {
                    rows: Vec::new(),
                    indexes: IndexManager::new(schema.map(|s| &**s)),
                    sort_spec: None,
                }),
                schema: RwLock::new(schema.cloned()),
                modifications: AtomicU64::new(0),
                length: AtomicUsize::new(0),
            }),
        }
    }

    /// Build a list from configuration: mode, sort specification and
    /// secondary indexes.
    pub fn from_config(schema: Option<&SchemaRef>, config: &ListConfig) -> Result<Self> {
        config.validate()?;
        let list = Self::with_mode(&config.name, schema, config.mode());
        if let Some(spec) = &config.sort {
            if let Some(schema) = schema {
                spec.resolve(schema).map_err(TabulaError::Config)?;
            }
            list.set_sort_spec(Some(spec.clone()))?;
        }
        if !config.indexes.is_empty() && schema.is_none() {
            return Err(TabulaError::Config(format!(
                "list '{}' declares indexes but has no schema",
                config.name
            )));
        }
        for index in &config.indexes {
            let properties: Vec<&str> = index.properties.iter().map(String::as_str).collect();
            list.create_index(&index.name, &properties)
                .map_err(|e| TabulaError::Config(e.to_string()))?;
        }
        Ok(list)
    }

    pub(crate) fn from_shared(shared: Arc<ListShared>) -> Self {
        RecordList { shared }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ListState>> {
        match self.shared.mode {
            SyncMode::Guarded => Ok(self.shared.state.lock()),
            SyncMode::Unguarded => self
                .shared
                .state
                .try_lock()
                .ok_or_else(|| self.concurrent("unguarded list accessed by more than one caller")),
        }
    }

    fn concurrent(&self, detail: &str) -> TabulaError {
        TabulaError::ConcurrentModification {
            list: self.shared.name.clone(),
            detail: detail.to_string(),
        }
    }

    fn duplicate(&self, key: &IndexKey) -> TabulaError {
        TabulaError::DuplicatePrimaryKey {
            list: self.shared.name.clone(),
            key: key.to_string(),
        }
    }

    fn bump(&self, state: &ListState) {
        self.shared.modifications.fetch_add(1, Ordering::SeqCst);
        self.shared.length.store(state.rows.len(), Ordering::SeqCst);
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn mode(&self) -> SyncMode {
        self.shared.mode
    }

    pub fn schema(&self) -> Option<SchemaRef> {
        self.shared.schema.read().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.length.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn modification_count(&self) -> u64 {
        self.shared.modifications.load(Ordering::SeqCst)
    }

    pub fn ptr_eq(&self, other: &RecordList) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Row at `index`.
    pub fn get(&self, index: usize) -> Result<Record> {
        let state = self.lock()?;
        state.rows.get(index).cloned().ok_or(TabulaError::IndexOutOfBounds {
            index,
            len: state.rows.len(),
        })
    }

    /// Whether the record is one of this list's rows, or equal to one.
    pub fn contains(&self, record: &Record) -> Result<bool> {
        if record.is_owned_by(&self.shared) {
            return Ok(true);
        }
        Ok(self.snapshot()?.iter().any(|row| row == record))
    }

    /// Detached record of this list's schema.
    pub fn new_record(&self) -> Result<Record> {
        self.schema()
            .map(|schema| Record::new(&schema))
            .ok_or_else(|| TabulaError::set("*", format!("list '{}' has no schema", self.shared.name)))
    }

    /// Current rows, as live handles.
    pub fn snapshot(&self) -> Result<Vec<Record>> {
        Ok(self.lock()?.rows.clone())
    }

    /// Rows for comparisons that cannot report an error. Waits for the
    /// lock in either mode.
    fn rows_waiting(&self) -> Vec<Record> {
        self.shared.state.lock().rows.clone()
    }

    /// Row lookup for value-path navigation, where a missing row reads as
    /// null. Waits for the lock in either mode.
    pub(crate) fn row_waiting(&self, index: usize) -> Option<Record> {
        self.shared.state.lock().rows.get(index).cloned()
    }

    /// Check the record against the list schema, adopting it on an
    /// unset list. Records already owned elsewhere are copied.
    fn adopt(&self, state: &mut ListState, record: Record) -> Result<Record> {
        let schema = record.schema().ok_or_else(|| {
            TabulaError::schema("", format!("cannot add a record without schema to list '{}'", self.shared.name))
        })?;
        let current = self.shared.schema.read().clone();
        match current {
            Some(current) if !Arc::ptr_eq(&current, &schema) => {
                return Err(TabulaError::schema(
                    schema.to_text(),
                    format!("record schema does not match list '{}'", self.shared.name),
                ));
            }
            Some(_) => {}
            None => {
                state.indexes.reset_primary(Some(&schema));
                *self.shared.schema.write() = Some(schema);
            }
        }
        if record.is_owned() {
            Ok(record.clone_with_data())
        } else {
            Ok(record)
        }
    }

    /// Append a record.
    pub fn add(&self, record: Record) -> Result<()> {
        let mut state = self.lock()?;
        let position = state.rows.len();
        self.insert_locked(&mut state, position, record)
    }

    /// Insert a record at `index`, shifting later rows.
    pub fn insert(&self, index: usize, record: Record) -> Result<()> {
        let mut state = self.lock()?;
        self.insert_locked(&mut state, index, record)
    }

    fn insert_locked(&self, state: &mut ListState, index: usize, record: Record) -> Result<()> {
        if index > state.rows.len() {
            return Err(TabulaError::IndexOutOfBounds {
                index,
                len: state.rows.len(),
            });
        }
        let record = self.adopt(state, record)?;
        if let Some(key) = state.indexes.collision(&record, None) {
            return Err(self.duplicate(&key));
        }
        state.rows.insert(index, record.clone());
        record.attach(&self.shared, index);
        renumber(&state.rows, index + 1);
        state
            .indexes
            .insert(&record)
            .map_err(|key| self.duplicate(&key))?;
        self.bump(state);
        trace!(list = %self.shared.name, position = index, "inserted record");
        Ok(())
    }

    /// Replace the row at `index`, returning the previous row. Replacing a
    /// row with itself is a no-op.
    pub fn set(&self, index: usize, record: Record) -> Result<Record> {
        let mut state = self.lock()?;
        let previous = match state.rows.get(index) {
            Some(previous) => previous.clone(),
            None => {
                return Err(TabulaError::IndexOutOfBounds {
                    index,
                    len: state.rows.len(),
                })
            }
        };
        if previous.ptr_eq(&record) {
            return Ok(record);
        }
        let record = self.adopt(&mut state, record)?;
        if let Some(key) = state.indexes.collision(&record, Some(&previous)) {
            return Err(self.duplicate(&key));
        }
        state.indexes.remove(&previous);
        previous.detach();
        state.rows[index] = record.clone();
        record.attach(&self.shared, index);
        state
            .indexes
            .insert(&record)
            .map_err(|key| self.duplicate(&key))?;
        self.bump(&state);
        trace!(list = %self.shared.name, position = index, "replaced record");
        Ok(previous)
    }

    /// Remove and return the row at `index`.
    pub fn remove(&self, index: usize) -> Result<Record> {
        let mut state = self.lock()?;
        self.remove_locked(&mut state, index)
    }

    fn remove_locked(&self, state: &mut ListState, index: usize) -> Result<Record> {
        if index >= state.rows.len() {
            return Err(TabulaError::IndexOutOfBounds {
                index,
                len: state.rows.len(),
            });
        }
        let removed = state.rows.remove(index);
        state.indexes.remove(&removed);
        removed.detach();
        renumber(&state.rows, index);
        self.bump(state);
        trace!(list = %self.shared.name, position = index, "removed record");
        Ok(removed)
    }

    fn position_of(state: &ListState, record: &Record) -> Option<usize> {
        record
            .position()
            .filter(|&p| state.rows.get(p).map_or(false, |row| row.ptr_eq(record)))
            .or_else(|| state.rows.iter().position(|row| row.ptr_eq(record)))
    }

    /// Remove a row by identity. Returns whether it was present.
    pub fn remove_record(&self, record: &Record) -> Result<bool> {
        let mut state = self.lock()?;
        match Self::position_of(&state, record) {
            Some(index) => self.remove_locked(&mut state, index).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock()?;
        for row in state.rows.drain(..) {
            row.detach();
        }
        state.indexes.clear();
        self.bump(&state);
        trace!(list = %self.shared.name, "cleared list");
        Ok(())
    }

    /// Slot write routed from [`Record::set_property`]: the row leaves its
    /// indexes under the old value and re-enters them under the new one
    /// within one critical section. `schema` is the schema the slot index
    /// and the coerced value were derived from.
    pub(crate) fn update_slot(
        &self,
        record: &Record,
        schema: &SchemaRef,
        index: usize,
        value: Value,
    ) -> Result<SlotWrite> {
        let mut state = self.lock()?;
        if !record.is_owned_by(&self.shared) {
            return Ok(SlotWrite::NotOwned(value));
        }
        if !record.schema().map_or(false, |current| Arc::ptr_eq(&current, schema)) {
            return Ok(SlotWrite::SchemaChanged);
        }
        if schema.primary_key_indices().contains(&index) {
            let mut prospective = record.values();
            if let Some(slot) = prospective.get_mut(index) {
                *slot = value.clone();
            }
            if let Some(key) = state.indexes.collision_for_values(record, &prospective) {
                return Err(self.duplicate(&key));
            }
        }
        state.indexes.remove(record);
        record.write_slot(index, value);
        state
            .indexes
            .insert(record)
            .map_err(|key| self.duplicate(&key))?;
        Ok(SlotWrite::Written)
    }

    /// Row currently holding the primary key `key`.
    pub fn find_by_key(&self, key: &IndexKey) -> Result<Option<Record>> {
        let state = self.lock()?;
        if !state.indexes.has_primary() {
            return Err(TabulaError::query(
                "primary key",
                format!("list '{}' declares no primary key", self.shared.name),
            ));
        }
        Ok(state.indexes.find_primary(key))
    }

    /// Primary-key probe. The key record may be of another schema; its
    /// primary-key properties are read by name and coerced to this list's
    /// column types.
    pub fn search_by_primary_key(&self, key_record: &Record) -> Result<Option<Record>> {
        let schema = self.primary_schema()?;
        let same_schema = key_record
            .schema()
            .map_or(false, |s| Arc::ptr_eq(&s, &schema));
        let values = schema
            .primary_key_indices()
            .iter()
            .map(|&column| {
                if same_schema {
                    Ok(key_record.value_at(column))
                } else {
                    key_record.get_property(schema.properties()[column].name())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        self.search_by_primary_key_values(&values)
    }

    /// Primary-key probe by values in primary-key declaration order.
    pub fn search_by_primary_key_values(&self, values: &[Value]) -> Result<Option<Record>> {
        let schema = self.primary_schema()?;
        if values.len() != schema.primary_key_indices().len() {
            return Err(TabulaError::query(
                "primary key",
                format!(
                    "expected {} key values, got {}",
                    schema.primary_key_indices().len(),
                    values.len()
                ),
            ));
        }
        let coerced = schema
            .primary_key_properties()
            .zip(values.iter())
            .map(|(property, value)| property.set(value.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.find_by_key(&IndexKey::from(coerced))
    }

    fn primary_schema(&self) -> Result<SchemaRef> {
        self.schema()
            .filter(|schema| schema.has_primary_key())
            .ok_or_else(|| {
                TabulaError::query(
                    "primary key",
                    format!("list '{}' declares no primary key", self.shared.name),
                )
            })
    }

    /// Rows whose named properties equal `values`, copied into a new list.
    /// Equality is index-key equality, with or without an index over
    /// exactly these properties: null equals only null and numbers of
    /// different kinds never match on an untyped column.
    pub fn search_by_key(&self, properties: &[&str], values: &[Value]) -> Result<RecordList> {
        let description = properties.join(",");
        if properties.len() != values.len() {
            return Err(TabulaError::query(
                description,
                format!("{} properties but {} values", properties.len(), values.len()),
            ));
        }
        let schema = self
            .schema()
            .ok_or_else(|| TabulaError::query(&description, "list has no schema"))?;
        let mut columns = Vec::with_capacity(properties.len());
        let mut probe = Vec::with_capacity(values.len());
        for (name, value) in properties.iter().zip(values) {
            let column = schema
                .index_of(name)
                .ok_or_else(|| TabulaError::query(&description, format!("unknown property '{}'", name)))?;
            let property = &schema.properties()[column];
            let value = if property.is_read_only() {
                value.clone()
            } else {
                property
                    .set(value.clone())
                    .map_err(|e| TabulaError::query(&description, e.to_string()))?
            };
            columns.push(column);
            probe.push(value);
        }

        let indexed = {
            let state = self.lock()?;
            state
                .indexes
                .find_by_columns(&columns)
                .map(|index| index.lookup(&IndexKey::from_values(probe.iter())))
        };
        let matches = match indexed {
            Some(rows) => {
                let mut rows = rows;
                rows.sort_by_key(|row| row.position().unwrap_or(usize::MAX));
                rows
            }
            None => {
                let expected = IndexKey::from_values(probe.iter());
                let mut matches = Vec::new();
                for row in self.snapshot()? {
                    let actual = columns
                        .iter()
                        .map(|&column| row.get_property(column))
                        .collect::<Result<Vec<_>>>()?;
                    if IndexKey::from(actual) == expected {
                        matches.push(row);
                    }
                }
                matches
            }
        };
        self.derived(matches)
    }

    /// Rows for which the boolean expression holds, copied into a new list.
    /// Every property is bound by name, plus the extra `variables`.
    pub fn search_by_expression(&self, expression: &str, variables: &HashMap<String, Value>) -> Result<RecordList> {
        let program = Program::compile(expression).map_err(|cause| TabulaError::query(expression, cause))?;
        if program.ast().yields_boolean() == Some(false) {
            return Err(TabulaError::query(expression, "expression can never produce a boolean"));
        }
        let mut matches = Vec::new();
        for row in self.snapshot()? {
            let scope = RecordScope::with_variables(&row, variables);
            match program.evaluate(&scope) {
                Ok(Value::Bool(true)) => matches.push(row),
                Ok(Value::Bool(false)) => {}
                Ok(other) => {
                    return Err(TabulaError::query(
                        expression,
                        format!("returned {} {}, expected a boolean", other.type_name(), other),
                    ))
                }
                Err(cause) => return Err(TabulaError::query(expression, cause)),
            }
        }
        self.derived(matches)
    }

    pub fn search(&self, expression: &str) -> Result<RecordList> {
        self.search_by_expression(expression, &HashMap::new())
    }

    /// Fresh list of this name, mode and schema holding copies of `rows`.
    fn derived(&self, rows: Vec<Record>) -> Result<RecordList> {
        let result = RecordList::with_mode(&self.shared.name, self.schema().as_ref(), self.shared.mode);
        {
            let mut state = result.lock()?;
            for row in rows {
                let position = state.rows.len();
                result.insert_locked(&mut state, position, row.clone_with_data())?;
            }
        }
        Ok(result)
    }

    /// Stable sort by property names with per-key direction flags
    /// (missing flags mean ascending).
    pub fn sort(&self, properties: &[&str], ascending: &[bool]) -> Result<()> {
        self.sort_by_spec(&SortSpec::from_parts(properties, ascending))
    }

    pub fn sort_by_spec(&self, spec: &SortSpec) -> Result<()> {
        let (rows, expected) = {
            let state = self.lock()?;
            (state.rows.clone(), self.modification_count())
        };
        let schema = match self.schema() {
            Some(schema) => schema,
            None => return Ok(()),
        };
        let sorted = sort_rows(rows, spec, &schema)?;

        let mut state = self.lock()?;
        if self.modification_count() != expected {
            return Err(self.concurrent("list changed while sorting"));
        }
        renumber(&sorted, 0);
        state.rows = sorted;
        self.bump(&state);
        trace!(list = %self.shared.name, keys = spec.keys.len(), "sorted list");
        Ok(())
    }

    /// Sort specification applied to reconciliation results.
    pub fn set_sort_spec(&self, spec: Option<SortSpec>) -> Result<()> {
        let mut state = self.lock()?;
        state.sort_spec = spec.filter(|s| !s.is_empty());
        Ok(())
    }

    pub fn sort_spec(&self) -> Result<Option<SortSpec>> {
        Ok(self.lock()?.sort_spec.clone())
    }

    /// Apply a change set, producing a new list. Unchanged rows are copied,
    /// add/update payloads replace rows under their key, removes drop rows,
    /// and pending adds/updates are appended in change-set order. This list
    /// is never modified.
    pub fn reconcile(&self, changes: &ChangeSet) -> Result<RecordList> {
        let schema = self.schema().filter(|s| s.has_primary_key()).ok_or_else(|| {
            TabulaError::Reconciliation {
                key: "*".to_string(),
                cause: format!("list '{}' declares no primary key", self.shared.name),
            }
        })?;
        let (rows, sort_spec, indexes) = {
            let state = self.lock()?;
            (state.rows.clone(), state.sort_spec.clone(), state.indexes.empty_copy())
        };

        let mut pending = changes.clone();
        let mut result = Vec::with_capacity(rows.len() + pending.len());
        let (mut kept, mut replaced, mut removed, mut appended) = (0usize, 0usize, 0usize, 0usize);

        for row in &rows {
            let key = match row.primary_key() {
                Some(key) => key,
                None => continue,
            };
            match pending.take(&key) {
                None => {
                    result.push(row.clone_with_data());
                    kept += 1;
                }
                Some(change) if change.kind == UpdateKind::Remove => removed += 1,
                Some(change) => {
                    result.push(payload_for(&key, change.payload, &schema)?);
                    replaced += 1;
                }
            }
        }
        for (key, change) in pending.drain() {
            if change.kind == UpdateKind::Remove {
                continue;
            }
            result.push(payload_for(&key, change.payload, &schema)?);
            appended += 1;
        }

        if let Some(spec) = &sort_spec {
            result = sort_rows(result, spec, &schema)?;
        }

        let reconciled = RecordList::with_mode(&self.shared.name, Some(&schema), self.shared.mode);
        {
            let mut state = reconciled.lock()?;
            state.indexes = indexes;
            state.sort_spec = sort_spec;
            for row in result {
                let position = state.rows.len();
                reconciled.insert_locked(&mut state, position, row)?;
            }
        }
        debug!(
            list = %self.shared.name,
            kept,
            replaced,
            removed,
            appended,
            "reconciled change set"
        );
        Ok(reconciled)
    }

    /// Renumber every row and rebuild all indexes from scratch. Returns how
    /// many rows share a primary key with an earlier row.
    pub fn analyze(&self) -> Result<usize> {
        let mut state = self.lock()?;
        Ok(self.analyze_locked(&mut state))
    }

    fn analyze_locked(&self, state: &mut ListState) -> usize {
        for (position, row) in state.rows.iter().enumerate() {
            row.attach(&self.shared, position);
        }
        let ListState { rows, indexes, .. } = state;
        let duplicates = indexes.rebuild(rows);
        for key in &duplicates {
            warn!(list = %self.shared.name, key = %key, "duplicate primary key after rebuild");
        }
        debug!(list = %self.shared.name, rows = rows.len(), "rebuilt indexes");
        duplicates.len()
    }

    /// Hand the backing rows to `f` for bulk mutation, then re-attach,
    /// renumber and rebuild the indexes. Rows of another schema are
    /// rejected and the list is left unchanged.
    pub fn modify_rows<T>(&self, f: impl FnOnce(&mut Vec<Record>) -> T) -> Result<T> {
        let mut state = self.lock()?;
        let mut rows = state.rows.clone();
        let output = f(&mut rows);

        let schema = match self.schema() {
            Some(schema) => Some(schema),
            None => rows.first().and_then(Record::schema),
        };
        if let Some(schema) = &schema {
            if let Some(foreign) = rows
                .iter()
                .find(|row| row.schema().map_or(true, |s| !Arc::ptr_eq(&s, schema)))
            {
                return Err(TabulaError::schema(
                    foreign.schema().map(|s| s.to_text().to_string()).unwrap_or_default(),
                    format!("record schema does not match list '{}'", self.shared.name),
                ));
            }
        }

        let mut seen: HashSet<*const ()> = HashSet::with_capacity(rows.len());
        for row in rows.iter_mut() {
            let foreign = row.is_owned() && !row.is_owned_by(&self.shared);
            if foreign || !seen.insert(row.identity()) {
                *row = row.clone_with_data();
                seen.insert(row.identity());
            }
        }
        for old in &state.rows {
            if !seen.contains(&old.identity()) {
                old.detach();
            }
        }

        let unset = self.shared.schema.read().is_none();
        if unset {
            state.indexes.reset_primary(schema.as_deref());
            *self.shared.schema.write() = schema;
        }
        state.rows = rows;
        self.analyze_locked(&mut state);
        self.bump(&state);
        Ok(output)
    }

    /// Replace the list schema, carrying every row over by property name.
    /// Fails without changes when the replacement is incompatible or would
    /// make two rows share a primary key.
    pub fn set_schema(&self, replacement: &SchemaRef) -> Result<()> {
        let mut state = self.lock()?;
        let current = self.shared.schema.read().clone();
        let current = match current {
            Some(current) if Arc::ptr_eq(&current, replacement) => return Ok(()),
            Some(current) => current,
            None => {
                state.indexes.reset_primary(Some(replacement));
                *self.shared.schema.write() = Some(Arc::clone(replacement));
                return Ok(());
            }
        };
        current.check_replaceable(replacement)?;

        let carried: Vec<Vec<Value>> = state
            .rows
            .iter()
            .map(|row| current.carry_values(replacement, &row.values()))
            .collect();

        let mut indexes = IndexManager::new(Some(replacement));
        if let Some(primary) = indexes.primary() {
            let mut keys = HashSet::with_capacity(carried.len());
            for values in &carried {
                if let Some(key) = primary.extractor().key_from_values(values) {
                    if !keys.insert(key.clone()) {
                        return Err(self.duplicate(&key));
                    }
                }
            }
        }
        for index in state.indexes.secondary() {
            let rebuilt = match (index.properties(), index.extractor()) {
                (Some(properties), KeyExtractor::Properties(_)) => {
                    let names: Vec<&str> = properties.iter().map(String::as_str).collect();
                    match Index::on_properties(index.name(), replacement, &names, index.is_unique()) {
                        Ok(rebuilt) => rebuilt,
                        Err(cause) => {
                            warn!(list = %self.shared.name, index = index.name(), %cause, "dropping index");
                            continue;
                        }
                    }
                }
                _ => index.empty_copy(),
            };
            indexes
                .create(rebuilt, &[])
                .map_err(|cause| TabulaError::schema(replacement.to_text(), cause))?;
        }

        for (row, values) in state.rows.iter().zip(carried) {
            row.rebind(replacement, values);
        }
        state.indexes = indexes;
        *self.shared.schema.write() = Some(Arc::clone(replacement));
        self.analyze_locked(&mut state);
        self.bump(&state);
        debug!(list = %self.shared.name, fingerprint = replacement.fingerprint(), "replaced list schema");
        Ok(())
    }

    /// Independent copy: same name, mode, schema, sort specification and
    /// index definitions, deep copies of every row.
    pub fn deep_copy(&self) -> Result<RecordList> {
        let parts = {
            let state = self.lock()?;
            (state.rows.clone(), state.sort_spec.clone(), state.indexes.empty_copy())
        };
        Ok(self.copy_from(parts))
    }

    /// Deep copy of a list nested in a record value. Waits for the lock in
    /// either mode so the copy is never partial.
    pub(crate) fn deep_copy_waiting(&self) -> RecordList {
        let parts = {
            let state = self.shared.state.lock();
            (state.rows.clone(), state.sort_spec.clone(), state.indexes.empty_copy())
        };
        self.copy_from(parts)
    }

    fn copy_from(&self, parts: (Vec<Record>, Option<SortSpec>, IndexManager)) -> RecordList {
        let (rows, sort_spec, indexes) = parts;
        let copy = RecordList::with_mode(&self.shared.name, self.schema().as_ref(), self.shared.mode);
        {
            let mut state = copy.shared.state.lock();
            state.rows = rows.iter().map(Record::clone_with_data).collect();
            state.indexes = indexes;
            state.sort_spec = sort_spec;
            copy.analyze_locked(&mut state);
            copy.bump(&state);
        }
        copy
    }

    /// Create a non-unique secondary index over `properties`.
    pub fn create_index(&self, name: &str, properties: &[&str]) -> Result<()> {
        let mut state = self.lock()?;
        let schema = self
            .schema()
            .ok_or_else(|| TabulaError::schema(format!("index {}", name), "list has no schema"))?;
        let index = Index::on_properties(name, &schema, properties, false)
            .map_err(|cause| TabulaError::schema(format!("index {}", name), cause))?;
        let ListState { rows, indexes, .. } = &mut *state;
        indexes
            .create(index, rows)
            .map_err(|cause| TabulaError::schema(format!("index {}", name), cause))?;
        debug!(list = %self.shared.name, index = name, ?properties, "created index");
        Ok(())
    }

    /// Create a secondary index keyed by a custom function. Rows for which
    /// it returns `None` are left out of the index.
    pub fn create_index_with<F>(&self, name: &str, key_fn: F) -> Result<()>
    where
        F: Fn(&Record) -> Option<IndexKey> + Send + Sync + 'static,
    {
        let mut state = self.lock()?;
        let key_fn: KeyFn = Arc::new(key_fn);
        let index = Index::new(name, None, KeyExtractor::Custom(key_fn), false);
        let ListState { rows, indexes, .. } = &mut *state;
        indexes
            .create(index, rows)
            .map_err(|cause| TabulaError::schema(format!("index {}", name), cause))?;
        debug!(list = %self.shared.name, index = name, "created custom index");
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.indexes.drop_index(name))
    }

    pub fn index_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.indexes.names())
    }

    pub fn index_stats(&self) -> Result<Vec<IndexStats>> {
        Ok(self.lock()?.indexes.stats())
    }

    /// Live rows held by index `name` under `values`.
    pub fn lookup_index(&self, name: &str, values: &[Value]) -> Result<Vec<Record>> {
        let schema = self.schema();
        let state = self.lock()?;
        let index = state
            .indexes
            .get(name)
            .ok_or_else(|| TabulaError::query(name, "unknown index"))?;
        let values = match (index.extractor(), &schema) {
            (KeyExtractor::Properties(columns), Some(schema)) => columns
                .iter()
                .zip(values)
                .map(|(&column, value)| {
                    schema.properties()[column]
                        .set(value.clone())
                        .map_err(|e| TabulaError::query(name, e.to_string()))
                })
                .collect::<Result<Vec<_>>>()?,
            _ => values.to_vec(),
        };
        Ok(index.lookup(&IndexKey::from(values)))
    }

    /// Fail-fast iterator over the rows.
    pub fn iter(&self) -> ListIter {
        ListIter {
            list: self.clone(),
            cursor: 0,
            expected: self.modification_count(),
            last: None,
            failed: false,
        }
    }

    fn next_fenced(&self, cursor: usize, expected: u64) -> Result<Option<Record>> {
        let state = self.lock()?;
        if self.modification_count() != expected {
            return Err(self.concurrent("list changed during iteration"));
        }
        Ok(state.rows.get(cursor).cloned())
    }

    fn remove_fenced(&self, record: &Record, expected: u64) -> Result<u64> {
        let mut state = self.lock()?;
        if self.modification_count() != expected {
            return Err(self.concurrent("list changed during iteration"));
        }
        let index = Self::position_of(&state, record)
            .ok_or_else(|| self.concurrent("iterated record is no longer in the list"))?;
        self.remove_locked(&mut state, index)?;
        Ok(self.modification_count())
    }
}

fn payload_for(key: &IndexKey, payload: Option<Record>, schema: &SchemaRef) -> Result<Record> {
    let payload = payload.ok_or_else(|| TabulaError::Reconciliation {
        key: key.to_string(),
        cause: "change has no payload; fill the change set first".to_string(),
    })?;
    if !payload.schema().map_or(false, |s| Arc::ptr_eq(&s, schema)) {
        return Err(TabulaError::Reconciliation {
            key: key.to_string(),
            cause: "payload schema does not match the list".to_string(),
        });
    }
    if payload.primary_key().as_ref() != Some(key) {
        return Err(TabulaError::Reconciliation {
            key: key.to_string(),
            cause: "payload primary key differs from the change key".to_string(),
        });
    }
    Ok(payload.clone_with_data())
}

/// Stable sort with keys computed once per row.
fn sort_rows(rows: Vec<Record>, spec: &SortSpec, schema: &SchemaRef) -> Result<Vec<Record>> {
    let resolved = spec
        .resolve(schema)
        .map_err(|cause| TabulaError::query(format!("{:?}", spec), cause))?;
    let directions: Vec<bool> = resolved.iter().map(|(_, ascending)| *ascending).collect();
    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let key = resolved
                .iter()
                .map(|(column, _)| row.get_property(*column))
                .collect::<Result<Vec<_>>>()?;
            Ok((key, row))
        })
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| compare_rows(a, b, &directions));
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

/// Iterator returned by [`RecordList::iter`]. Yields an error, then stops,
/// once the list was structurally modified by anything but this iterator.
pub struct ListIter {
    list: RecordList,
    cursor: usize,
    expected: u64,
    last: Option<Record>,
    failed: bool,
}

impl ListIter {
    /// Remove the record last returned by `next`.
    pub fn remove(&mut self) -> Result<()> {
        let last = self
            .last
            .take()
            .ok_or_else(|| self.list.concurrent("remove called before next"))?;
        match self.list.remove_fenced(&last, self.expected) {
            Ok(counter) => {
                self.expected = counter;
                self.cursor = self.cursor.saturating_sub(1);
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

impl Iterator for ListIter {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.list.next_fenced(self.cursor, self.expected) {
            Ok(Some(record)) => {
                self.cursor += 1;
                self.last = Some(record.clone());
                Some(Ok(record))
            }
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = Result<Record>;
    type IntoIter = ListIter;

    fn into_iter(self) -> ListIter {
        self.iter()
    }
}

impl PartialEq for RecordList {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.shared.name == other.shared.name && self.rows_waiting() == other.rows_waiting()
    }
}

impl Eq for RecordList {}

impl Hash for RecordList {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.name.hash(state);
        self.len().hash(state);
    }
}

impl fmt::Debug for RecordList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordList")
            .field("name", &self.shared.name)
            .field("mode", &self.shared.mode)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordSchema;

    fn schema() -> SchemaRef {
        RecordSchema::parse("ls_id,long,,,,1\nls_city,String\nls_score,int").unwrap()
    }

    fn row(schema: &SchemaRef, id: i64, city: &str, score: i32) -> Record {
        Record::with_values(schema, vec![Value::Long(id), Value::from(city), Value::Int(score)]).unwrap()
    }

    fn ids(list: &RecordList) -> Vec<i64> {
        list.snapshot().unwrap().iter().map(|r| r.get_long("ls_id").unwrap()).collect()
    }

    #[test]
    fn test_positions_follow_mutations() {
        let schema = schema();
        let list = RecordList::with_schema("cities", &schema);
        list.add(row(&schema, 1, "a", 1)).unwrap();
        list.add(row(&schema, 2, "b", 2)).unwrap();
        list.insert(0, row(&schema, 3, "c", 3)).unwrap();
        assert_eq!(ids(&list), vec![3, 1, 2]);
        for (i, r) in list.snapshot().unwrap().iter().enumerate() {
            assert_eq!(r.position(), Some(i));
            assert!(r.owner().unwrap().ptr_eq(&list));
        }

        let removed = list.remove(0).unwrap();
        assert_eq!(removed.position(), None);
        assert!(removed.owner().is_none());
        assert_eq!(list.get(0).unwrap().position(), Some(0));
        assert_eq!(list.len(), 2);
        assert!(matches!(list.remove(5), Err(TabulaError::IndexOutOfBounds { index: 5, len: 2 })));
    }

    #[test]
    fn test_duplicate_key_leaves_list_unchanged() {
        let schema = schema();
        let list = RecordList::with_schema("dups", &schema);
        list.add(row(&schema, 1, "a", 1)).unwrap();
        let before = list.modification_count();
        let err = list.add(row(&schema, 1, "b", 2)).unwrap_err();
        assert_eq!(err.kind(), "duplicate_primary_key");
        assert_eq!(list.len(), 1);
        assert_eq!(list.modification_count(), before);
    }

    #[test]
    fn test_set_same_row_is_noop_and_replace_checks_key() {
        let schema = schema();
        let list = RecordList::with_schema("set", &schema);
        list.add(row(&schema, 1, "a", 1)).unwrap();
        list.add(row(&schema, 2, "b", 2)).unwrap();
        let first = list.get(0).unwrap();
        list.set(0, first.clone()).unwrap();

        // replacing a row with a record of its own key is allowed
        list.set(0, row(&schema, 1, "z", 9)).unwrap();
        assert_eq!(list.get(0).unwrap().get_string("ls_city").unwrap().as_deref(), Some("z"));
        assert!(first.owner().is_none());

        let err = list.set(0, row(&schema, 2, "x", 0)).unwrap_err();
        assert_eq!(err.kind(), "duplicate_primary_key");
    }

    #[test]
    fn test_set_property_maintains_primary_index() {
        let schema = schema();
        let list = RecordList::with_schema("keys", &schema);
        list.add(row(&schema, 1, "a", 1)).unwrap();
        list.add(row(&schema, 2, "b", 2)).unwrap();

        let first = list.get(0).unwrap();
        first.set_property("ls_id", Value::Long(10)).unwrap();
        assert!(list.search_by_primary_key_values(&[Value::Long(1)]).unwrap().is_none());
        let found = list.search_by_primary_key_values(&[Value::Int(10)]).unwrap().unwrap();
        assert!(found.ptr_eq(&first));

        let err = first.set_property("ls_id", Value::Long(2)).unwrap_err();
        assert_eq!(err.kind(), "duplicate_primary_key");
        assert_eq!(first.get_long("ls_id").unwrap(), 10);
    }

    #[test]
    fn test_adopts_schema_and_rejects_foreign_rows() {
        let schema = schema();
        let list = RecordList::new("adopt");
        assert!(list.schema().is_none());
        list.add(row(&schema, 1, "a", 1)).unwrap();
        assert!(Arc::ptr_eq(&list.schema().unwrap(), &schema));

        let other = RecordSchema::parse("ls_other,int").unwrap();
        let err = list.add(Record::new(&other)).unwrap_err();
        assert_eq!(err.kind(), "schema_definition");
    }

    #[test]
    fn test_owned_rows_are_copied_into_other_lists() {
        let schema = schema();
        let a = RecordList::with_schema("a", &schema);
        let b = RecordList::with_schema("b", &schema);
        a.add(row(&schema, 1, "x", 1)).unwrap();
        let shared = a.get(0).unwrap();
        b.add(shared.clone()).unwrap();
        assert!(!b.get(0).unwrap().ptr_eq(&shared));
        assert!(shared.owner().unwrap().ptr_eq(&a));
    }

    #[test]
    fn test_search_by_key_index_and_scan_agree() {
        let schema = schema();
        let list = RecordList::with_schema("search", &schema);
        for (id, city) in [(1, "x"), (2, "y"), (3, "x")] {
            list.add(row(&schema, id, city, 0)).unwrap();
        }
        let scanned = list.search_by_key(&["ls_city"], &[Value::from("x")]).unwrap();
        list.create_index("by_city", &["ls_city"]).unwrap();
        let indexed = list.search_by_key(&["ls_city"], &[Value::from("x")]).unwrap();
        assert_eq!(ids(&scanned), vec![1, 3]);
        assert_eq!(ids(&indexed), vec![1, 3]);
        assert!(!scanned.get(0).unwrap().ptr_eq(&list.get(0).unwrap()));
    }

    #[test]
    fn test_search_by_expression() {
        let schema = schema();
        let list = RecordList::with_schema("expr", &schema);
        for id in 1..=5 {
            list.add(row(&schema, id, "c", id as i32 * 10)).unwrap();
        }
        let mut vars = HashMap::new();
        vars.insert("min".to_string(), Value::Int(25));
        let hits = list.search_by_expression("ls_score >= min", &vars).unwrap();
        assert_eq!(ids(&hits), vec![3, 4, 5]);

        assert_eq!(list.search("ls_score + 1").unwrap_err().kind(), "query");
        assert_eq!(list.search("ls_score >= ").unwrap_err().kind(), "query");
    }

    #[test]
    fn test_sort_is_stable_and_directional() {
        let schema = schema();
        let list = RecordList::with_schema("sort", &schema);
        list.add(row(&schema, 1, "b", 1)).unwrap();
        list.add(row(&schema, 2, "a", 1)).unwrap();
        list.add(row(&schema, 3, "c", 0)).unwrap();
        list.sort(&["ls_score"], &[true]).unwrap();
        assert_eq!(ids(&list), vec![3, 1, 2]);
        list.sort(&["ls_score", "ls_city"], &[false, true]).unwrap();
        assert_eq!(ids(&list), vec![2, 1, 3]);
        for (i, r) in list.snapshot().unwrap().iter().enumerate() {
            assert_eq!(r.position(), Some(i));
        }
        assert_eq!(list.sort(&["nope"], &[]).unwrap_err().kind(), "query");
    }

    #[test]
    fn test_iterator_fails_fast_and_supports_remove() {
        let schema = schema();
        let list = RecordList::with_schema("iter", &schema);
        for id in 1..=4 {
            list.add(row(&schema, id, "c", 0)).unwrap();
        }

        let mut iter = list.iter();
        while let Some(next) = iter.next() {
            let record = next.unwrap();
            if record.get_long("ls_id").unwrap() % 2 == 0 {
                iter.remove().unwrap();
            }
        }
        assert_eq!(ids(&list), vec![1, 3]);

        let mut iter = list.iter();
        iter.next().unwrap().unwrap();
        list.add(row(&schema, 9, "c", 0)).unwrap();
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), "concurrent_modification");
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_unguarded_reports_contention() {
        let schema = schema();
        let list = RecordList::unguarded("solo", &schema);
        list.add(row(&schema, 1, "a", 0)).unwrap();
        let held = list.shared.state.lock();
        let err = list.add(row(&schema, 2, "b", 0)).unwrap_err();
        assert_eq!(err.kind(), "concurrent_modification");
        drop(held);
        list.add(row(&schema, 2, "b", 0)).unwrap();
    }

    #[test]
    fn test_unguarded_reads_report_contention() {
        let schema = schema();
        let list = RecordList::unguarded("busy", &schema);
        list.add(row(&schema, 1, "a", 0)).unwrap();
        list.set_sort_spec(Some(SortSpec::new().then("ls_id", true))).unwrap();

        let held = list.shared.state.lock();
        let busy = |err: TabulaError| assert_eq!(err.kind(), "concurrent_modification");
        busy(list.get(0).unwrap_err());
        busy(list.snapshot().unwrap_err());
        busy(list.search("ls_id = 1").unwrap_err());
        busy(list.search_by_key(&["ls_city"], &[Value::from("a")]).unwrap_err());
        busy(list.sort_spec().unwrap_err());
        busy(list.index_names().unwrap_err());
        busy(list.deep_copy().unwrap_err());
        busy(list.contains(&row(&schema, 1, "a", 0)).unwrap_err());
        busy(crate::wire::encode_list(&list, crate::wire::SchemaEncoding::Inline).unwrap_err());
        drop(held);

        assert_eq!(list.search("ls_id = 1").unwrap().len(), 1);
        let bytes = crate::wire::encode_list(&list, crate::wire::SchemaEncoding::Inline).unwrap();
        assert_eq!(crate::wire::decode_list(&bytes).unwrap().len(), 1);
    }

    #[test]
    fn test_slot_write_checks_schema_and_owner_under_lock() {
        let old = RecordSchema::parse("sw_x,int
sw_id,long,,,,1").unwrap();
        let new = RecordSchema::parse("sw_id,long,,,,1
sw_x,java.lang.Number
sw_note,String").unwrap();
        let list = RecordList::with_schema("slots", &old);
        list.add(Record::with_values(&old, vec![Value::Int(5), Value::Long(1)]).unwrap())
            .unwrap();
        let first = list.get(0).unwrap();
        list.set_schema(&new).unwrap();

        // column 0 was sw_x under the old schema and is sw_id now
        let outcome = list.update_slot(&first, &old, 0, Value::Int(7)).unwrap();
        assert!(matches!(outcome, SlotWrite::SchemaChanged));
        assert_eq!(first.get_long("sw_id").unwrap(), 1);
        assert_eq!(first.get_property("sw_x").unwrap(), Value::Int(5));

        first.set_property("sw_x", Value::Int(7)).unwrap();
        assert_eq!(first.values(), vec![Value::Long(1), Value::Int(7), Value::Null]);
        assert!(list.search_by_primary_key_values(&[Value::Long(1)]).unwrap().is_some());

        let detached = list.remove(0).unwrap();
        let outcome = list.update_slot(&detached, &new, 1, Value::Int(9)).unwrap();
        assert!(matches!(outcome, SlotWrite::NotOwned(Value::Int(9))));
        assert_eq!(detached.get_property("sw_x").unwrap(), Value::Int(7));
    }

    #[test]
    fn test_modify_rows_and_analyze() {
        let schema = schema();
        let list = RecordList::with_schema("bulk", &schema);
        list.add(row(&schema, 1, "a", 0)).unwrap();
        let detached = list
            .modify_rows(|rows| {
                rows.push(row(&schema, 2, "b", 0));
                rows.remove(0)
            })
            .unwrap();
        assert!(detached.owner().is_none());
        assert_eq!(ids(&list), vec![2]);
        assert!(list.search_by_primary_key_values(&[Value::Long(2)]).unwrap().is_some());
        assert_eq!(list.analyze().unwrap(), 0);

        list.modify_rows(|rows| rows.push(row(&schema, 2, "dup", 0)))
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.analyze().unwrap(), 1);
    }

    #[test]
    fn test_set_schema_carries_rows() {
        let old = RecordSchema::parse("sv_id,long,,,,1\nsv_v,int").unwrap();
        let new = RecordSchema::parse("sv_id,long,,,,1\nsv_v,java.lang.Number\nsv_extra,String").unwrap();
        let list = RecordList::with_schema("evolve", &old);
        list.add(Record::with_values(&old, vec![Value::Long(1), Value::Int(5)]).unwrap()).unwrap();
        list.create_index("by_v", &["sv_v"]).unwrap();
        list.set_schema(&new).unwrap();

        let first = list.get(0).unwrap();
        assert!(Arc::ptr_eq(&first.schema().unwrap(), &new));
        assert_eq!(first.get_property("sv_v").unwrap(), Value::Int(5));
        assert_eq!(list.lookup_index("by_v", &[Value::Int(5)]).unwrap().len(), 1);

        let collapsing = RecordSchema::parse("sv_v,java.lang.Number,,,,1").unwrap();
        list.add(Record::with_values(&new, vec![Value::Long(2), Value::Int(5), Value::Null]).unwrap())
            .unwrap();
        assert_eq!(list.set_schema(&collapsing).unwrap_err().kind(), "duplicate_primary_key");
        assert!(Arc::ptr_eq(&list.schema().unwrap(), &new));
    }

    #[test]
    fn test_custom_index_and_stats() {
        let schema = schema();
        let list = RecordList::with_schema("custom", &schema);
        list.add(row(&schema, 1, "Paris", 0)).unwrap();
        list.add(row(&schema, 2, "PARIS", 0)).unwrap();
        list.create_index_with("city_ci", |record: &Record| {
            let city = record.get_string("ls_city").ok().flatten()?;
            Some(IndexKey::from(vec![Value::from(city.to_lowercase())]))
        })
        .unwrap();
        assert_eq!(list.lookup_index("city_ci", &[Value::from("paris")]).unwrap().len(), 2);
        assert_eq!(list.index_names().unwrap(), vec!["primaryKey", "city_ci"]);
        assert!(list.drop_index("city_ci").unwrap());
        assert_eq!(list.lookup_index("city_ci", &[]).unwrap_err().kind(), "query");
        assert_eq!(list.index_stats().unwrap()[0].entries, 2);
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let schema = schema();
        let list = RecordList::with_schema("orig", &schema);
        list.add(row(&schema, 1, "a", 0)).unwrap();
        let copy = list.deep_copy().unwrap();
        assert_eq!(copy, list);
        copy.get(0).unwrap().set_property("ls_city", Value::from("b")).unwrap();
        assert_ne!(copy, list);
        assert!(copy.search_by_primary_key_values(&[Value::Long(1)]).unwrap().is_some());
    }
}
