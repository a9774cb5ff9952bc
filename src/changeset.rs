//! Keyed change sets for partial-update reconciliation

use crate::error::{Result, TabulaError};
use crate::index::IndexKey;
use crate::list::RecordList;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Add,
    Update,
    Remove,
}

/// One pending change. A missing payload on an add or update must be
/// filled from the target list before reconciling.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub kind: UpdateKind,
    pub payload: Option<Record>,
}

/// Changes keyed by primary-key tuple, remembered in insertion order
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: HashMap<IndexKey, (u64, Change)>,
    order: BTreeMap<u64, IndexKey>,
    next_seq: u64,
}

fn key_of(record: &Record) -> Result<IndexKey> {
    record.primary_key().ok_or_else(|| TabulaError::Reconciliation {
        key: format!("{:?}", record),
        cause: "record schema declares no primary key".to_string(),
    })
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: Record) -> Result<()> {
        let key = key_of(&record)?;
        self.insert(key, UpdateKind::Add, Some(record));
        Ok(())
    }

    pub fn update(&mut self, record: Record) -> Result<()> {
        let key = key_of(&record)?;
        self.insert(key, UpdateKind::Update, Some(record));
        Ok(())
    }

    pub fn remove(&mut self, record: &Record) -> Result<()> {
        let key = key_of(record)?;
        self.insert(key, UpdateKind::Remove, None);
        Ok(())
    }

    /// Key-only entry; add/update payloads come from [`ChangeSet::fill`].
    pub fn mark(&mut self, key: IndexKey, kind: UpdateKind) {
        self.insert(key, kind, None);
    }

    /// Record a change, replacing any earlier change for the same key.
    /// The key keeps its original place in the order.
    pub fn insert(&mut self, key: IndexKey, kind: UpdateKind, payload: Option<Record>) {
        let change = Change { kind, payload };
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.1 = change;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, (seq, change));
    }

    pub fn get(&self, key: &IndexKey) -> Option<&Change> {
        self.entries.get(key).map(|(_, change)| change)
    }

    /// Consume the change for `key`. A later insert of the same key goes
    /// to the end of the order.
    pub fn take(&mut self, key: &IndexKey) -> Option<Change> {
        let (seq, change) = self.entries.remove(key)?;
        self.order.remove(&seq);
        Some(change)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Pending keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &IndexKey> {
        self.order.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, &Change)> {
        self.order.values().filter_map(move |key| {
            self.entries
                .get_key_value(key)
                .map(|(key, (_, change))| (key, change))
        })
    }

    /// Remove and return every pending change in insertion order.
    pub fn drain(&mut self) -> Vec<(IndexKey, Change)> {
        let order = std::mem::take(&mut self.order);
        order
            .into_values()
            .filter_map(|key| self.entries.remove(&key).map(|(_, change)| (key, change)))
            .collect()
    }

    /// Fill missing add/update payloads with copies of the rows `list`
    /// currently holds under the same key. Returns how many were filled;
    /// keys the list does not hold stay empty.
    pub fn fill(&mut self, list: &RecordList) -> Result<usize> {
        let mut filled = 0;
        for (key, (_, change)) in self.entries.iter_mut() {
            if change.kind == UpdateKind::Remove || change.payload.is_some() {
                continue;
            }
            if let Some(current) = list.find_by_key(key)? {
                change.payload = Some(current.clone_with_data());
                filled += 1;
            }
        }
        Ok(filled)
    }

    /// Fold `other` into this set; its entries win on equal keys.
    pub fn merge(&mut self, mut other: ChangeSet) {
        for (key, change) in other.drain() {
            self.insert(key, change.kind, change.payload);
        }
    }
}
