//! Result accumulation: per-row outputs into the final result set.
//!
//! The accumulator is the only component that looks at the mapping's
//! shape tag. Pure-entity results collect each distinct root once, in
//! first-seen order; mixed and scalar-only results collect one entry per
//! row. A declared index key switches any of these from ordered to keyed
//! output.

use crate::mapping::{IndexSource, ResultMapping, Shape};
use rowgraph_core::{EntityRef, KeyedInsert, Value, value_hash};
use std::collections::HashMap;
use std::sync::Arc;

/// One row of a mixed or scalar-only result: the root entities of the
/// row in root declaration order, plus the freestanding scalar values.
#[derive(Debug, Default)]
pub struct RowEntry {
    /// Root instances, `None` where the row carried no identity for that
    /// root.
    pub entities: Vec<Option<EntityRef>>,
    /// Scalar outputs as (output name, value), in declaration order.
    pub scalars: Vec<(String, Value)>,
}

impl RowEntry {
    /// Root instance at a position, flattened.
    pub fn entity(&self, position: usize) -> Option<&EntityRef> {
        self.entities.get(position).and_then(Option::as_ref)
    }

    /// Scalar value by output name.
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.scalars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Keyed result entries in key insertion order.
#[derive(Debug, Default)]
pub struct KeyedRows {
    keys: Vec<Value>,
    slots: HashMap<u64, usize>,
    entries: Vec<RowEntry>,
}

impl KeyedRows {
    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry stored under a key.
    pub fn get(&self, key: &Value) -> Option<&RowEntry> {
        let slot = *self.slots.get(&value_hash(std::slice::from_ref(key)))?;
        self.entries.get(slot)
    }

    /// First root instance stored under a key. Convenience for keyed
    /// pure-entity results.
    pub fn entity(&self, key: &Value) -> Option<&EntityRef> {
        self.get(key).and_then(|entry| entry.entity(0))
    }

    /// Iterate (key, entry) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &RowEntry)> {
        self.keys.iter().zip(self.entries.iter())
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    fn insert(&mut self, key: Value, entry: RowEntry) -> KeyedInsert {
        let hash = value_hash(std::slice::from_ref(&key));
        if let Some(&slot) = self.slots.get(&hash) {
            self.entries[slot] = entry;
            return KeyedInsert::Overwrote;
        }
        self.slots.insert(hash, self.entries.len());
        self.keys.push(key);
        self.entries.push(entry);
        KeyedInsert::Inserted
    }
}

/// The hydrated result.
#[derive(Debug)]
pub enum ResultSet {
    /// Pure-entity result: distinct roots in first-seen order, `None`
    /// slots where rows carried no root identity.
    Entities(Vec<Option<EntityRef>>),
    /// Mixed or scalar-only result: one entry per row.
    Rows(Vec<RowEntry>),
    /// Keyed result, any shape.
    Keyed(KeyedRows),
}

impl ResultSet {
    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        match self {
            Self::Entities(entities) => entities.len(),
            Self::Rows(rows) => rows.len(),
            Self::Keyed(keyed) => keyed.len(),
        }
    }

    /// Whether the result is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entity list, when the result is pure-entity and ordered.
    pub fn entities(&self) -> Option<&[Option<EntityRef>]> {
        match self {
            Self::Entities(entities) => Some(entities),
            _ => None,
        }
    }

    /// The row entries, when the result is ordered rows.
    pub fn rows(&self) -> Option<&[RowEntry]> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// The keyed entries, when the result is keyed.
    pub fn keyed(&self) -> Option<&KeyedRows> {
        match self {
            Self::Keyed(keyed) => Some(keyed),
            _ => None,
        }
    }
}

/// Folds per-row outputs into a [`ResultSet`] according to the mapping's
/// shape and index source.
pub struct ResultAccumulator {
    shape: Shape,
    keyed: bool,
    entities: Vec<Option<EntityRef>>,
    rows: Vec<RowEntry>,
    keyed_rows: KeyedRows,
}

impl ResultAccumulator {
    /// Create an accumulator for one run.
    pub fn new(mapping: &ResultMapping) -> Self {
        Self {
            shape: mapping.shape(),
            keyed: *mapping.index_source() != IndexSource::None,
            entities: Vec::new(),
            rows: Vec::new(),
            keyed_rows: KeyedRows::default(),
        }
    }

    /// The shape this accumulator emits.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Record a pure-entity root: an instance on first sight, or `None`
    /// for a row whose root carried no identity.
    pub fn push_root(&mut self, root: Option<EntityRef>, key: Option<Value>) {
        if !self.keyed {
            self.entities.push(root);
            return;
        }
        let Some(key) = key.filter(|k| !k.is_null()) else {
            tracing::warn!("keyed result row has no usable index key; entry dropped");
            return;
        };
        if let Some(existing) = self.keyed_rows.entity(&key) {
            if root.as_ref().is_some_and(|r| Arc::ptr_eq(existing, r)) {
                return;
            }
        }
        let outcome = self.keyed_rows.insert(
            key,
            RowEntry {
                entities: vec![root],
                scalars: Vec::new(),
            },
        );
        if outcome == KeyedInsert::Overwrote {
            tracing::warn!("duplicate result index key with a different root; overwriting");
        }
    }

    /// Record one mixed or scalar-only row.
    pub fn push_row(&mut self, entry: RowEntry, key: Option<Value>) {
        if !self.keyed {
            self.rows.push(entry);
            return;
        }
        let Some(key) = key.filter(|k| !k.is_null()) else {
            tracing::warn!("keyed result row has no usable index key; entry dropped");
            return;
        };
        if self.keyed_rows.insert(key, entry) == KeyedInsert::Overwrote {
            tracing::warn!("duplicate result index key; last row wins");
        }
    }

    /// Freeze into the final result.
    pub fn finish(self) -> ResultSet {
        if self.keyed {
            return ResultSet::Keyed(self.keyed_rows);
        }
        match self.shape {
            Shape::PureEntity => ResultSet::Entities(self.entities),
            Shape::Mixed | Shape::ScalarOnly => ResultSet::Rows(self.rows),
        }
    }
}
