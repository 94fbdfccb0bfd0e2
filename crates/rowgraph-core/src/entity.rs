//! Dynamic entity instances and relation containers.
//!
//! Hydrated objects are dynamic: a bag of coerced field values plus
//! resolved relations, typed by entity type name. Instances are shared
//! through [`EntityRef`] so the identity map, parent collections, and the
//! final result all point at the same object; `Arc::ptr_eq` is the
//! object-identity test.

use crate::value::{Value, value_hash};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Shared handle to a hydrated entity.
pub type EntityRef = Arc<RwLock<Entity>>;

/// A hydrated entity instance.
#[derive(Debug, Default)]
pub struct Entity {
    /// Entity type name.
    entity_type: String,
    /// Scalar field values.
    fields: HashMap<String, Value>,
    /// Decided single-valued relations. A present `None` means the
    /// relation was explicitly resolved to "no partner".
    single: HashMap<String, Option<EntityRef>>,
    /// Collection-valued relations.
    collections: HashMap<String, Collection>,
    /// Whether this instance is a lazy stand-in (identifier only).
    reference: bool,
}

impl Entity {
    /// Create a blank instance of the given type.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    /// Create a lazy stand-in carrying only identifier fields.
    pub fn reference(entity_type: impl Into<String>, id_fields: Vec<(String, Value)>) -> Self {
        let mut entity = Self::new(entity_type);
        entity.reference = true;
        for (name, value) in id_fields {
            entity.fields.insert(name, value);
        }
        entity
    }

    /// The entity type name.
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Whether this instance is a lazy stand-in.
    pub fn is_reference(&self) -> bool {
        self.reference
    }

    /// Get a field value, `Value::Null` if unset.
    pub fn get(&self, field: &str) -> Value {
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Whether a field currently holds a non-null value.
    pub fn is_set(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !v.is_null())
    }

    /// Set a field value unconditionally.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Set a field only if it is currently unset or null.
    ///
    /// First-writer-wins within a hydration run: a later partial row for
    /// the same entity never clobbers populated fields.
    pub fn set_if_unset(&mut self, field: &str, value: Value) {
        if !self.is_set(field) {
            self.fields.insert(field.to_string(), value);
        }
    }

    /// Get a decided single-valued relation. Outer `None` = undecided,
    /// inner `None` = decided to "no partner".
    pub fn single(&self, relation: &str) -> Option<Option<EntityRef>> {
        self.single.get(relation).cloned()
    }

    /// Decide a single-valued relation.
    pub fn set_single(&mut self, relation: impl Into<String>, partner: Option<EntityRef>) {
        self.single.insert(relation.into(), partner);
    }

    /// Get a collection-valued relation, if initialized.
    pub fn collection(&self, relation: &str) -> Option<&Collection> {
        self.collections.get(relation)
    }

    /// Get or attach the collection container for a relation.
    pub fn collection_mut(&mut self, relation: &str, indexed: bool) -> &mut Collection {
        self.collections
            .entry(relation.to_string())
            .or_insert_with(|| Collection::new(indexed))
    }

    /// Whether a collection relation has been initialized (possibly empty).
    pub fn has_collection(&self, relation: &str) -> bool {
        self.collections.contains_key(relation)
    }
}

/// Ordered collection container with per-identity deduplication and
/// optional index-by keys.
#[derive(Debug, Default)]
pub struct Collection {
    entries: Vec<EntityRef>,
    /// Identity hashes of contained children, for O(1) dedup.
    identities: HashSet<u64>,
    /// Index-by keys: key hash -> slot, plus the key values for lookup
    /// reporting. `None` for positional collections.
    index: Option<HashMap<u64, usize>>,
}

impl Collection {
    /// Create an empty container, index-keyed when `indexed` is true.
    pub fn new(indexed: bool) -> Self {
        Self {
            entries: Vec::new(),
            identities: HashSet::new(),
            index: indexed.then(HashMap::new),
        }
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container holds no children.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Child at a position, in insertion order.
    pub fn get(&self, index: usize) -> Option<&EntityRef> {
        self.entries.get(index)
    }

    /// Child stored under an index-by key.
    pub fn get_by_key(&self, key: &Value) -> Option<&EntityRef> {
        let slot = *self.index.as_ref()?.get(&value_hash(std::slice::from_ref(key)))?;
        self.entries.get(slot)
    }

    /// Whether a child with the given identity hash is already present.
    pub fn contains_identity(&self, identity: u64) -> bool {
        self.identities.contains(&identity)
    }

    /// Append a child unless one with the same identity is present.
    ///
    /// Returns true when the child was inserted.
    pub fn push_unique(&mut self, identity: u64, child: EntityRef) -> bool {
        if !self.identities.insert(identity) {
            return false;
        }
        self.entries.push(child);
        true
    }

    /// Insert a child under an index-by key, deduplicating by identity.
    ///
    /// A duplicate key with a different child identity overwrites the
    /// slot; the caller is expected to report it as a warning condition.
    /// Returns true when the container changed.
    pub fn insert_keyed(&mut self, key: &Value, identity: u64, child: EntityRef) -> KeyedInsert {
        let key_hash = value_hash(std::slice::from_ref(key));
        let index = self
            .index
            .get_or_insert_with(HashMap::new);
        if let Some(&slot) = index.get(&key_hash) {
            if self.identities.contains(&identity) {
                return KeyedInsert::Duplicate;
            }
            // Same key, different child: overwrite, flagged upstream.
            self.identities.insert(identity);
            self.entries[slot] = child;
            return KeyedInsert::Overwrote;
        }
        if !self.identities.insert(identity) {
            return KeyedInsert::Duplicate;
        }
        index.insert(key_hash, self.entries.len());
        self.entries.push(child);
        KeyedInsert::Inserted
    }

    /// Iterate children in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.entries.iter()
    }
}

/// Outcome of a keyed collection insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyedInsert {
    /// New key, new child.
    Inserted,
    /// Child with this identity already present; no change.
    Duplicate,
    /// Key collision with a different child identity; slot overwritten.
    Overwrote,
}

/// Wrap an entity into a shared handle.
pub fn shared(entity: Entity) -> EntityRef {
    Arc::new(RwLock::new(entity))
}

/// Stable per-run identity of an instance, from its allocation.
pub fn instance_id(entity: &EntityRef) -> usize {
    Arc::as_ptr(entity) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: i64) -> (u64, EntityRef) {
        let mut e = Entity::new("Phonenumber");
        e.set("phonenumber", Value::Int(id));
        (value_hash(&[Value::Int(id)]), shared(e))
    }

    #[test]
    fn first_writer_wins() {
        let mut e = Entity::new("User");
        e.set_if_unset("name", Value::Text("romanb".to_string()));
        e.set_if_unset("name", Value::Null);
        e.set_if_unset("name", Value::Text("other".to_string()));
        assert_eq!(e.get("name"), Value::Text("romanb".to_string()));

        // Null placeholders are overwritable.
        e.set("status", Value::Null);
        e.set_if_unset("status", Value::Text("developer".to_string()));
        assert_eq!(e.get("status"), Value::Text("developer".to_string()));
    }

    #[test]
    fn single_valued_states() {
        let mut e = Entity::new("User");
        assert!(e.single("address").is_none());

        e.set_single("address", None);
        assert_eq!(e.single("address"), Some(None));
    }

    #[test]
    fn collection_dedup() {
        let mut c = Collection::new(false);
        let (id42, p42) = child(42);
        let (id43, p43) = child(43);

        assert!(c.push_unique(id42, Arc::clone(&p42)));
        assert!(c.push_unique(id43, p43));
        assert!(!c.push_unique(id42, p42));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn keyed_insertion() {
        let mut c = Collection::new(true);
        let (id42, p42) = child(42);
        let (id43, p43) = child(43);

        assert_eq!(
            c.insert_keyed(&Value::Int(42), id42, p42),
            KeyedInsert::Inserted
        );
        assert_eq!(
            c.insert_keyed(&Value::Int(43), id43, Arc::clone(&p43)),
            KeyedInsert::Inserted
        );
        assert_eq!(
            c.insert_keyed(&Value::Int(43), id43, p43),
            KeyedInsert::Duplicate
        );
        assert!(c.get_by_key(&Value::Int(42)).is_some());
        assert!(c.get_by_key(&Value::Int(99)).is_none());

        // Same key, different identity: overwrite.
        let (id99, p99) = child(99);
        assert_eq!(
            c.insert_keyed(&Value::Int(43), id99, Arc::clone(&p99)),
            KeyedInsert::Overwrote
        );
        let stored = c.get_by_key(&Value::Int(43)).unwrap();
        assert!(Arc::ptr_eq(stored, &p99));
    }

    #[test]
    fn reference_instances() {
        let e = Entity::reference("Shipping", vec![("id".to_string(), Value::Int(42))]);
        assert!(e.is_reference());
        assert_eq!(e.get("id"), Value::Int(42));
    }

    #[test]
    fn instance_identity() {
        let a = shared(Entity::new("User"));
        let b = Arc::clone(&a);
        let c = shared(Entity::new("User"));
        assert_eq!(instance_id(&a), instance_id(&b));
        assert_ne!(instance_id(&a), instance_id(&c));
    }
}
