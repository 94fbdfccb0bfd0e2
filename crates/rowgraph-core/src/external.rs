//! Collaborator traits: object materialization, unit-of-work
//! notifications, and the row cursor.
//!
//! These are the narrow seams to the surrounding system. The hydrator
//! only ever asks "give me a blank instance", "give me a stand-in for
//! (type, key)", "this entity is materialized", "this collection is
//! fully populated", and "next row".

use crate::entity::{Entity, EntityRef};
use crate::error::Result;
use crate::meta::MetadataProvider;
use crate::row::Row;
use crate::value::Value;

/// Factory for entity instances and lazy stand-ins.
pub trait Materializer {
    /// Create a blank instance of an entity type.
    fn new_instance(&self, entity_type: &str) -> Entity;

    /// Create a stand-in for an entity known only by identifier, used
    /// when a to-one relation is declared lazy and the row carries only
    /// its foreign-key column.
    fn new_lazy_reference(&self, entity_type: &str, key: Vec<(String, Value)>) -> Entity;
}

/// Materializer backed by a metadata provider: blank instances carry a
/// null slot for every declared field.
pub struct BasicMaterializer<'a, M: MetadataProvider> {
    metadata: &'a M,
}

impl<'a, M: MetadataProvider> BasicMaterializer<'a, M> {
    /// Create a materializer over the given metadata.
    pub fn new(metadata: &'a M) -> Self {
        Self { metadata }
    }
}

impl<M: MetadataProvider> Materializer for BasicMaterializer<'_, M> {
    fn new_instance(&self, entity_type: &str) -> Entity {
        let mut entity = Entity::new(entity_type);
        if let Some(meta) = self.metadata.meta(entity_type) {
            for field in &meta.fields {
                entity.set(field.name.clone(), Value::Null);
            }
        }
        entity
    }

    fn new_lazy_reference(&self, entity_type: &str, key: Vec<(String, Value)>) -> Entity {
        Entity::reference(entity_type, key)
    }
}

/// Longer-lived identity store and change tracker, notified as the
/// hydrator materializes objects. One run consults it before creating
/// instances so repeated queries reuse the same object per identity.
pub trait UnitOfWork {
    /// Look up an already-managed instance by (type, key hash).
    fn lookup(&self, entity_type: &str, key_hash: u64) -> Option<EntityRef>;

    /// An entity instance has been materialized with the given field
    /// values.
    fn entity_materialized(&mut self, entity_type: &str, key_hash: u64, instance: &EntityRef);

    /// A collection-valued relation on a parent has been fully populated
    /// for this run; no later lazy load should re-trigger it.
    fn collection_populated(&mut self, parent: &EntityRef, relation: &str);
}

/// Unit of work that tracks nothing. The default collaborator for
/// callers that hydrate detached objects.
#[derive(Debug, Default)]
pub struct NullUnitOfWork;

impl UnitOfWork for NullUnitOfWork {
    fn lookup(&self, _entity_type: &str, _key_hash: u64) -> Option<EntityRef> {
        None
    }

    fn entity_materialized(&mut self, _entity_type: &str, _key_hash: u64, _instance: &EntityRef) {}

    fn collection_populated(&mut self, _parent: &EntityRef, _relation: &str) {}
}

/// Unit of work that records notifications and serves a seeded identity
/// store. Used by tests and by embedders that keep a session-scoped map.
#[derive(Default)]
pub struct RecordingUnitOfWork {
    managed: Vec<(String, u64, EntityRef)>,
    /// (entity type, key hash) per materialization notification.
    pub materialized: Vec<(String, u64)>,
    /// (parent instance id, relation) per collection notification.
    pub populated: Vec<(usize, String)>,
}

impl RecordingUnitOfWork {
    /// Create an empty recording unit of work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a managed instance so lookups during hydration find it.
    pub fn manage(&mut self, entity_type: impl Into<String>, key_hash: u64, instance: EntityRef) {
        self.managed.push((entity_type.into(), key_hash, instance));
    }
}

impl UnitOfWork for RecordingUnitOfWork {
    fn lookup(&self, entity_type: &str, key_hash: u64) -> Option<EntityRef> {
        self.managed
            .iter()
            .find(|(t, k, _)| t == entity_type && *k == key_hash)
            .map(|(_, _, e)| EntityRef::clone(e))
    }

    fn entity_materialized(&mut self, entity_type: &str, key_hash: u64, _instance: &EntityRef) {
        self.materialized.push((entity_type.to_string(), key_hash));
    }

    fn collection_populated(&mut self, parent: &EntityRef, relation: &str) {
        self.populated
            .push((crate::entity::instance_id(parent), relation.to_string()));
    }
}

/// Pull-based row cursor over an executing statement.
pub trait RowCursor {
    /// Pull the next row, `None` at end of stream.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Release the underlying statement. Idempotent.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EntityMeta, FieldKind, MetadataRegistry};
    use crate::value::value_hash;

    #[test]
    fn basic_materializer_blanks_declared_fields() {
        let metadata = MetadataRegistry::new().register(
            EntityMeta::new("User")
                .field("id", FieldKind::Int)
                .field("name", FieldKind::Text)
                .id(&["id"]),
        );
        let materializer = BasicMaterializer::new(&metadata);

        let blank = materializer.new_instance("User");
        assert_eq!(blank.entity_type(), "User");
        assert_eq!(blank.get("id"), Value::Null);
        assert!(!blank.is_set("name"));
        assert!(!blank.is_reference());
    }

    #[test]
    fn lazy_reference_carries_key() {
        let metadata = MetadataRegistry::new();
        let materializer = BasicMaterializer::new(&metadata);

        let stand_in = materializer
            .new_lazy_reference("Shipping", vec![("id".to_string(), Value::Int(42))]);
        assert!(stand_in.is_reference());
        assert_eq!(stand_in.get("id"), Value::Int(42));
    }

    #[test]
    fn recording_uow_serves_seeded_instances() {
        let mut uow = RecordingUnitOfWork::new();
        let key = value_hash(&[Value::Int(1)]);
        let instance = shared(Entity::new("User"));
        uow.manage("User", key, EntityRef::clone(&instance));

        let found = uow.lookup("User", key).unwrap();
        assert!(std::sync::Arc::ptr_eq(&found, &instance));
        assert!(uow.lookup("User", value_hash(&[Value::Int(2)])).is_none());
        assert!(uow.lookup("Team", key).is_none());
    }
}
