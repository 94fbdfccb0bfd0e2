//! Run-scoped entity registry: identity map plus relation bookkeeping.
//!
//! One registry lives exactly as long as one hydration run. It guarantees
//! a single instance per (entity type, identifier tuple), remembers which
//! collection containers are open for appends, and keeps single-valued
//! relation decisions stable once made. The longer-lived unit of work is
//! consulted before any instance is created so repeated queries reuse the
//! same object per identity.

use rowgraph_core::{
    EntityRef, KeyedInsert, Materializer, MetadataProvider, RelationMeta, UnitOfWork, Value,
    instance_id, shared, value_hash,
};
use std::collections::{HashMap, HashSet};

/// Per-run identity map and relation state.
#[derive(Default)]
pub struct EntityRegistry {
    /// (entity type, key hash) -> the single live instance.
    identity: HashMap<(String, u64), EntityRef>,
    /// (parent instance, relation) pairs whose collection container is
    /// attached and accepting appends.
    open_collections: HashSet<(usize, String)>,
    /// (parent instance, relation) pairs whose to-one value is decided.
    decided_single: HashSet<(usize, String)>,
}

impl EntityRegistry {
    /// Create an empty registry for one run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the live instance for an identity, if materialized.
    pub fn get(&self, entity_type: &str, key: &[Value]) -> Option<EntityRef> {
        self.identity
            .get(&(entity_type.to_string(), value_hash(key)))
            .cloned()
    }

    /// Get or create the instance for (entity type, key tuple).
    ///
    /// Idempotent: a repeat call returns the same instance and only fills
    /// fields that are still null (first-writer-wins within the run). On
    /// first sight the unit of work is consulted before the materializer;
    /// `entity_materialized` fires only for freshly created instances.
    ///
    /// Returns the instance and whether it was created by this call.
    pub fn get_or_create<M, F, U>(
        &mut self,
        entity_type: &str,
        key: &[Value],
        fields: &[(String, Value)],
        meta: &[(String, Value)],
        metadata: &M,
        materializer: &F,
        uow: &mut U,
    ) -> (EntityRef, bool)
    where
        M: MetadataProvider,
        F: Materializer,
        U: UnitOfWork,
    {
        let key_hash = value_hash(key);
        let map_key = (entity_type.to_string(), key_hash);

        if let Some(existing) = self.identity.get(&map_key) {
            let instance = EntityRef::clone(existing);
            let mut guard = instance.write().expect("lock poisoned");
            for (field, value) in fields {
                guard.set_if_unset(field, value.clone());
            }
            drop(guard);
            return (instance, false);
        }

        // The longer-lived identity store wins over fresh materialization.
        if let Some(managed) = uow.lookup(entity_type, key_hash) {
            let mut guard = managed.write().expect("lock poisoned");
            for (field, value) in fields {
                guard.set_if_unset(field, value.clone());
            }
            drop(guard);
            self.identity.insert(map_key, EntityRef::clone(&managed));
            return (managed, false);
        }

        let mut entity = materializer.new_instance(entity_type);
        for (field, value) in fields {
            entity.set_if_unset(field, value.clone());
        }

        // Lazy to-one relations resolve through their foreign-key meta
        // column as stand-in references, decided at creation time.
        if let Some(entity_meta) = metadata.meta(entity_type) {
            for relation in &entity_meta.relations {
                if let Some(stand_in) = lazy_stand_in(relation, meta, metadata, materializer) {
                    entity.set_single(relation.field.clone(), stand_in);
                }
            }
        }

        let instance = shared(entity);
        uow.entity_materialized(entity_type, key_hash, &instance);
        self.identity.insert(map_key, EntityRef::clone(&instance));
        (instance, true)
    }

    /// Decide a single-valued relation on a parent.
    ///
    /// The first decision for a (parent, relation) pair wins, whether it
    /// is an instance or an explicit "none"; later calls are no-ops.
    pub fn resolve_single_valued(
        &mut self,
        parent: &EntityRef,
        relation: &str,
        child: Option<EntityRef>,
    ) {
        let slot = (instance_id(parent), relation.to_string());
        if !self.decided_single.insert(slot) {
            return;
        }
        parent
            .write()
            .expect("lock poisoned")
            .set_single(relation, child);
    }

    /// Append a child into the collection for (parent, relation),
    /// attaching an empty container on first sight.
    ///
    /// An absent child leaves the container as created: fully populated
    /// as empty. Children deduplicate by identity hash; an index key
    /// collision with a different child overwrites the slot and logs a
    /// warning.
    ///
    /// Returns true when this call attached the container.
    pub fn append_collection(
        &mut self,
        parent: &EntityRef,
        relation: &str,
        child: Option<(u64, EntityRef)>,
        index_key: Option<&Value>,
        indexed: bool,
    ) -> bool {
        let newly_opened = self
            .open_collections
            .insert((instance_id(parent), relation.to_string()));

        let mut guard = parent.write().expect("lock poisoned");
        let container = guard.collection_mut(relation, indexed);
        if let Some((identity, child)) = child {
            match index_key {
                Some(key) => {
                    if container.insert_keyed(key, identity, child) == KeyedInsert::Overwrote {
                        tracing::warn!(
                            relation,
                            key = ?key,
                            "duplicate collection index key with a different child; overwriting"
                        );
                    }
                }
                None => {
                    container.push_unique(identity, child);
                }
            }
        }
        newly_opened
    }

    /// Number of distinct instances materialized this run.
    pub fn len(&self) -> usize {
        self.identity.len()
    }

    /// Whether no instance has been materialized yet.
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }
}

/// Build the stand-in decision for a lazy to-one relation from meta
/// values, `None` when the relation does not apply.
fn lazy_stand_in<M: MetadataProvider, F: Materializer>(
    relation: &RelationMeta,
    meta: &[(String, Value)],
    metadata: &M,
    materializer: &F,
) -> Option<Option<EntityRef>> {
    if !relation.lazy || relation.kind.is_collection_valued() {
        return None;
    }
    let fk_field = relation.fk_field.as_deref()?;
    let (_, fk_value) = meta.iter().find(|(field, _)| field == fk_field)?;
    if fk_value.is_null() {
        return Some(None);
    }
    let target_ids = metadata.identifier_fields(&relation.target_type).ok()?;
    let id_field = target_ids.first()?.clone();
    let stand_in = materializer
        .new_lazy_reference(&relation.target_type, vec![(id_field, fk_value.clone())]);
    Some(Some(shared(stand_in)))
}
