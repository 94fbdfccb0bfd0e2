//! Entity metadata: field coercion rules, identifiers, and relations.
//!
//! Class-metadata resolution is an external concern; the hydrator only
//! consumes a lookup capability keyed by entity type name. The in-memory
//! [`MetadataRegistry`] is the reference implementation callers (and the
//! test suite) populate by hand.

use crate::error::{HydrationError, Result};
use crate::value::Value;

/// Coercion rule for a declared field.
///
/// Row cursors frequently deliver loosely-typed scalars (e.g. every value
/// as text); the declared kind converts them to the canonical
/// representation. Null always stays null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed integer
    Int,
    /// Floating point
    Float,
    /// Arbitrary precision decimal, kept as string
    Decimal,
    /// Text
    Text,
    /// Boolean
    Bool,
    /// Raw bytes
    Bytes,
    /// UUID
    Uuid,
    /// JSON document
    Json,
}

impl FieldKind {
    /// Coerce a raw cursor value to this kind's representation.
    pub fn coerce(self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let type_name = value.type_name();
        let coerced = match self {
            FieldKind::Int => value.as_i64().map(Value::Int),
            FieldKind::Float => value.as_f64().map(Value::Double),
            FieldKind::Decimal => match value {
                Value::Decimal(s) | Value::Text(s) => Some(Value::Decimal(s)),
                Value::Int(i) => Some(Value::Decimal(i.to_string())),
                Value::Double(f) => Some(Value::Decimal(f.to_string())),
                _ => None,
            },
            FieldKind::Text => match value {
                Value::Text(s) => Some(Value::Text(s)),
                Value::Int(i) => Some(Value::Text(i.to_string())),
                Value::Double(f) => Some(Value::Text(f.to_string())),
                Value::Decimal(s) => Some(Value::Text(s)),
                Value::Bool(b) => Some(Value::Text(b.to_string())),
                _ => None,
            },
            FieldKind::Bool => value.as_bool().map(Value::Bool),
            FieldKind::Bytes => match value {
                Value::Bytes(b) => Some(Value::Bytes(b)),
                Value::Text(s) => Some(Value::Bytes(s.into_bytes())),
                _ => None,
            },
            FieldKind::Uuid => match value {
                Value::Uuid(u) => Some(Value::Uuid(u)),
                Value::Bytes(b) if b.len() == 16 => {
                    let mut arr = [0u8; 16];
                    arr.copy_from_slice(&b);
                    Some(Value::Uuid(arr))
                }
                _ => None,
            },
            FieldKind::Json => match value {
                Value::Json(j) => Some(Value::Json(j)),
                Value::Text(s) => serde_json::from_str(&s).ok().map(Value::Json),
                _ => None,
            },
        };
        coerced.ok_or_else(|| {
            HydrationError::Metadata(format!(
                "cannot coerce {type_name} value to {self:?}"
            ))
        })
    }
}

/// The type of relationship between two entity types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationKind {
    /// One-to-one: a user has one address.
    OneToOne,
    /// Many-to-one: many products belong to one category.
    #[default]
    ManyToOne,
    /// One-to-many: one user has many phone numbers.
    OneToMany,
    /// Many-to-many: users belong to many groups via a link table.
    ManyToMany,
}

impl RelationKind {
    /// Does this relation hold a collection on the owning side?
    pub const fn is_collection_valued(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Metadata about one field of an entity type.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    /// Field name on the entity.
    pub name: String,
    /// Coercion rule applied to raw cursor values.
    pub kind: FieldKind,
}

impl FieldMeta {
    /// Create a new field definition.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Metadata about one relation of an entity type.
#[derive(Debug, Clone)]
pub struct RelationMeta {
    /// Field name holding the relation on the owning entity.
    pub field: String,
    /// Entity type on the other side.
    pub target_type: String,
    /// Cardinality.
    pub kind: RelationKind,
    /// Whether the relation is declared lazy. A lazy to-one relation is
    /// hydrated from its foreign-key meta column as a stand-in reference
    /// instead of joined columns.
    pub lazy: bool,
    /// Field carrying the foreign key for lazy to-one resolution.
    pub fk_field: Option<String>,
}

impl RelationMeta {
    /// Create a new relation definition.
    pub fn new(
        field: impl Into<String>,
        target_type: impl Into<String>,
        kind: RelationKind,
    ) -> Self {
        Self {
            field: field.into(),
            target_type: target_type.into(),
            kind,
            lazy: false,
            fk_field: None,
        }
    }

    /// Mark the relation lazy, naming the foreign-key field it resolves
    /// through.
    pub fn lazy(mut self, fk_field: impl Into<String>) -> Self {
        self.lazy = true;
        self.fk_field = Some(fk_field.into());
        self
    }
}

/// Metadata for one entity type.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    /// Entity type name (the identity-map namespace).
    pub entity_type: String,
    /// Declared fields with coercion rules.
    pub fields: Vec<FieldMeta>,
    /// Ordered identifier field names forming the primary key.
    pub identifier: Vec<String>,
    /// Declared relations.
    pub relations: Vec<RelationMeta>,
}

impl EntityMeta {
    /// Start a new entity type definition.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            fields: Vec::new(),
            identifier: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldMeta::new(name, kind));
        self
    }

    /// Declare the ordered identifier fields.
    pub fn id(mut self, fields: &[&str]) -> Self {
        self.identifier = fields.iter().map(|f| (*f).to_string()).collect();
        self
    }

    /// Add a relation.
    pub fn relation(mut self, rel: RelationMeta) -> Self {
        self.relations.push(rel);
        self
    }

    /// Look up a field's coercion kind.
    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == field).map(|f| f.kind)
    }

    /// Look up a relation by field name.
    pub fn relation_by_field(&self, field: &str) -> Option<&RelationMeta> {
        self.relations.iter().find(|r| r.field == field)
    }
}

/// Lookup capability the hydrator consumes, keyed by entity type name.
pub trait MetadataProvider {
    /// Get the metadata for an entity type, if registered.
    fn meta(&self, entity_type: &str) -> Option<&EntityMeta>;

    /// Ordered identifier field names for an entity type.
    fn identifier_fields(&self, entity_type: &str) -> Result<&[String]> {
        self.meta(entity_type)
            .map(|m| m.identifier.as_slice())
            .ok_or_else(|| {
                HydrationError::Metadata(format!("unknown entity type '{entity_type}'"))
            })
    }

    /// Coercion kind for a field, defaulting to pass-through text when a
    /// field is not declared (forward compatibility with partial models).
    fn field_kind(&self, entity_type: &str, field: &str) -> Option<FieldKind> {
        self.meta(entity_type).and_then(|m| m.field_kind(field))
    }

    /// Relation descriptor for a field.
    fn relation(&self, entity_type: &str, field: &str) -> Option<&RelationMeta> {
        self.meta(entity_type).and_then(|m| m.relation_by_field(field))
    }
}

/// In-memory metadata registry.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: Vec<EntityMeta>,
}

impl MetadataRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type. Later registrations for the same type
    /// replace earlier ones.
    pub fn register(mut self, meta: EntityMeta) -> Self {
        self.entries.retain(|m| m.entity_type != meta.entity_type);
        self.entries.push(meta);
        self
    }
}

impl MetadataProvider for MetadataRegistry {
    fn meta(&self, entity_type: &str) -> Option<&EntityMeta> {
        self.entries.iter().find(|m| m.entity_type == entity_type)
    }
}
