//! Core types and collaborator traits for rowgraph hydration.
//!
//! This crate holds the leaf data structures (values, rows, dynamic
//! entities, metadata) and the trait seams to external collaborators
//! (materializer, unit of work, row cursor). The hydration algorithm
//! itself lives in the `rowgraph` crate.

pub mod entity;
pub mod error;
pub mod external;
pub mod meta;
pub mod row;
pub mod value;

pub use entity::{Collection, Entity, EntityRef, KeyedInsert, instance_id, shared};
pub use error::{HydrationError, Result};
pub use external::{
    BasicMaterializer, Materializer, NullUnitOfWork, RecordingUnitOfWork, RowCursor, UnitOfWork,
};
pub use meta::{
    EntityMeta, FieldKind, FieldMeta, MetadataProvider, MetadataRegistry, RelationKind,
    RelationMeta,
};
pub use row::{ColumnInfo, Row};
pub use value::{Value, value_hash};
