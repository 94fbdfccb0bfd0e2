//! Result-set hydration: flat, aliased SQL rows into a graph of typed,
//! deduplicated entity instances.
//!
//! A hydration run takes a [`ResultMapping`] (which columns feed which
//! alias), entity metadata, and a row cursor, and produces either a list
//! of distinct root entities, one row-entry per row for mixed results,
//! or a keyed result when an index field is declared. Joined rows fold
//! into nested to-one references and deduplicated collections; the same
//! (type, identifier) pair always resolves to the same instance within a
//! run.
//!
//! ```
//! use rowgraph::{HydrationOptions, Hydrator, ResultMapping, VecCursor};
//! use rowgraph_core::{
//!     BasicMaterializer, EntityMeta, FieldKind, MetadataRegistry, NullUnitOfWork, Row, Value,
//! };
//!
//! let metadata = MetadataRegistry::new().register(
//!     EntityMeta::new("User")
//!         .field("id", FieldKind::Int)
//!         .field("name", FieldKind::Text)
//!         .id(&["id"]),
//! );
//! let mapping = ResultMapping::builder()
//!     .add_root("User", "u")
//!     .add_field("u", "u__id", "id")
//!     .add_field("u", "u__name", "name")
//!     .build(&metadata)
//!     .unwrap();
//!
//! let rows = vec![Row::from_pairs(vec![
//!     ("u__id", Value::Int(1)),
//!     ("u__name", Value::Text("romanb".into())),
//! ])];
//! let hydrator = Hydrator::new(&mapping, &metadata, HydrationOptions::default());
//! let result = hydrator
//!     .hydrate_all(
//!         VecCursor::new(rows),
//!         &BasicMaterializer::new(&metadata),
//!         &mut NullUnitOfWork,
//!     )
//!     .unwrap();
//! assert_eq!(result.len(), 1);
//! ```

pub mod accumulate;
pub mod assembler;
pub mod cursor;
pub mod decode;
pub mod mapping;
pub mod registry;

pub use accumulate::{KeyedRows, ResultAccumulator, ResultSet, RowEntry};
pub use assembler::{GraphAssembler, HydrationIter, Hydrator};
pub use cursor::{FetchCursor, RowSource, VecCursor};
pub use decode::{AliasBundle, DecodedRow, RowDecoder};
pub use mapping::{AliasNode, IndexSource, MappingBuilder, ResultMapping, Shape};
pub use registry::EntityRegistry;

// Re-exported so embedders rarely need a direct rowgraph-core dependency.
pub use rowgraph_core::{
    Entity, EntityRef, HydrationError, Materializer, MetadataProvider, Result, Row, RowCursor,
    UnitOfWork, Value,
};

/// Tunables for one hydration run.
#[derive(Debug, Clone, Copy, Default)]
pub struct HydrationOptions {
    /// Accept mappings that bind no identifier columns for an alias,
    /// keying identity on the full field tuple instead of failing.
    pub force_partial_load: bool,
    /// Decode columns the mapping declares but the row lacks as null
    /// instead of failing.
    pub tolerate_missing_columns: bool,
}

impl HydrationOptions {
    /// Default options: strict identifiers, strict columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set partial-load tolerance.
    pub fn force_partial_load(mut self, on: bool) -> Self {
        self.force_partial_load = on;
        self
    }

    /// Set missing-column tolerance.
    pub fn tolerate_missing_columns(mut self, on: bool) -> Self {
        self.tolerate_missing_columns = on;
        self
    }
}
