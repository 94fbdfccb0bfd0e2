//! Static description of how result columns map onto the object graph.
//!
//! A [`ResultMapping`] is built once per query, validated against entity
//! metadata at construction, and read-only during hydration. The alias
//! tree is a forest by construction: a joined alias must name a parent
//! that was already declared.

use rowgraph_core::{HydrationError, MetadataProvider, Result};
use std::collections::HashMap;

/// One alias slot in the mapping: an entity (root or joined) and its
/// column bindings.
#[derive(Debug, Clone)]
pub struct AliasNode {
    /// Alias name.
    pub alias: String,
    /// Declared entity type.
    pub entity_type: String,
    /// Parent alias; `None` for roots.
    pub parent: Option<String>,
    /// Relation field on the parent; `None` for roots.
    pub relation_field: Option<String>,
    /// Whether the parent relation holds a collection. Resolved from
    /// metadata at build time.
    pub collection_valued: bool,
    /// Column -> field bindings, in declaration order.
    pub fields: Vec<(String, String)>,
    /// Columns whose fields form the primary key, in identifier order.
    pub identifier_columns: Vec<String>,
    /// Meta (foreign-key) column -> field bindings, used only for
    /// association resolution.
    pub meta_fields: Vec<(String, String)>,
    /// Field used to key this alias's container (collection index for
    /// joined aliases, result index for roots).
    pub index_by: Option<String>,
    /// Column bound to `index_by`, resolved at build time.
    pub index_column: Option<String>,
}

/// Result shape, decided once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Exactly one root entity alias, no scalar outputs: a plain list of
    /// root instances.
    PureEntity,
    /// Scalar outputs present or multiple root aliases: one row-entry per
    /// row, entities plus scalars.
    Mixed,
    /// No entity aliases at all: scalar rows only.
    ScalarOnly,
}

/// Where the result index key comes from, if the result is keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    /// Not keyed; ordered output.
    None,
    /// Keyed by a field of the (first) root alias.
    RootField {
        /// The root alias.
        alias: String,
        /// Column carrying the key value.
        column: String,
    },
    /// Keyed by a freestanding scalar column.
    Scalar {
        /// Column carrying the key value.
        column: String,
    },
}

/// Immutable mapping from result columns to the hydrated graph shape.
#[derive(Debug, Clone)]
pub struct ResultMapping {
    nodes: Vec<AliasNode>,
    by_alias: HashMap<String, usize>,
    roots: Vec<String>,
    scalars: Vec<(String, String)>,
    shape: Shape,
    index: IndexSource,
}

impl ResultMapping {
    /// Start building a mapping.
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    /// Alias nodes in declaration order (parents always precede their
    /// children).
    pub fn nodes(&self) -> &[AliasNode] {
        &self.nodes
    }

    /// Look up an alias node.
    pub fn node(&self, alias: &str) -> Option<&AliasNode> {
        self.by_alias.get(alias).map(|&i| &self.nodes[i])
    }

    /// Root aliases in declaration order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Declared scalar outputs as (column, output name).
    pub fn scalars(&self) -> &[(String, String)] {
        &self.scalars
    }

    /// The result shape tag.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// The result index key source.
    pub fn index_source(&self) -> &IndexSource {
        &self.index
    }
}

/// Builder for [`ResultMapping`]. Declaration order matters: a joined
/// alias must come after its parent.
#[derive(Debug, Default)]
pub struct MappingBuilder {
    entities: Vec<(String, String)>,
    joins: Vec<(String, String, String, String)>,
    fields: Vec<(String, String, String)>,
    metas: Vec<(String, String, String)>,
    scalars: Vec<(String, String)>,
    index_by: Vec<(String, String)>,
    index_by_scalar: Option<String>,
}

impl MappingBuilder {
    /// Declare a root entity alias.
    pub fn add_root(mut self, entity_type: impl Into<String>, alias: impl Into<String>) -> Self {
        self.entities.push((entity_type.into(), alias.into()));
        self
    }

    /// Declare a joined entity alias under `parent_alias` via the named
    /// relation field.
    pub fn add_joined(
        mut self,
        entity_type: impl Into<String>,
        alias: impl Into<String>,
        parent_alias: impl Into<String>,
        relation_field: impl Into<String>,
    ) -> Self {
        self.joins.push((
            entity_type.into(),
            alias.into(),
            parent_alias.into(),
            relation_field.into(),
        ));
        self
    }

    /// Bind a result column to a field of an alias.
    pub fn add_field(
        mut self,
        alias: impl Into<String>,
        column: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.fields.push((alias.into(), column.into(), field.into()));
        self
    }

    /// Bind a meta (foreign-key) column to an alias. Meta columns take
    /// part in association resolution only, never in field population.
    pub fn add_meta(
        mut self,
        alias: impl Into<String>,
        column: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.metas.push((alias.into(), column.into(), field.into()));
        self
    }

    /// Declare a freestanding scalar output.
    pub fn add_scalar(mut self, column: impl Into<String>, name: impl Into<String>) -> Self {
        self.scalars.push((column.into(), name.into()));
        self
    }

    /// Key an alias's container by one of its fields.
    pub fn add_index_by(mut self, alias: impl Into<String>, field: impl Into<String>) -> Self {
        self.index_by.push((alias.into(), field.into()));
        self
    }

    /// Key the whole result by a scalar column (scalar-only results).
    pub fn add_index_by_scalar(mut self, column: impl Into<String>) -> Self {
        self.index_by_scalar = Some(column.into());
        self
    }

    /// Validate and freeze the mapping against entity metadata.
    pub fn build<M: MetadataProvider>(self, metadata: &M) -> Result<ResultMapping> {
        let mut nodes: Vec<AliasNode> = Vec::new();
        let mut by_alias: HashMap<String, usize> = HashMap::new();
        let mut roots = Vec::new();

        for (entity_type, alias) in self.entities {
            if by_alias.contains_key(&alias) {
                return Err(HydrationError::Mapping(format!(
                    "duplicate alias '{alias}'"
                )));
            }
            if metadata.meta(&entity_type).is_none() {
                return Err(HydrationError::Mapping(format!(
                    "unknown entity type '{entity_type}' for alias '{alias}'"
                )));
            }
            by_alias.insert(alias.clone(), nodes.len());
            roots.push(alias.clone());
            nodes.push(AliasNode {
                alias,
                entity_type,
                parent: None,
                relation_field: None,
                collection_valued: false,
                fields: Vec::new(),
                identifier_columns: Vec::new(),
                meta_fields: Vec::new(),
                index_by: None,
                index_column: None,
            });
        }

        for (entity_type, alias, parent, relation_field) in self.joins {
            if by_alias.contains_key(&alias) {
                return Err(HydrationError::Mapping(format!(
                    "duplicate alias '{alias}'"
                )));
            }
            let Some(&parent_idx) = by_alias.get(&parent) else {
                return Err(HydrationError::Mapping(format!(
                    "alias '{alias}' joins undeclared parent '{parent}'"
                )));
            };
            let parent_type = nodes[parent_idx].entity_type.clone();
            let Some(relation) = metadata.relation(&parent_type, &relation_field) else {
                return Err(HydrationError::Mapping(format!(
                    "entity type '{parent_type}' has no relation '{relation_field}'"
                )));
            };
            if relation.target_type != entity_type {
                return Err(HydrationError::Mapping(format!(
                    "relation '{parent_type}.{relation_field}' targets '{}', alias '{alias}' declares '{entity_type}'",
                    relation.target_type
                )));
            }
            let collection_valued = relation.kind.is_collection_valued();
            by_alias.insert(alias.clone(), nodes.len());
            nodes.push(AliasNode {
                alias,
                entity_type,
                parent: Some(parent),
                relation_field: Some(relation_field),
                collection_valued,
                fields: Vec::new(),
                identifier_columns: Vec::new(),
                meta_fields: Vec::new(),
                index_by: None,
                index_column: None,
            });
        }

        for (alias, column, field) in self.fields {
            let Some(&idx) = by_alias.get(&alias) else {
                return Err(HydrationError::Mapping(format!(
                    "field column '{column}' bound to undeclared alias '{alias}'"
                )));
            };
            nodes[idx].fields.push((column, field));
        }

        for (alias, column, field) in self.metas {
            let Some(&idx) = by_alias.get(&alias) else {
                return Err(HydrationError::Mapping(format!(
                    "meta column '{column}' bound to undeclared alias '{alias}'"
                )));
            };
            nodes[idx].meta_fields.push((column, field));
        }

        // Identifier columns: the bound columns of the identifier fields,
        // in identifier order. Resolved once so decoding never searches.
        for node in &mut nodes {
            let id_fields = metadata.identifier_fields(&node.entity_type)?;
            for id_field in id_fields {
                if let Some((column, _)) =
                    node.fields.iter().find(|(_, field)| field == id_field)
                {
                    node.identifier_columns.push(column.clone());
                }
            }
        }

        for (alias, field) in self.index_by {
            let Some(&idx) = by_alias.get(&alias) else {
                return Err(HydrationError::Mapping(format!(
                    "index-by on undeclared alias '{alias}'"
                )));
            };
            let node = &mut nodes[idx];
            let Some((column, _)) = node.fields.iter().find(|(_, f)| *f == field) else {
                return Err(HydrationError::Mapping(format!(
                    "index-by field '{field}' is not bound for alias '{alias}'"
                )));
            };
            node.index_column = Some(column.clone());
            node.index_by = Some(field);
        }

        let mut scalar_names = HashMap::new();
        for (column, name) in &self.scalars {
            if scalar_names.insert(name.clone(), column.clone()).is_some() {
                return Err(HydrationError::Mapping(format!(
                    "duplicate scalar output name '{name}'"
                )));
            }
        }

        let shape = if roots.is_empty() {
            if self.scalars.is_empty() {
                return Err(HydrationError::Mapping(
                    "mapping declares no entity aliases and no scalar outputs".to_string(),
                ));
            }
            Shape::ScalarOnly
        } else if self.scalars.is_empty() && roots.len() == 1 {
            Shape::PureEntity
        } else {
            Shape::Mixed
        };

        let index = if let Some(root_alias) = roots.iter().find(|alias| {
            nodes[by_alias[alias.as_str()]].index_by.is_some()
        }) {
            let node = &nodes[by_alias[root_alias.as_str()]];
            IndexSource::RootField {
                alias: root_alias.clone(),
                column: node.index_column.clone().unwrap_or_default(),
            }
        } else if let Some(column) = self.index_by_scalar {
            if !self.scalars.iter().any(|(c, _)| *c == column) {
                return Err(HydrationError::Mapping(format!(
                    "index-by scalar column '{column}' is not a declared scalar output"
                )));
            }
            IndexSource::Scalar { column }
        } else {
            IndexSource::None
        };

        Ok(ResultMapping {
            nodes,
            by_alias,
            roots,
            scalars: self.scalars,
            shape,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{EntityMeta, FieldKind, MetadataRegistry, RelationKind, RelationMeta};

    fn cms_metadata() -> MetadataRegistry {
        MetadataRegistry::new()
            .register(
                EntityMeta::new("CmsUser")
                    .field("id", FieldKind::Int)
                    .field("name", FieldKind::Text)
                    .field("status", FieldKind::Text)
                    .id(&["id"])
                    .relation(RelationMeta::new(
                        "phonenumbers",
                        "CmsPhonenumber",
                        RelationKind::OneToMany,
                    ))
                    .relation(RelationMeta::new(
                        "address",
                        "CmsAddress",
                        RelationKind::OneToOne,
                    )),
            )
            .register(
                EntityMeta::new("CmsPhonenumber")
                    .field("phonenumber", FieldKind::Int)
                    .id(&["phonenumber"]),
            )
            .register(
                EntityMeta::new("CmsAddress")
                    .field("id", FieldKind::Int)
                    .field("city", FieldKind::Text)
                    .id(&["id"]),
            )
    }

    #[test]
    fn pure_entity_shape() {
        let mapping = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_field("u", "u__id", "id")
            .add_field("u", "u__name", "name")
            .build(&cms_metadata())
            .unwrap();

        assert_eq!(mapping.shape(), Shape::PureEntity);
        assert_eq!(mapping.roots(), &["u".to_string()]);
        let node = mapping.node("u").unwrap();
        assert_eq!(node.identifier_columns, vec!["u__id".to_string()]);
        assert_eq!(*mapping.index_source(), IndexSource::None);
    }

    #[test]
    fn mixed_shape_with_scalar() {
        let mapping = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_field("u", "u__id", "id")
            .add_scalar("sclr0", "nameUpper")
            .build(&cms_metadata())
            .unwrap();

        assert_eq!(mapping.shape(), Shape::Mixed);
    }

    #[test]
    fn joined_alias_resolves_cardinality() {
        let mapping = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_joined("CmsPhonenumber", "p", "u", "phonenumbers")
            .add_joined("CmsAddress", "a", "u", "address")
            .add_field("u", "u__id", "id")
            .add_field("p", "p__phonenumber", "phonenumber")
            .add_field("a", "a__id", "id")
            .build(&cms_metadata())
            .unwrap();

        assert!(mapping.node("p").unwrap().collection_valued);
        assert!(!mapping.node("a").unwrap().collection_valued);
        // Parents precede children in node order.
        let order: Vec<_> = mapping.nodes().iter().map(|n| n.alias.as_str()).collect();
        assert_eq!(order, vec!["u", "p", "a"]);
    }

    #[test]
    fn dangling_parent_rejected() {
        let err = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_joined("CmsPhonenumber", "p", "x", "phonenumbers")
            .build(&cms_metadata())
            .unwrap_err();
        assert!(err.to_string().contains("undeclared parent"));
    }

    #[test]
    fn unknown_relation_rejected() {
        let err = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_joined("CmsPhonenumber", "p", "u", "faxnumbers")
            .build(&cms_metadata())
            .unwrap_err();
        assert!(err.to_string().contains("no relation"));
    }

    #[test]
    fn duplicate_alias_rejected() {
        let err = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_root("CmsAddress", "u")
            .build(&cms_metadata())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate alias"));
    }

    #[test]
    fn index_by_root_field() {
        let mapping = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_field("u", "u__id", "id")
            .add_index_by("u", "id")
            .build(&cms_metadata())
            .unwrap();

        match mapping.index_source() {
            IndexSource::RootField { alias, column } => {
                assert_eq!(alias, "u");
                assert_eq!(column, "u__id");
            }
            other => panic!("unexpected index source: {other:?}"),
        }
    }

    #[test]
    fn index_by_unbound_field_rejected() {
        let err = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_field("u", "u__id", "id")
            .add_index_by("u", "name")
            .build(&cms_metadata())
            .unwrap_err();
        assert!(err.to_string().contains("not bound"));
    }

    #[test]
    fn scalar_only_index() {
        let mapping = ResultMapping::builder()
            .add_scalar("sclr0", "nameUpper")
            .add_index_by_scalar("sclr0")
            .build(&cms_metadata())
            .unwrap();

        assert_eq!(mapping.shape(), Shape::ScalarOnly);
        assert_eq!(
            *mapping.index_source(),
            IndexSource::Scalar {
                column: "sclr0".to_string()
            }
        );
    }

    #[test]
    fn empty_mapping_rejected() {
        assert!(ResultMapping::builder().build(&cms_metadata()).is_err());
    }
}
