//! Per-row decoding: raw rows into per-alias value bundles.

use crate::HydrationOptions;
use crate::mapping::{AliasNode, ResultMapping};
use rowgraph_core::{HydrationError, MetadataProvider, Result, Row, Value};

/// Transient per-alias slice of one row: coerced field values plus the
/// identity tuple. Destroyed after the row is folded into the graph.
#[derive(Debug)]
pub struct AliasBundle {
    /// Index of the alias node in the mapping.
    pub node: usize,
    /// True iff every identifier column decoded to a non-null value.
    pub has_identity: bool,
    /// Identifier tuple, in identifier order.
    pub key: Vec<Value>,
    /// Coerced (field, value) pairs.
    pub fields: Vec<(String, Value)>,
    /// Meta (foreign-key) values, passed through uncoerced.
    pub meta: Vec<(String, Value)>,
    /// Value of the index-by column, when declared.
    pub index_key: Option<Value>,
    /// Whether any field decoded to a non-null value.
    pub populated: bool,
}

/// One decoded row: alias bundles in parent-before-child order plus the
/// freestanding scalar values.
#[derive(Debug)]
pub struct DecodedRow {
    /// Per-alias bundles, one per mapping node, in node order.
    pub bundles: Vec<AliasBundle>,
    /// Scalar outputs as (output name, value), in declaration order.
    pub scalars: Vec<(String, Value)>,
}

/// Decodes raw rows against a mapping, delegating coercion to metadata.
pub struct RowDecoder<'a, M: MetadataProvider> {
    mapping: &'a ResultMapping,
    metadata: &'a M,
    options: HydrationOptions,
}

impl<'a, M: MetadataProvider> RowDecoder<'a, M> {
    /// Create a decoder for one hydration run.
    pub fn new(mapping: &'a ResultMapping, metadata: &'a M, options: HydrationOptions) -> Self {
        Self {
            mapping,
            metadata,
            options,
        }
    }

    /// Decode one raw row. `ordinal` is the zero-based row number, used
    /// for error context only.
    ///
    /// Columns present in the row but absent from every binding are
    /// ignored; columns declared by the mapping but absent from the row
    /// are a hard error unless missing-column tolerance is on.
    pub fn decode(&self, row: &Row, ordinal: usize) -> Result<DecodedRow> {
        let mut bundles = Vec::with_capacity(self.mapping.nodes().len());
        for (idx, node) in self.mapping.nodes().iter().enumerate() {
            bundles.push(self.decode_alias(row, ordinal, idx, node)?);
        }

        let mut scalars = Vec::with_capacity(self.mapping.scalars().len());
        for (column, name) in self.mapping.scalars() {
            let value = self.fetch(row, ordinal, column, name)?;
            scalars.push((name.clone(), value));
        }

        Ok(DecodedRow { bundles, scalars })
    }

    fn decode_alias(
        &self,
        row: &Row,
        ordinal: usize,
        idx: usize,
        node: &AliasNode,
    ) -> Result<AliasBundle> {
        let mut decoded: Vec<(String, String, Value)> = Vec::with_capacity(node.fields.len());
        let mut populated = false;
        for (column, field) in &node.fields {
            let raw = self.fetch(row, ordinal, column, &node.alias)?;
            let value = match self.metadata.field_kind(&node.entity_type, field) {
                Some(kind) => kind.coerce(raw)?,
                None => raw,
            };
            populated |= !value.is_null();
            decoded.push((column.clone(), field.clone(), value));
        }

        let mut meta = Vec::with_capacity(node.meta_fields.len());
        for (column, field) in &node.meta_fields {
            let value = self.fetch(row, ordinal, column, &node.alias)?;
            meta.push((field.clone(), value));
        }

        // Identity tuple from the precomputed identifier columns. When
        // the mapping binds no identifier column for this alias, identity
        // degenerates to the full field tuple under partial tolerance.
        let (key, has_identity) = if node.identifier_columns.is_empty() {
            if !self.options.force_partial_load {
                return Err(HydrationError::MissingIdentifier {
                    alias: node.alias.clone(),
                    row: ordinal,
                });
            }
            let key: Vec<Value> = decoded.iter().map(|(_, _, v)| v.clone()).collect();
            (key, populated)
        } else {
            let key: Vec<Value> = node
                .identifier_columns
                .iter()
                .map(|id_column| {
                    decoded
                        .iter()
                        .find(|(column, _, _)| column == id_column)
                        .map_or(Value::Null, |(_, _, v)| v.clone())
                })
                .collect();
            let has_identity = !key.iter().any(Value::is_null);
            (key, has_identity)
        };

        // A populated alias without a decodable identifier degrades to
        // absent; one malformed row must not abort the run.
        if !has_identity && populated {
            tracing::warn!(
                alias = %node.alias,
                row = ordinal,
                "row has populated fields but no decodable identifier; treating alias as absent"
            );
        }

        let index_key = match &node.index_column {
            Some(index_column) => decoded
                .iter()
                .find(|(column, _, _)| column == index_column)
                .map(|(_, _, v)| v.clone()),
            None => None,
        };

        Ok(AliasBundle {
            node: idx,
            has_identity,
            key,
            fields: decoded
                .into_iter()
                .map(|(_, field, value)| (field, value))
                .collect(),
            meta,
            index_key,
            populated,
        })
    }

    fn fetch(&self, row: &Row, ordinal: usize, column: &str, owner: &str) -> Result<Value> {
        match row.get_by_name(column) {
            Some(value) => Ok(value.clone()),
            None if self.options.tolerate_missing_columns => Ok(Value::Null),
            None => Err(HydrationError::MissingColumn {
                column: column.to_string(),
                alias: owner.to_string(),
                row: ordinal,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{EntityMeta, FieldKind, MetadataRegistry, RelationKind, RelationMeta};

    fn metadata() -> MetadataRegistry {
        MetadataRegistry::new()
            .register(
                EntityMeta::new("CmsUser")
                    .field("id", FieldKind::Int)
                    .field("name", FieldKind::Text)
                    .id(&["id"])
                    .relation(RelationMeta::new(
                        "phonenumbers",
                        "CmsPhonenumber",
                        RelationKind::OneToMany,
                    )),
            )
            .register(
                EntityMeta::new("CmsPhonenumber")
                    .field("phonenumber", FieldKind::Int)
                    .id(&["phonenumber"]),
            )
    }

    fn mapping(metadata: &MetadataRegistry) -> ResultMapping {
        ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_field("u", "u__id", "id")
            .add_field("u", "u__name", "name")
            .add_scalar("sclr0", "nameUpper")
            .build(metadata)
            .unwrap()
    }

    #[test]
    fn coerces_and_bundles() {
        let metadata = metadata();
        let mapping = mapping(&metadata);
        let decoder = RowDecoder::new(&mapping, &metadata, HydrationOptions::default());

        let row = Row::from_pairs(vec![
            ("u__id", Value::Text("1".to_string())),
            ("u__name", Value::Text("romanb".to_string())),
            ("sclr0", Value::Text("ROMANB".to_string())),
        ]);
        let decoded = decoder.decode(&row, 0).unwrap();

        let bundle = &decoded.bundles[0];
        assert!(bundle.has_identity);
        assert_eq!(bundle.key, vec![Value::Int(1)]);
        assert!(
            bundle
                .fields
                .iter()
                .any(|(f, v)| f == "id" && *v == Value::Int(1))
        );
        assert_eq!(
            decoded.scalars,
            vec![("nameUpper".to_string(), Value::Text("ROMANB".to_string()))]
        );
    }

    #[test]
    fn unknown_columns_ignored() {
        let metadata = metadata();
        let mapping = mapping(&metadata);
        let decoder = RowDecoder::new(&mapping, &metadata, HydrationOptions::default());

        let row = Row::from_pairs(vec![
            ("u__id", Value::Int(1)),
            ("u__name", Value::Text("romanb".to_string())),
            ("sclr0", Value::Text("ROMANB".to_string())),
            ("foo", Value::Text("bar".to_string())),
        ]);
        assert!(decoder.decode(&row, 0).is_ok());
    }

    #[test]
    fn missing_declared_column_is_fatal() {
        let metadata = metadata();
        let mapping = mapping(&metadata);
        let decoder = RowDecoder::new(&mapping, &metadata, HydrationOptions::default());

        let row = Row::from_pairs(vec![
            ("u__id", Value::Int(1)),
            ("sclr0", Value::Text("ROMANB".to_string())),
        ]);
        let err = decoder.decode(&row, 7).unwrap_err();
        match err {
            HydrationError::MissingColumn { column, row, .. } => {
                assert_eq!(column, "u__name");
                assert_eq!(row, 7);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_column_tolerance_decodes_null() {
        let metadata = metadata();
        let mapping = mapping(&metadata);
        let options = HydrationOptions::default().tolerate_missing_columns(true);
        let decoder = RowDecoder::new(&mapping, &metadata, options);

        let row = Row::from_pairs(vec![
            ("u__id", Value::Int(1)),
            ("sclr0", Value::Text("ROMANB".to_string())),
        ]);
        let decoded = decoder.decode(&row, 0).unwrap();
        assert!(
            decoded.bundles[0]
                .fields
                .iter()
                .any(|(f, v)| f == "name" && v.is_null())
        );
    }

    #[test]
    fn null_identifier_yields_absent_bundle() {
        let metadata = metadata();
        let mapping = mapping(&metadata);
        let decoder = RowDecoder::new(&mapping, &metadata, HydrationOptions::default());

        let row = Row::from_pairs(vec![
            ("u__id", Value::Null),
            ("u__name", Value::Null),
            ("sclr0", Value::Text("ROMANB".to_string())),
        ]);
        let decoded = decoder.decode(&row, 0).unwrap();
        assert!(!decoded.bundles[0].has_identity);
        assert!(!decoded.bundles[0].populated);
    }

    #[test]
    fn populated_fields_without_identifier_degrade_to_absent() {
        let metadata = metadata();
        let mapping = mapping(&metadata);
        let decoder = RowDecoder::new(&mapping, &metadata, HydrationOptions::default());

        let row = Row::from_pairs(vec![
            ("u__id", Value::Null),
            ("u__name", Value::Text("romanb".to_string())),
            ("sclr0", Value::Text("ROMANB".to_string())),
        ]);
        let decoded = decoder.decode(&row, 0).unwrap();
        assert!(!decoded.bundles[0].has_identity);
        assert!(decoded.bundles[0].populated);
    }

    #[test]
    fn unbound_identifier_columns_fatal_without_partial_load() {
        let metadata = metadata();
        // The mapping never binds the identifier column.
        let mapping = ResultMapping::builder()
            .add_root("CmsUser", "u")
            .add_field("u", "u__name", "name")
            .build(&metadata)
            .unwrap();
        let decoder = RowDecoder::new(&mapping, &metadata, HydrationOptions::default());

        let row = Row::from_pairs(vec![("u__name", Value::Text("romanb".to_string()))]);
        assert!(matches!(
            decoder.decode(&row, 0),
            Err(HydrationError::MissingIdentifier { .. })
        ));

        let partial = RowDecoder::new(
            &mapping,
            &metadata,
            HydrationOptions::default().force_partial_load(true),
        );
        let decoded = partial.decode(&row, 0).unwrap();
        // Identity degenerates to the full field tuple.
        assert!(decoded.bundles[0].has_identity);
    }
}
