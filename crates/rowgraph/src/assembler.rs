//! Graph assembly: decoded rows folded into the shared object graph.
//!
//! The assembler walks each decoded row in node order (parents before
//! children), resolves every alias through the run's identity registry,
//! and wires children into their parent's relation. Which of the
//! resolved instances ends up in the result is the accumulator's
//! business; the assembler only reports what each row produced.

use crate::HydrationOptions;
use crate::accumulate::{ResultAccumulator, ResultSet, RowEntry};
use crate::decode::{DecodedRow, RowDecoder};
use crate::mapping::{IndexSource, ResultMapping, Shape};
use crate::registry::EntityRegistry;
use rowgraph_core::{
    EntityRef, HydrationError, Materializer, MetadataProvider, Result, RowCursor, UnitOfWork,
    Value, instance_id, value_hash,
};
use std::collections::{HashMap, HashSet};

/// What one row contributed, in root declaration order.
#[derive(Debug)]
pub struct RowOutcome {
    /// Resolved root instances, `None` where the row carried no identity.
    pub entities: Vec<Option<EntityRef>>,
    /// Scalar outputs of the row.
    pub scalars: Vec<(String, Value)>,
    /// Per root: whether this row materialized the root for the first
    /// time in the run.
    pub first_seen: Vec<bool>,
    /// Per root: the root's index-by key value, when declared.
    pub root_index_keys: Vec<Option<Value>>,
}

/// Folds decoded rows into the object graph, one row at a time.
pub struct GraphAssembler<'a, M: MetadataProvider> {
    mapping: &'a ResultMapping,
    metadata: &'a M,
    registry: EntityRegistry,
    /// Parent node index per node, `None` for roots.
    parent_index: Vec<Option<usize>>,
    /// (root node, identity hash) pairs already materialized.
    emitted_roots: HashSet<(usize, u64)>,
    /// Root identity hashes of the previous row, for boundary detection.
    previous_root_keys: Option<Vec<Option<u64>>>,
    /// Collections opened since the last boundary, awaiting their
    /// populated notification.
    pending: Vec<(EntityRef, String)>,
    notified: HashSet<(usize, String)>,
}

impl<'a, M: MetadataProvider> GraphAssembler<'a, M> {
    /// Create an assembler for one run.
    pub fn new(mapping: &'a ResultMapping, metadata: &'a M) -> Self {
        let by_alias: HashMap<&str, usize> = mapping
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| (node.alias.as_str(), idx))
            .collect();
        let parent_index = mapping
            .nodes()
            .iter()
            .map(|node| {
                node.parent
                    .as_deref()
                    .and_then(|parent| by_alias.get(parent).copied())
            })
            .collect();
        Self {
            mapping,
            metadata,
            registry: EntityRegistry::new(),
            parent_index,
            emitted_roots: HashSet::new(),
            previous_root_keys: None,
            pending: Vec::new(),
            notified: HashSet::new(),
        }
    }

    /// The run's identity registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Fold one decoded row into the graph.
    pub fn assemble<F, U>(
        &mut self,
        decoded: DecodedRow,
        materializer: &F,
        uow: &mut U,
    ) -> Result<RowOutcome>
    where
        F: Materializer,
        U: UnitOfWork,
    {
        // A change in the root identity combination closes the previous
        // run of rows: its collections are complete.
        let current_root_keys: Vec<Option<u64>> = self
            .mapping
            .nodes()
            .iter()
            .zip(decoded.bundles.iter())
            .filter(|(node, _)| node.parent.is_none())
            .map(|(_, bundle)| bundle.has_identity.then(|| value_hash(&bundle.key)))
            .collect();
        if self
            .previous_root_keys
            .as_ref()
            .is_some_and(|previous| *previous != current_root_keys)
        {
            self.flush_collection_notifications(uow);
        }
        self.previous_root_keys = Some(current_root_keys);

        let mut resolved: Vec<Option<EntityRef>> = vec![None; self.mapping.nodes().len()];
        let mut first_seen = Vec::new();
        let mut root_index_keys = Vec::new();

        for (idx, node) in self.mapping.nodes().iter().enumerate() {
            let bundle = &decoded.bundles[idx];

            let Some(relation_field) = node.relation_field.as_deref() else {
                // Root alias.
                let mut fresh = false;
                if bundle.has_identity {
                    let (instance, _) = self.registry.get_or_create(
                        &node.entity_type,
                        &bundle.key,
                        &bundle.fields,
                        &bundle.meta,
                        self.metadata,
                        materializer,
                        uow,
                    );
                    fresh = self.emitted_roots.insert((idx, value_hash(&bundle.key)));
                    resolved[idx] = Some(instance);
                }
                first_seen.push(fresh);
                root_index_keys.push(bundle.index_key.clone());
                continue;
            };

            let parent_idx =
                self.parent_index[idx]
                    .ok_or_else(|| HydrationError::UnresolvedParent {
                        alias: node.alias.clone(),
                        parent: node.parent.clone().unwrap_or_default(),
                        row: 0,
                    })?;
            // Absent parent: the whole subtree of this alias is absent.
            let Some(parent) = resolved[parent_idx].clone() else {
                continue;
            };

            let child = if bundle.has_identity {
                let (instance, _) = self.registry.get_or_create(
                    &node.entity_type,
                    &bundle.key,
                    &bundle.fields,
                    &bundle.meta,
                    self.metadata,
                    materializer,
                    uow,
                );
                Some(instance)
            } else {
                None
            };

            if node.collection_valued {
                let index_key = bundle.index_key.as_ref().filter(|key| !key.is_null());
                if node.index_by.is_some() && index_key.is_none() && child.is_some() {
                    tracing::warn!(
                        alias = %node.alias,
                        "collection child has no usable index key; appending positionally"
                    );
                }
                let entry = child
                    .clone()
                    .map(|instance| (value_hash(&bundle.key), instance));
                let opened = self.registry.append_collection(
                    &parent,
                    relation_field,
                    entry,
                    index_key,
                    node.index_by.is_some(),
                );
                if opened {
                    self.pending
                        .push((EntityRef::clone(&parent), relation_field.to_string()));
                }
            } else {
                self.registry
                    .resolve_single_valued(&parent, relation_field, child.clone());
            }
            resolved[idx] = child;
        }

        let entities = self
            .mapping
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(idx, _)| resolved[idx].clone())
            .collect();

        Ok(RowOutcome {
            entities,
            scalars: decoded.scalars,
            first_seen,
            root_index_keys,
        })
    }

    /// End of stream: the final run of rows is complete.
    pub fn finish<U: UnitOfWork>(&mut self, uow: &mut U) {
        self.flush_collection_notifications(uow);
    }

    fn flush_collection_notifications<U: UnitOfWork>(&mut self, uow: &mut U) {
        for (parent, relation) in self.pending.drain(..) {
            if self
                .notified
                .insert((instance_id(&parent), relation.clone()))
            {
                uow.collection_populated(&parent, &relation);
            }
        }
    }
}

/// Entry point for hydration runs over a mapping.
pub struct Hydrator<'a, M: MetadataProvider> {
    mapping: &'a ResultMapping,
    metadata: &'a M,
    options: HydrationOptions,
}

impl<'a, M: MetadataProvider> Hydrator<'a, M> {
    /// Create a hydrator for a mapping.
    pub fn new(mapping: &'a ResultMapping, metadata: &'a M, options: HydrationOptions) -> Self {
        Self {
            mapping,
            metadata,
            options,
        }
    }

    /// Drain the cursor eagerly into a complete result set.
    ///
    /// The cursor is closed in every exit path, including errors.
    pub fn hydrate_all<C, F, U>(
        &self,
        mut cursor: C,
        materializer: &F,
        uow: &mut U,
    ) -> Result<ResultSet>
    where
        C: RowCursor,
        F: Materializer,
        U: UnitOfWork,
    {
        let decoder = RowDecoder::new(self.mapping, self.metadata, self.options);
        let mut assembler = GraphAssembler::new(self.mapping, self.metadata);
        let mut accumulator = ResultAccumulator::new(self.mapping);

        let mut ordinal = 0;
        let outcome = loop {
            match cursor.next_row() {
                Ok(Some(row)) => {
                    match decoder
                        .decode(&row, ordinal)
                        .and_then(|decoded| assembler.assemble(decoded, materializer, uow))
                    {
                        Ok(outcome) => self.emit(&mut accumulator, outcome),
                        Err(err) => break Err(err),
                    }
                    ordinal += 1;
                }
                Ok(None) => {
                    assembler.finish(uow);
                    break Ok(());
                }
                Err(err) => break Err(err),
            }
        };
        cursor.close();
        outcome?;
        Ok(accumulator.finish())
    }

    /// Hydrate lazily, one row entry per pulled row.
    ///
    /// Deduplication still applies to the graph: a root spanning several
    /// rows is the same instance in each yielded entry, with its
    /// collections growing as rows arrive.
    pub fn iterate<'u, C, F, U>(
        &self,
        cursor: C,
        materializer: &'u F,
        uow: &'u mut U,
    ) -> HydrationIter<'a, 'u, M, C, F, U>
    where
        C: RowCursor,
        F: Materializer,
        U: UnitOfWork,
    {
        HydrationIter {
            decoder: RowDecoder::new(self.mapping, self.metadata, self.options),
            assembler: GraphAssembler::new(self.mapping, self.metadata),
            cursor,
            materializer,
            uow,
            ordinal: 0,
            done: false,
        }
    }

    fn emit(&self, accumulator: &mut ResultAccumulator, outcome: RowOutcome) {
        match self.mapping.shape() {
            Shape::PureEntity => {
                let root = outcome.entities.into_iter().next().flatten();
                match root {
                    Some(instance) if outcome.first_seen[0] => {
                        let key = outcome.root_index_keys.into_iter().next().flatten();
                        accumulator.push_root(Some(instance), key);
                    }
                    Some(_) => {}
                    None => accumulator.push_root(None, None),
                }
            }
            Shape::Mixed | Shape::ScalarOnly => {
                let key = self.row_index_key(&outcome);
                accumulator.push_row(
                    RowEntry {
                        entities: outcome.entities,
                        scalars: outcome.scalars,
                    },
                    key,
                );
            }
        }
    }

    fn row_index_key(&self, outcome: &RowOutcome) -> Option<Value> {
        match self.mapping.index_source() {
            IndexSource::None => None,
            IndexSource::RootField { alias, .. } => self
                .mapping
                .roots()
                .iter()
                .position(|root| root == alias)
                .and_then(|pos| outcome.root_index_keys.get(pos).cloned().flatten()),
            IndexSource::Scalar { column } => {
                let name = self
                    .mapping
                    .scalars()
                    .iter()
                    .find(|(c, _)| c == column)
                    .map(|(_, name)| name)?;
                outcome
                    .scalars
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v.clone())
            }
        }
    }
}

/// Lazy hydration over a cursor. Yields one [`RowEntry`] per input row;
/// for pure-entity mappings the entry holds a single root slot.
pub struct HydrationIter<'m, 'u, M: MetadataProvider, C: RowCursor, F: Materializer, U: UnitOfWork>
{
    decoder: RowDecoder<'m, M>,
    assembler: GraphAssembler<'m, M>,
    cursor: C,
    materializer: &'u F,
    uow: &'u mut U,
    ordinal: usize,
    done: bool,
}

impl<M: MetadataProvider, C: RowCursor, F: Materializer, U: UnitOfWork> Iterator
    for HydrationIter<'_, '_, M, C, F, U>
{
    type Item = Result<RowEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let row = match self.cursor.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.assembler.finish(self.uow);
                self.cursor.close();
                self.done = true;
                return None;
            }
            Err(err) => {
                self.cursor.close();
                self.done = true;
                return Some(Err(err));
            }
        };
        let outcome = self
            .decoder
            .decode(&row, self.ordinal)
            .and_then(|decoded| self.assembler.assemble(decoded, self.materializer, self.uow));
        self.ordinal += 1;
        match outcome {
            Ok(outcome) => Some(Ok(RowEntry {
                entities: outcome.entities,
                scalars: outcome.scalars,
            })),
            Err(err) => {
                self.cursor.close();
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<M: MetadataProvider, C: RowCursor, F: Materializer, U: UnitOfWork> Drop
    for HydrationIter<'_, '_, M, C, F, U>
{
    fn drop(&mut self) {
        if !self.done {
            self.cursor.close();
        }
    }
}
