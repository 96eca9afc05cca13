use super::{Index, PrimaryIndex};
use crate::common::PRIMARY_MARKER;
use crate::errors::{IndexError, IndexResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;

type FieldIndices = IndexMap<String, Vec<Index>>;

/// Runtime layout of registered indices.
///
/// Maps `type -> field -> indices` in registration order, plus one backlink
/// tracker per type. Readers get owned snapshots (index handles are `Arc`s),
/// so no registry lock is held while an index touches the filesystem.
pub(crate) struct IndexRegistry {
    indices: RwLock<IndexMap<String, FieldIndices>>,
    trackers: DashMap<String, PrimaryIndex>,
}

impl IndexRegistry {
    pub(crate) fn new() -> Self {
        IndexRegistry {
            indices: RwLock::new(IndexMap::new()),
            trackers: DashMap::new(),
        }
    }

    /// Appends `index` to the list of its `(type, field)` pair.
    ///
    /// Registering an index with an identical descriptor twice is rejected.
    pub(crate) fn add_index(&self, index: Index) -> IndexResult<()> {
        let descriptor = index.descriptor().clone();
        let mut indices = self.indices.write();
        let field_indices = indices
            .entry(descriptor.type_name().to_string())
            .or_default()
            .entry(descriptor.index_by().to_string())
            .or_default();

        if field_indices.iter().any(|it| it.descriptor() == &descriptor) {
            return Err(IndexError::already_exists(
                descriptor.type_name(),
                descriptor.index_by(),
                descriptor.index_type(),
            ));
        }
        field_indices.push(index);
        Ok(())
    }

    pub(crate) fn add_tracker(&self, tracker: PrimaryIndex) -> IndexResult<()> {
        match self.trackers.entry(tracker.type_name().to_string()) {
            Entry::Occupied(entry) => Err(IndexError::already_exists(
                entry.key(),
                PRIMARY_MARKER,
                entry.key(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(tracker);
                Ok(())
            }
        }
    }

    /// Every registered field of `type_name` with its indices.
    pub(crate) fn fields_of(&self, type_name: &str) -> Vec<(String, Vec<Index>)> {
        self.indices
            .read()
            .get(type_name)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(field, indices)| (field.clone(), indices.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn indices_for(&self, type_name: &str, index_by: &str) -> Vec<Index> {
        self.indices
            .read()
            .get(type_name)
            .and_then(|fields| fields.get(index_by))
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn tracker(&self, type_name: &str) -> Option<PrimaryIndex> {
        self.trackers.get(type_name).map(|it| it.value().clone())
    }
}
