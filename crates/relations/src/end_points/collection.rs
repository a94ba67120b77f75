//! Collection-valued virtual end-points

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{RelationError, RelationResult};
use crate::identity::{CollectionId, ObjectId};

use super::id::RelationEndPointId;
use super::load_state::VirtualEndPointData;
use super::virtual_end_point::VirtualEndPoint;

/// How current and original items are compared to detect a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeDetectionStrategy {
    /// Order-insensitive; used by root transactions
    SetEquality,
    /// Order-sensitive; used by sub-transactions so that a reorder propagates
    SequenceEquality,
}

impl ChangeDetectionStrategy {
    pub fn has_data_changed(&self, current: &[ObjectId], original: &[ObjectId]) -> bool {
        match self {
            ChangeDetectionStrategy::SetEquality => {
                current.len() != original.len()
                    || current.iter().collect::<BTreeSet<_>>()
                        != original.iter().collect::<BTreeSet<_>>()
            }
            ChangeDetectionStrategy::SequenceEquality => current != original,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionData {
    current_items: Vec<ObjectId>,
    original_items: Vec<ObjectId>,
    current_collection_id: CollectionId,
    original_collection_id: CollectionId,
    change_detection: ChangeDetectionStrategy,
}

impl CollectionData {
    pub fn new(
        items: Vec<ObjectId>,
        collection_id: CollectionId,
        change_detection: ChangeDetectionStrategy,
    ) -> Self {
        Self {
            current_items: items.clone(),
            original_items: items,
            current_collection_id: collection_id,
            original_collection_id: collection_id,
            change_detection,
        }
    }

    pub fn items(&self) -> &[ObjectId] {
        &self.current_items
    }

    pub fn original(&self) -> &[ObjectId] {
        &self.original_items
    }

    pub fn collection_id(&self) -> CollectionId {
        self.current_collection_id
    }

    pub fn original_collection_id(&self) -> CollectionId {
        self.original_collection_id
    }

    pub fn len(&self) -> usize {
        self.current_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_items.is_empty()
    }

    pub fn index_of(&self, item: &ObjectId) -> Option<usize> {
        self.current_items.iter().position(|current| current == item)
    }

    pub fn insert(&mut self, index: usize, item: ObjectId) -> RelationResult<()> {
        if index > self.current_items.len() {
            return Err(index_out_of_range(index, self.current_items.len()));
        }
        if self.current_items.contains(&item) {
            return Err(RelationError::invalid_argument(
                "item",
                format!("Object '{}' is already part of the collection", item),
            ));
        }
        self.current_items.insert(index, item);
        Ok(())
    }

    /// Remove by identity; returns whether the item was present
    pub fn remove(&mut self, item: &ObjectId) -> bool {
        match self.index_of(item) {
            Some(index) => {
                self.current_items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Swap the item at `index`, returning the previous one
    pub fn replace(&mut self, index: usize, item: ObjectId) -> RelationResult<ObjectId> {
        let len = self.current_items.len();
        let slot = self
            .current_items
            .get_mut(index)
            .ok_or_else(|| index_out_of_range(index, len))?;
        Ok(std::mem::replace(slot, item))
    }

    /// Install a new collection object and its items
    pub fn set_collection(&mut self, collection_id: CollectionId, items: Vec<ObjectId>) {
        self.current_collection_id = collection_id;
        self.current_items = items;
    }

    pub fn sort<F>(&mut self, compare: F)
    where
        F: FnMut(&ObjectId, &ObjectId) -> Ordering,
    {
        self.current_items.sort_by(compare);
    }
}

fn index_out_of_range(index: usize, len: usize) -> RelationError {
    RelationError::invalid_argument(
        "index",
        format!("Index {} is out of range for a collection of {} item(s)", index, len),
    )
}

impl VirtualEndPointData for CollectionData {
    fn current_items(&self) -> Vec<ObjectId> {
        self.current_items.clone()
    }

    fn original_items(&self) -> Vec<ObjectId> {
        self.original_items.clone()
    }

    fn contains_current(&self, item: &ObjectId) -> bool {
        self.current_items.contains(item)
    }

    fn has_changed(&self) -> bool {
        self.current_collection_id != self.original_collection_id
            || self
                .change_detection
                .has_data_changed(&self.current_items, &self.original_items)
    }

    fn commit(&mut self) {
        self.original_items = self.current_items.clone();
        self.original_collection_id = self.current_collection_id;
    }

    fn rollback(&mut self) {
        self.current_items = self.original_items.clone();
        self.current_collection_id = self.original_collection_id;
    }

    fn register_original_item(&mut self, item: ObjectId) -> RelationResult<()> {
        if !self.original_items.contains(&item) {
            self.original_items.push(item.clone());
        }
        if !self.current_items.contains(&item) {
            self.current_items.push(item);
        }
        Ok(())
    }

    fn unregister_original_item(&mut self, item: &ObjectId) {
        self.original_items.retain(|original| original != item);
        self.current_items.retain(|current| current != item);
    }

    fn set_data_from_sub_transaction(&mut self, source: &Self) {
        self.current_items = source.current_items.clone();
        self.current_collection_id = source.current_collection_id;
    }

    fn clear(&mut self) {
        self.current_items.clear();
    }
}

/// Virtual end-point holding an ordered, duplicate-free set of objects
pub type CollectionEndPoint = VirtualEndPoint<CollectionData>;

/// The collection object handed out to callers
///
/// A collection obtained from a relation is associated with its end-point.
/// Replacing it wholesale detaches it: it keeps its items as a freestanding
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainObjectCollection {
    id: CollectionId,
    items: Vec<ObjectId>,
    associated_end_point: Option<RelationEndPointId>,
    is_read_only: bool,
}

impl DomainObjectCollection {
    /// A fresh, detached collection
    pub fn new(items: impl IntoIterator<Item = ObjectId>) -> Self {
        Self::detached(CollectionId::generate(), items.into_iter().collect())
    }

    pub(crate) fn detached(id: CollectionId, items: Vec<ObjectId>) -> Self {
        Self {
            id,
            items,
            associated_end_point: None,
            is_read_only: false,
        }
    }

    pub(crate) fn associated(
        id: CollectionId,
        items: Vec<ObjectId>,
        end_point_id: RelationEndPointId,
    ) -> Self {
        Self {
            id,
            items,
            associated_end_point: Some(end_point_id),
            is_read_only: false,
        }
    }

    pub(crate) fn read_only(
        id: CollectionId,
        items: Vec<ObjectId>,
        end_point_id: RelationEndPointId,
    ) -> Self {
        Self {
            id,
            items,
            associated_end_point: Some(end_point_id),
            is_read_only: true,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn items(&self) -> &[ObjectId] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &ObjectId) -> bool {
        self.items.contains(item)
    }

    pub fn associated_end_point(&self) -> Option<&RelationEndPointId> {
        self.associated_end_point.as_ref()
    }

    pub fn is_detached(&self) -> bool {
        self.associated_end_point.is_none()
    }

    pub fn is_read_only(&self) -> bool {
        self.is_read_only
    }
}
