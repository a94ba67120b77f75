//! Atomic relation modifications
//!
//! A modification changes exactly one end-point. User-facing operations are
//! expanded into an ordered list of modifications covering both sides of
//! every affected relation.

use crate::end_points::{
    CollectionData, EndPoint, RelationEndPoint, RelationEndPointId, RelationEndPointMap,
};
use crate::error::{RelationError, RelationResult};
use crate::events::{CollectionChange, CollectionOperation, Notification, RelationChange};
use crate::identity::{CollectionId, ObjectId};

#[derive(Debug, Clone, PartialEq)]
pub enum RelationModification {
    /// Set a single-valued end-point
    ObjectSet {
        end_point_id: RelationEndPointId,
        old_related_object: Option<ObjectId>,
        new_related_object: Option<ObjectId>,
    },
    CollectionInsert {
        end_point_id: RelationEndPointId,
        index: usize,
        item: ObjectId,
    },
    CollectionRemove {
        end_point_id: RelationEndPointId,
        item: ObjectId,
    },
    CollectionReplace {
        end_point_id: RelationEndPointId,
        index: usize,
        old_item: ObjectId,
        new_item: ObjectId,
    },
    /// Replace the collection object of a collection end-point wholesale
    SetCollection {
        end_point_id: RelationEndPointId,
        old_items: Vec<ObjectId>,
        new_items: Vec<ObjectId>,
        new_collection_id: CollectionId,
    },
    /// Mark the end-point touched without changing it
    Touch { end_point_id: RelationEndPointId },
    /// Drop all references of an end-point whose owner is being deleted
    Delete { end_point_id: RelationEndPointId },
}

impl RelationModification {
    pub fn end_point_id(&self) -> &RelationEndPointId {
        match self {
            RelationModification::ObjectSet { end_point_id, .. }
            | RelationModification::CollectionInsert { end_point_id, .. }
            | RelationModification::CollectionRemove { end_point_id, .. }
            | RelationModification::CollectionReplace { end_point_id, .. }
            | RelationModification::SetCollection { end_point_id, .. }
            | RelationModification::Touch { end_point_id }
            | RelationModification::Delete { end_point_id } => end_point_id,
        }
    }

    /// "Changing" notifications in raise order; "changed" ones are the mirror
    pub fn notifications(&self) -> Vec<Notification> {
        match self {
            RelationModification::ObjectSet {
                end_point_id,
                old_related_object,
                new_related_object,
            } => vec![relation(
                end_point_id,
                old_related_object.clone(),
                new_related_object.clone(),
            )],
            RelationModification::CollectionInsert {
                end_point_id,
                index,
                item,
            } => vec![
                relation(end_point_id, None, Some(item.clone())),
                collection(end_point_id, CollectionOperation::Add, item, Some(*index)),
            ],
            RelationModification::CollectionRemove { end_point_id, item } => vec![
                relation(end_point_id, Some(item.clone()), None),
                collection(end_point_id, CollectionOperation::Remove, item, None),
            ],
            RelationModification::CollectionReplace {
                end_point_id,
                index,
                old_item,
                new_item,
            } => vec![
                relation(end_point_id, Some(old_item.clone()), Some(new_item.clone())),
                collection(end_point_id, CollectionOperation::Remove, old_item, Some(*index)),
                collection(end_point_id, CollectionOperation::Add, new_item, Some(*index)),
            ],
            RelationModification::SetCollection {
                end_point_id,
                old_items,
                new_items,
                ..
            } => {
                let mut notifications = vec![relation(end_point_id, None, None)];
                notifications.extend(
                    old_items
                        .iter()
                        .filter(|item| !new_items.contains(item))
                        .map(|item| collection(end_point_id, CollectionOperation::Remove, item, None)),
                );
                notifications.extend(
                    new_items
                        .iter()
                        .filter(|item| !old_items.contains(item))
                        .map(|item| collection(end_point_id, CollectionOperation::Add, item, None)),
                );
                notifications
            }
            RelationModification::Touch { .. } | RelationModification::Delete { .. } => Vec::new(),
        }
    }

    /// Apply the modification and touch the end-point
    pub fn perform(&self, end_points: &mut RelationEndPointMap) -> RelationResult<()> {
        let end_point = end_points.registered_mut(self.end_point_id())?;

        match self {
            RelationModification::ObjectSet {
                new_related_object, ..
            } => match end_point {
                RelationEndPoint::RealObject(real) => {
                    real.set_opposite_object_id(new_related_object.clone())
                }
                RelationEndPoint::VirtualObject(virtual_object) => virtual_object
                    .data_mut()?
                    .set_current(new_related_object.clone()),
                RelationEndPoint::Collection(_) => {
                    return Err(wrong_kind(self.end_point_id(), "a single-valued"))
                }
            },
            RelationModification::CollectionInsert { index, item, .. } => {
                collection_data(end_point)?.insert(*index, item.clone())?;
            }
            RelationModification::CollectionRemove { item, .. } => {
                collection_data(end_point)?.remove(item);
            }
            RelationModification::CollectionReplace { index, new_item, .. } => {
                collection_data(end_point)?.replace(*index, new_item.clone())?;
            }
            RelationModification::SetCollection {
                new_items,
                new_collection_id,
                ..
            } => {
                collection_data(end_point)?.set_collection(*new_collection_id, new_items.clone());
            }
            RelationModification::Touch { .. } => {}
            RelationModification::Delete { .. } => end_point.clear()?,
        }

        end_point.touch();
        Ok(())
    }
}

fn relation(
    end_point_id: &RelationEndPointId,
    old_related_object: Option<ObjectId>,
    new_related_object: Option<ObjectId>,
) -> Notification {
    Notification::Relation(RelationChange {
        end_point_id: end_point_id.clone(),
        old_related_object,
        new_related_object,
    })
}

fn collection(
    end_point_id: &RelationEndPointId,
    operation: CollectionOperation,
    item: &ObjectId,
    index: Option<usize>,
) -> Notification {
    Notification::Collection(CollectionChange {
        end_point_id: end_point_id.clone(),
        operation,
        item: item.clone(),
        index,
    })
}

fn collection_data(
    end_point: &mut RelationEndPoint,
) -> RelationResult<&mut CollectionData> {
    match end_point {
        RelationEndPoint::Collection(collection) => collection.data_mut(),
        other => Err(wrong_kind(other.id(), "a collection")),
    }
}

fn wrong_kind(id: &RelationEndPointId, expected: &str) -> RelationError {
    RelationError::invalid_operation(format!("End-point '{}' is not {} end-point", id, expected))
}
