use std::collections::BTreeSet;

use crate::data_container::{DataContainerMap, SharedDataContainer};
use crate::end_points::{ChangeDetectionStrategy, RelationEndPointMap};
use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;

/// One level of the transaction hierarchy
///
/// Level 0 is the root, which talks to the object store. Every other level
/// is a sub-transaction that pulls its data from the level above.
#[derive(Debug)]
pub(crate) struct TransactionScope {
    pub(crate) depth: usize,
    pub(crate) data_containers: DataContainerMap,
    pub(crate) end_points: RelationEndPointMap,
    pub(crate) invalid_objects: BTreeSet<ObjectId>,
}

impl TransactionScope {
    pub(crate) fn root(reclaim_collectible_end_points: bool) -> Self {
        Self::new(
            0,
            ChangeDetectionStrategy::SetEquality,
            reclaim_collectible_end_points,
            BTreeSet::new(),
        )
    }

    /// A sub-transaction scope; it inherits the invalid objects of its parent
    pub(crate) fn sub_transaction(
        parent: &TransactionScope,
        reclaim_collectible_end_points: bool,
    ) -> Self {
        Self::new(
            parent.depth + 1,
            ChangeDetectionStrategy::SequenceEquality,
            reclaim_collectible_end_points,
            parent.invalid_objects.clone(),
        )
    }

    fn new(
        depth: usize,
        change_detection: ChangeDetectionStrategy,
        reclaim_collectible_end_points: bool,
        invalid_objects: BTreeSet<ObjectId>,
    ) -> Self {
        Self {
            depth,
            data_containers: DataContainerMap::new(),
            end_points: RelationEndPointMap::new(change_detection, reclaim_collectible_end_points),
            invalid_objects,
        }
    }

    pub(crate) fn is_invalid(&self, id: &ObjectId) -> bool {
        self.invalid_objects.contains(id)
    }

    pub(crate) fn check_not_invalid(&self, id: &ObjectId) -> RelationResult<()> {
        if self.is_invalid(id) {
            return Err(RelationError::ObjectInvalid(id.clone()));
        }
        Ok(())
    }

    pub(crate) fn container(&self, id: &ObjectId) -> RelationResult<SharedDataContainer> {
        self.data_containers.get(id).ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "Object '{}' has not been loaded into transaction level {}",
                id, self.depth
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_transaction_scope_inherits_invalid_objects() {
        let invalid = ObjectId::generate("Order");
        let mut root = TransactionScope::root(true);
        root.invalid_objects.insert(invalid.clone());

        let child = TransactionScope::sub_transaction(&root, true);
        assert_eq!(child.depth, 1);
        assert!(child.is_invalid(&invalid));
        assert_eq!(
            child.end_points.change_detection(),
            ChangeDetectionStrategy::SequenceEquality
        );
        assert_eq!(
            root.end_points.change_detection(),
            ChangeDetectionStrategy::SetEquality
        );
    }

    #[test]
    fn test_unknown_container_is_an_error() {
        let root = TransactionScope::root(true);
        let id = ObjectId::generate("Order");

        assert!(matches!(root.container(&id), Err(RelationError::InvalidOperation(_))));
        assert!(root.check_not_invalid(&id).is_ok());
    }
}
