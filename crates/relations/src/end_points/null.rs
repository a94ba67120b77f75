use std::sync::Arc;

use crate::commands::RelationModification;
use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::mapping::EndPointDefinition;

use super::id::RelationEndPointId;
use super::EndPoint;

/// The opposite end-point of a relation that currently points to nothing
///
/// Immutable and always synchronized. Modifications that merely detach
/// something are no-ops; modifications that need a real target fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullEndPoint {
    id: RelationEndPointId,
}

impl NullEndPoint {
    pub fn new(definition: Arc<EndPointDefinition>) -> Self {
        Self {
            id: RelationEndPointId::null(definition),
        }
    }

    pub fn opposite_object_id(&self) -> Option<ObjectId> {
        None
    }

    pub fn current_items(&self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Setting a null end-point to nothing does nothing
    pub fn create_set_modification(
        &self,
        new_related_object: Option<&ObjectId>,
    ) -> RelationResult<Option<RelationModification>> {
        match new_related_object {
            None => Ok(None),
            Some(object_id) => Err(self.mutation_error(object_id)),
        }
    }

    /// Removing from a null end-point does nothing
    pub fn create_remove_modification(&self, _item: &ObjectId) -> Option<RelationModification> {
        None
    }

    fn mutation_error(&self, object_id: &ObjectId) -> RelationError {
        RelationError::invalid_operation(format!(
            "Cannot relate '{}' through the null end-point '{}'",
            object_id, self.id
        ))
    }
}

impl EndPoint for NullEndPoint {
    fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    fn is_null(&self) -> bool {
        true
    }

    fn is_data_complete(&self) -> bool {
        true
    }

    fn has_changed(&self) -> bool {
        false
    }

    fn has_been_touched(&self) -> bool {
        false
    }

    fn touch(&mut self) {}

    fn commit(&mut self) {}

    fn rollback(&mut self) {}

    fn is_synchronized(&self) -> Option<bool> {
        Some(true)
    }

    fn can_be_collected(&self) -> bool {
        false
    }

    fn can_be_marked_incomplete(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingConfiguration, RelationDefinition, RelationSchema};

    #[test]
    fn test_null_end_point_behaviour() {
        let mapping = MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();
        let mut end_point =
            NullEndPoint::new(mapping.end_point_definition("Customer", "Orders").unwrap());
        let order = ObjectId::generate("Order");

        assert!(end_point.is_null());
        assert!(end_point.id().is_null());
        assert_eq!(end_point.is_synchronized(), Some(true));

        end_point.touch();
        assert!(!end_point.has_been_touched());

        assert!(end_point.create_remove_modification(&order).is_none());
        assert!(end_point.create_set_modification(None).unwrap().is_none());
        assert!(end_point.create_set_modification(Some(&order)).is_err());
    }
}
