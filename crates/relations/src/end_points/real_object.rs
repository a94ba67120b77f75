use std::rc::Rc;

use crate::data_container::SharedDataContainer;
use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;

use super::id::RelationEndPointId;
use super::sync_state::SyncState;
use super::EndPoint;

/// The stored side of a relation
///
/// Reads and writes go straight through to the owner's data container, so the
/// data is always complete. The sync state tracks whether the opposite virtual
/// end-point agrees with the stored reference.
#[derive(Debug, Clone)]
pub struct RealObjectEndPoint {
    id: RelationEndPointId,
    property_name: String,
    container: SharedDataContainer,
    sync_state: SyncState,
}

impl RealObjectEndPoint {
    pub fn new(id: RelationEndPointId, container: SharedDataContainer) -> RelationResult<Self> {
        if id.is_virtual() || id.is_collection() {
            return Err(RelationError::invalid_argument(
                "end_point_id",
                format!("End-point '{}' is not a real single-valued end-point", id),
            ));
        }

        let property_name = id
            .property_name()
            .ok_or_else(|| {
                RelationError::invalid_argument(
                    "end_point_id",
                    format!("Real end-point '{}' must have a property", id),
                )
            })?
            .to_string();

        if Some(container.borrow().id()) != id.object_id() {
            return Err(RelationError::invalid_argument(
                "container",
                format!("Data container does not belong to end-point '{}'", id),
            ));
        }

        Ok(Self {
            id,
            property_name,
            container,
            sync_state: SyncState::Unknown,
        })
    }

    pub fn opposite_object_id(&self) -> Option<ObjectId> {
        self.container.borrow().get_reference_value(&self.property_name)
    }

    pub fn original_opposite_object_id(&self) -> Option<ObjectId> {
        self.container
            .borrow()
            .get_original_reference_value(&self.property_name)
    }

    pub(crate) fn set_opposite_object_id(&mut self, value: Option<ObjectId>) {
        self.container
            .borrow_mut()
            .set_reference_value(&self.property_name, value);
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub(crate) fn set_sync_state(&mut self, sync_state: SyncState) {
        self.sync_state = sync_state;
    }

    pub fn container(&self) -> SharedDataContainer {
        Rc::clone(&self.container)
    }
}

impl EndPoint for RealObjectEndPoint {
    fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    fn is_data_complete(&self) -> bool {
        true
    }

    fn has_changed(&self) -> bool {
        self.container.borrow().has_value_changed(&self.property_name)
    }

    fn has_been_touched(&self) -> bool {
        self.container.borrow().is_touched(&self.property_name)
    }

    fn touch(&mut self) {
        self.container.borrow_mut().touch(&self.property_name);
    }

    fn commit(&mut self) {
        self.container.borrow_mut().commit_value(&self.property_name);
    }

    fn rollback(&mut self) {
        self.container.borrow_mut().rollback_value(&self.property_name);
    }

    fn is_synchronized(&self) -> Option<bool> {
        self.sync_state.is_synchronized()
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
    use crate::data_container::DataContainer;
    use crate::loader::LoadedObject;
    use crate::mapping::{MappingConfiguration, RelationDefinition};
    use std::cell::RefCell;

    fn mapping() -> MappingConfiguration {
        MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap()
    }

    #[test]
    fn test_reads_and_writes_through_container() {
        let mapping = mapping();
        let order = ObjectId::generate("Order");
        let customer = ObjectId::generate("Customer");
        let container = Rc::new(RefCell::new(DataContainer::from_loaded(
            LoadedObject::new(order.clone()).with_reference("Customer", Some(customer.clone())),
        )));

        let id = RelationEndPointId::for_property(&mapping, &order, "Customer").unwrap();
        let mut end_point = RealObjectEndPoint::new(id, Rc::clone(&container)).unwrap();

        assert_eq!(end_point.opposite_object_id(), Some(customer.clone()));
        assert!(end_point.is_data_complete());
        assert_eq!(end_point.is_synchronized(), None);

        end_point.set_opposite_object_id(None);
        end_point.touch();
        assert!(end_point.has_changed());
        assert!(container.borrow().is_touched("Customer"));
        assert_eq!(end_point.original_opposite_object_id(), Some(customer.clone()));

        end_point.rollback();
        assert_eq!(end_point.opposite_object_id(), Some(customer));
        assert!(!end_point.has_been_touched());
    }

    #[test]
    fn test_rejects_virtual_and_foreign_ids() {
        let mapping = mapping();
        let order = ObjectId::generate("Order");
        let customer = ObjectId::generate("Customer");
        let container = Rc::new(RefCell::new(DataContainer::new_object(
            order.clone(),
            ["Customer"],
        )));

        let virtual_id = RelationEndPointId::for_property(&mapping, &customer, "Orders").unwrap();
        assert!(RealObjectEndPoint::new(virtual_id, Rc::clone(&container)).is_err());

        let other = RelationEndPointId::for_property(&mapping, &ObjectId::generate("Order"), "Customer")
            .unwrap();
        assert!(RealObjectEndPoint::new(other, container).is_err());
    }
}
