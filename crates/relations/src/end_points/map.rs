//! End-point registry - owns every live end-point of one transaction scope

use std::collections::HashMap;
use std::sync::Arc;

use crate::commands::DataManagementCommand;
use crate::error::{RelationError, RelationResult};
use crate::identity::{CollectionId, ObjectId};
use crate::mapping::RelationSchema;

use super::collection::{ChangeDetectionStrategy, CollectionData, CollectionEndPoint};
use super::id::RelationEndPointId;
use super::real_object::RealObjectEndPoint;
use super::sync_state::{SyncState, SyncUpdate};
use super::virtual_object::{ObjectData, VirtualObjectEndPoint};
use super::{EndPoint, RelationEndPoint};

/// Callback invoked for each end-point added to or removed from a map
pub type EndPointCallback<'a> = dyn FnMut(&RelationEndPointId) + 'a;

#[derive(Debug)]
pub struct RelationEndPointMap {
    end_points: HashMap<RelationEndPointId, RelationEndPoint>,
    change_detection: ChangeDetectionStrategy,
    reclaim_collectible_end_points: bool,
}

impl RelationEndPointMap {
    pub fn new(change_detection: ChangeDetectionStrategy, reclaim_collectible_end_points: bool) -> Self {
        Self {
            end_points: HashMap::new(),
            change_detection,
            reclaim_collectible_end_points,
        }
    }

    pub fn change_detection(&self) -> ChangeDetectionStrategy {
        self.change_detection
    }

    pub fn len(&self) -> usize {
        self.end_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_points.is_empty()
    }

    pub fn contains(&self, id: &RelationEndPointId) -> bool {
        self.end_points.contains_key(id)
    }

    /// Lookup without loading
    pub fn get(&self, id: &RelationEndPointId) -> Option<&RelationEndPoint> {
        self.end_points.get(id)
    }

    pub fn get_mut(&mut self, id: &RelationEndPointId) -> Option<&mut RelationEndPoint> {
        self.end_points.get_mut(id)
    }

    /// Lookup that fails for unregistered end-points
    pub fn registered(&self, id: &RelationEndPointId) -> RelationResult<&RelationEndPoint> {
        self.end_points.get(id).ok_or_else(|| not_registered(id))
    }

    pub fn registered_mut(&mut self, id: &RelationEndPointId) -> RelationResult<&mut RelationEndPoint> {
        self.end_points.get_mut(id).ok_or_else(|| not_registered(id))
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<RelationEndPointId> {
        let mut ids: Vec<_> = self.end_points.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn end_point_ids_for_object(&self, object_id: &ObjectId) -> Vec<RelationEndPointId> {
        let mut ids: Vec<_> = self
            .end_points
            .keys()
            .filter(|id| id.object_id() == Some(object_id))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn add_end_point(&mut self, end_point: RelationEndPoint) -> RelationResult<()> {
        let id = end_point.id().clone();
        if self.end_points.contains_key(&id) {
            return Err(RelationError::invalid_operation(format!(
                "A relation end-point with id '{}' has already been registered",
                id
            )));
        }
        tracing::trace!("Registering relation end-point '{}'", id);
        self.end_points.insert(id, end_point);
        Ok(())
    }

    pub fn remove_end_point(&mut self, id: &RelationEndPointId) -> RelationResult<RelationEndPoint> {
        tracing::trace!("Removing relation end-point '{}'", id);
        self.end_points.remove(id).ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "End-point '{}' is not part of this map",
                id
            ))
        })
    }

    /// Put back a copy of an end-point taken before a failed command
    pub(crate) fn restore_end_point(&mut self, end_point: RelationEndPoint) {
        self.end_points.insert(end_point.id().clone(), end_point);
    }

    /// Return the virtual end-point, creating an incomplete one if needed
    pub fn get_or_create_virtual_end_point(
        &mut self,
        id: &RelationEndPointId,
        schema: &dyn RelationSchema,
        on_registering: &mut EndPointCallback<'_>,
    ) -> RelationResult<&mut RelationEndPoint> {
        if !self.end_points.contains_key(id) {
            if !id.is_virtual() || id.is_null() {
                return Err(RelationError::invalid_argument(
                    "end_point_id",
                    format!("End-point '{}' is not a virtual end-point of an object", id),
                ));
            }
            id.check_not_anonymous()?;

            let opposite_definition = schema
                .opposite_end_point_definition(id.definition())
                .ok_or_else(|| {
                    RelationError::invalid_argument(
                        "end_point_id",
                        format!("End-point '{}' has no opposite definition", id),
                    )
                })?;

            let end_point = if id.is_collection() {
                RelationEndPoint::Collection(CollectionEndPoint::new(id.clone(), opposite_definition))
            } else {
                RelationEndPoint::VirtualObject(VirtualObjectEndPoint::new(
                    id.clone(),
                    opposite_definition,
                ))
            };
            self.add_end_point(end_point)?;
            on_registering(id);
        }
        self.registered_mut(id)
    }

    /// Add a real end-point and register it with the opposite virtual end-point
    /// its original reference points to
    pub fn register_real_object_end_point(
        &mut self,
        end_point: RealObjectEndPoint,
        schema: &dyn RelationSchema,
        on_registering: &mut EndPointCallback<'_>,
    ) -> RelationResult<()> {
        let id = end_point.id().clone();
        let original = end_point.original_opposite_object_id();
        self.add_end_point(RelationEndPoint::RealObject(end_point))?;
        on_registering(&id);

        let update = match original {
            Some(opposite_object) => {
                let opposite = id.opposite(schema, Some(opposite_object))?;
                if opposite.is_anonymous() {
                    (id, SyncState::Synchronized)
                } else {
                    self.get_or_create_virtual_end_point(&opposite, schema, on_registering)?
                        .register_original_opposite_end_point(&id)?
                }
            }
            None => (id, SyncState::Synchronized),
        };
        self.apply_sync_updates(vec![update]);
        Ok(())
    }

    /// Remove a real end-point, withdrawing its registration from the opposite side
    pub fn unregister_real_object_end_point(
        &mut self,
        id: &RelationEndPointId,
        schema: &dyn RelationSchema,
        on_unregistering: &mut EndPointCallback<'_>,
    ) -> RelationResult<()> {
        let original = self
            .registered(id)?
            .as_real_object()
            .ok_or_else(|| {
                RelationError::invalid_argument(
                    "end_point_id",
                    format!("End-point '{}' is not a real end-point", id),
                )
            })?
            .original_opposite_object_id();

        if let Some(opposite_object) = original {
            let opposite = id.opposite(schema, Some(opposite_object))?;
            if !opposite.is_anonymous() {
                if let Some(end_point) = self.end_points.get_mut(&opposite) {
                    if !end_point.is_data_complete() {
                        end_point.unregister_original_opposite_end_point(id)?;
                    } else if end_point.is_opposite_unsynchronized(id) == Some(true) {
                        end_point.unregister_original_opposite_end_point(id)?;
                    }
                }
                self.remove_if_collectible(&opposite, on_unregistering);
            }
        }

        on_unregistering(id);
        self.remove_end_point(id)?;
        Ok(())
    }

    /// Install loaded items into an incomplete virtual end-point
    pub fn mark_data_complete(
        &mut self,
        id: &RelationEndPointId,
        items: Vec<ObjectId>,
        collection_id: Option<CollectionId>,
    ) -> RelationResult<()> {
        let change_detection = self.change_detection;
        let updates = match self.registered_mut(id)? {
            RelationEndPoint::VirtualObject(end_point) => {
                if items.len() > 1 {
                    return Err(RelationError::invalid_operation(format!(
                        "End-point '{}' can hold only one object, but {} were loaded",
                        id,
                        items.len()
                    )));
                }
                end_point.mark_data_complete(ObjectData::new(items.into_iter().next()))?
            }
            RelationEndPoint::Collection(end_point) => end_point.mark_data_complete(CollectionData::new(
                items,
                collection_id.unwrap_or_else(CollectionId::generate),
                change_detection,
            ))?,
            RelationEndPoint::RealObject(_) => {
                return Err(RelationError::invalid_argument(
                    "end_point_id",
                    format!("Real end-point '{}' cannot be marked complete", id),
                ))
            }
        };
        self.apply_sync_updates(updates);
        Ok(())
    }

    pub fn mark_data_incomplete(&mut self, id: &RelationEndPointId) -> RelationResult<()> {
        let updates = self.registered_mut(id)?.mark_data_incomplete()?;
        self.apply_sync_updates(updates);
        Ok(())
    }

    pub fn apply_sync_updates(&mut self, updates: Vec<SyncUpdate>) {
        for (id, sync_state) in updates {
            if let Some(end_point) = self.end_points.get_mut(&id).and_then(RelationEndPoint::as_real_object_mut) {
                end_point.set_sync_state(sync_state);
            }
        }
    }

    /// Sync state of an end-point, checking a loaded opposite side for unknown ones
    pub fn is_synchronized(
        &self,
        id: &RelationEndPointId,
        schema: &dyn RelationSchema,
    ) -> RelationResult<Option<bool>> {
        let end_point = self.registered(id)?;
        let real = match end_point.as_real_object() {
            Some(real) if real.sync_state() == SyncState::Unknown => real,
            _ => return Ok(end_point.is_synchronized()),
        };

        if let Some(opposite_object) = real.original_opposite_object_id() {
            let opposite = id.opposite(schema, Some(opposite_object))?;
            if let Some(unsynchronized) = self
                .end_points
                .get(&opposite)
                .and_then(|opposite_end_point| opposite_end_point.is_opposite_unsynchronized(id))
            {
                return Ok(Some(!unsynchronized));
            }
        }
        Ok(None)
    }

    /// Register an unsynchronized real end-point's owner with the opposite side
    pub fn synchronize_real_object_end_point(
        &mut self,
        id: &RelationEndPointId,
        schema: &dyn RelationSchema,
    ) -> RelationResult<()> {
        let real = self.registered(id)?.as_real_object().ok_or_else(|| {
            RelationError::invalid_argument(
                "end_point_id",
                format!("End-point '{}' is not a real end-point", id),
            )
        })?;
        if real.sync_state() != SyncState::Unsynchronized {
            return Ok(());
        }

        let opposite = id.opposite(schema, real.original_opposite_object_id())?;
        let update = self
            .registered_mut(&opposite)?
            .synchronize_opposite_end_point(id)?;
        self.apply_sync_updates(vec![update]);
        Ok(())
    }

    /// Drop loaded items of a virtual end-point that have no real end-point
    pub fn synchronize_virtual_end_point(&mut self, id: &RelationEndPointId) -> RelationResult<()> {
        match self.registered_mut(id)? {
            RelationEndPoint::VirtualObject(end_point) => end_point.synchronize(),
            RelationEndPoint::Collection(end_point) => end_point.synchronize(),
            RelationEndPoint::RealObject(_) => {
                return Err(RelationError::invalid_argument(
                    "end_point_id",
                    format!("End-point '{}' is not a virtual end-point", id),
                ))
            }
        }
        Ok(())
    }

    pub fn commit_all_end_points(&mut self) {
        for end_point in self.end_points.values_mut() {
            end_point.commit();
        }
    }

    pub fn rollback_all_end_points(&mut self) {
        for end_point in self.end_points.values_mut() {
            end_point.rollback();
        }
    }

    /// Drop every end-point, announcing each one before removal
    pub fn reset(&mut self, on_unregistering: &mut EndPointCallback<'_>) {
        for id in self.ids() {
            on_unregistering(&id);
        }
        self.end_points.clear();
    }

    /// Remove an end-point if nothing depends on it any more
    pub fn remove_if_collectible(
        &mut self,
        id: &RelationEndPointId,
        on_unregistering: &mut EndPointCallback<'_>,
    ) -> bool {
        let collectible = self.reclaim_collectible_end_points
            && self
                .end_points
                .get(id)
                .map_or(false, |end_point| end_point.can_be_collected());

        if collectible {
            on_unregistering(id);
            self.end_points.remove(id);
        }
        collectible
    }

    /// Whether an end-point can be dropped without leaving a dangling reference
    fn is_unregisterable(&self, end_point: &RelationEndPoint, schema: &dyn RelationSchema) -> bool {
        match end_point {
            RelationEndPoint::RealObject(real) => {
                let current = real.opposite_object_id();
                let original = real.original_opposite_object_id();
                if current.is_none() && original.is_none() {
                    return true;
                }
                if real.has_changed() {
                    return false;
                }
                match real.id().opposite(schema, current) {
                    Ok(opposite) if opposite.is_anonymous() => true,
                    Ok(opposite) => self
                        .end_points
                        .get(&opposite)
                        .map_or(true, |opposite_end_point| !opposite_end_point.is_data_complete()),
                    Err(_) => false,
                }
            }
            RelationEndPoint::VirtualObject(virtual_end_point) => {
                !virtual_end_point.is_data_complete() || virtual_end_point.is_empty()
            }
            RelationEndPoint::Collection(collection) => {
                !collection.is_data_complete() || collection.is_empty()
            }
        }
    }

    /// Command removing the end-points of an object whose data container is
    /// about to be unregistered
    ///
    /// Every end-point that would leave a dangling reference is reported in a
    /// single error.
    pub fn create_unregister_command_for_data_container(
        &self,
        object_id: &ObjectId,
        schema: &dyn RelationSchema,
    ) -> DataManagementCommand {
        let mut end_point_ids = Vec::new();
        let mut not_unregisterable = Vec::new();

        for definition in schema.end_point_definitions(object_id.class_id()) {
            let id = match RelationEndPointId::new(Some(object_id.clone()), Arc::clone(&definition)) {
                Ok(id) => id,
                Err(error) => return DataManagementCommand::Exception(error),
            };
            if let Some(end_point) = self.end_points.get(&id) {
                if !self.is_unregisterable(end_point, schema) {
                    not_unregisterable.push(id.clone());
                }
                end_point_ids.push(id);
            }
        }

        if !not_unregisterable.is_empty() {
            tracing::warn!(
                "Cannot unregister {} relation end-point(s) of object '{}'",
                not_unregisterable.len(),
                object_id
            );
            return DataManagementCommand::Exception(RelationError::UnregisterFailed {
                end_point_ids: not_unregisterable,
            });
        }

        if end_point_ids.is_empty() {
            DataManagementCommand::Nop
        } else {
            DataManagementCommand::Unregister { end_point_ids }
        }
    }

    /// Command returning unchanged virtual end-points to the incomplete state
    pub fn create_unload_virtual_end_points_command(
        &self,
        ids: &[RelationEndPointId],
    ) -> DataManagementCommand {
        let mut to_unload = Vec::new();
        let mut messages = Vec::new();

        for id in ids {
            if !id.is_virtual() {
                messages.push(format!("The end-point '{}' is not a virtual end-point.", id));
                continue;
            }
            match self.end_points.get(id) {
                Some(end_point) if end_point.is_data_complete() => {
                    if end_point.can_be_marked_incomplete() {
                        to_unload.push(id.clone());
                    } else {
                        messages.push(format!("The end-point '{}' has been changed.", id));
                    }
                }
                _ => {}
            }
        }

        if !messages.is_empty() {
            tracing::warn!("Cannot unload {} virtual end-point(s)", messages.len());
            return DataManagementCommand::Exception(RelationError::UnloadFailed { messages });
        }

        if to_unload.is_empty() {
            DataManagementCommand::Nop
        } else {
            DataManagementCommand::UnloadVirtualEndPoints {
                end_point_ids: to_unload,
            }
        }
    }
}

fn not_registered(id: &RelationEndPointId) -> RelationError {
    RelationError::invalid_operation(format!("End-point '{}' has not been registered", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::DataContainer;
    use crate::loader::LoadedObject;
    use crate::mapping::{MappingConfiguration, RelationDefinition};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn mapping() -> MappingConfiguration {
        MappingConfiguration::from_relations([
            RelationDefinition::one_to_many("Customer", "Orders", "Order", "Customer"),
            RelationDefinition::unidirectional("Order", "Official", "Official"),
        ])
        .unwrap()
    }

    fn new_map() -> RelationEndPointMap {
        RelationEndPointMap::new(ChangeDetectionStrategy::SetEquality, true)
    }

    fn register_order(
        map: &mut RelationEndPointMap,
        mapping: &MappingConfiguration,
        order: &ObjectId,
        customer: Option<ObjectId>,
    ) -> RelationEndPointId {
        let container = Rc::new(RefCell::new(DataContainer::from_loaded(
            LoadedObject::new(order.clone()).with_reference("Customer", customer),
        )));
        let id = RelationEndPointId::for_property(mapping, order, "Customer").unwrap();
        let end_point = RealObjectEndPoint::new(id.clone(), container).unwrap();
        map.register_real_object_end_point(end_point, mapping, &mut |_| {})
            .unwrap();
        id
    }

    #[test]
    fn test_add_and_remove() {
        let mapping = mapping();
        let mut map = new_map();
        let id = RelationEndPointId::for_property(&mapping, &ObjectId::generate("Customer"), "Orders")
            .unwrap();

        let end_point = RelationEndPoint::Collection(CollectionEndPoint::new(
            id.clone(),
            mapping.end_point_definition("Order", "Customer").unwrap(),
        ));
        map.add_end_point(end_point.clone()).unwrap();

        let error = map.add_end_point(end_point).unwrap_err();
        assert!(error.to_string().contains("already been registered"));

        map.remove_end_point(&id).unwrap();
        assert!(map.remove_end_point(&id).is_err());
    }

    #[test]
    fn test_real_end_point_registers_with_incomplete_opposite() {
        let mapping = mapping();
        let mut map = new_map();
        let customer = ObjectId::generate("Customer");
        let order = ObjectId::generate("Order");

        let real_id = register_order(&mut map, &mapping, &order, Some(customer.clone()));
        let orders_id = RelationEndPointId::for_property(&mapping, &customer, "Orders").unwrap();

        let orders = map.get(&orders_id).unwrap();
        assert!(!orders.is_data_complete());
        assert!(orders
            .as_collection()
            .unwrap()
            .load_state()
            .original_opposite_end_points()
            .unwrap()
            .contains(&real_id));
        assert_eq!(map.get(&real_id).unwrap().is_synchronized(), None);

        map.mark_data_complete(&orders_id, vec![order.clone()], None).unwrap();
        assert_eq!(map.get(&real_id).unwrap().is_synchronized(), Some(true));
        assert_eq!(map.get(&orders_id).unwrap().current_items(), vec![order]);
    }

    #[test]
    fn test_null_reference_is_synchronized() {
        let mapping = mapping();
        let mut map = new_map();
        let real_id = register_order(&mut map, &mapping, &ObjectId::generate("Order"), None);

        assert_eq!(map.get(&real_id).unwrap().is_synchronized(), Some(true));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_anonymous_opposite_is_never_materialized() {
        let mapping = mapping();
        let mut map = new_map();
        let official = ObjectId::generate("Official");
        let anonymous = RelationEndPointId::for_property(&mapping, &ObjectId::generate("Order"), "Official")
            .unwrap()
            .opposite(&mapping, Some(official))
            .unwrap();

        assert!(map
            .get_or_create_virtual_end_point(&anonymous, &mapping, &mut |_| {})
            .is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn test_unregister_reclaims_collectible_opposite() {
        let mapping = mapping();
        let mut map = new_map();
        let customer = ObjectId::generate("Customer");
        let real_id = register_order(&mut map, &mapping, &ObjectId::generate("Order"), Some(customer.clone()));
        let orders_id = RelationEndPointId::for_property(&mapping, &customer, "Orders").unwrap();

        let mut unregistered = Vec::new();
        map.unregister_real_object_end_point(&real_id, &mapping, &mut |id| {
            unregistered.push(id.clone())
        })
        .unwrap();

        assert_eq!(unregistered, vec![orders_id, real_id]);
        assert!(map.is_empty());
    }

    #[test]
    fn test_unregister_command_reports_every_dangling_end_point() {
        let mapping = mapping();
        let mut map = new_map();
        let customer = ObjectId::generate("Customer");
        let official = ObjectId::generate("Official");
        let order = ObjectId::generate("Order");

        let container = Rc::new(RefCell::new(DataContainer::from_loaded(
            LoadedObject::new(order.clone())
                .with_reference("Customer", Some(customer.clone()))
                .with_reference("Official", Some(official)),
        )));
        for property in ["Customer", "Official"] {
            let id = RelationEndPointId::for_property(&mapping, &order, property).unwrap();
            map.register_real_object_end_point(
                RealObjectEndPoint::new(id, Rc::clone(&container)).unwrap(),
                &mapping,
                &mut |_| {},
            )
            .unwrap();
        }
        let orders_id = RelationEndPointId::for_property(&mapping, &customer, "Orders").unwrap();
        map.mark_data_complete(&orders_id, vec![order.clone()], None).unwrap();

        container.borrow_mut().set_reference_value("Official", None);

        let command = map.create_unregister_command_for_data_container(&order, &mapping);
        assert!(!command.can_execute());

        match command.errors().as_slice() {
            [RelationError::UnregisterFailed { end_point_ids }] => {
                assert_eq!(end_point_ids.len(), 2);
            }
            other => panic!("unexpected errors: {:?}", other),
        }
        let message = command.errors()[0].to_string();
        assert!(message.starts_with("Cannot unregister the following relation end-points:"));
        assert!(message.contains("Order.Customer"));
        assert!(message.contains("Order.Official"));
    }

    #[test]
    fn test_unload_command_rejects_changed_end_points() {
        let mapping = mapping();
        let mut map = new_map();
        let customer = ObjectId::generate("Customer");
        let orders_id = RelationEndPointId::for_property(&mapping, &customer, "Orders").unwrap();
        map.get_or_create_virtual_end_point(&orders_id, &mapping, &mut |_| {})
            .unwrap();
        map.mark_data_complete(&orders_id, vec![], None).unwrap();

        let command = map.create_unload_virtual_end_points_command(&[orders_id.clone()]);
        assert!(command.can_execute());

        map.get_mut(&orders_id)
            .and_then(RelationEndPoint::as_collection_mut)
            .unwrap()
            .data_mut()
            .unwrap()
            .insert(0, ObjectId::generate("Order"))
            .unwrap();

        let command = map.create_unload_virtual_end_points_command(&[orders_id]);
        assert!(matches!(
            command.errors().as_slice(),
            [RelationError::UnloadFailed { .. }]
        ));
    }

    #[test]
    fn test_reset_announces_every_end_point() {
        let mapping = mapping();
        let mut map = new_map();
        register_order(&mut map, &mapping, &ObjectId::generate("Order"), Some(ObjectId::generate("Customer")));

        let mut count = 0;
        map.reset(&mut |_| count += 1);
        assert_eq!(count, 2);
        assert!(map.is_empty());
    }

    #[test]
    fn test_end_point_ids_for_object() {
        let mapping = mapping();
        let mut map = new_map();
        let order = ObjectId::generate("Order");
        let customer = ObjectId::generate("Customer");
        let real_id = register_order(&mut map, &mapping, &order, Some(customer));

        assert_eq!(map.end_point_ids_for_object(&order), vec![real_id]);
    }
}
