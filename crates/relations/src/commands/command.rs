use crate::data_container::{DataContainer, DataContainerMap, SharedDataContainer};
use crate::end_points::{RelationEndPoint, RelationEndPointId, RelationEndPointMap};
use crate::error::{RelationError, RelationResult};
use crate::events::Notification;
use crate::identity::ObjectId;

use super::modification::RelationModification;

/// A relation mutation with its notifications
///
/// The executor raises every "changing" notification first, performs the
/// mutation only if none was cancelled, then raises the "changed"
/// notifications.
pub trait Command {
    fn begin_notifications(&self) -> Vec<Notification>;

    fn perform(
        &self,
        end_points: &mut RelationEndPointMap,
        data_containers: &DataContainerMap,
    ) -> RelationResult<()>;

    fn end_notifications(&self) -> Vec<Notification>;

    fn affected_end_point_ids(&self) -> Vec<&RelationEndPointId>;

    /// Objects whose data containers the command may write
    fn affected_object_ids(&self) -> Vec<&ObjectId> {
        let mut ids: Vec<&ObjectId> = Vec::new();
        let owners = self
            .affected_end_point_ids()
            .into_iter()
            .filter_map(RelationEndPointId::object_id);
        for object_id in owners {
            if !ids.contains(&object_id) {
                ids.push(object_id);
            }
        }
        ids
    }

    /// Perform the command; if any step fails, every affected end-point and
    /// data container is put back the way it was
    fn perform_atomically(
        &self,
        end_points: &mut RelationEndPointMap,
        data_containers: &DataContainerMap,
    ) -> RelationResult<()> {
        let snapshot = Snapshot::capture(self, end_points, data_containers);
        let result = self.perform(end_points, data_containers);
        if result.is_err() {
            snapshot.restore(end_points);
        }
        result
    }
}

/// Copies of the state a command may modify
struct Snapshot {
    end_points: Vec<RelationEndPoint>,
    containers: Vec<(SharedDataContainer, DataContainer)>,
}

impl Snapshot {
    fn capture<C: Command + ?Sized>(
        command: &C,
        end_points: &RelationEndPointMap,
        data_containers: &DataContainerMap,
    ) -> Self {
        let end_points = command
            .affected_end_point_ids()
            .into_iter()
            .filter_map(|id| end_points.get(id).cloned())
            .collect();
        let containers = command
            .affected_object_ids()
            .into_iter()
            .filter_map(|id| data_containers.get(id))
            .map(|shared| {
                let copy = shared.borrow().clone();
                (shared, copy)
            })
            .collect();
        Self {
            end_points,
            containers,
        }
    }

    fn restore(self, end_points: &mut RelationEndPointMap) {
        for end_point in self.end_points {
            end_points.restore_end_point(end_point);
        }
        for (shared, copy) in self.containers {
            *shared.borrow_mut() = copy;
        }
    }
}

/// The complete, ordered list of modifications for one user-facing operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedCommand {
    modifications: Vec<RelationModification>,
}

impl ExpandedCommand {
    pub fn new(modifications: Vec<RelationModification>) -> Self {
        Self { modifications }
    }

    pub fn push(&mut self, modification: RelationModification) {
        self.modifications.push(modification);
    }

    pub fn modifications(&self) -> &[RelationModification] {
        &self.modifications
    }

    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }
}

impl Extend<RelationModification> for ExpandedCommand {
    fn extend<T: IntoIterator<Item = RelationModification>>(&mut self, iter: T) {
        self.modifications.extend(iter);
    }
}

impl Command for ExpandedCommand {
    fn begin_notifications(&self) -> Vec<Notification> {
        self.modifications
            .iter()
            .flat_map(RelationModification::notifications)
            .collect()
    }

    fn perform(
        &self,
        end_points: &mut RelationEndPointMap,
        _data_containers: &DataContainerMap,
    ) -> RelationResult<()> {
        for modification in &self.modifications {
            modification.perform(end_points)?;
        }
        Ok(())
    }

    fn end_notifications(&self) -> Vec<Notification> {
        self.modifications
            .iter()
            .rev()
            .flat_map(|modification| modification.notifications().into_iter().rev())
            .collect()
    }

    fn affected_end_point_ids(&self) -> Vec<&RelationEndPointId> {
        self.modifications
            .iter()
            .map(RelationModification::end_point_id)
            .collect()
    }
}

/// Deletion of an object together with the clearing of all its relations
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    object_id: ObjectId,
    relations: ExpandedCommand,
}

impl DeleteCommand {
    pub fn new(object_id: ObjectId, relations: ExpandedCommand) -> Self {
        Self {
            object_id,
            relations,
        }
    }
}

impl Command for DeleteCommand {
    fn begin_notifications(&self) -> Vec<Notification> {
        let mut notifications = vec![Notification::ObjectDelete(self.object_id.clone())];
        notifications.extend(self.relations.begin_notifications());
        notifications
    }

    fn perform(
        &self,
        end_points: &mut RelationEndPointMap,
        data_containers: &DataContainerMap,
    ) -> RelationResult<()> {
        let container = data_containers.get(&self.object_id).ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "Object '{}' has no data container",
                self.object_id
            ))
        })?;

        self.relations.perform(end_points, data_containers)?;
        container.borrow_mut().delete();
        Ok(())
    }

    fn end_notifications(&self) -> Vec<Notification> {
        let mut notifications = self.relations.end_notifications();
        notifications.push(Notification::ObjectDelete(self.object_id.clone()));
        notifications
    }

    fn affected_end_point_ids(&self) -> Vec<&RelationEndPointId> {
        self.relations.affected_end_point_ids()
    }

    fn affected_object_ids(&self) -> Vec<&ObjectId> {
        let mut ids = self.relations.affected_object_ids();
        if !ids.contains(&&self.object_id) {
            ids.push(&self.object_id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_container::DataContainer;
    use crate::end_points::{ChangeDetectionStrategy, EndPoint, RealObjectEndPoint, RelationEndPointId};
    use crate::events::{CollectionOperation, RelationChange};
    use crate::loader::LoadedObject;
    use crate::mapping::{MappingConfiguration, RelationDefinition};

    struct Ids {
        orders: RelationEndPointId,
        customer: RelationEndPointId,
        order: ObjectId,
        owner: ObjectId,
    }

    fn ids() -> Ids {
        let mapping = MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();
        let owner = ObjectId::generate("Customer");
        let order = ObjectId::generate("Order");
        Ids {
            orders: RelationEndPointId::for_property(&mapping, &owner, "Orders").unwrap(),
            customer: RelationEndPointId::for_property(&mapping, &order, "Customer").unwrap(),
            order,
            owner,
        }
    }

    fn describe(notification: &Notification) -> String {
        match notification {
            Notification::Relation(RelationChange { end_point_id, .. }) => {
                format!("relation {}", end_point_id.property_name().unwrap_or_default())
            }
            Notification::Collection(change) => match change.operation {
                CollectionOperation::Add => "add".to_string(),
                CollectionOperation::Remove => "remove".to_string(),
            },
            Notification::ObjectDelete(_) => "delete".to_string(),
        }
    }

    #[test]
    fn test_expanded_command_mirrors_notifications() {
        let ids = ids();
        let command = ExpandedCommand::new(vec![
            RelationModification::CollectionInsert {
                end_point_id: ids.orders.clone(),
                index: 0,
                item: ids.order.clone(),
            },
            RelationModification::ObjectSet {
                end_point_id: ids.customer.clone(),
                old_related_object: None,
                new_related_object: Some(ids.owner.clone()),
            },
        ]);

        let begin: Vec<_> = command.begin_notifications().iter().map(describe).collect();
        let end: Vec<_> = command.end_notifications().iter().map(describe).collect();

        assert_eq!(begin, vec!["relation Orders", "add", "relation Customer"]);
        assert_eq!(end, vec!["relation Customer", "add", "relation Orders"]);
    }

    #[test]
    fn test_touch_has_no_notifications() {
        let ids = ids();
        let command = ExpandedCommand::new(vec![RelationModification::Touch {
            end_point_id: ids.orders,
        }]);

        assert!(command.begin_notifications().is_empty());
        assert!(command.end_notifications().is_empty());
        assert_eq!(command.affected_end_point_ids().len(), 1);
    }

    #[test]
    fn test_delete_command_brackets_relation_notifications() {
        let ids = ids();
        let relations = ExpandedCommand::new(vec![
            RelationModification::Delete {
                end_point_id: ids.customer.clone(),
            },
            RelationModification::CollectionRemove {
                end_point_id: ids.orders.clone(),
                item: ids.order.clone(),
            },
        ]);
        let command = DeleteCommand::new(ids.order.clone(), relations);

        let begin: Vec<_> = command.begin_notifications().iter().map(describe).collect();
        let end: Vec<_> = command.end_notifications().iter().map(describe).collect();

        assert_eq!(begin, vec!["delete", "relation Orders", "remove"]);
        assert_eq!(end, vec!["remove", "relation Orders", "delete"]);
    }

    #[test]
    fn test_failed_command_restores_every_end_point() {
        let mapping = MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();
        let mut end_points = RelationEndPointMap::new(ChangeDetectionStrategy::SetEquality, true);
        let mut containers = DataContainerMap::new();
        let customer = ObjectId::generate("Customer");
        let order = ObjectId::generate("Order");

        let container = containers
            .register(DataContainer::from_loaded(
                LoadedObject::new(order.clone()).with_reference("Customer", None),
            ))
            .unwrap();
        let customer_id = RelationEndPointId::for_property(&mapping, &order, "Customer").unwrap();
        end_points
            .register_real_object_end_point(
                RealObjectEndPoint::new(customer_id.clone(), container).unwrap(),
                &mapping,
                &mut |_| {},
            )
            .unwrap();
        let orders_id = RelationEndPointId::for_property(&mapping, &customer, "Orders").unwrap();
        end_points
            .get_or_create_virtual_end_point(&orders_id, &mapping, &mut |_| {})
            .unwrap();
        end_points.mark_data_complete(&orders_id, Vec::new(), None).unwrap();

        // the second step refers to an index the collection does not have
        let command = ExpandedCommand::new(vec![
            RelationModification::ObjectSet {
                end_point_id: customer_id.clone(),
                old_related_object: None,
                new_related_object: Some(customer.clone()),
            },
            RelationModification::CollectionInsert {
                end_point_id: orders_id.clone(),
                index: 3,
                item: order.clone(),
            },
        ]);

        let error = command
            .perform_atomically(&mut end_points, &containers)
            .unwrap_err();
        assert!(matches!(error, RelationError::InvalidArgument { .. }));

        let real = end_points.get(&customer_id).unwrap();
        assert!(real.current_items().is_empty());
        assert!(!real.has_been_touched());
        assert!(!real.has_changed());
        let orders = end_points.get(&orders_id).unwrap();
        assert!(orders.current_items().is_empty());
        assert!(!orders.has_been_touched());
        assert_eq!(
            containers.get(&order).unwrap().borrow().get_reference_value("Customer"),
            None
        );
    }

    #[test]
    fn test_delete_command_affects_the_deleted_object() {
        let ids = ids();
        let command = DeleteCommand::new(
            ids.order.clone(),
            ExpandedCommand::new(vec![RelationModification::CollectionRemove {
                end_point_id: ids.orders.clone(),
                item: ids.order.clone(),
            }]),
        );

        assert_eq!(command.affected_end_point_ids(), vec![&ids.orders]);
        assert_eq!(command.affected_object_ids(), vec![&ids.owner, &ids.order]);
    }
}
