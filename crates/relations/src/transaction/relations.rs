//! Relation accessors and mutators
//!
//! Reads go straight to the (lazily loaded) end-point. Every write is
//! expanded into the full list of modifications on both sides of each
//! affected relation and then executed as one command.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::commands::{DeleteCommand, ExpandedCommand, RelationModification};
use crate::end_points::{
    CollectionData, DomainObjectCollection, EndPoint, NullEndPoint, RelationEndPoint,
    RelationEndPointId, SyncState,
};
use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::mapping::EndPointDefinition;

use super::ClientTransaction;

impl ClientTransaction {
    /// Resolve a named relation property of an object
    pub fn relation_end_point_id(
        &self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<RelationEndPointId> {
        RelationEndPointId::for_property(self.schema.as_ref(), object_id, property_name)
    }

    /// Look up an end-point, loading its data on a miss
    pub fn get_relation_end_point_with_lazy_load(
        &mut self,
        end_point_id: &RelationEndPointId,
    ) -> RelationResult<&RelationEndPoint> {
        self.load_end_point(end_point_id)?;
        let level = self.leaf_level();
        self.scopes[level].end_points.registered(end_point_id)
    }

    /// Look up an end-point without loading anything
    pub fn get_relation_end_point_without_loading(
        &self,
        end_point_id: &RelationEndPointId,
    ) -> Option<&RelationEndPoint> {
        self.leaf().end_points.get(end_point_id)
    }

    /// A handle to a virtual end-point, created incomplete if needed
    pub fn get_or_create_virtual_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
    ) -> RelationResult<&RelationEndPoint> {
        let level = self.leaf_level();
        self.get_or_create_virtual_end_point_at(level, end_point_id)?;
        self.scopes[level].end_points.registered(end_point_id)
    }

    pub fn get_related_object(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<Option<ObjectId>> {
        let id = self.single_valued_end_point_id(object_id, property_name)?;
        let end_point = self.get_relation_end_point_with_lazy_load(&id)?;
        Ok(end_point.current_items().into_iter().next())
    }

    pub fn get_original_related_object(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<Option<ObjectId>> {
        let id = self.single_valued_end_point_id(object_id, property_name)?;
        let end_point = self.get_relation_end_point_with_lazy_load(&id)?;
        Ok(end_point.original_items().into_iter().next())
    }

    /// The collection currently associated with a collection end-point
    pub fn get_related_objects(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<DomainObjectCollection> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        let data = collection_data(self.get_relation_end_point_with_lazy_load(&id)?)?;
        let (collection_id, items) = (data.collection_id(), data.items().to_vec());
        Ok(DomainObjectCollection::associated(collection_id, items, id))
    }

    /// Read-only view of the collection as of the last commit
    pub fn get_original_related_objects(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<DomainObjectCollection> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        let data = collection_data(self.get_relation_end_point_with_lazy_load(&id)?)?;
        let (collection_id, items) = (data.original_collection_id(), data.original().to_vec());
        Ok(DomainObjectCollection::read_only(collection_id, items, id))
    }

    /// Set a single-valued relation, updating every affected opposite side
    pub fn set_related_object(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        new_related_object: Option<&ObjectId>,
    ) -> RelationResult<()> {
        let id = self.single_valued_end_point_id(object_id, property_name)?;
        self.check_object_modifiable(object_id)?;
        if let Some(new_related_object) = new_related_object {
            self.check_related_object(&id, new_related_object)?;
        }

        let command = self.expand_set(&id, new_related_object.cloned())?;
        self.execute_command(&command)
    }

    /// Append an object to a collection relation
    pub fn add_related_object(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        item: &ObjectId,
    ) -> RelationResult<()> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        self.check_object_modifiable(object_id)?;
        self.check_related_object(&id, item)?;

        let command = self.expand_insert(&id, None, item)?;
        self.execute_command(&command)
    }

    /// Insert an object at `index`, shifting the following items
    pub fn insert_related_object(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        index: usize,
        item: &ObjectId,
    ) -> RelationResult<()> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        self.check_object_modifiable(object_id)?;
        self.check_related_object(&id, item)?;

        let command = self.expand_insert(&id, Some(index), item)?;
        self.execute_command(&command)
    }

    /// Remove an object from a collection relation
    ///
    /// Removing an object that is not part of the collection only touches
    /// the end-point and returns `false`.
    pub fn remove_related_object(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        item: &ObjectId,
    ) -> RelationResult<bool> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        self.check_object_modifiable(object_id)?;

        let end_point = self.load_for_modification(&id)?;
        let contains = end_point.current_items().contains(item);
        let command = if contains {
            end_point.check_item_removable(item)?;
            let item_end_point = id.opposite(self.schema.as_ref(), Some(item.clone()))?;
            self.load_for_modification(&item_end_point)?;
            ExpandedCommand::new(vec![
                RelationModification::CollectionRemove {
                    end_point_id: id,
                    item: item.clone(),
                },
                RelationModification::ObjectSet {
                    end_point_id: item_end_point,
                    old_related_object: Some(object_id.clone()),
                    new_related_object: None,
                },
            ])
        } else {
            ExpandedCommand::new(vec![RelationModification::Touch { end_point_id: id }])
        };

        self.execute_command(&command)?;
        Ok(contains)
    }

    /// Remove the object at `index`, returning it
    pub fn remove_related_object_at(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        index: usize,
    ) -> RelationResult<ObjectId> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        let items = self.get_relation_end_point_with_lazy_load(&id)?.current_items();
        let item = items
            .get(index)
            .cloned()
            .ok_or_else(|| index_out_of_range(index, items.len()))?;

        self.remove_related_object(object_id, property_name, &item)?;
        Ok(item)
    }

    /// Swap the object at `index`, returning the replaced one
    pub fn replace_related_object_at(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        index: usize,
        new_item: &ObjectId,
    ) -> RelationResult<ObjectId> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        self.check_object_modifiable(object_id)?;
        self.check_related_object(&id, new_item)?;

        let items = self.load_for_modification(&id)?.current_items();
        let old_item = items
            .get(index)
            .cloned()
            .ok_or_else(|| index_out_of_range(index, items.len()))?;
        let old_item_end_point = id.opposite(self.schema.as_ref(), Some(old_item.clone()))?;

        let command = if &old_item == new_item {
            self.load_end_point(&old_item_end_point)?;
            ExpandedCommand::new(vec![
                RelationModification::Touch { end_point_id: id },
                RelationModification::Touch {
                    end_point_id: old_item_end_point,
                },
            ])
        } else {
            if items.contains(new_item) {
                return Err(already_in_collection(new_item));
            }
            self.scopes[self.leaf_level()]
                .end_points
                .registered(&id)?
                .check_item_removable(&old_item)?;
            self.load_for_modification(&old_item_end_point)?;

            let new_item_end_point = id.opposite(self.schema.as_ref(), Some(new_item.clone()))?;
            let previous_owner = self
                .load_for_modification(&new_item_end_point)?
                .current_items()
                .into_iter()
                .next();

            let mut command = ExpandedCommand::new(vec![
                RelationModification::CollectionReplace {
                    end_point_id: id.clone(),
                    index,
                    old_item: old_item.clone(),
                    new_item: new_item.clone(),
                },
                RelationModification::ObjectSet {
                    end_point_id: old_item_end_point,
                    old_related_object: Some(object_id.clone()),
                    new_related_object: None,
                },
                RelationModification::ObjectSet {
                    end_point_id: new_item_end_point,
                    old_related_object: previous_owner.clone(),
                    new_related_object: Some(object_id.clone()),
                },
            ]);
            let previous_collection = RelationEndPointId::new(previous_owner, Arc::clone(id.definition()))?;
            command.extend(self.detach_modification(&previous_collection, new_item)?);
            command
        };

        self.execute_command(&command)?;
        Ok(old_item)
    }

    /// Replace the collection object of a collection relation wholesale
    ///
    /// The new collection becomes associated with the end-point; the
    /// previous one is returned as a detached snapshot. The end-point counts
    /// as changed even when both hold the same items.
    pub fn set_related_objects(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        collection: DomainObjectCollection,
    ) -> RelationResult<DomainObjectCollection> {
        let id = self.collection_end_point_id(object_id, property_name)?;
        self.check_object_modifiable(object_id)?;

        if let Some(associated) = collection.associated_end_point() {
            if associated != &id {
                return Err(RelationError::invalid_operation(format!(
                    "The collection is already associated with end-point '{}'",
                    associated
                )));
            }
        }
        if collection.is_read_only() {
            return Err(RelationError::invalid_argument(
                "collection",
                "A read-only collection cannot be associated with an end-point",
            ));
        }
        let new_items = collection.items().to_vec();
        for (index, item) in new_items.iter().enumerate() {
            if new_items[..index].contains(item) {
                return Err(RelationError::invalid_argument(
                    "collection",
                    format!("Object '{}' is contained more than once", item),
                ));
            }
            self.check_related_object(&id, item)?;
        }

        let end_point = self.load_for_modification(&id)?;
        end_point.check_synchronized()?;
        let data = collection_data(end_point)?;
        let (old_collection_id, old_items) = (data.collection_id(), data.items().to_vec());

        let mut command = ExpandedCommand::new(vec![RelationModification::SetCollection {
            end_point_id: id.clone(),
            old_items: old_items.clone(),
            new_items: new_items.clone(),
            new_collection_id: collection.id(),
        }]);

        for removed in old_items.iter().filter(|item| !new_items.contains(item)) {
            let removed_end_point = id.opposite(self.schema.as_ref(), Some(removed.clone()))?;
            self.load_for_modification(&removed_end_point)?;
            command.push(RelationModification::ObjectSet {
                end_point_id: removed_end_point,
                old_related_object: Some(object_id.clone()),
                new_related_object: None,
            });
        }

        let mut detachments = Vec::new();
        for added in new_items.iter().filter(|item| !old_items.contains(item)) {
            let added_end_point = id.opposite(self.schema.as_ref(), Some(added.clone()))?;
            let previous_owner = self
                .load_for_modification(&added_end_point)?
                .current_items()
                .into_iter()
                .next();
            command.push(RelationModification::ObjectSet {
                end_point_id: added_end_point,
                old_related_object: previous_owner.clone(),
                new_related_object: Some(object_id.clone()),
            });
            let previous_collection = RelationEndPointId::new(previous_owner, Arc::clone(id.definition()))?;
            detachments.extend(self.detach_modification(&previous_collection, added)?);
        }
        command.extend(detachments);

        self.execute_command(&command)?;
        Ok(DomainObjectCollection::detached(old_collection_id, old_items))
    }

    /// Reorder the loaded items of a collection relation
    ///
    /// Raises no notifications; the end-point is touched.
    pub fn sort_related_objects<F>(
        &mut self,
        object_id: &ObjectId,
        property_name: &str,
        compare: F,
    ) -> RelationResult<()>
    where
        F: FnMut(&ObjectId, &ObjectId) -> Ordering,
    {
        let id = self.collection_end_point_id(object_id, property_name)?;
        self.load_end_point(&id)?;

        let level = self.leaf_level();
        let end_point = self.scopes[level].end_points.registered_mut(&id)?;
        match end_point.as_collection_mut() {
            Some(collection) => collection.data_mut()?.sort(compare),
            None => return Err(not_a_collection(&id)),
        }
        end_point.touch();
        self.record_modification();
        Ok(())
    }

    /// Delete an object, detaching it from every relation
    ///
    /// Deleting an already deleted object does nothing. A new object is
    /// discarded at once and becomes invalid.
    pub fn delete_object(&mut self, object_id: &ObjectId) -> RelationResult<()> {
        self.ensure_data_available(object_id)?;
        let level = self.leaf_level();
        let (is_deleted, is_new) = {
            let container = self.leaf().container(object_id)?;
            let container = container.borrow();
            (container.is_deleted(), container.is_new())
        };
        if is_deleted {
            return Ok(());
        }

        let relations = self.expand_delete(object_id)?;
        self.execute_command(&DeleteCommand::new(object_id.clone(), relations))?;
        tracing::debug!("Deleted object '{}'", object_id);

        if is_new {
            self.discard_object(level, object_id)?;
        }
        Ok(())
    }

    fn expand_set(
        &mut self,
        id: &RelationEndPointId,
        new_related_object: Option<ObjectId>,
    ) -> RelationResult<ExpandedCommand> {
        let owner = id.require_object_id()?.clone();
        let opposite_definition = self.opposite_definition(id)?;

        let end_point = self.load_for_modification(id)?;
        if end_point.is_virtual() {
            end_point.check_synchronized()?;
        }
        let old_related_object = end_point.current_items().into_iter().next();

        if old_related_object == new_related_object {
            let mut command = ExpandedCommand::new(vec![RelationModification::Touch {
                end_point_id: id.clone(),
            }]);
            if let (Some(old), false) = (&old_related_object, opposite_definition.is_anonymous()) {
                let opposite = id.opposite(self.schema.as_ref(), Some(old.clone()))?;
                self.load_end_point(&opposite)?;
                command.push(RelationModification::Touch {
                    end_point_id: opposite,
                });
            }
            return Ok(command);
        }

        let mut command = ExpandedCommand::new(vec![RelationModification::ObjectSet {
            end_point_id: id.clone(),
            old_related_object: old_related_object.clone(),
            new_related_object: new_related_object.clone(),
        }]);
        if opposite_definition.is_anonymous() {
            return Ok(command);
        }

        let mut previous_of_new = None;
        if let Some(new_related_object) = &new_related_object {
            let new_opposite = id.opposite(self.schema.as_ref(), Some(new_related_object.clone()))?;
            let (modification, previous) = self.attach_modification(&new_opposite, &owner)?;
            command.push(modification);
            previous_of_new = previous;
        }

        let old_opposite = id.opposite(self.schema.as_ref(), old_related_object)?;
        command.extend(self.detach_modification(&old_opposite, &owner)?);

        if let (Some(previous), Some(new_related_object)) = (previous_of_new, &new_related_object) {
            let previous_end_point = RelationEndPointId::new(Some(previous), Arc::clone(id.definition()))?;
            command.extend(self.detach_modification(&previous_end_point, new_related_object)?);
        }
        Ok(command)
    }

    fn expand_insert(
        &mut self,
        id: &RelationEndPointId,
        index: Option<usize>,
        item: &ObjectId,
    ) -> RelationResult<ExpandedCommand> {
        let owner = id.require_object_id()?.clone();
        let items = self.load_for_modification(id)?.current_items();
        let index = index.unwrap_or(items.len());
        if index > items.len() {
            return Err(index_out_of_range(index, items.len()));
        }
        if items.contains(item) {
            return Err(already_in_collection(item));
        }

        let item_end_point = id.opposite(self.schema.as_ref(), Some(item.clone()))?;
        let previous_owner = self
            .load_for_modification(&item_end_point)?
            .current_items()
            .into_iter()
            .next();

        let mut command = ExpandedCommand::new(vec![
            RelationModification::CollectionInsert {
                end_point_id: id.clone(),
                index,
                item: item.clone(),
            },
            RelationModification::ObjectSet {
                end_point_id: item_end_point,
                old_related_object: previous_owner.clone(),
                new_related_object: Some(owner),
            },
        ]);
        let previous_collection = RelationEndPointId::new(previous_owner, Arc::clone(id.definition()))?;
        command.extend(self.detach_modification(&previous_collection, item)?);
        Ok(command)
    }

    fn expand_delete(&mut self, object_id: &ObjectId) -> RelationResult<ExpandedCommand> {
        let mut command = ExpandedCommand::default();

        for definition in self.schema.end_point_definitions(object_id.class_id()) {
            let id = RelationEndPointId::new(Some(object_id.clone()), definition)?;
            let end_point = self.load_for_modification(&id)?;
            if end_point.is_virtual() {
                end_point.check_synchronized()?;
            }
            let related = end_point.current_items();
            command.push(RelationModification::Delete {
                end_point_id: id.clone(),
            });

            if self.opposite_definition(&id)?.is_anonymous() {
                continue;
            }
            for item in related {
                let opposite = id.opposite(self.schema.as_ref(), Some(item))?;
                command.extend(self.detach_modification(&opposite, object_id)?);
            }
        }
        Ok(command)
    }

    /// Modification relating `item` to the end-point `id`, plus the object
    /// a single-valued end-point pointed to before
    fn attach_modification(
        &mut self,
        id: &RelationEndPointId,
        item: &ObjectId,
    ) -> RelationResult<(RelationModification, Option<ObjectId>)> {
        let end_point = self.load_for_modification(id)?;
        let current = end_point.current_items();

        if id.is_collection() {
            if current.contains(item) {
                return Err(RelationError::unsynchronized(
                    id,
                    format!("it already contains '{}'", item),
                ));
            }
            let modification = RelationModification::CollectionInsert {
                end_point_id: id.clone(),
                index: current.len(),
                item: item.clone(),
            };
            Ok((modification, None))
        } else {
            end_point.check_synchronized()?;
            let previous = current.into_iter().next();
            let modification = RelationModification::ObjectSet {
                end_point_id: id.clone(),
                old_related_object: previous.clone(),
                new_related_object: Some(item.clone()),
            };
            Ok((modification, previous))
        }
    }

    /// Modification detaching `item` from the end-point `id`; nothing for
    /// the null end-point
    fn detach_modification(
        &mut self,
        id: &RelationEndPointId,
        item: &ObjectId,
    ) -> RelationResult<Option<RelationModification>> {
        if id.is_null() {
            let null_end_point = NullEndPoint::new(Arc::clone(id.definition()));
            return if id.is_collection() {
                Ok(null_end_point.create_remove_modification(item))
            } else {
                null_end_point.create_set_modification(None)
            };
        }

        let end_point = self.load_for_modification(id)?;
        end_point.check_item_removable(item)?;
        let modification = if id.is_collection() {
            RelationModification::CollectionRemove {
                end_point_id: id.clone(),
                item: item.clone(),
            }
        } else {
            RelationModification::ObjectSet {
                end_point_id: id.clone(),
                old_related_object: end_point.current_items().into_iter().next(),
                new_related_object: None,
            }
        };
        Ok(Some(modification))
    }

    /// Load an end-point and make sure a real one may be modified
    ///
    /// A real end-point of unknown sync state gets the opposite side of its
    /// original value loaded first, which settles the state.
    fn load_for_modification(&mut self, id: &RelationEndPointId) -> RelationResult<&RelationEndPoint> {
        self.load_end_point(id)?;
        let level = self.leaf_level();

        let unknown_original = match self.scopes[level].end_points.registered(id)?.as_real_object() {
            Some(real) if real.sync_state() == SyncState::Unknown => real.original_opposite_object_id(),
            _ => None,
        };
        if let Some(original) = unknown_original {
            let opposite = id.opposite(self.schema.as_ref(), Some(original))?;
            if !opposite.is_anonymous() {
                self.ensure_end_point_complete_at(level, &opposite)?;
            }
        }

        let end_point = self.scopes[level].end_points.registered(id)?;
        if !end_point.is_virtual() {
            end_point.check_synchronized()?;
        }
        Ok(end_point)
    }

    pub(super) fn load_end_point(&mut self, id: &RelationEndPointId) -> RelationResult<()> {
        if id.is_null() {
            return Err(RelationError::invalid_argument(
                "end_point_id",
                format!("The null end-point '{}' has no data to load", id),
            ));
        }
        self.ensure_data_complete(id)
    }

    fn check_object_modifiable(&mut self, object_id: &ObjectId) -> RelationResult<()> {
        self.ensure_data_available(object_id)?;
        if self.leaf().container(object_id)?.borrow().is_deleted() {
            return Err(RelationError::ObjectDeleted(object_id.clone()));
        }
        Ok(())
    }

    fn check_related_object(&mut self, id: &RelationEndPointId, related: &ObjectId) -> RelationResult<()> {
        let opposite = self.opposite_definition(id)?;
        if related.class_id() != opposite.class_id {
            return Err(RelationError::invalid_argument(
                "related_object",
                format!(
                    "Object '{}' cannot be related through '{}': an object of class '{}' is expected",
                    related, id, opposite.class_id
                ),
            ));
        }
        self.check_object_modifiable(related)
    }

    pub(super) fn opposite_definition(
        &self,
        id: &RelationEndPointId,
    ) -> RelationResult<Arc<EndPointDefinition>> {
        self.schema
            .opposite_end_point_definition(id.definition())
            .ok_or_else(|| {
                RelationError::invalid_argument(
                    "end_point_id",
                    format!("End-point '{}' has no opposite definition", id),
                )
            })
    }

    fn single_valued_end_point_id(
        &self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<RelationEndPointId> {
        let id = self.relation_end_point_id(object_id, property_name)?;
        if id.is_collection() {
            return Err(RelationError::invalid_argument(
                "property_name",
                format!("Property '{}' holds a collection", id),
            ));
        }
        Ok(id)
    }

    fn collection_end_point_id(
        &self,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<RelationEndPointId> {
        let id = self.relation_end_point_id(object_id, property_name)?;
        if !id.is_collection() {
            return Err(not_a_collection(&id));
        }
        Ok(id)
    }
}

fn collection_data(end_point: &RelationEndPoint) -> RelationResult<&CollectionData> {
    end_point
        .as_collection()
        .and_then(|collection| collection.data())
        .ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "End-point '{}' is not a loaded collection end-point",
                end_point.id()
            ))
        })
}

fn not_a_collection(id: &RelationEndPointId) -> RelationError {
    RelationError::invalid_argument(
        "property_name",
        format!("Property '{}' does not hold a collection", id),
    )
}

fn already_in_collection(item: &ObjectId) -> RelationError {
    RelationError::invalid_argument(
        "item",
        format!("Object '{}' is already part of the collection", item),
    )
}

fn index_out_of_range(index: usize, len: usize) -> RelationError {
    RelationError::invalid_argument(
        "index",
        format!("Index {} is out of range for a collection of {} item(s)", index, len),
    )
}
