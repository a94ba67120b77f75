//! Object and end-point loading through the scope hierarchy

use std::rc::Rc;

use crate::data_container::{DataContainer, DataContainerState, SharedDataContainer};
use crate::end_points::{EndPoint, RealObjectEndPoint, RelationEndPointId};
use crate::error::{RelationError, RelationResult};
use crate::identity::{CollectionId, ObjectId};
use crate::loader::LoadedObject;

use super::ClientTransaction;

impl ClientTransaction {
    /// Load an object into the current scope if it is not there yet
    ///
    /// An object the store does not know fails with `ObjectsNotFound` once;
    /// it is invalid from then on and later attempts fail with
    /// `ObjectInvalid`.
    pub fn ensure_data_available(&mut self, object_id: &ObjectId) -> RelationResult<()> {
        let level = self.leaf_level();
        self.ensure_data_available_at(level, std::slice::from_ref(object_id))
    }

    /// Bulk variant: found objects are registered even if others are missing
    pub fn ensure_data_available_many(&mut self, object_ids: &[ObjectId]) -> RelationResult<()> {
        let level = self.leaf_level();
        self.ensure_data_available_at(level, object_ids)
    }

    /// Load the data of a virtual end-point, or the owner of a real one
    pub fn ensure_data_complete(&mut self, end_point_id: &RelationEndPointId) -> RelationResult<()> {
        end_point_id.check_not_anonymous()?;
        let level = self.leaf_level();
        if end_point_id.is_virtual() {
            self.ensure_end_point_complete_at(level, end_point_id)
        } else {
            let object_id = end_point_id.require_object_id()?.clone();
            self.ensure_data_available_at(level, std::slice::from_ref(&object_id))
        }
    }

    /// Install data for a virtual end-point without asking the store
    ///
    /// The given objects are registered as well, so their real end-points
    /// point back immediately.
    pub fn mark_data_complete(
        &mut self,
        end_point_id: &RelationEndPointId,
        objects: Vec<LoadedObject>,
    ) -> RelationResult<()> {
        end_point_id.check_not_anonymous()?;
        let level = self.leaf_level();
        let items: Vec<ObjectId> = objects.iter().map(|object| object.id.clone()).collect();

        self.get_or_create_virtual_end_point_at(level, end_point_id)?;
        if self.scopes[level].end_points.registered(end_point_id)?.is_data_complete() {
            return Err(RelationError::invalid_operation(format!(
                "The data of end-point '{}' is already complete",
                end_point_id
            )));
        }
        self.register_loaded_objects(level, objects)?;
        self.scopes[level]
            .end_points
            .mark_data_complete(end_point_id, items, None)
    }

    /// Return an unchanged virtual end-point to the incomplete state
    pub fn mark_data_incomplete(&mut self, end_point_id: &RelationEndPointId) -> RelationResult<()> {
        let level = self.leaf_level();
        self.scopes[level].end_points.mark_data_incomplete(end_point_id)?;
        self.record_modification();
        Ok(())
    }

    /// Create a new object of a class in the current scope
    ///
    /// Its real end-points point to nothing and its virtual end-points are
    /// complete and empty.
    pub fn new_object(&mut self, class_id: &str) -> RelationResult<ObjectId> {
        let object_id = ObjectId::generate(class_id);
        let properties = self.real_property_names(class_id);
        let container =
            DataContainer::new_object(object_id.clone(), properties.iter().map(String::as_str));

        let level = self.leaf_level();
        self.register_data_container(level, container)?;
        tracing::debug!("Created new object '{}'", object_id);
        Ok(object_id)
    }

    pub fn is_invalid(&self, object_id: &ObjectId) -> bool {
        self.leaf().is_invalid(object_id)
    }

    pub fn data_container_state(&mut self, object_id: &ObjectId) -> RelationResult<DataContainerState> {
        self.ensure_data_available(object_id)?;
        let state = self.leaf().container(object_id)?.borrow().state();
        Ok(state)
    }

    /// Make an object that is invalid throughout the hierarchy loadable again
    pub fn resurrect_invalid_object(&mut self, object_id: &ObjectId) -> RelationResult<()> {
        if let Some(scope) = self.scopes.iter().find(|scope| !scope.is_invalid(object_id)) {
            return Err(RelationError::invalid_operation(format!(
                "Cannot resurrect object '{}' because it is not invalid within the whole transaction hierarchy. In transaction level {}, the object is not invalid.",
                object_id, scope.depth
            )));
        }

        for scope in self.scopes.iter_mut() {
            scope.invalid_objects.remove(object_id);
        }
        tracing::debug!("Resurrected object '{}'", object_id);
        Ok(())
    }

    pub(super) fn ensure_data_available_at(
        &mut self,
        level: usize,
        object_ids: &[ObjectId],
    ) -> RelationResult<()> {
        let mut missing: Vec<ObjectId> = Vec::new();
        for object_id in object_ids {
            self.scopes[level].check_not_invalid(object_id)?;
            if !self.scopes[level].data_containers.contains(object_id) && !missing.contains(object_id) {
                missing.push(object_id.clone());
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let (loaded, not_found) = if level == 0 {
            self.load_from_store(&missing)?
        } else {
            self.load_from_parent(level, &missing)?
        };

        for object in loaded {
            self.register_data_container(level, DataContainer::from_loaded(object))?;
        }

        if not_found.is_empty() {
            Ok(())
        } else {
            Err(RelationError::ObjectsNotFound { ids: not_found })
        }
    }

    fn load_from_store(
        &mut self,
        object_ids: &[ObjectId],
    ) -> RelationResult<(Vec<LoadedObject>, Vec<ObjectId>)> {
        let (loaded, not_found) = match object_ids {
            [object_id] => match self.store.load_object(object_id)? {
                Some(object) => (vec![object], Vec::new()),
                None => (Vec::new(), vec![object_id.clone()]),
            },
            _ => {
                let result = self.store.load_objects(object_ids)?;
                (result.loaded, result.not_found)
            }
        };
        tracing::debug!(
            "Loaded {} object(s) from the store, {} not found",
            loaded.len(),
            not_found.len()
        );

        for object_id in &not_found {
            tracing::warn!("Object '{}' could not be found", object_id);
            self.mark_invalid_everywhere(object_id);
        }
        Ok((loaded, not_found))
    }

    /// Snapshot the parent's current values; objects deleted in the parent
    /// are invalid here
    fn load_from_parent(
        &mut self,
        level: usize,
        object_ids: &[ObjectId],
    ) -> RelationResult<(Vec<LoadedObject>, Vec<ObjectId>)> {
        let not_found = match self.ensure_data_available_at(level - 1, object_ids) {
            Ok(()) => Vec::new(),
            Err(RelationError::ObjectsNotFound { ids }) => ids,
            Err(error) => return Err(error),
        };

        let mut loaded = Vec::new();
        for object_id in object_ids.iter().filter(|id| !not_found.contains(id)) {
            let parent = self.scopes[level - 1].container(object_id)?;
            let parent = parent.borrow();
            if parent.is_deleted() {
                self.scopes[level].invalid_objects.insert(object_id.clone());
                return Err(RelationError::ObjectInvalid(object_id.clone()));
            }
            loaded.push(parent.to_loaded_object());
        }
        Ok((loaded, not_found))
    }

    fn mark_invalid_everywhere(&mut self, object_id: &ObjectId) {
        for scope in self.scopes.iter_mut() {
            scope.invalid_objects.insert(object_id.clone());
        }
    }

    /// Register a container and create its end-points
    pub(super) fn register_data_container(
        &mut self,
        level: usize,
        container: DataContainer,
    ) -> RelationResult<SharedDataContainer> {
        let object_id = container.id().clone();
        let is_new = container.is_new();
        let schema = Rc::clone(&self.schema);
        let listeners = &self.listeners;
        let scope = &mut self.scopes[level];
        let shared = scope.data_containers.register(container)?;

        for definition in schema.end_point_definitions(object_id.class_id()) {
            let id = RelationEndPointId::new(Some(object_id.clone()), definition)?;
            let on_registering = &mut |id: &RelationEndPointId| listeners.notify_registering(id);

            if !id.is_virtual() {
                let end_point = RealObjectEndPoint::new(id, Rc::clone(&shared))?;
                scope
                    .end_points
                    .register_real_object_end_point(end_point, schema.as_ref(), on_registering)?;
            } else if is_new {
                scope
                    .end_points
                    .get_or_create_virtual_end_point(&id, schema.as_ref(), on_registering)?;
                scope.end_points.mark_data_complete(&id, Vec::new(), None)?;
            }
        }

        tracing::trace!("Registered data container '{}' at level {}", object_id, level);
        Ok(shared)
    }

    /// Register objects that came with a related-object load, skipping
    /// known and invalid ones
    fn register_loaded_objects(&mut self, level: usize, objects: Vec<LoadedObject>) -> RelationResult<()> {
        for object in objects {
            let scope = &self.scopes[level];
            if scope.is_invalid(&object.id) || scope.data_containers.contains(&object.id) {
                continue;
            }
            self.register_data_container(level, DataContainer::from_loaded(object))?;
        }
        Ok(())
    }

    pub(super) fn get_or_create_virtual_end_point_at(
        &mut self,
        level: usize,
        end_point_id: &RelationEndPointId,
    ) -> RelationResult<()> {
        if let Some(object_id) = end_point_id.object_id() {
            self.scopes[level].check_not_invalid(object_id)?;
        }
        let schema = Rc::clone(&self.schema);
        let listeners = &self.listeners;
        self.scopes[level].end_points.get_or_create_virtual_end_point(
            end_point_id,
            schema.as_ref(),
            &mut |id| listeners.notify_registering(id),
        )?;
        Ok(())
    }

    /// Load a virtual end-point's data: from the store at the root, from
    /// the parent's current data in a sub-transaction
    pub(super) fn ensure_end_point_complete_at(
        &mut self,
        level: usize,
        end_point_id: &RelationEndPointId,
    ) -> RelationResult<()> {
        let object_id = end_point_id.require_object_id()?.clone();
        self.ensure_data_available_at(level, std::slice::from_ref(&object_id))?;
        self.get_or_create_virtual_end_point_at(level, end_point_id)?;
        if self.scopes[level].end_points.registered(end_point_id)?.is_data_complete() {
            return Ok(());
        }

        let (items, collection_id) = if level == 0 {
            let opposite = self
                .schema
                .opposite_end_point_definition(end_point_id.definition())
                .ok_or_else(|| {
                    RelationError::invalid_argument(
                        "end_point_id",
                        format!("End-point '{}' has no opposite definition", end_point_id),
                    )
                })?;
            let related = self.store.load_related_objects(&object_id, &opposite)?;
            tracing::debug!(
                "Loaded {} related object(s) for end-point '{}'",
                related.len(),
                end_point_id
            );
            let items: Vec<ObjectId> = related.iter().map(|object| object.id.clone()).collect();
            self.register_loaded_objects(level, related)?;
            (items, None)
        } else {
            self.ensure_end_point_complete_at(level - 1, end_point_id)?;
            let parent = self.scopes[level - 1].end_points.registered(end_point_id)?;
            let items = parent.current_items();
            let collection_id: Option<CollectionId> = parent
                .as_collection()
                .and_then(|collection| collection.data())
                .map(|data| data.collection_id());
            self.ensure_data_available_at(level, &items)?;
            (items, collection_id)
        };

        self.scopes[level]
            .end_points
            .mark_data_complete(end_point_id, items, collection_id)
    }

    /// Names of the real (stored) relation properties of a class
    pub(super) fn real_property_names(&self, class_id: &str) -> Vec<String> {
        self.schema
            .end_point_definitions(class_id)
            .iter()
            .filter(|definition| !definition.is_virtual)
            .filter_map(|definition| definition.property_name.clone())
            .collect()
    }
}
