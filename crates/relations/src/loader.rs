//! Object Loading - the backing store collaborator
//!
//! The relation core never talks to a database itself. It asks an
//! `ObjectStore` for the reference values of objects and for the objects
//! pointing to a given owner, and hands changed objects back on commit.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_container::DataContainerState;
use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::mapping::EndPointDefinition;

/// Reference values of one object as the store knows them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedObject {
    pub id: ObjectId,
    /// Real relation property name -> referenced object
    #[serde(default)]
    pub reference_values: BTreeMap<String, Option<ObjectId>>,
}

impl LoadedObject {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            reference_values: BTreeMap::new(),
        }
    }

    pub fn with_reference(mut self, property: &str, value: Option<ObjectId>) -> Self {
        self.reference_values.insert(property.to_string(), value);
        self
    }

    pub fn reference_value(&self, property: &str) -> Option<&ObjectId> {
        self.reference_values.get(property).and_then(Option::as_ref)
    }
}

/// Result of a bulk load: whatever was found plus the ids that were not
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadMultipleResult {
    pub loaded: Vec<LoadedObject>,
    pub not_found: Vec<ObjectId>,
}

/// An object handed to the store on commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistableData {
    pub object: LoadedObject,
    pub state: DataContainerState,
}

/// Backing store queried by the root transaction scope
pub trait ObjectStore {
    /// Load one object; `None` means it does not exist
    fn load_object(&self, id: &ObjectId) -> RelationResult<Option<LoadedObject>>;

    fn load_objects(&self, ids: &[ObjectId]) -> RelationResult<LoadMultipleResult> {
        let mut result = LoadMultipleResult::default();
        for id in ids {
            match self.load_object(id)? {
                Some(object) => result.loaded.push(object),
                None => result.not_found.push(id.clone()),
            }
        }
        Ok(result)
    }

    /// Load the objects whose `opposite` end-point refers to `owner`, in
    /// store order
    fn load_related_objects(
        &self,
        owner: &ObjectId,
        opposite: &EndPointDefinition,
    ) -> RelationResult<Vec<LoadedObject>>;

    /// Persist the changes of a root commit
    fn save(&self, _changes: &[PersistableData]) -> RelationResult<()> {
        Ok(())
    }
}

/// Store backed by a vector, used by tests and demos
///
/// Counts every call so tests can assert how often the core went to the
/// store.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RefCell<Vec<LoadedObject>>,
    load_count: Cell<usize>,
    related_load_count: Cell<usize>,
    save_count: Cell<usize>,
    fail_next_save: RefCell<Option<String>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: impl IntoIterator<Item = LoadedObject>) -> Self {
        let store = Self::new();
        for object in objects {
            store.insert(object);
        }
        store
    }

    /// Insert or replace an object
    pub fn insert(&self, object: LoadedObject) {
        let mut objects = self.objects.borrow_mut();
        match objects.iter_mut().find(|existing| existing.id == object.id) {
            Some(existing) => *existing = object,
            None => objects.push(object),
        }
    }

    pub fn remove(&self, id: &ObjectId) -> Option<LoadedObject> {
        let mut objects = self.objects.borrow_mut();
        let index = objects.iter().position(|object| &object.id == id)?;
        Some(objects.remove(index))
    }

    pub fn get(&self, id: &ObjectId) -> Option<LoadedObject> {
        self.objects
            .borrow()
            .iter()
            .find(|object| &object.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }

    /// Number of single or bulk object loads
    pub fn load_count(&self) -> usize {
        self.load_count.get()
    }

    pub fn related_load_count(&self) -> usize {
        self.related_load_count.get()
    }

    pub fn save_count(&self) -> usize {
        self.save_count.get()
    }

    /// Make the next `save` fail with a store error
    pub fn fail_next_save(&self, message: &str) {
        *self.fail_next_save.borrow_mut() = Some(message.to_string());
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn load_object(&self, id: &ObjectId) -> RelationResult<Option<LoadedObject>> {
        self.load_count.set(self.load_count.get() + 1);
        Ok(self.get(id))
    }

    fn load_objects(&self, ids: &[ObjectId]) -> RelationResult<LoadMultipleResult> {
        self.load_count.set(self.load_count.get() + 1);
        let mut result = LoadMultipleResult::default();
        for id in ids {
            match self.get(id) {
                Some(object) => result.loaded.push(object),
                None => result.not_found.push(id.clone()),
            }
        }
        Ok(result)
    }

    fn load_related_objects(
        &self,
        owner: &ObjectId,
        opposite: &EndPointDefinition,
    ) -> RelationResult<Vec<LoadedObject>> {
        self.related_load_count.set(self.related_load_count.get() + 1);
        let property = opposite.property_name.as_deref().ok_or_else(|| {
            RelationError::invalid_argument(
                "opposite",
                format!("End-point '{}' stores no reference", opposite.full_name()),
            )
        })?;

        Ok(self
            .objects
            .borrow()
            .iter()
            .filter(|object| {
                object.id.class_id() == opposite.class_id
                    && object.reference_value(property) == Some(owner)
            })
            .cloned()
            .collect())
    }

    fn save(&self, changes: &[PersistableData]) -> RelationResult<()> {
        if let Some(message) = self.fail_next_save.borrow_mut().take() {
            return Err(RelationError::Store(message));
        }
        self.save_count.set(self.save_count.get() + 1);

        for change in changes {
            match change.state {
                DataContainerState::Deleted => {
                    self.remove(&change.object.id);
                }
                _ => self.insert(change.object.clone()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingConfiguration, RelationDefinition, RelationSchema};

    #[test]
    fn test_load_related_objects_filters_by_owner() {
        let mapping = MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();
        let customer = ObjectId::generate("Customer");
        let other = ObjectId::generate("Customer");
        let first = ObjectId::generate("Order");

        let store = InMemoryObjectStore::with_objects([
            LoadedObject::new(first.clone()).with_reference("Customer", Some(customer.clone())),
            LoadedObject::new(ObjectId::generate("Order")).with_reference("Customer", Some(other)),
            LoadedObject::new(customer.clone()),
        ]);

        let opposite = mapping.end_point_definition("Order", "Customer").unwrap();
        let related = store.load_related_objects(&customer, &opposite).unwrap();

        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, first);
        assert_eq!(store.related_load_count(), 1);
    }

    #[test]
    fn test_load_objects_reports_missing_ids() {
        let present = ObjectId::generate("Order");
        let missing = ObjectId::generate("Order");
        let store = InMemoryObjectStore::with_objects([LoadedObject::new(present.clone())]);

        let result = store.load_objects(&[present, missing.clone()]).unwrap();
        assert_eq!(result.loaded.len(), 1);
        assert_eq!(result.not_found, vec![missing]);
        assert_eq!(store.load_count(), 1);
    }

    #[test]
    fn test_save_applies_changes() {
        let kept = ObjectId::generate("Order");
        let deleted = ObjectId::generate("Order");
        let store = InMemoryObjectStore::with_objects([
            LoadedObject::new(kept.clone()),
            LoadedObject::new(deleted.clone()),
        ]);

        store.fail_next_save("disk full");
        assert!(matches!(store.save(&[]), Err(RelationError::Store(_))));

        store
            .save(&[PersistableData {
                object: LoadedObject::new(deleted.clone()),
                state: DataContainerState::Deleted,
            }])
            .unwrap();

        assert!(store.get(&deleted).is_none());
        assert!(store.get(&kept).is_some());
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_loaded_object_from_json() {
        let id = ObjectId::generate("Order");
        let json = serde_json::to_string(&LoadedObject::new(id.clone())).unwrap();
        let parsed: LoadedObject = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, id);
    }
}
