//! Value containers - per-object storage of relation reference values
//!
//! A `DataContainer` holds the current and original foreign-key-like
//! references of one object. It is shared between the object's real
//! end-points and the rest of the unit of work; only end-points write the
//! relation fields.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::loader::LoadedObject;

/// Lifecycle state of a data container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataContainerState {
    New,
    Unchanged,
    Changed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataContainer {
    id: ObjectId,
    is_new: bool,
    is_deleted: bool,
    current_values: BTreeMap<String, Option<ObjectId>>,
    original_values: BTreeMap<String, Option<ObjectId>>,
    touched_properties: BTreeSet<String>,
}

impl DataContainer {
    /// Container for an object created in this unit of work
    pub fn new_object<'a>(id: ObjectId, properties: impl IntoIterator<Item = &'a str>) -> Self {
        let values: BTreeMap<_, _> = properties
            .into_iter()
            .map(|property| (property.to_string(), None))
            .collect();
        Self {
            id,
            is_new: true,
            is_deleted: false,
            current_values: values.clone(),
            original_values: values,
            touched_properties: BTreeSet::new(),
        }
    }

    /// Container for an object whose data came from the store or a parent scope
    pub fn from_loaded(loaded: LoadedObject) -> Self {
        Self {
            id: loaded.id,
            is_new: false,
            is_deleted: false,
            current_values: loaded.reference_values.clone(),
            original_values: loaded.reference_values,
            touched_properties: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn state(&self) -> DataContainerState {
        if self.is_deleted {
            DataContainerState::Deleted
        } else if self.is_new {
            DataContainerState::New
        } else if self.current_values != self.original_values {
            DataContainerState::Changed
        } else {
            DataContainerState::Unchanged
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn get_reference_value(&self, property: &str) -> Option<ObjectId> {
        self.current_values.get(property).cloned().flatten()
    }

    pub fn get_original_reference_value(&self, property: &str) -> Option<ObjectId> {
        self.original_values.get(property).cloned().flatten()
    }

    pub fn set_reference_value(&mut self, property: &str, value: Option<ObjectId>) {
        self.current_values.insert(property.to_string(), value);
    }

    pub fn has_value_changed(&self, property: &str) -> bool {
        self.get_reference_value(property) != self.get_original_reference_value(property)
    }

    pub fn touch(&mut self, property: &str) {
        self.touched_properties.insert(property.to_string());
    }

    pub fn is_touched(&self, property: &str) -> bool {
        self.touched_properties.contains(property)
    }

    pub fn has_been_touched(&self) -> bool {
        !self.touched_properties.is_empty()
    }

    pub fn delete(&mut self) {
        self.is_deleted = true;
    }

    /// Make the current state the original state
    pub fn commit(&mut self) {
        self.original_values = self.current_values.clone();
        self.touched_properties.clear();
        self.is_new = false;
    }

    /// Restore the original state
    pub fn rollback(&mut self) {
        self.current_values = self.original_values.clone();
        self.touched_properties.clear();
        self.is_deleted = false;
    }

    pub fn commit_value(&mut self, property: &str) {
        let current = self.get_reference_value(property);
        self.original_values.insert(property.to_string(), current);
        self.touched_properties.remove(property);
    }

    pub fn rollback_value(&mut self, property: &str) {
        let original = self.get_original_reference_value(property);
        self.current_values.insert(property.to_string(), original);
        self.touched_properties.remove(property);
    }

    /// Overwrite the current values with those of a committing sub-transaction
    pub(crate) fn set_values_from_sub_transaction(&mut self, source: &DataContainer) {
        self.current_values = source.current_values.clone();
        for property in &source.touched_properties {
            self.touched_properties.insert(property.clone());
        }
    }

    /// Snapshot of the current values, as a child scope or the store sees them
    pub fn to_loaded_object(&self) -> LoadedObject {
        LoadedObject {
            id: self.id.clone(),
            reference_values: self.current_values.clone(),
        }
    }
}

pub type SharedDataContainer = Rc<RefCell<DataContainer>>;

/// All data containers registered in one scope
#[derive(Debug, Default)]
pub struct DataContainerMap {
    containers: HashMap<ObjectId, SharedDataContainer>,
}

impl DataContainerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, container: DataContainer) -> RelationResult<SharedDataContainer> {
        let id = container.id().clone();
        if self.containers.contains_key(&id) {
            return Err(RelationError::invalid_operation(format!(
                "A data container for object '{}' is already registered",
                id
            )));
        }
        let shared = Rc::new(RefCell::new(container));
        self.containers.insert(id, Rc::clone(&shared));
        Ok(shared)
    }

    pub fn remove(&mut self, id: &ObjectId) -> RelationResult<SharedDataContainer> {
        self.containers.remove(id).ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "No data container for object '{}' is registered",
                id
            ))
        })
    }

    pub fn get(&self, id: &ObjectId) -> Option<SharedDataContainer> {
        self.containers.get(id).cloned()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.containers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Ids of all registered objects, sorted
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.containers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of objects in the given state, sorted
    pub fn ids_in_state(&self, state: DataContainerState) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self
            .containers
            .iter()
            .filter(|(_, container)| container.borrow().state() == state)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_order(customer: Option<ObjectId>) -> LoadedObject {
        LoadedObject::new(ObjectId::generate("Order")).with_reference("Customer", customer)
    }

    #[test]
    fn test_state_transitions() {
        let customer = ObjectId::generate("Customer");
        let mut container = DataContainer::from_loaded(loaded_order(Some(customer.clone())));
        assert_eq!(container.state(), DataContainerState::Unchanged);

        container.set_reference_value("Customer", None);
        assert_eq!(container.state(), DataContainerState::Changed);
        assert!(container.has_value_changed("Customer"));

        container.rollback();
        assert_eq!(container.get_reference_value("Customer"), Some(customer));
        assert_eq!(container.state(), DataContainerState::Unchanged);

        container.delete();
        assert_eq!(container.state(), DataContainerState::Deleted);
    }

    #[test]
    fn test_new_object_commit() {
        let mut container = DataContainer::new_object(ObjectId::generate("Order"), ["Customer"]);
        assert_eq!(container.state(), DataContainerState::New);
        assert_eq!(container.get_reference_value("Customer"), None);

        container.touch("Customer");
        assert!(container.has_been_touched());

        container.commit();
        assert_eq!(container.state(), DataContainerState::Unchanged);
        assert!(!container.has_been_touched());
    }

    #[test]
    fn test_commit_and_rollback_single_value() {
        let customer = ObjectId::generate("Customer");
        let mut container = DataContainer::from_loaded(loaded_order(None));

        container.set_reference_value("Customer", Some(customer.clone()));
        container.touch("Customer");
        container.commit_value("Customer");
        assert_eq!(container.get_original_reference_value("Customer"), Some(customer));
        assert!(!container.is_touched("Customer"));

        container.set_reference_value("Customer", None);
        container.rollback_value("Customer");
        assert!(container.get_reference_value("Customer").is_some());
    }

    #[test]
    fn test_map_rejects_duplicates() {
        let mut map = DataContainerMap::new();
        let loaded = loaded_order(None);
        map.register(DataContainer::from_loaded(loaded.clone())).unwrap();

        assert!(map.register(DataContainer::from_loaded(loaded.clone())).is_err());
        assert!(map.contains(&loaded.id));
        assert!(map.remove(&loaded.id).is_ok());
        assert!(map.remove(&loaded.id).is_err());
        assert!(map.is_empty());
    }
}
