use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;

use super::load_state::VirtualEndPointData;
use super::virtual_end_point::VirtualEndPoint;

/// Data of the virtual side of a one-to-one relation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectData {
    current: Option<ObjectId>,
    original: Option<ObjectId>,
}

impl ObjectData {
    pub fn new(item: Option<ObjectId>) -> Self {
        Self {
            current: item.clone(),
            original: item,
        }
    }

    pub fn current(&self) -> Option<&ObjectId> {
        self.current.as_ref()
    }

    pub fn original(&self) -> Option<&ObjectId> {
        self.original.as_ref()
    }

    pub fn set_current(&mut self, item: Option<ObjectId>) {
        self.current = item;
    }
}

impl VirtualEndPointData for ObjectData {
    fn current_items(&self) -> Vec<ObjectId> {
        self.current.iter().cloned().collect()
    }

    fn original_items(&self) -> Vec<ObjectId> {
        self.original.iter().cloned().collect()
    }

    fn contains_current(&self, item: &ObjectId) -> bool {
        self.current.as_ref() == Some(item)
    }

    fn has_changed(&self) -> bool {
        self.current != self.original
    }

    fn commit(&mut self) {
        self.original = self.current.clone();
    }

    fn rollback(&mut self) {
        self.current = self.original.clone();
    }

    fn register_original_item(&mut self, item: ObjectId) -> RelationResult<()> {
        if let Some(original) = &self.original {
            if original != &item {
                return Err(RelationError::invalid_operation(format!(
                    "Cannot register '{}': the end-point already refers to '{}'",
                    item, original
                )));
            }
        }
        let unchanged = self.current == self.original;
        self.original = Some(item.clone());
        if unchanged {
            self.current = Some(item);
        }
        Ok(())
    }

    fn unregister_original_item(&mut self, item: &ObjectId) {
        if self.original.as_ref() == Some(item) {
            self.original = None;
        }
        if self.current.as_ref() == Some(item) {
            self.current = None;
        }
    }

    fn set_data_from_sub_transaction(&mut self, source: &Self) {
        self.current = source.current.clone();
    }

    fn clear(&mut self) {
        self.current = None;
    }
}

/// Virtual end-point holding at most one object
pub type VirtualObjectEndPoint = VirtualEndPoint<ObjectData>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_tracking() {
        let ticket = ObjectId::generate("OrderTicket");
        let mut data = ObjectData::new(Some(ticket.clone()));
        assert!(!data.has_changed());

        data.set_current(None);
        assert!(data.has_changed());

        data.rollback();
        assert_eq!(data.current(), Some(&ticket));

        data.clear();
        data.commit();
        assert_eq!(data.original(), None);
    }

    #[test]
    fn test_register_original_item_conflicts() {
        let mut data = ObjectData::new(Some(ObjectId::generate("OrderTicket")));
        assert!(data
            .register_original_item(ObjectId::generate("OrderTicket"))
            .is_err());

        let mut empty = ObjectData::default();
        let ticket = ObjectId::generate("OrderTicket");
        empty.register_original_item(ticket.clone()).unwrap();
        assert_eq!(empty.current(), Some(&ticket));
        assert!(!empty.has_changed());

        empty.unregister_original_item(&ticket);
        assert_eq!(empty, ObjectData::default());
    }
}
