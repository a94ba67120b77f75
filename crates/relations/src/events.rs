//! Transaction events - the change notification protocol
//!
//! Every relation command raises its "changing" notifications before anything
//! is modified and its "changed" notifications afterwards, in mirrored order.
//! A listener cancels a change by returning an error from a "changing"
//! callback.

use crate::end_points::RelationEndPointId;
use crate::event_error::EventError;
use crate::identity::ObjectId;
use crate::transaction::ClientTransaction;

/// A single-valued or collection relation is about to change / has changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationChange {
    pub end_point_id: RelationEndPointId,
    pub old_related_object: Option<ObjectId>,
    pub new_related_object: Option<ObjectId>,
}

impl RelationChange {
    /// The object whose relation changes
    pub fn object_id(&self) -> Option<&ObjectId> {
        self.end_point_id.object_id()
    }

    pub fn property_name(&self) -> Option<&str> {
        self.end_point_id.property_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOperation {
    Add,
    Remove,
}

/// An item is being added to or removed from a collection end-point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionChange {
    pub end_point_id: RelationEndPointId,
    pub operation: CollectionOperation,
    pub item: ObjectId,
    pub index: Option<usize>,
}

/// One notification raised by a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Relation(RelationChange),
    Collection(CollectionChange),
    ObjectDelete(ObjectId),
}

/// Observer of relation changes in a transaction
///
/// All methods default to no-ops. Change callbacks receive the transaction
/// and may read or modify the object graph.
pub trait ClientTransactionListener {
    fn relation_changing(
        &self,
        _transaction: &mut ClientTransaction,
        _change: &RelationChange,
    ) -> Result<(), EventError> {
        Ok(())
    }

    fn relation_changed(
        &self,
        _transaction: &mut ClientTransaction,
        _change: &RelationChange,
    ) -> Result<(), EventError> {
        Ok(())
    }

    fn collection_changing(
        &self,
        _transaction: &mut ClientTransaction,
        _change: &CollectionChange,
    ) -> Result<(), EventError> {
        Ok(())
    }

    fn collection_changed(
        &self,
        _transaction: &mut ClientTransaction,
        _change: &CollectionChange,
    ) -> Result<(), EventError> {
        Ok(())
    }

    fn object_deleting(
        &self,
        _transaction: &mut ClientTransaction,
        _object_id: &ObjectId,
    ) -> Result<(), EventError> {
        Ok(())
    }

    fn object_deleted(
        &self,
        _transaction: &mut ClientTransaction,
        _object_id: &ObjectId,
    ) -> Result<(), EventError> {
        Ok(())
    }

    fn relation_end_point_registering(&self, _end_point_id: &RelationEndPointId) {}

    fn relation_end_point_unregistering(&self, _end_point_id: &RelationEndPointId) {}
}
