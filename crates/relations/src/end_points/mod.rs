//! Relation end-points
//!
//! One end-point exists per object per relation property. Real end-points
//! store their reference on the owning object; virtual end-points (single
//! object or collection) are derived from the opposite side and loaded on
//! demand.

pub mod collection;
pub mod id;
pub mod load_state;
pub mod map;
pub mod null;
pub mod real_object;
pub mod sync_state;
pub mod virtual_end_point;
pub mod virtual_object;

pub use collection::{ChangeDetectionStrategy, CollectionData, CollectionEndPoint, DomainObjectCollection};
pub use id::RelationEndPointId;
pub use load_state::{CompleteState, LoadState, VirtualEndPointData};
pub use map::{EndPointCallback, RelationEndPointMap};
pub use null::NullEndPoint;
pub use real_object::RealObjectEndPoint;
pub use sync_state::{SyncState, SyncUpdate};
pub use virtual_end_point::VirtualEndPoint;
pub use virtual_object::{ObjectData, VirtualObjectEndPoint};

use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;

/// Capabilities shared by every end-point
pub trait EndPoint {
    fn id(&self) -> &RelationEndPointId;

    fn is_null(&self) -> bool {
        false
    }

    fn is_data_complete(&self) -> bool;

    /// Whether the current data differs from the original data
    fn has_changed(&self) -> bool;

    /// Whether a modification was requested since the last commit, even one
    /// that did not change the value
    fn has_been_touched(&self) -> bool;

    fn touch(&mut self);

    fn commit(&mut self);

    fn rollback(&mut self);

    /// `None` while it is not known whether both sides agree
    fn is_synchronized(&self) -> Option<bool>;

    fn can_be_collected(&self) -> bool;

    fn can_be_marked_incomplete(&self) -> bool;
}

/// A live end-point, owned by a `RelationEndPointMap`
#[derive(Debug, Clone)]
pub enum RelationEndPoint {
    RealObject(RealObjectEndPoint),
    VirtualObject(VirtualObjectEndPoint),
    Collection(CollectionEndPoint),
}

impl RelationEndPoint {
    fn inner(&self) -> &dyn EndPoint {
        match self {
            RelationEndPoint::RealObject(end_point) => end_point,
            RelationEndPoint::VirtualObject(end_point) => end_point,
            RelationEndPoint::Collection(end_point) => end_point,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn EndPoint {
        match self {
            RelationEndPoint::RealObject(end_point) => end_point,
            RelationEndPoint::VirtualObject(end_point) => end_point,
            RelationEndPoint::Collection(end_point) => end_point,
        }
    }

    pub fn as_real_object(&self) -> Option<&RealObjectEndPoint> {
        match self {
            RelationEndPoint::RealObject(end_point) => Some(end_point),
            _ => None,
        }
    }

    pub fn as_real_object_mut(&mut self) -> Option<&mut RealObjectEndPoint> {
        match self {
            RelationEndPoint::RealObject(end_point) => Some(end_point),
            _ => None,
        }
    }

    pub fn as_virtual_object(&self) -> Option<&VirtualObjectEndPoint> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => Some(end_point),
            _ => None,
        }
    }

    pub fn as_virtual_object_mut(&mut self) -> Option<&mut VirtualObjectEndPoint> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => Some(end_point),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionEndPoint> {
        match self {
            RelationEndPoint::Collection(end_point) => Some(end_point),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut CollectionEndPoint> {
        match self {
            RelationEndPoint::Collection(end_point) => Some(end_point),
            _ => None,
        }
    }

    pub fn is_virtual(&self) -> bool {
        !matches!(self, RelationEndPoint::RealObject(_))
    }

    /// Current opposite objects; a single-valued end-point yields zero or one
    pub fn current_items(&self) -> Vec<ObjectId> {
        match self {
            RelationEndPoint::RealObject(end_point) => {
                end_point.opposite_object_id().into_iter().collect()
            }
            RelationEndPoint::VirtualObject(end_point) => end_point.current_items(),
            RelationEndPoint::Collection(end_point) => end_point.current_items(),
        }
    }

    pub fn original_items(&self) -> Vec<ObjectId> {
        match self {
            RelationEndPoint::RealObject(end_point) => {
                end_point.original_opposite_object_id().into_iter().collect()
            }
            RelationEndPoint::VirtualObject(end_point) => end_point.original_items(),
            RelationEndPoint::Collection(end_point) => end_point.original_items(),
        }
    }

    /// Refuse mutation while the end-point disagrees with its opposite side
    pub fn check_synchronized(&self) -> RelationResult<()> {
        match self {
            RelationEndPoint::RealObject(end_point) => {
                end_point.sync_state().check_modifiable(end_point.id())
            }
            RelationEndPoint::VirtualObject(end_point) => end_point.check_synchronized(),
            RelationEndPoint::Collection(end_point) => end_point.check_synchronized(),
        }
    }

    pub fn check_item_removable(&self, item: &ObjectId) -> RelationResult<()> {
        match self {
            RelationEndPoint::RealObject(_) => Ok(()),
            RelationEndPoint::VirtualObject(end_point) => end_point.check_item_removable(item),
            RelationEndPoint::Collection(end_point) => end_point.check_item_removable(item),
        }
    }

    pub fn register_original_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> RelationResult<SyncUpdate> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => {
                Ok(end_point.register_original_opposite_end_point(opposite))
            }
            RelationEndPoint::Collection(end_point) => {
                Ok(end_point.register_original_opposite_end_point(opposite))
            }
            RelationEndPoint::RealObject(end_point) => Err(not_virtual(end_point.id())),
        }
    }

    pub fn unregister_original_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> RelationResult<()> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => {
                end_point.unregister_original_opposite_end_point(opposite)
            }
            RelationEndPoint::Collection(end_point) => {
                end_point.unregister_original_opposite_end_point(opposite)
            }
            RelationEndPoint::RealObject(end_point) => Err(not_virtual(end_point.id())),
        }
    }

    pub fn synchronize_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> RelationResult<SyncUpdate> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => {
                end_point.synchronize_opposite_end_point(opposite)
            }
            RelationEndPoint::Collection(end_point) => {
                end_point.synchronize_opposite_end_point(opposite)
            }
            RelationEndPoint::RealObject(end_point) => Err(not_virtual(end_point.id())),
        }
    }

    pub fn is_opposite_unsynchronized(&self, opposite: &RelationEndPointId) -> Option<bool> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => {
                end_point.is_opposite_unsynchronized(opposite)
            }
            RelationEndPoint::Collection(end_point) => end_point.is_opposite_unsynchronized(opposite),
            RelationEndPoint::RealObject(_) => None,
        }
    }

    pub fn mark_data_incomplete(&mut self) -> RelationResult<Vec<SyncUpdate>> {
        match self {
            RelationEndPoint::VirtualObject(end_point) => end_point.mark_data_incomplete(),
            RelationEndPoint::Collection(end_point) => end_point.mark_data_incomplete(),
            RelationEndPoint::RealObject(end_point) => Err(RelationError::invalid_operation(
                format!("Real end-point '{}' is always complete", end_point.id()),
            )),
        }
    }

    /// Copy the current data of the same end-point in a sub-transaction
    pub fn set_data_from_sub_transaction(&mut self, source: &RelationEndPoint) -> RelationResult<()> {
        match (self, source) {
            (RelationEndPoint::VirtualObject(target), RelationEndPoint::VirtualObject(source)) => {
                if let Some(data) = source.data() {
                    target.data_mut()?.set_data_from_sub_transaction(data);
                }
                Ok(())
            }
            (RelationEndPoint::Collection(target), RelationEndPoint::Collection(source)) => {
                if let Some(data) = source.data() {
                    target.data_mut()?.set_data_from_sub_transaction(data);
                }
                Ok(())
            }
            (target, _) => Err(RelationError::invalid_operation(format!(
                "Cannot take over sub-transaction data for end-point '{}'",
                target.id()
            ))),
        }
    }

    /// Drop every reference held by the end-point, as deleting its owner does
    pub fn clear(&mut self) -> RelationResult<()> {
        match self {
            RelationEndPoint::RealObject(end_point) => end_point.set_opposite_object_id(None),
            RelationEndPoint::VirtualObject(end_point) => end_point.data_mut()?.clear(),
            RelationEndPoint::Collection(end_point) => end_point.data_mut()?.clear(),
        }
        Ok(())
    }
}

fn not_virtual(id: &RelationEndPointId) -> RelationError {
    RelationError::invalid_operation(format!("End-point '{}' is not a virtual end-point", id))
}

impl EndPoint for RelationEndPoint {
    fn id(&self) -> &RelationEndPointId {
        self.inner().id()
    }

    fn is_data_complete(&self) -> bool {
        self.inner().is_data_complete()
    }

    fn has_changed(&self) -> bool {
        self.inner().has_changed()
    }

    fn has_been_touched(&self) -> bool {
        self.inner().has_been_touched()
    }

    fn touch(&mut self) {
        self.inner_mut().touch();
    }

    fn commit(&mut self) {
        self.inner_mut().commit();
    }

    fn rollback(&mut self) {
        self.inner_mut().rollback();
    }

    fn is_synchronized(&self) -> Option<bool> {
        self.inner().is_synchronized()
    }

    fn can_be_collected(&self) -> bool {
        self.inner().can_be_collected()
    }

    fn can_be_marked_incomplete(&self) -> bool {
        self.inner().can_be_marked_incomplete()
    }
}
