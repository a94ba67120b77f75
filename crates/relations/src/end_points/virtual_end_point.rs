use std::sync::Arc;

use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::mapping::EndPointDefinition;

use super::id::RelationEndPointId;
use super::load_state::{LoadState, VirtualEndPointData};
use super::sync_state::SyncUpdate;
use super::EndPoint;

/// An end-point whose data is derived from the opposite side and loaded lazily
#[derive(Debug, Clone)]
pub struct VirtualEndPoint<D> {
    id: RelationEndPointId,
    opposite_definition: Arc<EndPointDefinition>,
    load_state: LoadState<D>,
    touched: bool,
}

impl<D: VirtualEndPointData> VirtualEndPoint<D> {
    pub fn new(id: RelationEndPointId, opposite_definition: Arc<EndPointDefinition>) -> Self {
        Self {
            id,
            opposite_definition,
            load_state: LoadState::default(),
            touched: false,
        }
    }

    pub fn opposite_definition(&self) -> &Arc<EndPointDefinition> {
        &self.opposite_definition
    }

    pub fn load_state(&self) -> &LoadState<D> {
        &self.load_state
    }

    pub fn data(&self) -> Option<&D> {
        self.load_state.data()
    }

    /// Mutable data, failing while the end-point is incomplete
    pub fn data_mut(&mut self) -> RelationResult<&mut D> {
        let id = &self.id;
        self.load_state.data_mut().ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "The data of end-point '{}' has not been loaded",
                id
            ))
        })
    }

    pub fn current_items(&self) -> Vec<ObjectId> {
        self.data().map(D::current_items).unwrap_or_default()
    }

    pub fn original_items(&self) -> Vec<ObjectId> {
        self.data().map(D::original_items).unwrap_or_default()
    }

    pub fn mark_data_complete(&mut self, data: D) -> RelationResult<Vec<SyncUpdate>> {
        self.load_state.mark_data_complete(&self.id, data)
    }

    pub fn mark_data_incomplete(&mut self) -> RelationResult<Vec<SyncUpdate>> {
        let updates = self
            .load_state
            .mark_data_incomplete(&self.id, &self.opposite_definition)?;
        self.touched = false;
        Ok(updates)
    }

    pub fn register_original_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> SyncUpdate {
        self.load_state.register_original_opposite_end_point(opposite)
    }

    pub fn unregister_original_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> RelationResult<()> {
        self.load_state
            .unregister_original_opposite_end_point(&self.id, opposite)
    }

    pub fn synchronize_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> RelationResult<SyncUpdate> {
        self.load_state
            .synchronize_opposite_end_point(&self.id, opposite)
    }

    pub fn synchronize(&mut self) {
        self.load_state.synchronize();
    }

    pub fn check_synchronized(&self) -> RelationResult<()> {
        self.load_state.check_synchronized(&self.id)
    }

    pub fn check_item_removable(&self, item: &ObjectId) -> RelationResult<()> {
        self.load_state.check_item_removable(&self.id, item)
    }

    pub fn is_opposite_unsynchronized(&self, opposite: &RelationEndPointId) -> Option<bool> {
        self.load_state.is_opposite_unsynchronized(opposite)
    }

    /// Whether both the current and the original data are empty
    pub fn is_empty(&self) -> bool {
        self.current_items().is_empty() && self.original_items().is_empty()
    }
}

impl<D: VirtualEndPointData> EndPoint for VirtualEndPoint<D> {
    fn id(&self) -> &RelationEndPointId {
        &self.id
    }

    fn is_data_complete(&self) -> bool {
        self.load_state.is_complete()
    }

    fn has_changed(&self) -> bool {
        self.load_state.has_changed()
    }

    fn has_been_touched(&self) -> bool {
        self.touched
    }

    fn touch(&mut self) {
        self.touched = true;
    }

    fn commit(&mut self) {
        self.load_state.commit();
        self.touched = false;
    }

    fn rollback(&mut self) {
        self.load_state.rollback();
        self.touched = false;
    }

    fn is_synchronized(&self) -> Option<bool> {
        self.load_state.is_synchronized()
    }

    fn can_be_collected(&self) -> bool {
        !self.touched && self.load_state.can_be_collected()
    }

    fn can_be_marked_incomplete(&self) -> bool {
        self.load_state.can_be_marked_incomplete()
    }
}
