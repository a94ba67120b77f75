//! Load-state machine of virtual end-points
//!
//! A virtual end-point starts `Incomplete`, remembering only which real
//! end-points registered themselves as pointing at it. Installing data moves
//! it to `Complete`; the registered real end-points are then matched against
//! the loaded items, which determines their sync state.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::mapping::EndPointDefinition;

use super::id::RelationEndPointId;
use super::sync_state::{SyncState, SyncUpdate};

/// Data held by a complete virtual end-point
pub trait VirtualEndPointData: Clone + fmt::Debug {
    fn current_items(&self) -> Vec<ObjectId>;

    fn original_items(&self) -> Vec<ObjectId>;

    fn contains_current(&self, item: &ObjectId) -> bool {
        self.current_items().contains(item)
    }

    fn has_changed(&self) -> bool;

    fn commit(&mut self);

    fn rollback(&mut self);

    /// Add an item to both the original and the current data
    fn register_original_item(&mut self, item: ObjectId) -> RelationResult<()>;

    /// Remove an item from both the original and the current data
    fn unregister_original_item(&mut self, item: &ObjectId);

    /// Replace the current data with the current data of a sub-transaction
    fn set_data_from_sub_transaction(&mut self, source: &Self);

    /// Drop all current items
    fn clear(&mut self);
}

#[derive(Debug, Clone)]
pub struct CompleteState<D> {
    data: D,
    items_without_end_points: BTreeSet<ObjectId>,
    unsynchronized_opposite_end_points: BTreeSet<RelationEndPointId>,
}

impl<D> CompleteState<D> {
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Loaded items whose real end-point points elsewhere
    pub fn items_without_end_points(&self) -> &BTreeSet<ObjectId> {
        &self.items_without_end_points
    }

    /// Real end-points pointing here whose owner is not part of the data
    pub fn unsynchronized_opposite_end_points(&self) -> &BTreeSet<RelationEndPointId> {
        &self.unsynchronized_opposite_end_points
    }
}

#[derive(Debug, Clone)]
pub enum LoadState<D> {
    Incomplete {
        original_opposite_end_points: BTreeSet<RelationEndPointId>,
    },
    Complete(CompleteState<D>),
}

impl<D> Default for LoadState<D> {
    fn default() -> Self {
        LoadState::Incomplete {
            original_opposite_end_points: BTreeSet::new(),
        }
    }
}

impl<D: VirtualEndPointData> LoadState<D> {
    pub fn is_complete(&self) -> bool {
        matches!(self, LoadState::Complete(_))
    }

    pub fn data(&self) -> Option<&D> {
        match self {
            LoadState::Complete(state) => Some(&state.data),
            LoadState::Incomplete { .. } => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut D> {
        match self {
            LoadState::Complete(state) => Some(&mut state.data),
            LoadState::Incomplete { .. } => None,
        }
    }

    pub fn complete_state(&self) -> Option<&CompleteState<D>> {
        match self {
            LoadState::Complete(state) => Some(state),
            LoadState::Incomplete { .. } => None,
        }
    }

    /// Real end-points registered while incomplete
    pub fn original_opposite_end_points(&self) -> Option<&BTreeSet<RelationEndPointId>> {
        match self {
            LoadState::Incomplete {
                original_opposite_end_points,
            } => Some(original_opposite_end_points),
            LoadState::Complete(_) => None,
        }
    }

    pub fn has_changed(&self) -> bool {
        self.data().map_or(false, D::has_changed)
    }

    pub fn is_synchronized(&self) -> Option<bool> {
        self.complete_state()
            .map(|state| state.items_without_end_points.is_empty())
    }

    pub fn can_be_collected(&self) -> bool {
        match self {
            LoadState::Incomplete {
                original_opposite_end_points,
            } => original_opposite_end_points.is_empty(),
            LoadState::Complete(_) => false,
        }
    }

    pub fn can_be_marked_incomplete(&self) -> bool {
        !self.has_changed()
    }

    /// Install loaded data
    pub fn mark_data_complete(
        &mut self,
        end_point_id: &RelationEndPointId,
        data: D,
    ) -> RelationResult<Vec<SyncUpdate>> {
        let originals = match self {
            LoadState::Incomplete {
                original_opposite_end_points,
            } => mem::take(original_opposite_end_points),
            LoadState::Complete(_) => {
                return Err(RelationError::invalid_operation(format!(
                    "The data of end-point '{}' is already complete",
                    end_point_id
                )))
            }
        };

        let items = data.original_items();
        let mut updates = Vec::with_capacity(originals.len());
        let mut registered_items = BTreeSet::new();
        let mut unsynchronized = BTreeSet::new();

        for opposite in originals {
            match opposite.object_id() {
                Some(item) if items.contains(item) => {
                    registered_items.insert(item.clone());
                    updates.push((opposite, SyncState::Synchronized));
                }
                _ => {
                    unsynchronized.insert(opposite.clone());
                    updates.push((opposite, SyncState::Unsynchronized));
                }
            }
        }

        let items_without_end_points = items
            .into_iter()
            .filter(|item| !registered_items.contains(item))
            .collect();

        *self = LoadState::Complete(CompleteState {
            data,
            items_without_end_points,
            unsynchronized_opposite_end_points: unsynchronized,
        });
        Ok(updates)
    }

    /// Drop the loaded data, returning to `Incomplete`
    pub fn mark_data_incomplete(
        &mut self,
        end_point_id: &RelationEndPointId,
        opposite_definition: &Arc<EndPointDefinition>,
    ) -> RelationResult<Vec<SyncUpdate>> {
        let state = match self {
            LoadState::Incomplete { .. } => return Ok(Vec::new()),
            LoadState::Complete(state) => state,
        };

        if state.data.has_changed() {
            return Err(RelationError::invalid_operation(format!(
                "Cannot mark end-point '{}' incomplete because it has been changed",
                end_point_id
            )));
        }

        let mut originals = BTreeSet::new();
        for item in state.data.original_items() {
            if !state.items_without_end_points.contains(&item) {
                originals.insert(RelationEndPointId::new(
                    Some(item),
                    Arc::clone(opposite_definition),
                )?);
            }
        }
        originals.extend(state.unsynchronized_opposite_end_points.iter().cloned());

        let updates = originals
            .iter()
            .map(|opposite| (opposite.clone(), SyncState::Unknown))
            .collect();

        *self = LoadState::Incomplete {
            original_opposite_end_points: originals,
        };
        Ok(updates)
    }

    /// A real end-point pointing here was registered
    pub fn register_original_opposite_end_point(
        &mut self,
        opposite: &RelationEndPointId,
    ) -> SyncUpdate {
        match self {
            LoadState::Incomplete {
                original_opposite_end_points,
            } => {
                original_opposite_end_points.insert(opposite.clone());
                (opposite.clone(), SyncState::Unknown)
            }
            LoadState::Complete(state) => match opposite.object_id() {
                Some(item) if state.items_without_end_points.remove(item) => {
                    (opposite.clone(), SyncState::Synchronized)
                }
                _ => {
                    state
                        .unsynchronized_opposite_end_points
                        .insert(opposite.clone());
                    (opposite.clone(), SyncState::Unsynchronized)
                }
            },
        }
    }

    /// A real end-point pointing here is about to be removed
    pub fn unregister_original_opposite_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
        opposite: &RelationEndPointId,
    ) -> RelationResult<()> {
        let removed = match self {
            LoadState::Incomplete {
                original_opposite_end_points,
            } => original_opposite_end_points.remove(opposite),
            LoadState::Complete(state) => state.unsynchronized_opposite_end_points.remove(opposite),
        };

        if removed {
            Ok(())
        } else {
            Err(RelationError::invalid_operation(format!(
                "Cannot unregister end-point '{}' from '{}': it is not registered or the data is complete",
                opposite, end_point_id
            )))
        }
    }

    /// Take an unsynchronized real end-point's owner into the data
    pub fn synchronize_opposite_end_point(
        &mut self,
        end_point_id: &RelationEndPointId,
        opposite: &RelationEndPointId,
    ) -> RelationResult<SyncUpdate> {
        let state = match self {
            LoadState::Complete(state)
                if state.unsynchronized_opposite_end_points.contains(opposite) =>
            {
                state
            }
            _ => {
                return Err(RelationError::invalid_operation(format!(
                    "End-point '{}' is not registered as unsynchronized with '{}'",
                    opposite, end_point_id
                )))
            }
        };

        let item = opposite.require_object_id()?.clone();
        state.data.register_original_item(item)?;
        state.unsynchronized_opposite_end_points.remove(opposite);
        Ok((opposite.clone(), SyncState::Synchronized))
    }

    /// Drop the loaded items that have no matching real end-point
    pub fn synchronize(&mut self) {
        if let LoadState::Complete(state) = self {
            for item in mem::take(&mut state.items_without_end_points) {
                state.data.unregister_original_item(&item);
            }
        }
    }

    /// Refuse wholesale mutation while the data disagrees with the opposite side
    pub fn check_synchronized(&self, end_point_id: &RelationEndPointId) -> RelationResult<()> {
        let state = match self {
            LoadState::Complete(state) => state,
            LoadState::Incomplete { .. } => return Ok(()),
        };

        if !state.items_without_end_points.is_empty() {
            return Err(RelationError::unsynchronized(
                end_point_id,
                "it contains objects whose relation points elsewhere",
            ));
        }
        if !state.unsynchronized_opposite_end_points.is_empty() {
            return Err(RelationError::unsynchronized(
                end_point_id,
                "objects pointing to it are not part of its data",
            ));
        }
        Ok(())
    }

    /// Refuse removal of an item that has no matching real end-point
    pub fn check_item_removable(
        &self,
        end_point_id: &RelationEndPointId,
        item: &ObjectId,
    ) -> RelationResult<()> {
        match self {
            LoadState::Complete(state) if state.items_without_end_points.contains(item) => {
                Err(RelationError::unsynchronized(
                    end_point_id,
                    format!("the relation of '{}' does not point back to it", item),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Whether a registered real end-point is unsynchronized, `None` while incomplete
    pub fn is_opposite_unsynchronized(&self, opposite: &RelationEndPointId) -> Option<bool> {
        self.complete_state()
            .map(|state| state.unsynchronized_opposite_end_points.contains(opposite))
    }

    pub fn commit(&mut self) {
        if let Some(data) = self.data_mut() {
            data.commit();
        }
    }

    pub fn rollback(&mut self) {
        if let Some(data) = self.data_mut() {
            data.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::end_points::collection::{ChangeDetectionStrategy, CollectionData};
    use crate::identity::CollectionId;
    use crate::mapping::{MappingConfiguration, RelationDefinition, RelationSchema};

    struct Fixture {
        mapping: MappingConfiguration,
        customer: ObjectId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                mapping: MappingConfiguration::from_relations([RelationDefinition::one_to_many(
                    "Customer", "Orders", "Order", "Customer",
                )])
                .unwrap(),
                customer: ObjectId::generate("Customer"),
            }
        }

        fn orders_id(&self) -> RelationEndPointId {
            RelationEndPointId::for_property(&self.mapping, &self.customer, "Orders").unwrap()
        }

        fn customer_id(&self, order: &ObjectId) -> RelationEndPointId {
            RelationEndPointId::for_property(&self.mapping, order, "Customer").unwrap()
        }

        fn real_definition(&self) -> Arc<EndPointDefinition> {
            self.mapping.end_point_definition("Order", "Customer").unwrap()
        }
    }

    fn collection(items: Vec<ObjectId>) -> CollectionData {
        CollectionData::new(items, CollectionId::generate(), ChangeDetectionStrategy::SetEquality)
    }

    #[test]
    fn test_registration_while_incomplete_is_unknown() {
        let fixture = Fixture::new();
        let order = ObjectId::generate("Order");
        let mut state = LoadState::<CollectionData>::default();

        let (_, sync) = state.register_original_opposite_end_point(&fixture.customer_id(&order));
        assert_eq!(sync, SyncState::Unknown);
        assert!(!state.can_be_collected());
        assert_eq!(state.is_synchronized(), None);
    }

    #[test]
    fn test_mark_complete_determines_sync_states() {
        let fixture = Fixture::new();
        let member = ObjectId::generate("Order");
        let stray = ObjectId::generate("Order");
        let foreign = ObjectId::generate("Order");
        let mut state = LoadState::default();

        state.register_original_opposite_end_point(&fixture.customer_id(&member));
        state.register_original_opposite_end_point(&fixture.customer_id(&stray));

        let updates = state
            .mark_data_complete(&fixture.orders_id(), collection(vec![member.clone(), foreign.clone()]))
            .unwrap();

        assert!(updates.contains(&(fixture.customer_id(&member), SyncState::Synchronized)));
        assert!(updates.contains(&(fixture.customer_id(&stray), SyncState::Unsynchronized)));

        let complete = state.complete_state().unwrap();
        assert!(complete.items_without_end_points().contains(&foreign));
        assert_eq!(state.is_synchronized(), Some(false));
        assert!(state.check_synchronized(&fixture.orders_id()).is_err());
        assert!(state.check_item_removable(&fixture.orders_id(), &foreign).is_err());
        assert!(state.check_item_removable(&fixture.orders_id(), &member).is_ok());
    }

    #[test]
    fn test_mark_complete_twice_fails() {
        let fixture = Fixture::new();
        let mut state = LoadState::default();
        state.mark_data_complete(&fixture.orders_id(), collection(vec![])).unwrap();

        assert!(state
            .mark_data_complete(&fixture.orders_id(), collection(vec![]))
            .is_err());
    }

    #[test]
    fn test_mark_incomplete_restores_registrations() {
        let fixture = Fixture::new();
        let member = ObjectId::generate("Order");
        let mut state = LoadState::default();
        state.register_original_opposite_end_point(&fixture.customer_id(&member));
        state
            .mark_data_complete(&fixture.orders_id(), collection(vec![member.clone()]))
            .unwrap();

        let updates = state
            .mark_data_incomplete(&fixture.orders_id(), &fixture.real_definition())
            .unwrap();

        assert_eq!(updates, vec![(fixture.customer_id(&member), SyncState::Unknown)]);
        assert!(state
            .original_opposite_end_points()
            .unwrap()
            .contains(&fixture.customer_id(&member)));
    }

    #[test]
    fn test_changed_data_cannot_be_marked_incomplete() {
        let fixture = Fixture::new();
        let mut state = LoadState::default();
        state.mark_data_complete(&fixture.orders_id(), collection(vec![])).unwrap();
        state
            .data_mut()
            .unwrap()
            .insert(0, ObjectId::generate("Order"))
            .unwrap();

        assert!(!state.can_be_marked_incomplete());
        assert!(state
            .mark_data_incomplete(&fixture.orders_id(), &fixture.real_definition())
            .is_err());
    }

    #[test]
    fn test_synchronize_opposite_end_point_adds_item() {
        let fixture = Fixture::new();
        let late = ObjectId::generate("Order");
        let mut state = LoadState::default();
        state.mark_data_complete(&fixture.orders_id(), collection(vec![])).unwrap();

        let (_, sync) = state.register_original_opposite_end_point(&fixture.customer_id(&late));
        assert_eq!(sync, SyncState::Unsynchronized);

        let (_, sync) = state
            .synchronize_opposite_end_point(&fixture.orders_id(), &fixture.customer_id(&late))
            .unwrap();
        assert_eq!(sync, SyncState::Synchronized);

        let data = state.data().unwrap();
        assert_eq!(data.current_items(), vec![late.clone()]);
        assert_eq!(data.original_items(), vec![late]);
        assert!(!state.has_changed());
    }

    #[test]
    fn test_synchronize_drops_items_without_end_points() {
        let fixture = Fixture::new();
        let foreign = ObjectId::generate("Order");
        let mut state = LoadState::default();
        state
            .mark_data_complete(&fixture.orders_id(), collection(vec![foreign]))
            .unwrap();

        state.synchronize();

        assert!(state.data().unwrap().current_items().is_empty());
        assert_eq!(state.is_synchronized(), Some(true));
    }

    #[test]
    fn test_unregister_from_incomplete_state() {
        let fixture = Fixture::new();
        let order = ObjectId::generate("Order");
        let mut state = LoadState::<CollectionData>::default();
        state.register_original_opposite_end_point(&fixture.customer_id(&order));

        state
            .unregister_original_opposite_end_point(&fixture.orders_id(), &fixture.customer_id(&order))
            .unwrap();
        assert!(state.can_be_collected());
        assert!(state
            .unregister_original_opposite_end_point(&fixture.orders_id(), &fixture.customer_id(&order))
            .is_err());
    }
}
