use crate::error::{RelationError, RelationResult};

use super::id::RelationEndPointId;

/// Agreement status of a real end-point with the opposite virtual end-point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// The opposite side has not been loaded since this end-point was registered
    #[default]
    Unknown,
    Synchronized,
    /// The opposite side was loaded and does not contain this end-point's owner
    Unsynchronized,
}

impl SyncState {
    /// Tri-state answer: `None` while the state is unknown
    pub fn is_synchronized(&self) -> Option<bool> {
        match self {
            SyncState::Unknown => None,
            SyncState::Synchronized => Some(true),
            SyncState::Unsynchronized => Some(false),
        }
    }

    /// Refuse mutation of an unsynchronized end-point
    pub fn check_modifiable(&self, end_point_id: &RelationEndPointId) -> RelationResult<()> {
        match self {
            SyncState::Unsynchronized => Err(RelationError::unsynchronized(
                end_point_id,
                "the opposite end-point does not contain this object; synchronize the end-point before modifying it",
            )),
            SyncState::Unknown | SyncState::Synchronized => Ok(()),
        }
    }
}

/// A sync-state change computed by a load-state transition
pub type SyncUpdate = (RelationEndPointId, SyncState);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ObjectId;
    use crate::mapping::{MappingConfiguration, RelationDefinition};

    #[test]
    fn test_tri_state() {
        assert_eq!(SyncState::default(), SyncState::Unknown);
        assert_eq!(SyncState::Unknown.is_synchronized(), None);
        assert_eq!(SyncState::Synchronized.is_synchronized(), Some(true));
        assert_eq!(SyncState::Unsynchronized.is_synchronized(), Some(false));
    }

    #[test]
    fn test_unsynchronized_refuses_modification() {
        let mapping = MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();
        let id =
            RelationEndPointId::for_property(&mapping, &ObjectId::generate("Order"), "Customer")
                .unwrap();

        assert!(SyncState::Synchronized.check_modifiable(&id).is_ok());
        assert!(SyncState::Unknown.check_modifiable(&id).is_ok());

        let error = SyncState::Unsynchronized.check_modifiable(&id).unwrap_err();
        assert!(matches!(error, RelationError::Unsynchronized { .. }));
    }
}
