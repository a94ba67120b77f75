//! Detection and repair of end-points that disagree with their opposite side

use std::rc::Rc;

use crate::end_points::RelationEndPointId;
use crate::error::{RelationError, RelationResult};

use super::ClientTransaction;

impl ClientTransaction {
    /// Whether an end-point agrees with its opposite side in every scope of
    /// the hierarchy where it is registered
    ///
    /// `None` means it is not known yet; nothing is loaded to find out.
    pub fn is_synchronized(&self, end_point_id: &RelationEndPointId) -> RelationResult<Option<bool>> {
        self.check_synchronizable(end_point_id)?;

        let mut result = Some(true);
        for scope in self.scopes.iter().filter(|scope| scope.end_points.contains(end_point_id)) {
            match scope.end_points.is_synchronized(end_point_id, self.schema.as_ref())? {
                Some(false) => return Ok(Some(false)),
                None => result = None,
                Some(true) => {}
            }
        }
        Ok(result)
    }

    /// Bring an unsynchronized end-point back in line, in every scope
    ///
    /// A real end-point is registered with the opposite side it points to;
    /// a virtual end-point drops the loaded items that do not point back.
    pub fn synchronize(&mut self, end_point_id: &RelationEndPointId) -> RelationResult<()> {
        self.check_synchronizable(end_point_id)?;

        self.record_modification();
        let schema = Rc::clone(&self.schema);
        for scope in self.scopes.iter_mut() {
            if !scope.end_points.contains(end_point_id) {
                continue;
            }
            if end_point_id.is_virtual() {
                scope.end_points.synchronize_virtual_end_point(end_point_id)?;
            } else {
                scope
                    .end_points
                    .synchronize_real_object_end_point(end_point_id, schema.as_ref())?;
            }
            tracing::debug!(
                "Synchronized end-point '{}' at level {}",
                end_point_id,
                scope.depth
            );
        }
        Ok(())
    }

    fn check_synchronizable(&self, end_point_id: &RelationEndPointId) -> RelationResult<()> {
        end_point_id.check_not_anonymous()?;
        if self.opposite_definition(end_point_id)?.is_anonymous() {
            return Err(RelationError::invalid_argument(
                "end_point_id",
                format!(
                    "End-point '{}' belongs to a unidirectional relation, which is always synchronized",
                    end_point_id
                ),
            ));
        }
        if !self.scopes.iter().any(|scope| scope.end_points.contains(end_point_id)) {
            return Err(RelationError::invalid_operation(format!(
                "End-point '{}' has not been loaded into the transaction hierarchy",
                end_point_id
            )));
        }
        Ok(())
    }
}
