//! Unloading of unchanged data from the current scope

use std::rc::Rc;

use crate::data_container::DataContainerState;
use crate::end_points::{EndPoint, EndPointCallback, RelationEndPointId};
use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;

use super::ClientTransaction;

impl ClientTransaction {
    /// Remove an unchanged object and its end-points from the current scope
    ///
    /// Complete virtual end-points of the object and those on the opposite
    /// side of its references are demoted to incomplete first, so the next
    /// access reloads them. Nothing is unloaded if any of them, or the
    /// object itself, has changed; all problems are reported together.
    pub fn unload_data(&mut self, object_id: &ObjectId) -> RelationResult<()> {
        let level = self.leaf_level();
        let container = match self.scopes[level].data_containers.get(object_id) {
            Some(container) => container,
            None => return Ok(()),
        };
        let state = container.borrow().state();

        let virtual_end_points = self.end_points_to_unload(object_id)?;
        let command = self.scopes[level]
            .end_points
            .create_unload_virtual_end_points_command(&virtual_end_points);

        let mut messages: Vec<String> = command
            .errors()
            .into_iter()
            .flat_map(|error| match error {
                RelationError::UnloadFailed { messages } => messages,
                other => vec![other.to_string()],
            })
            .collect();
        if state != DataContainerState::Unchanged {
            messages.push(format!(
                "The state of object '{}' is {:?}; only unchanged objects can be unloaded.",
                object_id, state
            ));
        }
        if !messages.is_empty() {
            tracing::warn!("Cannot unload object '{}': {}", object_id, messages.join(" "));
            return Err(RelationError::UnloadFailed { messages });
        }

        self.record_modification();
        let schema = Rc::clone(&self.schema);
        let listeners = &self.listeners;
        let scope = &mut self.scopes[level];
        let on_unregistering: &mut EndPointCallback<'_> =
            &mut |id: &RelationEndPointId| listeners.notify_unregistering(id);

        command.perform(&mut scope.end_points, schema.as_ref(), on_unregistering)?;
        scope
            .end_points
            .create_unregister_command_for_data_container(object_id, schema.as_ref())
            .perform(&mut scope.end_points, schema.as_ref(), on_unregistering)?;
        scope.data_containers.remove(object_id)?;

        tracing::debug!(
            "Unloaded object '{}' and {} virtual end-point(s) at level {}",
            object_id,
            virtual_end_points.len(),
            level
        );
        Ok(())
    }

    /// Demote unchanged virtual end-points to incomplete
    pub fn unload_virtual_end_points(&mut self, end_point_ids: &[RelationEndPointId]) -> RelationResult<()> {
        self.record_modification();
        let level = self.leaf_level();
        let schema = Rc::clone(&self.schema);
        let listeners = &self.listeners;
        let scope = &mut self.scopes[level];

        let command = scope.end_points.create_unload_virtual_end_points_command(end_point_ids);
        if !command.can_execute() {
            tracing::warn!("Cannot unload {} virtual end-point(s)", end_point_ids.len());
        }
        command.perform(&mut scope.end_points, schema.as_ref(), &mut |id| {
            listeners.notify_unregistering(id)
        })?;
        tracing::debug!("Unloaded {} virtual end-point(s)", end_point_ids.len());
        Ok(())
    }

    /// The complete virtual end-points owned by an object or referenced by
    /// its real end-points
    fn end_points_to_unload(&self, object_id: &ObjectId) -> RelationResult<Vec<RelationEndPointId>> {
        let scope = self.leaf();
        let mut ids = Vec::new();

        for id in scope.end_points.end_point_ids_for_object(object_id) {
            let end_point = match scope.end_points.get(&id) {
                Some(end_point) => end_point,
                None => continue,
            };

            if id.is_virtual() {
                if end_point.is_data_complete() {
                    ids.push(id);
                }
                continue;
            }

            let opposite_object = end_point.current_items().into_iter().next();
            if opposite_object.is_none() || self.opposite_definition(&id)?.is_anonymous() {
                continue;
            }
            let opposite = id.opposite(self.schema.as_ref(), opposite_object)?;
            let complete = scope
                .end_points
                .get(&opposite)
                .map_or(false, |end_point| end_point.is_data_complete());
            if complete && !ids.contains(&opposite) {
                ids.push(opposite);
            }
        }
        Ok(ids)
    }
}
