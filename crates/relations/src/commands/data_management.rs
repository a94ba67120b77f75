//! Commands that register, unregister or unload end-points without touching
//! relation data

use crate::end_points::{EndPoint, EndPointCallback, RelationEndPointId, RelationEndPointMap};
use crate::error::{RelationError, RelationResult};
use crate::mapping::RelationSchema;

/// A bookkeeping command produced by the end-point map
///
/// Commands that cannot run carry their error instead of failing at
/// construction, so callers can collect the errors of several commands
/// before deciding.
#[derive(Debug, Clone, PartialEq)]
pub enum DataManagementCommand {
    /// Remove the end-points of an object being unregistered
    Unregister { end_point_ids: Vec<RelationEndPointId> },
    /// Return complete virtual end-points to the incomplete state
    UnloadVirtualEndPoints { end_point_ids: Vec<RelationEndPointId> },
    Composite(Vec<DataManagementCommand>),
    Exception(RelationError),
    Nop,
}

impl DataManagementCommand {
    pub fn composite(commands: impl IntoIterator<Item = DataManagementCommand>) -> Self {
        let commands: Vec<_> = commands
            .into_iter()
            .filter(|command| !matches!(command, DataManagementCommand::Nop))
            .collect();
        match commands.len() {
            0 => DataManagementCommand::Nop,
            _ => DataManagementCommand::Composite(commands),
        }
    }

    pub fn errors(&self) -> Vec<RelationError> {
        match self {
            DataManagementCommand::Exception(error) => vec![error.clone()],
            DataManagementCommand::Composite(commands) => {
                commands.iter().flat_map(DataManagementCommand::errors).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn can_execute(&self) -> bool {
        match self {
            DataManagementCommand::Exception(_) => false,
            DataManagementCommand::Composite(commands) => {
                commands.iter().all(DataManagementCommand::can_execute)
            }
            _ => true,
        }
    }

    /// Run the command; a command carrying errors fails before doing anything
    pub fn perform(
        &self,
        end_points: &mut RelationEndPointMap,
        schema: &dyn RelationSchema,
        on_unregistering: &mut EndPointCallback<'_>,
    ) -> RelationResult<()> {
        if let Some(error) = self.errors().into_iter().next() {
            return Err(error);
        }
        self.perform_unchecked(end_points, schema, on_unregistering)
    }

    fn perform_unchecked(
        &self,
        end_points: &mut RelationEndPointMap,
        schema: &dyn RelationSchema,
        on_unregistering: &mut EndPointCallback<'_>,
    ) -> RelationResult<()> {
        match self {
            DataManagementCommand::Unregister { end_point_ids } => {
                for id in end_point_ids.iter().filter(|id| !id.is_virtual()) {
                    if end_points.contains(id) {
                        end_points.unregister_real_object_end_point(id, schema, on_unregistering)?;
                    }
                }
                for id in end_point_ids.iter().filter(|id| id.is_virtual()) {
                    let complete = match end_points.get(id) {
                        Some(end_point) => end_point.is_data_complete(),
                        None => continue,
                    };
                    if complete {
                        on_unregistering(id);
                        end_points.remove_end_point(id)?;
                    } else {
                        end_points.remove_if_collectible(id, on_unregistering);
                    }
                }
            }
            DataManagementCommand::UnloadVirtualEndPoints { end_point_ids } => {
                for id in end_point_ids {
                    tracing::debug!("Unloading virtual end-point '{}'", id);
                    end_points.mark_data_incomplete(id)?;
                    end_points.remove_if_collectible(id, on_unregistering);
                }
            }
            DataManagementCommand::Composite(commands) => {
                for command in commands {
                    command.perform_unchecked(end_points, schema, on_unregistering)?;
                }
            }
            DataManagementCommand::Exception(error) => return Err(error.clone()),
            DataManagementCommand::Nop => {}
        }
        Ok(())
    }
}
