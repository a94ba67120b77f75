use std::fmt;
use std::rc::Rc;

use crate::commands::Command;
use crate::config::RelationConfig;
use crate::data_container::{DataContainer, DataContainerState};
use crate::end_points::{EndPoint, RelationEndPointId};
use crate::error::{RelationError, RelationResult};
use crate::event_error::EventError;
use crate::events::{ClientTransactionListener, Notification};
use crate::identity::ObjectId;
use crate::loader::{ObjectStore, PersistableData};
use crate::mapping::RelationSchema;
use crate::observers::ListenerRegistry;

use super::scope::TransactionScope;

/// Unit of work over a relation graph
///
/// Owns one scope per hierarchy level. All public operations act on the
/// innermost (leaf) scope; a sub-transaction becomes the leaf when it begins
/// and hands control back to its parent when it is discarded.
pub struct ClientTransaction {
    pub(super) schema: Rc<dyn RelationSchema>,
    pub(super) store: Rc<dyn ObjectStore>,
    pub(super) listeners: ListenerRegistry,
    pub(super) config: RelationConfig,
    pub(super) scopes: Vec<TransactionScope>,
    /// Bumped by every operation that modifies relation data or the scope
    /// stack
    pub(super) modification_count: u64,
}

impl ClientTransaction {
    pub fn new(schema: Rc<dyn RelationSchema>, store: Rc<dyn ObjectStore>) -> Self {
        Self::with_config(schema, store, RelationConfig::default())
    }

    pub fn with_config(
        schema: Rc<dyn RelationSchema>,
        store: Rc<dyn ObjectStore>,
        config: RelationConfig,
    ) -> Self {
        let root = TransactionScope::root(config.reclaim_collectible_end_points);
        Self {
            schema,
            store,
            listeners: ListenerRegistry::new(),
            config,
            scopes: vec![root],
            modification_count: 0,
        }
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    pub fn schema(&self) -> &dyn RelationSchema {
        self.schema.as_ref()
    }

    pub fn add_listener(&mut self, listener: Rc<dyn ClientTransactionListener>) {
        self.listeners.register(listener);
    }

    pub fn remove_listener(&mut self, listener: &Rc<dyn ClientTransactionListener>) -> bool {
        self.listeners.unregister(listener)
    }

    /// Number of active sub-transactions
    pub fn depth(&self) -> usize {
        self.leaf_level()
    }

    pub fn is_sub_transaction(&self) -> bool {
        self.leaf_level() > 0
    }

    /// Start a sub-transaction as an unmodified view of the current leaf
    pub fn begin_sub_transaction(&mut self) -> RelationResult<usize> {
        let max = self.config.max_sub_transaction_depth;
        if self.depth() >= max {
            return Err(RelationError::SubTransactionDepthExceeded { max });
        }

        let scope = TransactionScope::sub_transaction(
            &self.scopes[self.leaf_level()],
            self.config.reclaim_collectible_end_points,
        );
        let depth = scope.depth;
        self.scopes.push(scope);
        self.record_modification();
        tracing::debug!("Began sub-transaction at level {}", depth);
        Ok(depth)
    }

    /// Drop the leaf sub-transaction without touching its parent
    pub fn discard_sub_transaction(&mut self) -> RelationResult<()> {
        if !self.is_sub_transaction() {
            return Err(RelationError::invalid_operation(
                "The root transaction cannot be discarded",
            ));
        }

        self.record_modification();
        if let Some(mut scope) = self.scopes.pop() {
            let listeners = &self.listeners;
            scope
                .end_points
                .reset(&mut |id| listeners.notify_unregistering(id));
            tracing::debug!("Discarded sub-transaction at level {}", scope.depth);
        }
        Ok(())
    }

    /// Commit the leaf scope
    ///
    /// The root persists its changes through the object store; a
    /// sub-transaction pushes them into its parent.
    pub fn commit(&mut self) -> RelationResult<()> {
        self.record_modification();
        if self.is_sub_transaction() {
            self.commit_sub_transaction()
        } else {
            self.commit_root()
        }
    }

    /// Restore the leaf scope to its last committed state
    ///
    /// Objects created since then are discarded and become invalid.
    pub fn rollback(&mut self) -> RelationResult<()> {
        self.record_modification();
        let level = self.leaf_level();
        let scope = &mut self.scopes[level];
        scope.end_points.rollback_all_end_points();

        let mut new_objects = Vec::new();
        for id in scope.data_containers.ids() {
            if let Some(container) = scope.data_containers.get(&id) {
                let mut container = container.borrow_mut();
                if container.is_new() {
                    new_objects.push(id);
                }
                container.rollback();
            }
        }

        for id in &new_objects {
            self.discard_object(level, id)?;
        }
        tracing::debug!(
            "Rolled back transaction level {} ({} new object(s) discarded)",
            level,
            new_objects.len()
        );
        Ok(())
    }

    fn commit_root(&mut self) -> RelationResult<()> {
        if self.config.validate_mandatory_relations {
            self.validate_mandatory_relations(0)?;
        }

        let scope = &self.scopes[0];
        let mut changes = Vec::new();
        for id in scope.data_containers.ids() {
            let container = scope.container(&id)?;
            let container = container.borrow();
            let state = container.state();
            if state != DataContainerState::Unchanged {
                changes.push(PersistableData {
                    object: container.to_loaded_object(),
                    state,
                });
            }
        }

        if !changes.is_empty() {
            self.store.save(&changes)?;
        }
        self.commit_scope(0)?;
        tracing::debug!("Committed root transaction ({} object(s) saved)", changes.len());
        Ok(())
    }

    fn commit_sub_transaction(&mut self) -> RelationResult<()> {
        let child_level = self.leaf_level();
        let parent_level = child_level - 1;
        let mut discarded_in_parent = Vec::new();

        for id in self.scopes[child_level].data_containers.ids() {
            let child = self.scopes[child_level].container(&id)?;
            let child = child.borrow();

            if child.is_new() {
                let properties = self.real_property_names(id.class_id());
                let mut container =
                    DataContainer::new_object(id.clone(), properties.iter().map(String::as_str));
                container.set_values_from_sub_transaction(&child);
                self.register_data_container(parent_level, container)?;
                continue;
            }

            let parent = self.scopes[parent_level].container(&id)?;
            let mut parent = parent.borrow_mut();
            parent.set_values_from_sub_transaction(&child);
            if child.is_deleted() && !parent.is_deleted() {
                parent.delete();
                if parent.is_new() {
                    discarded_in_parent.push(id.clone());
                }
            }
        }

        let (parents, children) = self.scopes.split_at_mut(child_level);
        let parent = &mut parents[parent_level];
        let child = &children[0];
        for id in child.end_points.ids() {
            let source = match child.end_points.get(&id) {
                Some(end_point)
                    if end_point.is_virtual()
                        && end_point.is_data_complete()
                        && (end_point.has_changed() || end_point.has_been_touched()) =>
                {
                    end_point
                }
                _ => continue,
            };
            let target = parent.end_points.registered_mut(&id)?;
            target.set_data_from_sub_transaction(source)?;
            target.touch();
        }

        for id in &discarded_in_parent {
            self.discard_object(parent_level, id)?;
        }
        self.commit_scope(child_level)?;
        tracing::debug!("Committed sub-transaction at level {} into its parent", child_level);
        Ok(())
    }

    /// Make the current state of a scope its original state; deleted
    /// objects are discarded
    fn commit_scope(&mut self, level: usize) -> RelationResult<()> {
        let scope = &mut self.scopes[level];
        scope.end_points.commit_all_end_points();

        let deleted = scope.data_containers.ids_in_state(DataContainerState::Deleted);
        for id in scope.data_containers.ids() {
            if let Some(container) = scope.data_containers.get(&id) {
                container.borrow_mut().commit();
            }
        }

        for id in &deleted {
            self.discard_object(level, id)?;
        }
        Ok(())
    }

    fn validate_mandatory_relations(&self, level: usize) -> RelationResult<()> {
        let scope = &self.scopes[level];
        for object_id in scope.data_containers.ids() {
            if scope.container(&object_id)?.borrow().is_deleted() {
                continue;
            }

            for definition in self.schema.end_point_definitions(object_id.class_id()) {
                if !definition.is_mandatory {
                    continue;
                }
                let id = RelationEndPointId::new(Some(object_id.clone()), definition)?;
                let is_missing = match scope.end_points.get(&id) {
                    Some(end_point) if end_point.is_data_complete() => {
                        end_point.current_items().is_empty()
                    }
                    _ => false,
                };
                if is_missing {
                    tracing::warn!("Mandatory relation '{}' is not set", id);
                    return Err(RelationError::MandatoryRelationNotSet { end_point_id: id });
                }
            }
        }
        Ok(())
    }

    /// Remove an object and its end-points from a scope and mark it invalid
    /// there
    pub(super) fn discard_object(&mut self, level: usize, object_id: &ObjectId) -> RelationResult<()> {
        let schema = Rc::clone(&self.schema);
        let listeners = &self.listeners;
        let scope = &mut self.scopes[level];

        let command = scope
            .end_points
            .create_unregister_command_for_data_container(object_id, schema.as_ref());
        if !command.can_execute() {
            tracing::warn!("Cannot unregister the end-points of object '{}'", object_id);
        }
        command.perform(&mut scope.end_points, schema.as_ref(), &mut |id| {
            listeners.notify_unregistering(id)
        })?;
        scope.data_containers.remove(object_id)?;
        scope.invalid_objects.insert(object_id.clone());

        tracing::debug!("Discarded object '{}' at level {}", object_id, level);
        Ok(())
    }

    pub(super) fn record_modification(&mut self) {
        self.modification_count = self.modification_count.wrapping_add(1);
    }

    pub(super) fn leaf_level(&self) -> usize {
        self.scopes.len() - 1
    }

    pub(super) fn leaf(&self) -> &TransactionScope {
        &self.scopes[self.leaf_level()]
    }

    /// Raise all "changing" notifications, perform, raise all "changed"
    /// notifications
    ///
    /// A listener error during the first phase aborts the command before
    /// anything was modified. So does a listener that modified the graph
    /// itself, since the command was planned against the previous state.
    /// A failure while performing leaves every affected end-point as it was.
    pub(super) fn execute_command(&mut self, command: &dyn Command) -> RelationResult<()> {
        let planned_at = self.modification_count;
        for notification in command.begin_notifications() {
            if let Err(error) = self.raise_changing(&notification) {
                tracing::warn!("Relation command cancelled by a listener: {}", error);
                return Err(error.into());
            }
        }
        if self.modification_count != planned_at {
            tracing::warn!("Relation command abandoned: a listener modified the graph before it ran");
            return Err(RelationError::invalid_operation(
                "The relation graph was modified by a listener while the change was being announced; \
                 the change was not performed",
            ));
        }

        let level = self.leaf_level();
        let scope = &mut self.scopes[level];
        command.perform_atomically(&mut scope.end_points, &scope.data_containers)?;
        self.record_modification();
        tracing::trace!("Performed relation command at level {}", level);

        for notification in command.end_notifications() {
            self.raise_changed(&notification)?;
        }
        Ok(())
    }

    fn raise_changing(&mut self, notification: &Notification) -> Result<(), EventError> {
        for listener in self.listeners.snapshot() {
            match notification {
                Notification::Relation(change) => listener.relation_changing(self, change)?,
                Notification::Collection(change) => listener.collection_changing(self, change)?,
                Notification::ObjectDelete(object_id) => listener.object_deleting(self, object_id)?,
            }
        }
        Ok(())
    }

    fn raise_changed(&mut self, notification: &Notification) -> Result<(), EventError> {
        for listener in self.listeners.snapshot() {
            match notification {
                Notification::Relation(change) => listener.relation_changed(self, change)?,
                Notification::Collection(change) => listener.collection_changed(self, change)?,
                Notification::ObjectDelete(object_id) => listener.object_deleted(self, object_id)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("depth", &self.depth())
            .field("listeners", &self.listeners)
            .field("config", &self.config)
            .finish()
    }
}
