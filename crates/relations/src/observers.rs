//! Listener registry

use std::fmt;
use std::rc::Rc;

use crate::end_points::RelationEndPointId;
use crate::events::ClientTransactionListener;

/// Ordered set of listeners attached to a transaction
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Vec<Rc<dyn ClientTransactionListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Rc<dyn ClientTransactionListener>) {
        self.listeners.push(listener);
    }

    /// Remove a listener by identity
    pub fn unregister(&mut self, listener: &Rc<dyn ClientTransactionListener>) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|registered| !Rc::ptr_eq(registered, listener));
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// The listeners at this moment; callbacks may register further listeners
    pub fn snapshot(&self) -> Vec<Rc<dyn ClientTransactionListener>> {
        self.listeners.clone()
    }

    pub fn notify_registering(&self, end_point_id: &RelationEndPointId) {
        for listener in &self.listeners {
            listener.relation_end_point_registering(end_point_id);
        }
    }

    pub fn notify_unregistering(&self, end_point_id: &RelationEndPointId) {
        for listener in &self.listeners {
            listener.relation_end_point_unregistering(end_point_id);
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ObjectId;
    use crate::mapping::{MappingConfiguration, RelationDefinition};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RegistrationTracker {
        registered: RefCell<Vec<String>>,
    }

    impl ClientTransactionListener for RegistrationTracker {
        fn relation_end_point_registering(&self, end_point_id: &RelationEndPointId) {
            self.registered
                .borrow_mut()
                .push(format!("+{}", end_point_id.property_name().unwrap_or_default()));
        }

        fn relation_end_point_unregistering(&self, end_point_id: &RelationEndPointId) {
            self.registered
                .borrow_mut()
                .push(format!("-{}", end_point_id.property_name().unwrap_or_default()));
        }
    }

    #[test]
    fn test_notifications_reach_every_listener() {
        let mapping = MappingConfiguration::from_relations([RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();
        let id = RelationEndPointId::for_property(&mapping, &ObjectId::generate("Order"), "Customer")
            .unwrap();

        let first = Rc::new(RegistrationTracker::default());
        let second = Rc::new(RegistrationTracker::default());
        let mut registry = ListenerRegistry::new();
        registry.register(first.clone());
        registry.register(second.clone());

        registry.notify_registering(&id);
        registry.notify_unregistering(&id);

        assert_eq!(*first.registered.borrow(), vec!["+Customer", "-Customer"]);
        assert_eq!(*second.registered.borrow(), vec!["+Customer", "-Customer"]);
    }

    #[test]
    fn test_unregister_by_identity() {
        let listener: Rc<dyn ClientTransactionListener> = Rc::new(RegistrationTracker::default());
        let mut registry = ListenerRegistry::new();
        registry.register(Rc::clone(&listener));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&listener));
        assert!(!registry.unregister(&listener));
        assert!(registry.is_empty());
    }
}
