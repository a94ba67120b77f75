//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use elif_relations::{
    ClientTransaction, ClientTransactionListener, CollectionChange, CollectionOperation,
    EventError, InMemoryObjectStore, LoadedObject, MappingConfiguration, ObjectId,
    RelationChange, RelationConfig, RelationDefinition, RelationEndPointId,
};

/// Route crate logs to the test output; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Customer 1-n Order, Order 1-1 OrderTicket (stored on the ticket) and a
/// unidirectional Order -> Official reference
pub fn mapping() -> MappingConfiguration {
    MappingConfiguration::from_relations([
        RelationDefinition::one_to_many("Customer", "Orders", "Order", "Customer"),
        RelationDefinition::one_to_one("Order", "OrderTicket", "OrderTicket", "Order"),
        RelationDefinition::unidirectional("Order", "Official", "Official"),
    ])
    .expect("fixture mapping is valid")
}

pub fn transaction(store: &Rc<InMemoryObjectStore>) -> ClientTransaction {
    ClientTransaction::new(Rc::new(mapping()), store.clone())
}

pub fn transaction_with_config(store: &Rc<InMemoryObjectStore>, config: RelationConfig) -> ClientTransaction {
    ClientTransaction::with_config(Rc::new(mapping()), store.clone(), config)
}

pub fn customer(id: &ObjectId) -> LoadedObject {
    LoadedObject::new(id.clone())
}

pub fn order(id: &ObjectId, customer: Option<&ObjectId>) -> LoadedObject {
    LoadedObject::new(id.clone())
        .with_reference("Customer", customer.cloned())
        .with_reference("Official", None)
}

pub fn ticket(id: &ObjectId, order: Option<&ObjectId>) -> LoadedObject {
    LoadedObject::new(id.clone()).with_reference("Order", order.cloned())
}

/// One customer with two orders, a second customer without orders and a
/// ticket for the first order
pub struct Graph {
    pub store: Rc<InMemoryObjectStore>,
    pub customer: ObjectId,
    pub other_customer: ObjectId,
    pub first_order: ObjectId,
    pub second_order: ObjectId,
    pub ticket: ObjectId,
}

impl Graph {
    pub fn new() -> Self {
        init_tracing();
        let customer_id = ObjectId::generate("Customer");
        let other_customer = ObjectId::generate("Customer");
        let first_order = ObjectId::generate("Order");
        let second_order = ObjectId::generate("Order");
        let ticket_id = ObjectId::generate("OrderTicket");

        let store = Rc::new(InMemoryObjectStore::with_objects([
            customer(&customer_id),
            customer(&other_customer),
            order(&first_order, Some(&customer_id)),
            order(&second_order, Some(&customer_id)),
            ticket(&ticket_id, Some(&first_order)),
        ]));

        Self {
            store,
            customer: customer_id,
            other_customer,
            first_order,
            second_order,
            ticket: ticket_id,
        }
    }

    pub fn transaction(&self) -> ClientTransaction {
        transaction(&self.store)
    }
}

/// Records every notification as "<event> <Class.Property>"
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: RefCell<Vec<String>>,
    registered: RefCell<Vec<RelationEndPointId>>,
    unregistered: RefCell<Vec<RelationEndPointId>>,
}

impl RecordingListener {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn registered(&self) -> Vec<RelationEndPointId> {
        self.registered.borrow().clone()
    }

    pub fn unregistered(&self) -> Vec<RelationEndPointId> {
        self.unregistered.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn record(&self, event: &str, end_point_id: &RelationEndPointId) {
        self.events
            .borrow_mut()
            .push(format!("{} {}", event, end_point_id.definition().full_name()));
    }
}

impl ClientTransactionListener for RecordingListener {
    fn relation_changing(&self, _: &mut ClientTransaction, change: &RelationChange) -> Result<(), EventError> {
        self.record("changing", &change.end_point_id);
        Ok(())
    }

    fn relation_changed(&self, _: &mut ClientTransaction, change: &RelationChange) -> Result<(), EventError> {
        self.record("changed", &change.end_point_id);
        Ok(())
    }

    fn collection_changing(&self, _: &mut ClientTransaction, change: &CollectionChange) -> Result<(), EventError> {
        let event = match change.operation {
            CollectionOperation::Add => "adding",
            CollectionOperation::Remove => "removing",
        };
        self.record(event, &change.end_point_id);
        Ok(())
    }

    fn collection_changed(&self, _: &mut ClientTransaction, change: &CollectionChange) -> Result<(), EventError> {
        let event = match change.operation {
            CollectionOperation::Add => "added",
            CollectionOperation::Remove => "removed",
        };
        self.record(event, &change.end_point_id);
        Ok(())
    }

    fn object_deleting(&self, _: &mut ClientTransaction, object_id: &ObjectId) -> Result<(), EventError> {
        self.events.borrow_mut().push(format!("deleting {}", object_id.class_id()));
        Ok(())
    }

    fn object_deleted(&self, _: &mut ClientTransaction, object_id: &ObjectId) -> Result<(), EventError> {
        self.events.borrow_mut().push(format!("deleted {}", object_id.class_id()));
        Ok(())
    }

    fn relation_end_point_registering(&self, end_point_id: &RelationEndPointId) {
        self.registered.borrow_mut().push(end_point_id.clone());
    }

    fn relation_end_point_unregistering(&self, end_point_id: &RelationEndPointId) {
        self.unregistered.borrow_mut().push(end_point_id.clone());
    }
}

/// Cancels every relation change on the given property
pub struct CancellingListener {
    pub property_name: String,
}

impl CancellingListener {
    pub fn new(property_name: &str) -> Rc<Self> {
        Rc::new(Self {
            property_name: property_name.to_string(),
        })
    }
}

impl ClientTransactionListener for CancellingListener {
    fn relation_changing(&self, _: &mut ClientTransaction, change: &RelationChange) -> Result<(), EventError> {
        if change.property_name() == Some(self.property_name.as_str()) {
            return Err(EventError::cancelled("changes to this property are not allowed"));
        }
        Ok(())
    }
}
