//! # elif-relations: Relation End-Point Tracking for elif.rs
//!
//! Keeps both sides of every bidirectional relation between domain objects
//! consistent inside a unit of work. Relation data is loaded lazily through
//! an `ObjectStore`, every mutation is expanded into modifications on all
//! affected end-points and announced to listeners before and after it is
//! performed, and nested sub-transactions can commit into or be discarded
//! from their parent.

pub mod commands;
pub mod config;
pub mod data_container;
pub mod end_points;
pub mod error;
pub mod event_error;
pub mod events;
pub mod identity;
pub mod loader;
pub mod mapping;
pub mod observers;
pub mod transaction;

// Re-export the everyday surface
pub use commands::{Command, DataManagementCommand, DeleteCommand, ExpandedCommand, RelationModification};
pub use config::{ConfigError, RelationConfig};
pub use data_container::{DataContainer, DataContainerMap, DataContainerState};
pub use end_points::{
    ChangeDetectionStrategy, DomainObjectCollection, EndPoint, NullEndPoint, RelationEndPoint,
    RelationEndPointId, RelationEndPointMap, SyncState,
};
pub use error::{ErrorKind, RelationError, RelationResult};
pub use event_error::EventError;
pub use events::{ClientTransactionListener, CollectionChange, CollectionOperation, Notification, RelationChange};
pub use identity::{CollectionId, ObjectId};
pub use loader::{InMemoryObjectStore, LoadMultipleResult, LoadedObject, ObjectStore, PersistableData};
pub use mapping::{Cardinality, EndPointDefinition, MappingConfiguration, RelationDefinition, RelationSchema};
pub use observers::ListenerRegistry;
pub use transaction::ClientTransaction;
