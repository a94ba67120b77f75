//! Relation commands
//!
//! A user-level mutation is expanded into `RelationModification`s covering
//! both sides of every affected relation and executed as one command:
//! all "changing" notifications, then all modifications, then all
//! "changed" notifications in reverse order.

pub mod command;
pub mod data_management;
pub mod modification;

pub use command::{Command, DeleteCommand, ExpandedCommand};
pub use data_management::DataManagementCommand;
pub use modification::RelationModification;
