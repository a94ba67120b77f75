//! Error types for relation end-point management
//!
//! Every failure is a programmer-visible condition: the object graph is
//! in-process and deterministic, so nothing here is retried.

use crate::end_points::RelationEndPointId;
use crate::event_error::EventError;
use crate::identity::{join_ids, ObjectId};

/// Result type alias for relation operations
pub type RelationResult<T> = Result<T, RelationError>;

/// Coarse classification of a `RelationError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidOperation,
    Cancellation,
    Store,
}

/// Error types for relation end-point operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelationError {
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument { argument: String, message: String },

    #[error("Object(s) could not be found: {}.", join_ids(.ids))]
    ObjectsNotFound { ids: Vec<ObjectId> },

    #[error("Object '{0}' is invalid in this transaction.")]
    ObjectInvalid(ObjectId),

    #[error("Object '{0}' is already deleted.")]
    ObjectDeleted(ObjectId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("The relation end-point '{end_point_id}' is out of sync: {message}")]
    Unsynchronized {
        end_point_id: RelationEndPointId,
        message: String,
    },

    #[error(
        "Cannot unregister the following relation end-points: {}. Relation end-points can only be unregistered if they do not store references to other objects.",
        join_ids(.end_point_ids)
    )]
    UnregisterFailed { end_point_ids: Vec<RelationEndPointId> },

    #[error("Cannot unload: {}", join_messages(.messages))]
    UnloadFailed { messages: Vec<String> },

    #[error("Mandatory relation property '{end_point_id}' is not set.")]
    MandatoryRelationNotSet { end_point_id: RelationEndPointId },

    #[error("Sub-transaction depth limit of {max} reached")]
    SubTransactionDepthExceeded { max: usize },

    #[error("{0}")]
    Event(#[from] EventError),

    #[error("Store error: {0}")]
    Store(String),
}

fn join_messages(messages: &[String]) -> String {
    messages.join(" ")
}

impl RelationError {
    pub fn invalid_argument(argument: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn unsynchronized(end_point_id: &RelationEndPointId, message: impl Into<String>) -> Self {
        Self::Unsynchronized {
            end_point_id: end_point_id.clone(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelationError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            RelationError::ObjectsNotFound { .. } => ErrorKind::NotFound,
            RelationError::Event(_) => ErrorKind::Cancellation,
            RelationError::Store(_) => ErrorKind::Store,
            RelationError::ObjectInvalid(_)
            | RelationError::ObjectDeleted(_)
            | RelationError::InvalidOperation(_)
            | RelationError::Unsynchronized { .. }
            | RelationError::UnregisterFailed { .. }
            | RelationError::UnloadFailed { .. }
            | RelationError::MandatoryRelationNotSet { .. }
            | RelationError::SubTransactionDepthExceeded { .. } => ErrorKind::InvalidOperation,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }
}
