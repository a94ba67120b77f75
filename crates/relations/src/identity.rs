//! Object and collection identities
//!
//! Domain objects are addressed by an `ObjectId` (class id plus a UUID value).
//! User-visible collection objects carry their own `CollectionId` so that a
//! wholesale collection replacement can be told apart from element changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a domain object within the object graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    class_id: String,
    value: Uuid,
}

impl ObjectId {
    /// Create an identity from a class id and an existing value
    pub fn new(class_id: impl Into<String>, value: Uuid) -> Self {
        Self {
            class_id: class_id.into(),
            value,
        }
    }

    /// Create an identity with a freshly generated value
    pub fn generate(class_id: impl Into<String>) -> Self {
        Self::new(class_id, Uuid::new_v4())
    }

    /// The class (mapping type) this object belongs to
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    pub fn value(&self) -> Uuid {
        self.value
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.class_id, self.value)
    }
}

/// Identity of a collection object handed out to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(Uuid);

impl CollectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collection:{}", self.0)
    }
}

/// Render a list of ids for error messages
pub(crate) fn join_ids<T: fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(|id| format!("'{}'", id))
        .collect::<Vec<_>>()
        .join(", ")
}
