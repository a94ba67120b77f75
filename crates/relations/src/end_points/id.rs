use std::fmt;
use std::sync::Arc;

use crate::error::{RelationError, RelationResult};
use crate::identity::ObjectId;
use crate::mapping::{EndPointDefinition, RelationSchema};

/// Identifies one end of one relation instance
///
/// Equality and hashing are structural over the owning object and the
/// end-point definition. An id without an object denotes the end-point of
/// "no object", which resolves to a null end-point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationEndPointId {
    object_id: Option<ObjectId>,
    definition: Arc<EndPointDefinition>,
}

impl RelationEndPointId {
    /// Create an id, checking that the object belongs to the definition's class
    pub fn new(
        object_id: Option<ObjectId>,
        definition: Arc<EndPointDefinition>,
    ) -> RelationResult<Self> {
        if let Some(object_id) = &object_id {
            if object_id.class_id() != definition.class_id {
                return Err(RelationError::invalid_argument(
                    "object_id",
                    format!(
                        "Object '{}' cannot own end-point '{}': class mismatch",
                        object_id,
                        definition.full_name()
                    ),
                ));
            }
        }

        Ok(Self {
            object_id,
            definition,
        })
    }

    /// The id of "no object" for a definition
    pub fn null(definition: Arc<EndPointDefinition>) -> Self {
        Self {
            object_id: None,
            definition,
        }
    }

    /// Resolve a named relation property of an object through the schema
    pub fn for_property(
        schema: &dyn RelationSchema,
        object_id: &ObjectId,
        property_name: &str,
    ) -> RelationResult<Self> {
        let definition = schema
            .end_point_definition(object_id.class_id(), property_name)
            .ok_or_else(|| {
                RelationError::invalid_argument(
                    "property_name",
                    format!(
                        "Class '{}' has no relation property '{}'",
                        object_id.class_id(),
                        property_name
                    ),
                )
            })?;
        Self::new(Some(object_id.clone()), definition)
    }

    /// The id of the opposite end-point for `opposite_object`
    pub fn opposite(
        &self,
        schema: &dyn RelationSchema,
        opposite_object: Option<ObjectId>,
    ) -> RelationResult<Self> {
        let definition = schema
            .opposite_end_point_definition(&self.definition)
            .ok_or_else(|| {
                RelationError::invalid_argument(
                    "end_point_id",
                    format!("End-point '{}' has no opposite definition", self),
                )
            })?;
        Self::new(opposite_object, definition)
    }

    pub fn object_id(&self) -> Option<&ObjectId> {
        self.object_id.as_ref()
    }

    pub fn definition(&self) -> &Arc<EndPointDefinition> {
        &self.definition
    }

    pub fn property_name(&self) -> Option<&str> {
        self.definition.property_name.as_deref()
    }

    pub fn is_virtual(&self) -> bool {
        self.definition.is_virtual
    }

    pub fn is_collection(&self) -> bool {
        self.definition.is_collection()
    }

    pub fn is_anonymous(&self) -> bool {
        self.definition.is_anonymous()
    }

    pub fn is_null(&self) -> bool {
        self.object_id.is_none()
    }

    /// Anonymous ids may never be created through the normal access path
    pub(crate) fn check_not_anonymous(&self) -> RelationResult<()> {
        if self.is_anonymous() {
            return Err(RelationError::invalid_argument(
                "end_point_id",
                format!(
                    "End-point '{}' is the anonymous side of a unidirectional relation and cannot be accessed",
                    self
                ),
            ));
        }
        Ok(())
    }

    /// The owning object, failing for null ids
    pub(crate) fn require_object_id(&self) -> RelationResult<&ObjectId> {
        self.object_id.as_ref().ok_or_else(|| {
            RelationError::invalid_operation(format!(
                "End-point '{}' has no owning object",
                self.definition.full_name()
            ))
        })
    }
}

impl fmt::Display for RelationEndPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object_id {
            Some(object_id) => write!(f, "{}/{}", object_id, self.definition.full_name()),
            None => write!(f, "null/{}", self.definition.full_name()),
        }
    }
}
