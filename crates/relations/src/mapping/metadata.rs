//! Relation Metadata - end-point and relation definitions

use serde::{Deserialize, Serialize};

use crate::error::{RelationError, RelationResult};

/// How many objects an end-point refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Describes one side of a relation
///
/// A non-virtual end-point stores its reference on the owning object; a
/// virtual end-point is derived from the opposite side and must be loaded.
/// An end-point without a property name is the anonymous side of a
/// unidirectional relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndPointDefinition {
    /// Id of the relation this end-point belongs to
    pub relation_id: String,

    /// Class owning the end-point
    pub class_id: String,

    /// Relation property name, `None` for anonymous end-points
    pub property_name: Option<String>,

    pub cardinality: Cardinality,

    pub is_virtual: bool,

    /// Whether a root commit requires the relation to be set
    #[serde(default)]
    pub is_mandatory: bool,
}

impl EndPointDefinition {
    pub fn new(
        relation_id: &str,
        class_id: &str,
        property_name: Option<&str>,
        cardinality: Cardinality,
        is_virtual: bool,
    ) -> Self {
        Self {
            relation_id: relation_id.to_string(),
            class_id: class_id.to_string(),
            property_name: property_name.map(str::to_string),
            cardinality,
            is_virtual,
            is_mandatory: false,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.property_name.is_none()
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    /// "Class.Property", or "Class.<anonymous>"
    pub fn full_name(&self) -> String {
        format!(
            "{}.{}",
            self.class_id,
            self.property_name.as_deref().unwrap_or("<anonymous>")
        )
    }
}

/// A relation between two classes, consisting of exactly two end-points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub id: String,
    pub end_points: [EndPointDefinition; 2],
}

impl RelationDefinition {
    /// One-to-many: `one_class.collection_property` holds many `many_class`
    /// objects, each of which stores its owner in `foreign_key_property`
    pub fn one_to_many(
        one_class: &str,
        collection_property: &str,
        many_class: &str,
        foreign_key_property: &str,
    ) -> Self {
        let id = format!("{}.{}", many_class, foreign_key_property);
        Self {
            end_points: [
                EndPointDefinition::new(
                    &id,
                    one_class,
                    Some(collection_property),
                    Cardinality::Many,
                    true,
                ),
                EndPointDefinition::new(
                    &id,
                    many_class,
                    Some(foreign_key_property),
                    Cardinality::One,
                    false,
                ),
            ],
            id,
        }
    }

    /// One-to-one: the reference is stored on `real_class.real_property`
    pub fn one_to_one(
        virtual_class: &str,
        virtual_property: &str,
        real_class: &str,
        real_property: &str,
    ) -> Self {
        let id = format!("{}.{}", real_class, real_property);
        Self {
            end_points: [
                EndPointDefinition::new(
                    &id,
                    virtual_class,
                    Some(virtual_property),
                    Cardinality::One,
                    true,
                ),
                EndPointDefinition::new(
                    &id,
                    real_class,
                    Some(real_property),
                    Cardinality::One,
                    false,
                ),
            ],
            id,
        }
    }

    /// Unidirectional: `class.property` points to `target_class`, which has
    /// no property for the inverse direction
    pub fn unidirectional(class: &str, property: &str, target_class: &str) -> Self {
        let id = format!("{}.{}", class, property);
        Self {
            end_points: [
                EndPointDefinition::new(&id, class, Some(property), Cardinality::One, false),
                EndPointDefinition::new(&id, target_class, None, Cardinality::Many, true),
            ],
            id,
        }
    }

    /// Mark the end-point `class.property` as mandatory
    pub fn with_mandatory(mut self, class_id: &str, property_name: &str) -> Self {
        for end_point in self.end_points.iter_mut() {
            if end_point.class_id == class_id
                && end_point.property_name.as_deref() == Some(property_name)
            {
                end_point.is_mandatory = true;
            }
        }
        self
    }

    pub fn is_bidirectional(&self) -> bool {
        self.end_points.iter().all(|end_point| !end_point.is_anonymous())
    }

    /// Validate the relation for consistency
    pub fn validate(&self) -> RelationResult<()> {
        if self.id.is_empty() {
            return Err(RelationError::invalid_argument(
                "relation",
                "Relation id must not be empty",
            ));
        }

        for end_point in &self.end_points {
            if end_point.relation_id != self.id {
                return Err(RelationError::invalid_argument(
                    "relation",
                    format!(
                        "End-point '{}' belongs to relation '{}', not '{}'",
                        end_point.full_name(),
                        end_point.relation_id,
                        self.id
                    ),
                ));
            }
            if end_point.class_id.is_empty() {
                return Err(RelationError::invalid_argument(
                    "relation",
                    format!("Relation '{}' has an end-point without a class", self.id),
                ));
            }
            if end_point.is_anonymous() && !end_point.is_virtual {
                return Err(RelationError::invalid_argument(
                    "relation",
                    format!("Anonymous end-point of relation '{}' must be virtual", self.id),
                ));
            }
            if !end_point.is_virtual && end_point.is_collection() {
                return Err(RelationError::invalid_argument(
                    "relation",
                    format!(
                        "End-point '{}' stores a reference and cannot have cardinality Many",
                        end_point.full_name()
                    ),
                ));
            }
        }

        let real_count = self.end_points.iter().filter(|e| !e.is_virtual).count();
        if real_count != 1 {
            return Err(RelationError::invalid_argument(
                "relation",
                format!(
                    "Relation '{}' must have exactly one non-virtual end-point, found {}",
                    self.id, real_count
                ),
            ));
        }

        if self.end_points[0].class_id == self.end_points[1].class_id
            && self.end_points[0].property_name == self.end_points[1].property_name
        {
            return Err(RelationError::invalid_argument(
                "relation",
                format!("Relation '{}' connects an end-point to itself", self.id),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_to_many_definition() {
        let relation = RelationDefinition::one_to_many("Customer", "Orders", "Order", "Customer");

        assert_eq!(relation.id, "Order.Customer");
        assert!(relation.is_bidirectional());
        assert!(relation.validate().is_ok());

        let [collection, real] = &relation.end_points;
        assert!(collection.is_virtual && collection.is_collection());
        assert!(!real.is_virtual && !real.is_collection());
        assert_eq!(real.full_name(), "Order.Customer");
    }

    #[test]
    fn test_unidirectional_definition_has_anonymous_end_point() {
        let relation = RelationDefinition::unidirectional("Order", "Official", "Official");

        assert!(!relation.is_bidirectional());
        assert!(relation.validate().is_ok());
        assert!(relation.end_points[1].is_anonymous());
        assert_eq!(relation.end_points[1].full_name(), "Official.<anonymous>");
    }

    #[test]
    fn test_with_mandatory() {
        let relation = RelationDefinition::one_to_one("Order", "OrderTicket", "OrderTicket", "Order")
            .with_mandatory("OrderTicket", "Order");

        assert!(!relation.end_points[0].is_mandatory);
        assert!(relation.end_points[1].is_mandatory);
    }

    #[test]
    fn test_validation_rejects_two_real_end_points() {
        let mut relation = RelationDefinition::one_to_one("Order", "OrderTicket", "OrderTicket", "Order");
        relation.end_points[0].is_virtual = false;

        let error = relation.validate().unwrap_err();
        assert!(error.to_string().contains("exactly one non-virtual"));
    }

    #[test]
    fn test_validation_rejects_real_collection() {
        let mut relation = RelationDefinition::one_to_many("Customer", "Orders", "Order", "Customer");
        relation.end_points[1].cardinality = Cardinality::Many;

        assert!(relation.validate().is_err());
    }

    #[test]
    fn test_definition_round_trips_through_json() {
        let relation = RelationDefinition::one_to_many("Customer", "Orders", "Order", "Customer");
        let json = serde_json::to_string(&relation).unwrap();
        let parsed: RelationDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, relation);
    }
}
