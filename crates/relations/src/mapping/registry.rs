//! Mapping Registry - runtime access to relation definitions

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{RelationError, RelationResult};
use super::metadata::{EndPointDefinition, RelationDefinition};

/// Schema provider queried by the end-point subsystem
///
/// Read-only: the relation core never mutates the mapping.
pub trait RelationSchema {
    /// Look up a named end-point of a class
    fn end_point_definition(
        &self,
        class_id: &str,
        property_name: &str,
    ) -> Option<Arc<EndPointDefinition>>;

    /// The other end-point of the relation `definition` belongs to
    fn opposite_end_point_definition(
        &self,
        definition: &EndPointDefinition,
    ) -> Option<Arc<EndPointDefinition>>;

    /// All named end-points owned by a class, in registration order
    fn end_point_definitions(&self, class_id: &str) -> Vec<Arc<EndPointDefinition>>;
}

/// In-memory relation mapping
#[derive(Debug, Clone, Default)]
pub struct MappingConfiguration {
    relations: BTreeMap<String, RelationDefinition>,
    relation_end_points: HashMap<String, [Arc<EndPointDefinition>; 2]>,
    named_end_points: HashMap<(String, String), Arc<EndPointDefinition>>,
    class_end_points: HashMap<String, Vec<Arc<EndPointDefinition>>>,
}

impl MappingConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from a list of relations
    pub fn from_relations(
        relations: impl IntoIterator<Item = RelationDefinition>,
    ) -> RelationResult<Self> {
        let mut mapping = Self::new();
        for relation in relations {
            mapping.add_relation(relation)?;
        }
        Ok(mapping)
    }

    /// Parse a JSON array of relation definitions
    pub fn from_json(json: &str) -> RelationResult<Self> {
        let relations: Vec<RelationDefinition> = serde_json::from_str(json).map_err(|e| {
            RelationError::invalid_argument("json", format!("Invalid mapping: {}", e))
        })?;
        Self::from_relations(relations)
    }

    /// Register a relation
    pub fn add_relation(&mut self, relation: RelationDefinition) -> RelationResult<()> {
        relation.validate()?;

        if self.relations.contains_key(&relation.id) {
            return Err(RelationError::invalid_argument(
                "relation",
                format!("Relation '{}' is already registered", relation.id),
            ));
        }

        for end_point in relation.end_points.iter() {
            if let Some(property) = &end_point.property_name {
                let key = (end_point.class_id.clone(), property.clone());
                if self.named_end_points.contains_key(&key) {
                    return Err(RelationError::invalid_argument(
                        "relation",
                        format!(
                            "Property '{}' already takes part in another relation",
                            end_point.full_name()
                        ),
                    ));
                }
            }
        }

        let [first, second] = relation.end_points.clone();
        let end_points = [Arc::new(first), Arc::new(second)];

        for end_point in end_points.iter() {
            if let Some(property) = &end_point.property_name {
                self.named_end_points.insert(
                    (end_point.class_id.clone(), property.clone()),
                    Arc::clone(end_point),
                );
                self.class_end_points
                    .entry(end_point.class_id.clone())
                    .or_default()
                    .push(Arc::clone(end_point));
            }
        }

        self.relation_end_points.insert(relation.id.clone(), end_points);
        self.relations.insert(relation.id.clone(), relation);
        Ok(())
    }

    pub fn relation(&self, relation_id: &str) -> Option<&RelationDefinition> {
        self.relations.get(relation_id)
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDefinition> {
        self.relations.values()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}

impl RelationSchema for MappingConfiguration {
    fn end_point_definition(
        &self,
        class_id: &str,
        property_name: &str,
    ) -> Option<Arc<EndPointDefinition>> {
        self.named_end_points
            .get(&(class_id.to_string(), property_name.to_string()))
            .cloned()
    }

    fn opposite_end_point_definition(
        &self,
        definition: &EndPointDefinition,
    ) -> Option<Arc<EndPointDefinition>> {
        let [first, second] = self.relation_end_points.get(&definition.relation_id)?;
        if first.as_ref() == definition {
            Some(Arc::clone(second))
        } else if second.as_ref() == definition {
            Some(Arc::clone(first))
        } else {
            None
        }
    }

    fn end_point_definitions(&self, class_id: &str) -> Vec<Arc<EndPointDefinition>> {
        self.class_end_points
            .get(class_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Cardinality;

    fn order_mapping() -> MappingConfiguration {
        MappingConfiguration::from_relations([
            RelationDefinition::one_to_many("Customer", "Orders", "Order", "Customer"),
            RelationDefinition::one_to_one("Order", "OrderTicket", "OrderTicket", "Order"),
            RelationDefinition::unidirectional("Order", "Official", "Official"),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup_and_opposite() {
        let mapping = order_mapping();

        let orders = mapping.end_point_definition("Customer", "Orders").unwrap();
        assert_eq!(orders.cardinality, Cardinality::Many);

        let opposite = mapping.opposite_end_point_definition(&orders).unwrap();
        assert_eq!(opposite.full_name(), "Order.Customer");

        let back = mapping.opposite_end_point_definition(&opposite).unwrap();
        assert_eq!(back, orders);
    }

    #[test]
    fn test_anonymous_end_point_is_not_named() {
        let mapping = order_mapping();

        let official = mapping.end_point_definition("Order", "Official").unwrap();
        let anonymous = mapping.opposite_end_point_definition(&official).unwrap();
        assert!(anonymous.is_anonymous());
        assert!(mapping.end_point_definitions("Official").is_empty());
    }

    #[test]
    fn test_class_end_points() {
        let mapping = order_mapping();
        let names: Vec<_> = mapping
            .end_point_definitions("Order")
            .iter()
            .map(|d| d.full_name())
            .collect();
        assert_eq!(names, vec!["Order.Customer", "Order.OrderTicket", "Order.Official"]);
    }

    #[test]
    fn test_duplicate_relation_rejected() {
        let mut mapping = order_mapping();
        let result = mapping.add_relation(RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_property_reuse_rejected() {
        let mut mapping = order_mapping();
        let result = mapping.add_relation(RelationDefinition::one_to_many(
            "Customer", "Orders", "Invoice", "Customer",
        ));
        assert!(result.is_err());
        assert_eq!(mapping.relation_count(), 3);
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::to_string(&vec![RelationDefinition::one_to_many(
            "Customer", "Orders", "Order", "Customer",
        )])
        .unwrap();

        let mapping = MappingConfiguration::from_json(&json).unwrap();
        assert!(mapping.relation("Order.Customer").is_some());
        assert!(MappingConfiguration::from_json("{").is_err());
    }
}
