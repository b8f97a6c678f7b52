use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ModelError;

/// Opaque identifier, unique within one cache type.
pub type Identifier = String;

/// Producer-defined attribute value. `Value::Null` is the deletion marker.
pub type AttributeValue = Value;

/// One cached entity: attributes plus named relationship sets.
///
/// A relationship name always maps to the complete set of related ids; the
/// store replaces that set wholesale on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheData {
    id: Identifier,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    relationships: BTreeMap<String, BTreeSet<Identifier>>,
}

impl CacheData {
    pub fn new(id: impl Into<Identifier>) -> Result<Self, ModelError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ModelError::EmptyIdentifier);
        }
        Ok(Self {
            id,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        })
    }

    /// Assemble a record from parts already read back from storage.
    pub fn from_parts(
        id: impl Into<Identifier>,
        attributes: BTreeMap<String, AttributeValue>,
        relationships: BTreeMap<String, BTreeSet<Identifier>>,
    ) -> Result<Self, ModelError> {
        let mut data = Self::new(id)?;
        data.attributes = attributes;
        data.relationships = relationships;
        Ok(data)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Mark an attribute for deletion on the next merge.
    pub fn with_null_attribute(mut self, key: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), Value::Null);
        self
    }

    pub fn with_relationship<I, S>(mut self, name: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Identifier>,
    {
        self.relationships
            .insert(name.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn relationships(&self) -> &BTreeMap<String, BTreeSet<Identifier>> {
        &self.relationships
    }

    pub fn relationship(&self, name: &str) -> Option<&BTreeSet<Identifier>> {
        self.relationships.get(name)
    }

    /// Checks the invariants that deserialization cannot enforce.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.is_empty() {
            return Err(ModelError::EmptyIdentifier);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_identifier_is_rejected() {
        assert_eq!(CacheData::new(""), Err(ModelError::EmptyIdentifier));
    }

    #[test]
    fn builder_collects_attributes_and_relationships() {
        let data = CacheData::new("s1")
            .expect("valid id")
            .with_attribute("status", "UP")
            .with_null_attribute("zone")
            .with_relationship("cluster", ["c1", "c1", "c2"]);

        assert_eq!(data.id(), "s1");
        assert_eq!(data.attribute("status"), Some(&json!("UP")));
        assert_eq!(data.attribute("zone"), Some(&Value::Null));
        let cluster = data.relationship("cluster").expect("cluster relationship");
        assert_eq!(cluster.len(), 2);
    }

    #[test]
    fn relationship_builder_replaces_previous_set() {
        let data = CacheData::new("s1")
            .expect("valid id")
            .with_relationship("cluster", ["a", "b"])
            .with_relationship("cluster", ["c"]);

        let cluster: Vec<_> = data.relationship("cluster").unwrap().iter().collect();
        assert_eq!(cluster, vec!["c"]);
    }

    #[test]
    fn deserialized_empty_id_fails_validation() {
        let data: CacheData =
            serde_json::from_value(json!({ "id": "", "attributes": { "a": 1 } })).unwrap();
        assert_eq!(data.validate(), Err(ModelError::EmptyIdentifier));
    }

    #[test]
    fn missing_maps_default_to_empty() {
        let data: CacheData = serde_json::from_value(json!({ "id": "x" })).unwrap();
        assert!(data.attributes().is_empty());
        assert!(data.relationships().is_empty());
    }
}
