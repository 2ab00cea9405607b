//! Entity schema definitions.
//!
//! An `EntitySchema` lists the properties a model exposes to queries, in
//! index order. Queries resolve property names against it once, when they are
//! built.

use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::string::String;
use alloc::vec::Vec;

/// A queryable property of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Property {
    /// Property name.
    name: String,
    /// Data type of the property.
    data_type: DataType,
    /// Whether this property may hold `Value::Null`.
    nullable: bool,
    /// Property index in the entity (0-based).
    index: usize,
}

impl Property {
    /// Creates a new property definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            nullable: data_type.is_nullable_by_default(),
            data_type,
            index: 0,
        }
    }

    /// Sets whether this property is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Returns the property name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns whether this property is nullable.
    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the property index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// The queryable shape of one entity type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySchema {
    /// Entity name, used in diagnostics only.
    name: String,
    /// Property definitions in index order.
    properties: Vec<Property>,
}

impl EntitySchema {
    /// Creates a schema from properties; indices follow their order.
    ///
    /// Use [`EntitySchemaBuilder`] when the property list is not known to be
    /// valid.
    pub fn new(name: impl Into<String>, properties: Vec<Property>) -> Self {
        let properties = properties
            .into_iter()
            .enumerate()
            .map(|(i, p)| p.with_index(i))
            .collect();
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Starts a validating builder.
    pub fn builder(name: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder::new(name)
    }

    /// Returns the entity name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the properties.
    #[inline]
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Looks up a property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Returns the index of the named property.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.property(name).map(|p| p.index)
    }

    /// Returns the property at `index`.
    pub fn property_at(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    /// Returns the number of properties.
    #[inline]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if there are no properties.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Validating builder for [`EntitySchema`].
pub struct EntitySchemaBuilder {
    name: String,
    properties: Vec<Property>,
}

impl EntitySchemaBuilder {
    /// Creates a builder for the named entity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property with the type's default nullability.
    pub fn property(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(Property::new(name, data_type))
    }

    /// Adds a nullable property.
    pub fn nullable_property(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add(Property::new(name, data_type).nullable(true))
    }

    /// Adds a fully configured property.
    pub fn add(mut self, property: Property) -> Result<Self> {
        if self.properties.iter().any(|p| p.name == property.name) {
            return Err(Error::duplicate_property(&self.name, property.name));
        }
        self.properties.push(property);
        Ok(self)
    }

    /// Builds the schema.
    pub fn build(self) -> Result<EntitySchema> {
        if self.properties.is_empty() {
            return Err(Error::empty_schema(self.name));
        }
        Ok(EntitySchema::new(self.name, self.properties))
    }
}
