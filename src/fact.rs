//! Facts as they are handed to the store: single triples, or nested maps
//! from attribute to value describing one entity (and the entities it
//! embeds).

use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::construct::{Attribute, Eid, Triple, Value};
use crate::error::{Result, TriplError};

#[derive(Clone, Debug, PartialEq)]
pub enum FactValue {
    Value(Value),
    /// An embedded entity, asserted on its own and then referenced.
    Entity(FactMap),
    /// Several values for a cardinality many attribute.
    Many(Vec<FactValue>),
}

impl FactValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        FactValue::Value(value.into())
    }
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(_) => FactMap::from_json(json).map(FactValue::Entity),
            serde_json::Value::Array(items) => items
                .iter()
                .filter(|item| !item.is_null())
                .map(FactValue::from_json)
                .collect::<Result<Vec<_>>>()
                .map(FactValue::Many),
            scalar => Value::from_json(scalar)
                .map(FactValue::Value)
                .ok_or_else(|| TriplError::parse(format!("{} is not a fact value", scalar))),
        }
    }
    /// The scalar value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FactValue::Value(value) => Some(value),
            _ => None,
        }
    }
}
impl From<Value> for FactValue {
    fn from(value: Value) -> Self {
        FactValue::Value(value)
    }
}
impl From<FactMap> for FactValue {
    fn from(map: FactMap) -> Self {
        FactValue::Entity(map)
    }
}
impl From<Vec<FactValue>> for FactValue {
    fn from(values: Vec<FactValue>) -> Self {
        FactValue::Many(values)
    }
}

/// Attribute/value pairs describing one entity, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FactMap {
    pairs: Vec<(Attribute, FactValue)>,
}

impl FactMap {
    pub fn new() -> Self {
        Self::default()
    }
    /// Parses a JSON object. Keys holding `null` are treated as absent.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| TriplError::parse(format!("{} is not a fact map", json)))?;
        let mut map = FactMap::new();
        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            map.insert(Attribute::parse(key)?, FactValue::from_json(value)?);
        }
        Ok(map)
    }
    /// Sets the value of an attribute, replacing any earlier one.
    pub fn insert(&mut self, attribute: Attribute, value: impl Into<FactValue>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(a, _)| *a == attribute) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((attribute, value)),
        }
    }
    pub fn with(mut self, attribute: &str, value: impl Into<FactValue>) -> Result<Self> {
        self.insert(Attribute::parse(attribute)?, value);
        Ok(self)
    }
    pub fn get(&self, attribute: &Attribute) -> Option<&FactValue> {
        self.pairs.iter().find(|(a, _)| a == attribute).map(|(_, v)| v)
    }
    pub fn contains(&self, attribute: &Attribute) -> bool {
        self.get(attribute).is_some()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, &FactValue)> {
        self.pairs.iter().map(|(a, v)| (a, v))
    }
    pub fn len(&self) -> usize {
        self.pairs.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
    /// The explicit identity carried under the identity attribute.
    pub fn identity(&self, ident_attr: &Attribute) -> Option<Eid> {
        match self.get(ident_attr)? {
            FactValue::Value(value) => Some(eid_of(value)),
            FactValue::Many(values) => values.iter().find_map(|v| v.as_value()).map(eid_of),
            FactValue::Entity(_) => None,
        }
    }
}

fn eid_of(value: &Value) -> Eid {
    match value.as_eid_str() {
        Some(eid) => Eid::new(eid),
        None => Eid::from(value.to_string()),
    }
}

impl<'de> Deserialize<'de> for FactMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        FactMap::from_json(&json).map_err(de::Error::custom)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fact {
    Triple(Triple),
    Entity(FactMap),
}

impl Fact {
    /// Objects are entity facts, `[entity, attribute, value]` arrays are
    /// triples.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(_) => FactMap::from_json(json).map(Fact::Entity),
            serde_json::Value::Array(items) if items.len() == 3 => {
                let entity = items[0]
                    .as_str()
                    .ok_or_else(|| TriplError::parse(format!("{} is not an entity", items[0])))?;
                let attribute = items[1]
                    .as_str()
                    .ok_or_else(|| TriplError::parse(format!("{} is not an attribute", items[1])))?;
                let value = Value::from_json(&items[2])
                    .ok_or_else(|| TriplError::parse(format!("{} is not a value", items[2])))?;
                Ok(Fact::Triple(Triple::parse(entity, attribute, value)?))
            }
            other => Err(TriplError::parse(format!("{} is not a fact", other))),
        }
    }
}
impl From<Triple> for Fact {
    fn from(triple: Triple) -> Self {
        Fact::Triple(triple)
    }
}
impl From<FactMap> for Fact {
    fn from(map: FactMap) -> Self {
        Fact::Entity(map)
    }
}
impl<'de> Deserialize<'de> for Fact {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Fact::from_json(&json).map_err(de::Error::custom)
    }
}

/// Parses a JSON array of facts.
pub fn facts_from_json(json: &serde_json::Value) -> Result<Vec<Fact>> {
    match json {
        serde_json::Value::Array(items) => items.iter().map(Fact::from_json).collect(),
        other => Ok(vec![Fact::from_json(other)?]),
    }
}

// ------------- Constructors -------------
/// Builds namespaced fact maps for one type of entity.
///
/// Keys without a namespace get the default namespace, and the type name is
/// recorded under `<root>:type`, where the root is the part of the type name
/// before its first dot (`person.student` is recorded under `person:type`).
#[derive(Clone, Debug)]
pub struct EntityTemplate {
    type_name: String,
    namespace: String,
}

impl EntityTemplate {
    pub fn new(type_name: &str, namespace: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            namespace: namespace.to_string(),
        }
    }
    pub fn build<I, K, V>(&self, pairs: I) -> Result<FactMap>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FactValue>,
    {
        let mut map = FactMap::new();
        for (key, value) in pairs {
            let key = key.as_ref();
            let attribute = if key.contains(':') {
                Attribute::parse(key)?
            } else {
                Attribute::parse(&format!("{}:{}", self.namespace, key))?
            };
            map.insert(attribute, value);
        }
        let root = self.type_name.split('.').next().unwrap_or(&self.type_name);
        map.insert(
            Attribute::parse(&format!("{}:type", root))?,
            Value::text(&self.type_name),
        );
        Ok(map)
    }
}

impl fmt::Display for EntityTemplate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.type_name, self.namespace)
    }
}
