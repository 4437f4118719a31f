//! Schema resolution.
//!
//! The schema is stored as ordinary data under the `db:schema` entity, but
//! every question asked about it is answered from a typed table that the
//! [`crate::store::Store`] keeps in step with those facts.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};

use crate::construct::{Attribute, Direction, IndexHasher};

pub const SCHEMA_EID: &str = "db:schema";
pub const TYPE_REF: &str = "db.type:ref";

lazy_static! {
    pub static ref DB_CARDINALITY: Attribute = Attribute::new("db", "cardinality", Direction::Forward);
    pub static ref DB_VALUE_TYPE: Attribute = Attribute::new("db", "valueType", Direction::Forward);
    pub static ref DB_ATTRIBUTES: Attribute = Attribute::new("db", "attributes", Direction::Forward);
    pub static ref DB_LAZY_REFS: Attribute = Attribute::new("db.refs", "lazy", Direction::Forward);
    pub static ref DB_DEFAULT_CARDINALITY: Attribute =
        Attribute::new("db.cardinality", "default", Direction::Forward);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "db.cardinality:one", alias = "one")]
    One,
    #[serde(rename = "db.cardinality:many", alias = "many")]
    Many,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::One => "db.cardinality:one",
            Cardinality::Many => "db.cardinality:many",
        }
    }
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "db.cardinality:one" | "one" => Some(Cardinality::One),
            "db.cardinality:many" | "many" => Some(Cardinality::Many),
            _ => None,
        }
    }
}
impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ValueType {
    Ref,
    /// Any other declared type; recorded but carries no engine semantics.
    Other(Arc<str>),
}

impl ValueType {
    pub fn parse(token: &str) -> Self {
        match token {
            TYPE_REF | "ref" => ValueType::Ref,
            other => ValueType::Other(Arc::from(other)),
        }
    }
    pub fn as_str(&self) -> &str {
        match self {
            ValueType::Ref => TYPE_REF,
            ValueType::Other(token) => token,
        }
    }
}
impl Serialize for ValueType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|token| ValueType::parse(&token))
    }
}

/// Per-attribute metadata, as found on the attribute's metadata entity.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(rename = "db:cardinality", default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
    #[serde(rename = "db:valueType", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
}

impl AttributeSchema {
    pub fn one() -> Self {
        Self {
            cardinality: Some(Cardinality::One),
            value_type: None,
        }
    }
    pub fn many() -> Self {
        Self {
            cardinality: Some(Cardinality::Many),
            value_type: None,
        }
    }
    pub fn reference(mut self) -> Self {
        self.value_type = Some(ValueType::Ref);
        self
    }
}

/// Caller supplied schema: attribute to metadata.
pub type SchemaMap = BTreeMap<Attribute, AttributeSchema>;

/// Store-wide settings, fixed once the store is built.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SchemaSettings {
    pub lazy_refs: bool,
    pub default_cardinality: Cardinality,
}

impl Default for SchemaSettings {
    fn default() -> Self {
        Self {
            lazy_refs: true,
            default_cardinality: Cardinality::Many,
        }
    }
}

/// Answers cardinality and value type questions for any attribute.
pub trait SchemaResolver {
    fn cardinality(&self, attr: &Attribute) -> Cardinality;
    fn value_type(&self, attr: &Attribute) -> Option<&ValueType>;

    fn is_ref(&self, attr: &Attribute) -> bool {
        // reverse lookups are typed by the attribute they reverse
        matches!(self.value_type(&attr.forward()), Some(ValueType::Ref))
    }
    fn is_card_one(&self, attr: &Attribute) -> bool {
        // a reverse lookup is always a collection of referrers
        !attr.is_reverse() && self.cardinality(attr) == Cardinality::One
    }
}

#[derive(Clone, Debug)]
pub struct Schema {
    attributes: HashMap<Attribute, AttributeSchema, IndexHasher>,
    settings: SchemaSettings,
}

impl Schema {
    /// The declarations every store starts out with.
    pub fn bootstrap(ident_attr: &Attribute) -> SchemaMap {
        let mut schema = SchemaMap::new();
        schema.insert(ident_attr.clone(), AttributeSchema::one());
        schema.insert(DB_CARDINALITY.clone(), AttributeSchema::one());
        schema.insert(DB_VALUE_TYPE.clone(), AttributeSchema::one());
        schema.insert(DB_ATTRIBUTES.clone(), AttributeSchema::many().reference());
        schema.insert(DB_LAZY_REFS.clone(), AttributeSchema::one());
        schema.insert(DB_DEFAULT_CARDINALITY.clone(), AttributeSchema::one());
        schema
    }
    pub fn new(settings: SchemaSettings) -> Self {
        Self {
            attributes: HashMap::default(),
            settings,
        }
    }
    pub fn settings(&self) -> SchemaSettings {
        self.settings
    }
    pub(crate) fn set_settings(&mut self, settings: SchemaSettings) {
        self.settings = settings;
    }
    pub fn attribute(&self, attr: &Attribute) -> Option<&AttributeSchema> {
        self.attributes.get(&attr.forward())
    }
    /// Declared attributes, in attribute order.
    pub fn declared(&self) -> SchemaMap {
        self.attributes
            .iter()
            .map(|(attr, schema)| (attr.clone(), schema.clone()))
            .collect()
    }
    pub(crate) fn set_cardinality(&mut self, attr: Attribute, cardinality: Option<Cardinality>) {
        let entry = self.attributes.entry(attr).or_default();
        entry.cardinality = cardinality;
    }
    /// Records the value type and reports whether ref-ness changed.
    pub(crate) fn set_value_type(&mut self, attr: Attribute, value_type: Option<ValueType>) -> bool {
        let entry = self.attributes.entry(attr).or_default();
        let was_ref = matches!(entry.value_type, Some(ValueType::Ref));
        entry.value_type = value_type;
        was_ref != matches!(entry.value_type, Some(ValueType::Ref))
    }
}

impl SchemaResolver for Schema {
    fn cardinality(&self, attr: &Attribute) -> Cardinality {
        if *attr == *DB_CARDINALITY {
            // otherwise resolving cardinality would have no base case
            return Cardinality::One;
        }
        self.attribute(attr)
            .and_then(|schema| schema.cardinality)
            .unwrap_or(self.settings.default_cardinality)
    }
    fn value_type(&self, attr: &Attribute) -> Option<&ValueType> {
        self.attribute(attr).and_then(|schema| schema.value_type.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(token: &str) -> Attribute {
        Attribute::parse(token).unwrap()
    }

    #[test]
    fn undeclared_attributes_use_the_default_cardinality() {
        let mut schema = Schema::new(SchemaSettings {
            lazy_refs: false,
            default_cardinality: Cardinality::One,
        });
        assert!(schema.is_card_one(&attr("person:name")));
        schema.set_cardinality(attr("person:name"), Some(Cardinality::Many));
        assert!(!schema.is_card_one(&attr("person:name")));
    }

    #[test]
    fn reverse_lookups_delegate_ref_typing_but_never_collapse() {
        let mut schema = Schema::new(SchemaSettings::default());
        schema.set_cardinality(attr("person:parent"), Some(Cardinality::One));
        assert!(schema.set_value_type(attr("person:parent"), Some(ValueType::Ref)));
        assert!(schema.is_ref(&attr("person:_parent")));
        assert!(schema.is_card_one(&attr("person:parent")));
        assert!(!schema.is_card_one(&attr("person:_parent")));
    }

    #[test]
    fn cardinality_attribute_is_always_one() {
        let mut schema = Schema::new(SchemaSettings::default());
        schema.set_cardinality(DB_CARDINALITY.clone(), Some(Cardinality::Many));
        assert_eq!(schema.cardinality(&DB_CARDINALITY), Cardinality::One);
    }

    #[test]
    fn attribute_schema_reads_schema_tokens() {
        let parsed: AttributeSchema = serde_json::from_str(
            r#"{"db:cardinality": "db.cardinality:one", "db:valueType": "db.type:ref"}"#,
        )
        .unwrap();
        assert_eq!(parsed, AttributeSchema::one().reference());
    }
}
