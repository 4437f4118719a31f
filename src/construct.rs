// used to hash the keys of the indexes
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

// custom made ordering for values
use std::cmp::Ordering;
use std::borrow::Borrow;
use std::str::FromStr;
use std::sync::Arc;

// used to print out readable forms of a construct
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::datatype::{DataType, Literal};
use crate::error::{Result, TriplError};

pub type IndexHasher = BuildHasherDefault<SeaHasher>;

// ------------- Eid -------------
/// A globally unique entity identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Eid(Arc<str>);

impl Eid {
    pub fn new(eid: impl AsRef<str>) -> Self {
        Self(Arc::from(eid.as_ref()))
    }
    /// Mints a fresh random identity.
    pub fn fresh() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Borrow<str> for Eid {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl From<&str> for Eid {
    fn from(eid: &str) -> Self {
        Self::new(eid)
    }
}
impl From<String> for Eid {
    fn from(eid: String) -> Self {
        Self(Arc::from(eid))
    }
}
impl From<&Eid> for Eid {
    fn from(eid: &Eid) -> Self {
        eid.clone()
    }
}
impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl Serialize for Eid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
impl<'de> Deserialize<'de> for Eid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(Eid::from)
    }
}

// ------------- Attribute -------------
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
    Forward,
    Reverse,
}

lazy_static! {
    // the namespace is everything up to the last colon, and an underscore
    // right after it marks a reverse lookup
    static ref ATTRIBUTE: Regex = Regex::new(r"^(?P<ns>.+):(?P<rev>_?)(?P<name>[^:]+)$").unwrap();
}

/// A namespaced attribute token such as `person:name`, or its reverse
/// lookup `person:_name` ("entities pointing at me through `person:name`").
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Attribute {
    namespace: Arc<str>,
    name: Arc<str>,
    direction: Direction,
}

impl Attribute {
    pub fn new(namespace: &str, name: &str, direction: Direction) -> Self {
        Self {
            namespace: Arc::from(namespace),
            name: Arc::from(name),
            direction,
        }
    }
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            return Err(TriplError::parse("empty attribute name"));
        }
        match ATTRIBUTE.captures(token) {
            Some(caps) => {
                let direction = if caps["rev"].is_empty() {
                    Direction::Forward
                } else {
                    Direction::Reverse
                };
                Ok(Self::new(&caps["ns"], &caps["name"], direction))
            }
            None => Ok(Self::new("", token, Direction::Forward)),
        }
    }
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn is_reverse(&self) -> bool {
        self.direction == Direction::Reverse
    }
    /// The underlying stored attribute of a reverse lookup (or itself).
    pub fn forward(&self) -> Self {
        Self {
            direction: Direction::Forward,
            ..self.clone()
        }
    }
    pub fn reverse(&self) -> Self {
        Self {
            direction: Direction::Reverse,
            ..self.clone()
        }
    }
}

impl Ord for Attribute {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.namespace, &self.name, self.direction).cmp(&(
            &other.namespace,
            &other.name,
            other.direction,
        ))
    }
}
impl PartialOrd for Attribute {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let marker = if self.is_reverse() { "_" } else { "" };
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}{}", self.namespace, marker, self.name)
        }
    }
}
impl FromStr for Attribute {
    type Err = TriplError;
    fn from_str(s: &str) -> Result<Self> {
        Attribute::parse(s)
    }
}
impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
impl<'de> Deserialize<'de> for Attribute {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Attribute::parse(&token).map_err(de::Error::custom)
    }
}

// ------------- Value -------------
/// Either an opaque literal or a reference to another entity.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Value {
    Literal(Literal),
    Ref(Eid),
}

impl Value {
    pub fn text(s: impl AsRef<str>) -> Self {
        Value::Literal(Literal::Text(Arc::from(s.as_ref())))
    }
    pub fn reference(eid: impl Into<Eid>) -> Self {
        Value::Ref(eid.into())
    }
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }
    /// The identity this value could denote: a reference, or a text literal
    /// naming an entity (as used by lazy references).
    pub fn as_eid_str(&self) -> Option<&str> {
        match self {
            Value::Ref(eid) => Some(eid.as_str()),
            Value::Literal(literal) => literal.as_text(),
        }
    }
    pub fn points_at(&self, eid: &Eid) -> bool {
        self.as_eid_str() == Some(eid.as_str())
    }
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        Literal::from_json(json).map(Value::Literal)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Literal(literal) => write!(f, "{}", literal),
            Value::Ref(eid) => write!(f, "{}", eid),
        }
    }
}
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Literal(literal) => literal.serialize(serializer),
            Value::Ref(eid) => eid.serialize(serializer),
        }
    }
}
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json)
            .ok_or_else(|| de::Error::custom(format!("{} is not a literal value", json)))
    }
}
impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Value::Literal(literal)
    }
}
impl From<Eid> for Value {
    fn from(eid: Eid) -> Self {
        Value::Ref(eid)
    }
}
impl<T: DataType> From<T> for Value {
    fn from(value: T) -> Self {
        Value::Literal(value.into_literal())
    }
}

// ------------- Triple -------------
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Triple {
    pub entity: Eid,
    pub attribute: Attribute,
    pub value: Value,
}

impl Triple {
    pub fn new(entity: impl Into<Eid>, attribute: Attribute, value: impl Into<Value>) -> Self {
        Self {
            entity: entity.into(),
            attribute,
            value: value.into(),
        }
    }
    /// Parses an `[entity, attribute, value]` triple from text tokens.
    pub fn parse(entity: &str, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self::new(entity, Attribute::parse(attribute)?, value))
    }
}
impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.entity, self.attribute, self.value)
    }
}
