//! Single level pattern matching: every attribute of the pattern must share
//! at least one value with the entity.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::construct::{Attribute, Eid, Value};
use crate::error::{Result, TriplError};
use crate::schema::SchemaResolver;
use crate::store::Store;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    clauses: BTreeMap<Attribute, Vec<Value>>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }
    /// Accepts `value` for the attribute, in addition to any value already
    /// accepted for it.
    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        self.accept(Attribute::parse(attribute)?, value.into());
        Ok(self)
    }
    pub fn any_of<V: Into<Value>>(
        mut self,
        attribute: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Self> {
        let attribute = Attribute::parse(attribute)?;
        for value in values {
            self.accept(attribute.clone(), value.into());
        }
        Ok(self)
    }
    fn accept(&mut self, attribute: Attribute, value: Value) {
        let accepted = self.clauses.entry(attribute).or_default();
        if !accepted.contains(&value) {
            accepted.push(value);
        }
    }
    /// Parses `{attribute: value}` or `{attribute: [values...]}`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| TriplError::parse(format!("{} is not a pattern", json)))?;
        let mut pattern = Pattern::new();
        for (key, accepted) in object {
            let attribute = Attribute::parse(key)?;
            let values: Vec<&serde_json::Value> = match accepted {
                serde_json::Value::Array(items) => items.iter().collect(),
                single => vec![single],
            };
            for value in values {
                let value = Value::from_json(value).ok_or_else(|| {
                    TriplError::parse(format!("{} cannot be matched against {}", value, key))
                })?;
                pattern.accept(attribute.clone(), value);
            }
        }
        Ok(pattern)
    }
    pub fn clauses(&self) -> impl Iterator<Item = (&Attribute, &[Value])> {
        self.clauses.iter().map(|(a, vs)| (a, vs.as_slice()))
    }
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let clauses: Vec<String> = self
            .clauses
            .iter()
            .map(|(attribute, values)| {
                let values: Vec<String> = values.iter().map(Value::to_string).collect();
                format!("{}: [{}]", attribute, values.join(", "))
            })
            .collect();
        write!(f, "{{{}}}", clauses.join(", "))
    }
}

impl Store {
    /// Eids of every entity matching the pattern. The empty pattern puts no
    /// constraint on an entity and so matches all of them.
    pub fn match_pattern(&self, pattern: &Pattern) -> BTreeSet<Eid> {
        let clauses: Vec<(&Attribute, Vec<Value>)> = pattern
            .clauses
            .iter()
            .map(|(attribute, values)| {
                let accepted = values.iter().map(|v| self.coerce(attribute, v.clone())).collect();
                (attribute, accepted)
            })
            .collect();
        let candidates: Vec<Eid> = match self.seed(&clauses) {
            Some(seeded) => seeded.into_iter().collect(),
            None => self.index.entities().map(|(eid, _)| eid.clone()).collect(),
        };
        candidates
            .into_iter()
            .filter(|eid| {
                clauses
                    .iter()
                    .all(|(attribute, accepted)| self.entity_matches(eid, attribute, accepted))
            })
            .collect()
    }

    // A declared reference clause can be answered from the reverse index
    // instead of a scan.
    fn seed(&self, clauses: &[(&Attribute, Vec<Value>)]) -> Option<BTreeSet<Eid>> {
        let (attribute, accepted) = clauses.iter().find(|(attribute, accepted)| {
            !attribute.is_reverse()
                && self.schema.is_ref(attribute)
                && accepted.iter().all(Value::is_ref)
        })?;
        let mut seeded = BTreeSet::new();
        for value in accepted {
            if let Value::Ref(target) = value {
                if let Some(referrers) = self.index.referrers(target, attribute) {
                    seeded.extend(referrers.iter().cloned());
                }
            }
        }
        Some(seeded)
    }

    fn entity_matches(&self, eid: &Eid, attribute: &Attribute, accepted: &[Value]) -> bool {
        if attribute.is_reverse() {
            self.referrers(eid, attribute)
                .iter()
                .any(|referrer| accepted.iter().any(|v| v.points_at(referrer)))
        } else {
            self.index
                .values(eid, attribute)
                .is_some_and(|values| accepted.iter().any(|v| values.contains(v)))
        }
    }
}
