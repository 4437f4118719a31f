//! A read-only view of one entity's slice of the index.

use std::fmt;

use tracing::warn;

use crate::construct::{Attribute, Eid, Value};
use crate::schema::SchemaResolver;
use crate::store::Store;

/// What an attribute of an entity holds.
#[derive(Debug)]
pub enum Field<'s> {
    /// Stored values, in value order.
    Values(Vec<Value>),
    /// The entities a reference attribute (or reverse lookup) leads to.
    Entities(Vec<Entity<'s>>),
}

impl Field<'_> {
    pub fn is_empty(&self) -> bool {
        match self {
            Field::Values(values) => values.is_empty(),
            Field::Entities(entities) => entities.is_empty(),
        }
    }
    pub fn len(&self) -> usize {
        match self {
            Field::Values(values) => values.len(),
            Field::Entities(entities) => entities.len(),
        }
    }
    pub fn eids(&self) -> Vec<&Eid> {
        match self {
            Field::Values(_) => Vec::new(),
            Field::Entities(entities) => entities.iter().map(Entity::eid).collect(),
        }
    }
}

#[derive(Clone)]
pub struct Entity<'s> {
    store: &'s Store,
    eid: Eid,
}

impl<'s> Entity<'s> {
    pub fn new(store: &'s Store, eid: Eid) -> Self {
        Self { store, eid }
    }
    pub fn eid(&self) -> &Eid {
        &self.eid
    }
    pub fn exists(&self) -> bool {
        self.store.contains_entity(self.eid.as_str())
    }

    /// Looks an attribute up. Reference attributes, and under lazy
    /// references attributes whose every value names a known entity, come
    /// back as entity views; reverse lookups list the referring entities.
    pub fn get(&self, attribute: &Attribute) -> Field<'s> {
        if attribute.is_reverse() {
            let referrers = self.store.referrers(&self.eid, attribute);
            return Field::Entities(self.store.entities(referrers));
        }
        let mut values: Vec<Value> = self
            .store
            .index
            .values(&self.eid, attribute)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default();
        values.sort();
        let traversable = self.store.schema.is_ref(attribute)
            || (self.store.settings().lazy_refs
                && !values.is_empty()
                && values.iter().all(|v| {
                    v.is_ref() || v.as_eid_str().is_some_and(|e| self.store.contains_entity(e))
                }));
        if !traversable {
            return Field::Values(values);
        }
        let mut targets = Vec::new();
        for value in values {
            match value.as_eid_str() {
                Some(target) => targets.push(self.store.entity(target)),
                None => warn!(%attribute, %value, "reference attribute holds a literal"),
            }
        }
        Field::Entities(targets)
    }

    /// Parses the attribute token first; an unparseable token holds nothing.
    pub fn field(&self, attribute: &str) -> Field<'s> {
        match Attribute::parse(attribute) {
            Ok(attribute) => self.get(&attribute),
            Err(_) => Field::Values(Vec::new()),
        }
    }

    pub fn contains(&self, attribute: &Attribute) -> bool {
        if attribute.is_reverse() {
            return self.store.schema.is_ref(attribute) || self.store.settings().lazy_refs;
        }
        self.store.index.values(&self.eid, attribute).is_some()
    }

    /// Stored attributes, in attribute order.
    pub fn attributes(&self) -> Vec<Attribute> {
        let mut attributes: Vec<Attribute> = self
            .store
            .index
            .entity(&self.eid)
            .map(|attributes| attributes.keys().cloned().collect())
            .unwrap_or_default();
        attributes.sort();
        attributes
    }
    pub fn len(&self) -> usize {
        self.store.index.entity(&self.eid).map_or(0, |attributes| attributes.len())
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entity").field("eid", &self.eid).finish()
    }
}
impl fmt::Display for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.eid)
    }
}
