//! The forward (EAV) and reverse (VAE) triple indexes.
//!
//! The reverse index is only maintained for reference typed attributes and
//! only ever keyed by [`Value::Ref`] targets. Both indexes are changed in
//! lockstep by [`TripleIndex::assert_triple`] and
//! [`TripleIndex::retract_triple`], which is what keeps
//! `(e, a, v) ∈ EAV ⇔ (v, a, e) ∈ VAE` for every reference attribute `a`.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::construct::{Attribute, Eid, IndexHasher, Triple, Value};
use crate::error::{Result, TriplError};
use crate::schema::SchemaResolver;

pub type ValueSet = HashSet<Value, IndexHasher>;
pub type EidSet = HashSet<Eid, IndexHasher>;
pub type AttributeMap = HashMap<Attribute, ValueSet, IndexHasher>;
type ReverseMap = HashMap<Attribute, EidSet, IndexHasher>;

/// An ordered snapshot of the forward index, as saved to disk.
pub type EavMap = BTreeMap<Eid, BTreeMap<Attribute, Vec<Value>>>;

#[derive(Debug, Default)]
pub struct TripleIndex {
    eav: HashMap<Eid, AttributeMap, IndexHasher>,
    vae: HashMap<Eid, ReverseMap, IndexHasher>,
    length: usize,
}

impl TripleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a triple, returning whether the index changed.
    ///
    /// For a cardinality one attribute every other value the entity holds
    /// is retracted before the new value is added, so re-asserting the
    /// current value never goes through a retract/re-add cycle.
    pub fn assert_triple(&mut self, triple: Triple, schema: &impl SchemaResolver) -> Result<bool> {
        let Triple {
            entity,
            attribute,
            value,
        } = triple;
        if attribute.is_reverse() {
            return Err(TriplError::Invariant(format!(
                "reverse attribute {} cannot be stored",
                attribute
            )));
        }
        if schema.is_card_one(&attribute) {
            let stale: Vec<Value> = self
                .values(&entity, &attribute)
                .map(|values| values.iter().filter(|x| **x != value).cloned().collect())
                .unwrap_or_default();
            for x in stale {
                self.retract_triple(&Triple::new(entity.clone(), attribute.clone(), x))?;
            }
        }
        let added = self
            .eav
            .entry(entity.clone())
            .or_default()
            .entry(attribute.clone())
            .or_default()
            .insert(value.clone());
        if !added {
            return Ok(false);
        }
        self.length += 1;
        if schema.is_ref(&attribute) {
            if let Value::Ref(target) = value {
                self.vae
                    .entry(target)
                    .or_default()
                    .entry(attribute)
                    .or_default()
                    .insert(entity);
            }
        }
        Ok(true)
    }

    /// Removes exactly the named triple and its reverse mirror.
    pub fn retract_triple(&mut self, triple: &Triple) -> Result<()> {
        let Triple {
            entity,
            attribute,
            value,
        } = triple;
        let mut removed = false;
        let mut entity_emptied = false;
        if let Some(attributes) = self.eav.get_mut(entity) {
            if let Some(values) = attributes.get_mut(attribute) {
                removed = values.remove(value);
                if values.is_empty() {
                    attributes.remove(attribute);
                }
            }
            entity_emptied = attributes.is_empty();
        }
        if entity_emptied {
            self.eav.remove(entity);
        }
        if !removed {
            return Err(TriplError::MissingTriple {
                entity: entity.to_string(),
                attribute: attribute.to_string(),
                value: value.to_string(),
            });
        }
        self.length -= 1;
        if let Value::Ref(target) = value {
            self.unmirror(target, attribute, entity);
        }
        Ok(())
    }

    fn unmirror(&mut self, target: &Eid, attribute: &Attribute, entity: &Eid) {
        let mut target_emptied = false;
        if let Some(reverse) = self.vae.get_mut(target) {
            if let Some(referrers) = reverse.get_mut(attribute) {
                referrers.remove(entity);
                if referrers.is_empty() {
                    reverse.remove(attribute);
                }
            }
            target_emptied = reverse.is_empty();
        }
        if target_emptied {
            self.vae.remove(target);
        }
    }

    /// Starts mirroring an attribute that has become reference typed: text
    /// values are turned into references and the reverse index is filled.
    pub fn index_references(&mut self, attribute: &Attribute) {
        let mut mirrored = 0;
        for (entity, attributes) in self.eav.iter_mut() {
            let Some(values) = attributes.get_mut(attribute) else {
                continue;
            };
            let coerced: ValueSet = values
                .drain()
                .map(|value| {
                    let named = match &value {
                        Value::Literal(literal) => literal.as_text().map(Eid::new),
                        Value::Ref(_) => None,
                    };
                    named.map(Value::Ref).unwrap_or(value)
                })
                .collect();
            *values = coerced;
            for value in values.iter() {
                if let Value::Ref(target) = value {
                    self.vae
                        .entry(target.clone())
                        .or_default()
                        .entry(attribute.clone())
                        .or_default()
                        .insert(entity.clone());
                    mirrored += 1;
                }
            }
        }
        // coercion may have collapsed a text and a reference into one value
        self.length = self.count_triples();
        debug!(%attribute, mirrored, "indexed references");
    }

    /// Stops mirroring an attribute that is no longer reference typed.
    pub fn drop_references(&mut self, attribute: &Attribute) {
        self.vae.retain(|_, reverse| {
            reverse.remove(attribute);
            !reverse.is_empty()
        });
        debug!(%attribute, "dropped references");
    }

    fn count_triples(&self) -> usize {
        self.eav
            .values()
            .flat_map(|attributes| attributes.values())
            .map(|values| values.len())
            .sum()
    }

    pub fn values(&self, entity: &Eid, attribute: &Attribute) -> Option<&ValueSet> {
        self.eav.get(entity).and_then(|attributes| attributes.get(attribute))
    }
    pub fn entity(&self, entity: &Eid) -> Option<&AttributeMap> {
        self.eav.get(entity)
    }
    pub fn contains_entity(&self, entity: &str) -> bool {
        self.eav.contains_key(entity)
    }
    pub fn contains(&self, triple: &Triple) -> bool {
        self.values(&triple.entity, &triple.attribute)
            .is_some_and(|values| values.contains(&triple.value))
    }
    /// Entities pointing at `target` through the reference attribute.
    pub fn referrers(&self, target: &Eid, attribute: &Attribute) -> Option<&EidSet> {
        self.vae.get(target).and_then(|reverse| reverse.get(attribute))
    }
    pub fn entities(&self) -> impl Iterator<Item = (&Eid, &AttributeMap)> {
        self.eav.iter()
    }
    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.eav.iter().flat_map(|(entity, attributes)| {
            attributes.iter().flat_map(move |(attribute, values)| {
                values
                    .iter()
                    .map(move |value| Triple::new(entity.clone(), attribute.clone(), value.clone()))
            })
        })
    }
    /// Number of triples.
    pub fn len(&self) -> usize {
        self.length
    }
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
    pub fn entity_count(&self) -> usize {
        self.eav.len()
    }

    pub fn to_eav_map(&self) -> EavMap {
        self.eav
            .iter()
            .map(|(entity, attributes)| {
                let attributes = attributes
                    .iter()
                    .map(|(attribute, values)| {
                        let mut values: Vec<Value> = values.iter().cloned().collect();
                        values.sort();
                        (attribute.clone(), values)
                    })
                    .collect();
                (entity.clone(), attributes)
            })
            .collect()
    }

    /// Checks that forward and reverse indexes agree for every reference
    /// typed attribute.
    pub fn is_consistent(&self, schema: &impl SchemaResolver) -> bool {
        let forward_mirrored = self.eav.iter().all(|(entity, attributes)| {
            attributes
                .iter()
                .filter(|(attribute, _)| schema.is_ref(attribute))
                .all(|(attribute, values)| {
                    values.iter().all(|value| match value {
                        Value::Ref(target) => self
                            .referrers(target, attribute)
                            .is_some_and(|referrers| referrers.contains(entity)),
                        Value::Literal(_) => true,
                    })
                })
        });
        let reverse_backed = self.vae.iter().all(|(target, reverse)| {
            reverse.iter().all(|(attribute, referrers)| {
                schema.is_ref(attribute)
                    && referrers.iter().all(|entity| {
                        self.values(entity, attribute)
                            .is_some_and(|values| values.contains(&Value::Ref(target.clone())))
                    })
            })
        });
        forward_mirrored && reverse_backed
    }
}
