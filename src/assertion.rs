//! Turning facts into triples: entity identity resolution and bulk
//! assertion.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::construct::{Attribute, Eid, IndexHasher, Triple, Value};
use crate::error::Result;
use crate::fact::{Fact, FactMap, FactValue};
use crate::index::EavMap;
use crate::store::Store;

/// A data irregularity met while resolving identities. These never abort
/// a batch; the resolution picked is described by the variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Conflict {
    /// A fact with an explicit identity carries a natural key already
    /// recorded for another entity. The explicit identity wins and the key
    /// is re-pointed to it.
    ConflictingIdentity {
        attribute: Attribute,
        value: Value,
        recorded: Eid,
        explicit: Eid,
    },
    /// The natural keys of a fact point at several entities. The smallest
    /// eid is chosen.
    AmbiguousMerge { candidates: Vec<Eid>, chosen: Eid },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Conflict::ConflictingIdentity {
                attribute,
                value,
                recorded,
                explicit,
            } => write!(
                f,
                "({}, {}) was recorded for {} but the fact says {}",
                attribute, value, recorded, explicit
            ),
            Conflict::AmbiguousMerge { candidates, chosen } => {
                let candidates: Vec<&str> = candidates.iter().map(Eid::as_str).collect();
                write!(f, "natural keys match [{}], merging into {}", candidates.join(", "), chosen)
            }
        }
    }
}

/// Maps natural keys `(attribute, value)` to the eid they were resolved to
/// during one bulk assertion.
#[derive(Debug, Default)]
pub struct IdentityTable {
    id_attrs: Vec<Attribute>,
    ids: HashMap<(Attribute, Value), Eid, IndexHasher>,
    conflicts: Vec<Conflict>,
}

impl IdentityTable {
    pub fn new(id_attrs: impl IntoIterator<Item = Attribute>) -> Self {
        Self {
            id_attrs: id_attrs.into_iter().collect(),
            ..Self::default()
        }
    }
    pub fn id_attrs(&self) -> &[Attribute] {
        &self.id_attrs
    }
    pub fn lookup(&self, attribute: &Attribute, value: &Value) -> Option<&Eid> {
        self.ids.get(&(attribute.clone(), value.clone()))
    }
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }
    fn conflict(&mut self, conflict: Conflict) {
        warn!(%conflict, "identity conflict");
        self.conflicts.push(conflict);
    }

    /// Picks the eid a fact map describes.
    pub fn resolve(&mut self, fact: &FactMap, ident_attr: &Attribute) -> Eid {
        let explicit = fact.identity(ident_attr);
        if self.id_attrs.is_empty() {
            return explicit.unwrap_or_else(Eid::fresh);
        }
        let keys: Vec<(Attribute, Value)> = self
            .id_attrs
            .iter()
            .filter_map(|attribute| {
                fact.get(attribute)
                    .and_then(FactValue::as_value)
                    .map(|value| (attribute.clone(), value.clone()))
            })
            .collect();

        if let Some(eid) = explicit {
            for key in keys {
                let recorded = self.ids.get(&key).cloned();
                if let Some(recorded) = recorded {
                    if recorded != eid {
                        self.conflict(Conflict::ConflictingIdentity {
                            attribute: key.0.clone(),
                            value: key.1.clone(),
                            recorded,
                            explicit: eid.clone(),
                        });
                    }
                }
                self.ids.insert(key, eid.clone());
            }
            return eid;
        }

        let mut candidates: Vec<Eid> = keys
            .iter()
            .filter_map(|key| self.ids.get(key).cloned())
            .collect();
        candidates.sort();
        candidates.dedup();
        let eid = match candidates.first() {
            Some(chosen) => {
                let chosen = chosen.clone();
                if candidates.len() > 1 {
                    self.conflict(Conflict::AmbiguousMerge {
                        candidates,
                        chosen: chosen.clone(),
                    });
                }
                chosen
            }
            None => Eid::fresh(),
        };
        for key in keys {
            self.ids.entry(key).or_insert_with(|| eid.clone());
        }
        eid
    }
}

/// The things [`Store::assert_facts`] knows how to merge.
pub enum Facts<'a> {
    /// Facts asserted in order, sharing one identity table.
    Batch(Vec<Fact>),
    /// A raw forward index, merged triple by triple.
    Index(EavMap),
    /// Every triple of another store.
    Store(&'a Store),
}

impl From<Vec<Fact>> for Facts<'_> {
    fn from(facts: Vec<Fact>) -> Self {
        Facts::Batch(facts)
    }
}
impl From<EavMap> for Facts<'_> {
    fn from(index: EavMap) -> Self {
        Facts::Index(index)
    }
}
impl<'a> From<&'a Store> for Facts<'a> {
    fn from(store: &'a Store) -> Self {
        Facts::Store(store)
    }
}

#[derive(Debug, Default)]
pub struct AssertReport {
    /// Eids of the entity facts in the batch, in order.
    pub eids: Vec<Eid>,
    pub conflicts: Vec<Conflict>,
}

impl Store {
    /// Asserts one fact; entity facts return the eid they resolved to.
    pub fn assert_fact(&mut self, fact: impl Into<Fact>) -> Result<Option<Eid>> {
        let mut table = IdentityTable::default();
        self.assert_fact_with(fact, &mut table)
    }

    /// As [`Store::assert_fact`], resolving natural keys through `table`.
    pub fn assert_fact_with(
        &mut self,
        fact: impl Into<Fact>,
        table: &mut IdentityTable,
    ) -> Result<Option<Eid>> {
        match fact.into() {
            Fact::Triple(triple) => {
                self.assert_triple(triple)?;
                Ok(None)
            }
            Fact::Entity(map) => self.assert_entity(&map, table).map(Some),
        }
    }

    /// Asserts a batch of facts, a raw EAV index, or a whole other store.
    /// Natural keys only apply to batches.
    pub fn assert_facts<'a>(
        &mut self,
        facts: impl Into<Facts<'a>>,
        id_attrs: &[Attribute],
    ) -> Result<AssertReport> {
        let mut report = AssertReport::default();
        match facts.into() {
            Facts::Batch(facts) => {
                let mut table = IdentityTable::new(id_attrs.iter().cloned());
                for fact in facts {
                    if let Some(eid) = self.assert_fact_with(fact, &mut table)? {
                        report.eids.push(eid);
                    }
                }
                report.conflicts = table.conflicts;
            }
            Facts::Index(index) => self.merge_index(index, id_attrs)?,
            Facts::Store(other) => self.merge_index(other.to_eav_map(), id_attrs)?,
        }
        Ok(report)
    }

    fn merge_index(&mut self, index: EavMap, id_attrs: &[Attribute]) -> Result<()> {
        if !id_attrs.is_empty() {
            debug!("natural keys are not used when merging an index");
        }
        for (entity, attributes) in index {
            for (attribute, values) in attributes {
                for value in values {
                    self.assert_triple(Triple::new(entity.clone(), attribute.clone(), value))?;
                }
            }
        }
        Ok(())
    }

    pub fn resolve_eid(&self, fact: &FactMap, table: &mut IdentityTable) -> Eid {
        table.resolve(fact, &self.ident_attr)
    }

    fn assert_entity(&mut self, fact: &FactMap, table: &mut IdentityTable) -> Result<Eid> {
        let eid = self.resolve_eid(fact, table);
        for (attribute, value) in fact.iter() {
            self.assert_value(&eid, attribute, value, table)?;
        }
        if !fact.contains(&self.ident_attr) {
            let ident_attr = self.ident_attr.clone();
            self.assert_triple(Triple::new(eid.clone(), ident_attr, Value::text(eid.as_str())))?;
        }
        Ok(eid)
    }

    fn assert_value(
        &mut self,
        eid: &Eid,
        attribute: &Attribute,
        value: &FactValue,
        table: &mut IdentityTable,
    ) -> Result<()> {
        match value {
            FactValue::Value(value) => {
                self.assert_triple(Triple::new(eid.clone(), attribute.clone(), value.clone()))?;
            }
            FactValue::Entity(nested) => {
                let nested = self.assert_entity(nested, table)?;
                self.assert_triple(Triple::new(eid.clone(), attribute.clone(), Value::Ref(nested)))?;
            }
            FactValue::Many(values) => {
                for value in values {
                    self.assert_value(eid, attribute, value, table)?;
                }
            }
        }
        Ok(())
    }
}
