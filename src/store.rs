//! The store: a triple index, the schema table governing it, and the fixed
//! identity attribute and settings chosen at construction.

use tracing::{debug, info, warn};

use crate::assertion::{AssertReport, Facts};
use crate::config::StoreConfig;
use crate::construct::{Attribute, Eid, Triple, Value};
use crate::datatype::Literal;
use crate::entity::Entity;
use crate::error::{Result, TriplError};
use crate::fact::{Fact, FactMap, FactValue};
use crate::index::{EavMap, TripleIndex};
use crate::schema::{
    Cardinality, DB_ATTRIBUTES, DB_CARDINALITY, DB_DEFAULT_CARDINALITY, DB_LAZY_REFS,
    DB_VALUE_TYPE, SCHEMA_EID, Schema, SchemaMap, SchemaResolver, SchemaSettings, ValueType,
};

pub const DEFAULT_IDENT_ATTR: &str = "db:ident";

pub struct Store {
    pub(crate) index: TripleIndex,
    pub(crate) schema: Schema,
    pub(crate) ident_attr: Attribute,
    // settings may no longer change once the builder is done
    frozen: bool,
}

impl Store {
    /// A store with the bootstrap schema and default settings.
    pub fn new() -> Result<Self> {
        StoreBuilder::new().build()
    }
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }
    fn empty(ident_attr: Attribute) -> Self {
        Self {
            index: TripleIndex::new(),
            schema: Schema::new(SchemaSettings::default()),
            ident_attr,
            frozen: false,
        }
    }

    pub fn ident_attr(&self) -> &Attribute {
        &self.ident_attr
    }
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
    pub fn settings(&self) -> SchemaSettings {
        self.schema.settings()
    }
    pub fn index(&self) -> &TripleIndex {
        &self.index
    }
    /// Number of triples.
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
    pub fn contains(&self, triple: &Triple) -> bool {
        match self.normalize(triple.clone()) {
            Ok(triple) => self.index.contains(&triple),
            Err(_) => false,
        }
    }
    pub fn contains_entity(&self, eid: &str) -> bool {
        self.index.contains_entity(eid)
    }
    pub fn entity(&self, eid: impl Into<Eid>) -> Entity<'_> {
        Entity::new(self, eid.into())
    }
    pub fn entities<I>(&self, eids: I) -> Vec<Entity<'_>>
    where
        I: IntoIterator,
        I::Item: Into<Eid>,
    {
        eids.into_iter().map(|eid| self.entity(eid)).collect()
    }
    pub fn to_eav_map(&self) -> EavMap {
        self.index.to_eav_map()
    }

    /// Asserts per-attribute metadata as data under `db:schema`.
    pub fn assert_schema(&mut self, schema: &SchemaMap) -> Result<Eid> {
        let mut attributes = Vec::new();
        for (attribute, metadata) in schema {
            let mut entity = FactMap::new();
            entity.insert(
                self.ident_attr.clone(),
                Value::text(attribute.forward().to_string()),
            );
            if let Some(cardinality) = metadata.cardinality {
                entity.insert(DB_CARDINALITY.clone(), Value::text(cardinality.as_str()));
            }
            if let Some(value_type) = &metadata.value_type {
                entity.insert(DB_VALUE_TYPE.clone(), Value::text(value_type.as_str()));
            }
            attributes.push(FactValue::Entity(entity));
        }
        let mut fact = FactMap::new();
        fact.insert(self.ident_attr.clone(), Value::text(SCHEMA_EID));
        fact.insert(DB_ATTRIBUTES.clone(), FactValue::Many(attributes));
        let eid = self.assert_fact(Fact::Entity(fact))?;
        Ok(eid.unwrap_or_else(|| Eid::from(SCHEMA_EID)))
    }

    /// Asserts a single triple. A reverse attribute asserts the flipped
    /// forward triple.
    pub fn assert_triple(&mut self, triple: Triple) -> Result<bool> {
        let triple = self.normalize(triple)?;
        if self.frozen && self.is_setting(&triple) && !self.index.contains(&triple) {
            warn!(%triple, "store settings are fixed after construction; ignoring");
            return Ok(false);
        }
        if self.schema.is_ref(&triple.attribute) && !triple.value.is_ref() {
            warn!(%triple, "non-reference value for a reference attribute");
        }
        let changed = self.index.assert_triple(triple.clone(), &self.schema)?;
        if changed {
            debug!(%triple, "asserted");
            self.observe_asserted(&triple);
        }
        Ok(changed)
    }

    /// Retracts a single triple; retracting a triple that is not stored is
    /// an error.
    pub fn retract_triple(&mut self, triple: &Triple) -> Result<()> {
        let triple = self.normalize(triple.clone())?;
        self.index.retract_triple(&triple)?;
        debug!(%triple, "retracted");
        self.observe_retracted(&triple);
        Ok(())
    }

    pub fn retract_triples(&mut self, triples: impl IntoIterator<Item = Triple>) -> Result<()> {
        for triple in triples {
            self.retract_triple(&triple)?;
        }
        Ok(())
    }

    // Flips reverse triples and coerces values to the attribute's type.
    fn normalize(&self, triple: Triple) -> Result<Triple> {
        let Triple {
            entity,
            attribute,
            value,
        } = triple;
        let (entity, attribute, value) = if attribute.is_reverse() {
            let target = value.as_eid_str().ok_or_else(|| {
                TriplError::parse(format!("{} cannot be the source of {}", value, attribute))
            })?;
            (Eid::new(target), attribute.forward(), Value::Ref(entity))
        } else {
            (entity, attribute, value)
        };
        let value = self.coerce(&attribute, value);
        Ok(Triple {
            entity,
            attribute,
            value,
        })
    }

    /// Text values of reference attributes denote the entity they name.
    pub(crate) fn coerce(&self, attribute: &Attribute, value: Value) -> Value {
        if !self.schema.is_ref(attribute) {
            return value;
        }
        let named = match &value {
            Value::Literal(literal) => literal.as_text().map(Eid::new),
            Value::Ref(_) => None,
        };
        named.map(Value::Ref).unwrap_or(value)
    }

    fn is_setting(&self, triple: &Triple) -> bool {
        triple.entity.as_str() == SCHEMA_EID
            && (triple.attribute == *DB_LAZY_REFS || triple.attribute == *DB_DEFAULT_CARDINALITY)
    }

    fn described_attribute(&self, triple: &Triple) -> Option<Attribute> {
        match Attribute::parse(triple.entity.as_str()) {
            Ok(attribute) => Some(attribute.forward()),
            Err(e) => {
                warn!(%triple, error = %e, "schema fact about something that is not an attribute");
                None
            }
        }
    }

    // keeps the schema table in step with the schema facts
    fn observe_asserted(&mut self, triple: &Triple) {
        if triple.attribute == *DB_CARDINALITY {
            let Some(attribute) = self.described_attribute(triple) else {
                return;
            };
            match triple.value.as_eid_str().and_then(Cardinality::parse) {
                Some(cardinality) => {
                    debug!(%attribute, %cardinality, "cardinality declared");
                    self.schema.set_cardinality(attribute, Some(cardinality));
                }
                None => warn!(%triple, "unknown cardinality"),
            }
        } else if triple.attribute == *DB_VALUE_TYPE {
            let Some(attribute) = self.described_attribute(triple) else {
                return;
            };
            let Some(token) = triple.value.as_eid_str() else {
                warn!(%triple, "unknown value type");
                return;
            };
            let value_type = ValueType::parse(token);
            let is_ref = value_type == ValueType::Ref;
            if self.schema.set_value_type(attribute.clone(), Some(value_type)) {
                if is_ref {
                    self.index.index_references(&attribute);
                } else {
                    self.index.drop_references(&attribute);
                }
            }
        }
    }

    fn observe_retracted(&mut self, triple: &Triple) {
        if triple.attribute == *DB_CARDINALITY {
            if let Some(attribute) = self.described_attribute(triple) {
                self.schema.set_cardinality(attribute, None);
            }
        } else if triple.attribute == *DB_VALUE_TYPE {
            if let Some(attribute) = self.described_attribute(triple) {
                if self.schema.set_value_type(attribute.clone(), None) {
                    self.index.drop_references(&attribute);
                }
            }
        }
    }

    fn stored_setting(&self, attribute: &Attribute) -> Option<&Value> {
        let mut values: Vec<&Value> = self
            .index
            .values(&Eid::from(SCHEMA_EID), attribute)?
            .iter()
            .collect();
        values.sort();
        values.into_iter().next()
    }

    /// The identity value of an entity: its identity attribute, or the eid.
    pub(crate) fn identity_of(&self, eid: &Eid) -> Value {
        let mut values: Vec<&Value> = self
            .index
            .values(eid, &self.ident_attr)
            .map(|values| values.iter().collect())
            .unwrap_or_default();
        values.sort();
        values
            .into_iter()
            .next()
            .cloned()
            .unwrap_or_else(|| Value::text(eid.as_str()))
    }

    /// Entities referencing `target` through the forward attribute: read
    /// from the reverse index when the attribute is a declared reference,
    /// found by a full scan under lazy references, and otherwise empty.
    pub(crate) fn referrers(&self, target: &Eid, attribute: &Attribute) -> Vec<Eid> {
        let attribute = attribute.forward();
        let mut referrers: Vec<Eid> = if self.schema.is_ref(&attribute) {
            self.index
                .referrers(target, &attribute)
                .map(|referrers| referrers.iter().cloned().collect())
                .unwrap_or_default()
        } else if self.settings().lazy_refs {
            self.index
                .entities()
                .filter(|(_, attributes)| {
                    attributes
                        .get(&attribute)
                        .is_some_and(|values| values.iter().any(|v| v.points_at(target)))
                })
                .map(|(eid, _)| eid.clone())
                .collect()
        } else {
            warn!(
                %attribute,
                "reverse lookup needs a reference declaration or lazy references"
            );
            Vec::new()
        };
        referrers.sort();
        referrers
    }

    /// Entities reached from `eid` through the attribute, in either
    /// direction.
    pub(crate) fn targets(&self, eid: &Eid, attribute: &Attribute) -> Vec<Eid> {
        if attribute.is_reverse() {
            return self.referrers(eid, attribute);
        }
        let mut values: Vec<&Value> = self
            .index
            .values(eid, attribute)
            .map(|values| values.iter().collect())
            .unwrap_or_default();
        values.sort();
        let mut targets = Vec::new();
        for value in values {
            match value {
                Value::Ref(target) => targets.push(target.clone()),
                Value::Literal(Literal::Text(text)) if self.settings().lazy_refs => {
                    if self.index.contains_entity(text) {
                        targets.push(Eid::new(text));
                    } else {
                        debug!(%attribute, %value, "not a known entity");
                    }
                }
                Value::Literal(Literal::Text(_)) => {
                    warn!(%attribute, %value, "cannot traverse a literal without lazy references");
                }
                Value::Literal(_) => {
                    warn!(%attribute, %value, "not an entity; skipping");
                }
            }
        }
        targets
    }
}

// ------------- Builder -------------
/// Construction-time configuration of a [`Store`].
///
/// Settings are resolved once, in this order: explicit builder options, the
/// [`StoreConfig`], settings found on a `db:schema` entity among the facts,
/// and finally the defaults (lazy references, cardinality many).
#[derive(Default)]
pub struct StoreBuilder {
    schema: Option<SchemaMap>,
    facts: Vec<Fact>,
    id_attrs: Vec<Attribute>,
    lazy_refs: Option<bool>,
    default_cardinality: Option<Cardinality>,
    ident_attr: Option<String>,
    config: Option<StoreConfig>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn schema(mut self, schema: SchemaMap) -> Self {
        self.schema = Some(schema);
        self
    }
    pub fn facts(mut self, facts: Vec<Fact>) -> Self {
        self.facts = facts;
        self
    }
    /// Natural key attributes used to merge the initial facts.
    pub fn id_attrs(mut self, id_attrs: Vec<Attribute>) -> Self {
        self.id_attrs = id_attrs;
        self
    }
    pub fn lazy_refs(mut self, lazy_refs: bool) -> Self {
        self.lazy_refs = Some(lazy_refs);
        self
    }
    pub fn default_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.default_cardinality = Some(cardinality);
        self
    }
    pub fn ident_attr(mut self, ident_attr: &str) -> Self {
        self.ident_attr = Some(ident_attr.to_string());
        self
    }
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Store> {
        self.build_with_report().map(|(store, _)| store)
    }

    pub fn build_with_report(self) -> Result<(Store, AssertReport)> {
        let config = self.config.unwrap_or_default();
        let ident_attr = Attribute::parse(
            self.ident_attr
                .as_deref()
                .unwrap_or(config.ident_attr.as_str()),
        )?;
        let mut store = Store::empty(ident_attr);
        store.assert_schema(&Schema::bootstrap(&store.ident_attr))?;
        if let Some(schema) = &self.schema {
            store.assert_schema(schema)?;
        }
        // schema entities among the facts go first, so that every other
        // fact is indexed under its final cardinality and type
        let schema_facts: Vec<Fact> = self
            .facts
            .iter()
            .filter(|fact| match fact {
                Fact::Entity(map) => {
                    map.identity(&store.ident_attr).as_ref().map(Eid::as_str) == Some(SCHEMA_EID)
                }
                Fact::Triple(triple) => triple.entity.as_str() == SCHEMA_EID,
            })
            .cloned()
            .collect();
        for fact in schema_facts {
            store.assert_fact(fact)?;
        }

        let stored_lazy = match store.stored_setting(&DB_LAZY_REFS) {
            Some(Value::Literal(Literal::Boolean(lazy))) => Some(*lazy),
            Some(other) => {
                warn!(value = %other, "db.refs:lazy is not a boolean");
                None
            }
            None => None,
        };
        let stored_cardinality = store
            .stored_setting(&DB_DEFAULT_CARDINALITY)
            .and_then(|value| value.as_eid_str())
            .and_then(Cardinality::parse);
        let settings = SchemaSettings {
            lazy_refs: self
                .lazy_refs
                .or(config.lazy_refs)
                .or(stored_lazy)
                .unwrap_or(true),
            default_cardinality: self
                .default_cardinality
                .or(config.default_cardinality)
                .or(stored_cardinality)
                .unwrap_or(Cardinality::Many),
        };
        store.schema.set_settings(settings);
        store.assert_triple(Triple::new(
            SCHEMA_EID,
            DB_LAZY_REFS.clone(),
            settings.lazy_refs,
        ))?;
        store.assert_triple(Triple::new(
            SCHEMA_EID,
            DB_DEFAULT_CARDINALITY.clone(),
            settings.default_cardinality.as_str(),
        ))?;
        store.frozen = true;

        let report = store.assert_facts(Facts::Batch(self.facts), &self.id_attrs)?;
        info!(
            triples = store.len(),
            entities = store.index.entity_count(),
            lazy_refs = settings.lazy_refs,
            default_cardinality = %settings.default_cardinality,
            "store built"
        );
        Ok((store, report))
    }
}
