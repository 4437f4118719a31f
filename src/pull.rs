//! The pull evaluator: projects an entity, and whatever it references, into
//! a nested record shaped by a pull expression.
//!
//! An expression is a list of tokens:
//!
//! * `"person:name"` includes the stored values of an attribute,
//! * `"*"` includes every stored attribute not named by another token,
//! * `"person:_parent"` includes the identities of the entities referencing
//!   this one through `person:parent`,
//! * `{"person:parent": [...]}` follows the relation and pulls the nested
//!   expression from each entity reached,
//! * `{"person:parent": "..."}` follows the relation and pulls the top level
//!   expression again, to any depth.
//!
//! Every attribute of a record collapses to a single value (or [`Pulled::Absent`])
//! when it has cardinality one and stays a sequence otherwise.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

use crate::construct::{Attribute, Eid, IndexHasher, Value};
use crate::entity::Entity;
use crate::error::{Result, TriplError};
use crate::pattern::Pattern;
use crate::schema::SchemaResolver;
use crate::store::Store;

const WILDCARD: &str = "*";
const RECURSE: &str = "...";

// ------------- Expressions -------------
#[derive(Clone, Debug, PartialEq)]
pub enum PullToken {
    Attr(Attribute),
    Wildcard,
    Relation(Attribute, PullSpec),
}

/// What to pull from the entities a relation leads to.
#[derive(Clone, Debug, PartialEq)]
pub enum PullSpec {
    Expr(PullExpr),
    /// The top level expression of the pull.
    Recurse,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PullExpr(Vec<PullToken>);

impl PullExpr {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, token: PullToken) -> Self {
        self.0.push(token);
        self
    }
    pub fn attr(self, attribute: &str) -> Result<Self> {
        Ok(self.with(PullToken::Attr(Attribute::parse(attribute)?)))
    }
    pub fn wildcard(self) -> Self {
        self.with(PullToken::Wildcard)
    }
    pub fn relation(self, attribute: &str, spec: PullSpec) -> Result<Self> {
        Ok(self.with(PullToken::Relation(Attribute::parse(attribute)?, spec)))
    }
    pub fn tokens(&self) -> &[PullToken] {
        &self.0
    }

    /// Parses an expression from JSON. A lone token is accepted as a one
    /// token expression.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let mut expr = PullExpr::new();
        match json {
            serde_json::Value::Array(tokens) => {
                for token in tokens {
                    expr.push_json(token)?;
                }
            }
            token => expr.push_json(token)?,
        }
        Ok(expr)
    }
    fn push_json(&mut self, token: &serde_json::Value) -> Result<()> {
        match token {
            serde_json::Value::String(s) if s == WILDCARD => self.0.push(PullToken::Wildcard),
            serde_json::Value::String(s) if s == RECURSE => {
                return Err(TriplError::parse(
                    "the recursion marker may only stand for a relation's expression",
                ));
            }
            serde_json::Value::String(s) => self.0.push(PullToken::Attr(Attribute::parse(s)?)),
            serde_json::Value::Object(relations) => {
                for (key, nested) in relations {
                    let spec = match nested {
                        serde_json::Value::String(s) if s == RECURSE => PullSpec::Recurse,
                        nested => PullSpec::Expr(PullExpr::from_json(nested)?),
                    };
                    self.0.push(PullToken::Relation(Attribute::parse(key)?, spec));
                }
            }
            other => return Err(TriplError::parse(format!("{} is not a pull token", other))),
        }
        Ok(())
    }
    pub fn parse(text: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(&json)
    }
    pub fn to_json(&self) -> serde_json::Value {
        let tokens = self
            .0
            .iter()
            .map(|token| match token {
                PullToken::Attr(attribute) => serde_json::Value::String(attribute.to_string()),
                PullToken::Wildcard => serde_json::Value::String(WILDCARD.to_string()),
                PullToken::Relation(attribute, spec) => {
                    let nested = match spec {
                        PullSpec::Recurse => serde_json::Value::String(RECURSE.to_string()),
                        PullSpec::Expr(expr) => expr.to_json(),
                    };
                    let mut relation = serde_json::Map::new();
                    relation.insert(attribute.to_string(), nested);
                    serde_json::Value::Object(relation)
                }
            })
            .collect();
        serde_json::Value::Array(tokens)
    }
}

impl FromStr for PullExpr {
    type Err = TriplError;
    fn from_str(s: &str) -> Result<Self> {
        PullExpr::parse(s)
    }
}
impl fmt::Display for PullExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ------------- Results -------------
/// A pulled value. The variant order is the sort order used by
/// [`Store::pull_many`]: absent, then literals, references, records and
/// finally sequences.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Pulled {
    Absent,
    Value(Value),
    Record(Record),
    Many(Vec<Pulled>),
}

impl Pulled {
    pub fn is_absent(&self) -> bool {
        matches!(self, Pulled::Absent)
    }
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Pulled::Value(value) => Some(value),
            _ => None,
        }
    }
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Pulled::Record(record) => Some(record),
            _ => None,
        }
    }
    pub fn as_many(&self) -> Option<&[Pulled]> {
        match self {
            Pulled::Many(items) => Some(items),
            _ => None,
        }
    }
}

impl Serialize for Pulled {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Pulled::Absent => serializer.serialize_none(),
            Pulled::Value(value) => value.serialize(serializer),
            Pulled::Record(record) => record.serialize(serializer),
            Pulled::Many(items) => items.serialize(serializer),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Record(BTreeMap<Attribute, Pulled>);

impl Record {
    pub fn get(&self, attribute: &str) -> Option<&Pulled> {
        let attribute = Attribute::parse(attribute).ok()?;
        self.0.get(&attribute)
    }
    pub fn get_attr(&self, attribute: &Attribute) -> Option<&Pulled> {
        self.0.get(attribute)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, &Pulled)> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (attribute, pulled) in &self.0 {
            map.serialize_entry(&attribute.to_string(), pulled)?;
        }
        map.end()
    }
}

// ------------- Targets -------------
/// Where a pull starts: an entity, or the single entity matching a pattern.
#[derive(Clone, Debug)]
pub enum PullTarget {
    Eid(Eid),
    Pattern(Pattern),
}

impl From<Eid> for PullTarget {
    fn from(eid: Eid) -> Self {
        PullTarget::Eid(eid)
    }
}
impl From<&Eid> for PullTarget {
    fn from(eid: &Eid) -> Self {
        PullTarget::Eid(eid.clone())
    }
}
impl From<&str> for PullTarget {
    fn from(eid: &str) -> Self {
        PullTarget::Eid(Eid::new(eid))
    }
}
impl From<&Entity<'_>> for PullTarget {
    fn from(entity: &Entity<'_>) -> Self {
        PullTarget::Eid(entity.eid().clone())
    }
}
impl From<Entity<'_>> for PullTarget {
    fn from(entity: Entity<'_>) -> Self {
        PullTarget::Eid(entity.eid().clone())
    }
}
impl From<Pattern> for PullTarget {
    fn from(pattern: Pattern) -> Self {
        PullTarget::Pattern(pattern)
    }
}

/// The entities of a batch pull.
#[derive(Clone, Debug)]
pub enum PullTargets {
    Eids(Vec<Eid>),
    /// Every match, in eid order.
    Pattern(Pattern),
}

impl From<Vec<Eid>> for PullTargets {
    fn from(eids: Vec<Eid>) -> Self {
        PullTargets::Eids(eids)
    }
}
impl From<Vec<&str>> for PullTargets {
    fn from(eids: Vec<&str>) -> Self {
        PullTargets::Eids(eids.into_iter().map(Eid::new).collect())
    }
}
impl From<Pattern> for PullTargets {
    fn from(pattern: Pattern) -> Self {
        PullTargets::Pattern(pattern)
    }
}

/// Orders the records of a batch pull by one of their attributes. Records
/// lacking the attribute sort as absent.
#[derive(Clone, Debug)]
pub struct SortBy {
    pub attribute: Attribute,
    pub descending: bool,
}

impl SortBy {
    pub fn ascending(attribute: &str) -> Result<Self> {
        Ok(Self {
            attribute: Attribute::parse(attribute)?,
            descending: false,
        })
    }
    pub fn descending(attribute: &str) -> Result<Self> {
        Ok(Self {
            attribute: Attribute::parse(attribute)?,
            descending: true,
        })
    }
    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let key = |record: &Record| record.get_attr(&self.attribute).cloned().unwrap_or(Pulled::Absent);
        let ordering = key(a).cmp(&key(b));
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

type Visited = HashSet<Eid, IndexHasher>;

// ------------- Evaluation -------------
impl Store {
    pub fn pull(&self, expr: &PullExpr, target: impl Into<PullTarget>) -> Result<Record> {
        let eid = self.pull_target(target.into())?;
        // every entity expanded so far, anywhere in this pull
        let mut visited = Visited::default();
        visited.insert(eid.clone());
        Ok(self.pull_entity(expr, expr, &eid, &mut visited))
    }

    pub fn pull_many(
        &self,
        expr: &PullExpr,
        targets: impl Into<PullTargets>,
        sort: Option<&SortBy>,
    ) -> Result<Vec<Record>> {
        let eids: Vec<Eid> = match targets.into() {
            PullTargets::Eids(eids) => eids,
            PullTargets::Pattern(pattern) => self.match_pattern(&pattern).into_iter().collect(),
        };
        let mut records = eids
            .into_iter()
            .map(|eid| self.pull(expr, eid))
            .collect::<Result<Vec<Record>>>()?;
        if let Some(sort) = sort {
            records.sort_by(|a, b| sort.compare(a, b));
        }
        Ok(records)
    }

    fn pull_target(&self, target: PullTarget) -> Result<Eid> {
        match target {
            PullTarget::Eid(eid) if self.contains_entity(eid.as_str()) => Ok(eid),
            PullTarget::Eid(eid) => Err(TriplError::UnknownEntity(eid.to_string())),
            PullTarget::Pattern(pattern) => {
                let matches = self.match_pattern(&pattern);
                match matches.len() {
                    0 => Err(TriplError::NoMatch {
                        pattern: pattern.to_string(),
                    }),
                    1 => matches
                        .into_iter()
                        .next()
                        .ok_or_else(|| TriplError::Invariant("lost the only match".into())),
                    n => Err(TriplError::AmbiguousPattern {
                        pattern: pattern.to_string(),
                        matches: n,
                    }),
                }
            }
        }
    }

    fn pull_entity(&self, top: &PullExpr, expr: &PullExpr, eid: &Eid, visited: &mut Visited) -> Record {
        let mut gathered: BTreeMap<Attribute, Vec<Pulled>> = BTreeMap::new();
        let mut wildcard = false;
        for token in expr.tokens() {
            match token {
                PullToken::Wildcard => wildcard = true,
                PullToken::Attr(attribute) if attribute.is_reverse() => {
                    let identities = self
                        .referrers(eid, attribute)
                        .iter()
                        .map(|referrer| Pulled::Value(self.identity_of(referrer)))
                        .collect();
                    gathered.insert(attribute.clone(), identities);
                }
                PullToken::Attr(attribute) => {
                    gathered.insert(attribute.clone(), self.stored(eid, attribute));
                }
                PullToken::Relation(attribute, spec) => {
                    let nested = self
                        .targets(eid, attribute)
                        .into_iter()
                        .map(|target| self.pull_related(top, spec, target, visited))
                        .collect();
                    gathered.insert(attribute.clone(), nested);
                }
            }
        }
        if wildcard {
            if let Some(attributes) = self.index.entity(eid) {
                for attribute in attributes.keys() {
                    if !gathered.contains_key(attribute) {
                        gathered.insert(attribute.clone(), self.stored(eid, attribute));
                    }
                }
            }
        }

        let shaped = gathered
            .into_iter()
            .map(|(attribute, mut pulled)| {
                let pulled = if self.schema.is_card_one(&attribute) {
                    if pulled.is_empty() {
                        Pulled::Absent
                    } else {
                        pulled.swap_remove(0)
                    }
                } else {
                    Pulled::Many(pulled)
                };
                (attribute, pulled)
            })
            .collect();
        Record(shaped)
    }

    fn pull_related(&self, top: &PullExpr, spec: &PullSpec, target: Eid, visited: &mut Visited) -> Pulled {
        match spec {
            PullSpec::Expr(nested) => Pulled::Record(self.pull_entity(top, nested, &target, visited)),
            PullSpec::Recurse => {
                if !visited.insert(target.clone()) {
                    debug!(eid = %target, "already expanded; not expanding again");
                    return Pulled::Record(self.terminal_record(&target));
                }
                Pulled::Record(self.pull_entity(top, top, &target, visited))
            }
        }
    }

    // what an entity expanded elsewhere in the same pull comes back as
    fn terminal_record(&self, eid: &Eid) -> Record {
        let mut record = BTreeMap::new();
        record.insert(self.ident_attr.clone(), Pulled::Value(self.identity_of(eid)));
        Record(record)
    }

    fn stored(&self, eid: &Eid, attribute: &Attribute) -> Vec<Pulled> {
        let mut values: Vec<&Value> = self
            .index
            .values(eid, attribute)
            .map(|values| values.iter().collect())
            .unwrap_or_default();
        values.sort();
        values.into_iter().cloned().map(Pulled::Value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_token_kind() {
        let expr = PullExpr::from_json(&json!([
            "person:name",
            "*",
            "person:_parent",
            {"person:home": ["place:name"]},
            {"person:parent": "..."}
        ]))
        .unwrap();
        let tokens = expr.tokens();
        assert_eq!(tokens.len(), 5);
        assert!(matches!(&tokens[0], PullToken::Attr(a) if !a.is_reverse()));
        assert_eq!(tokens[1], PullToken::Wildcard);
        assert!(matches!(&tokens[2], PullToken::Attr(a) if a.is_reverse()));
        assert!(matches!(&tokens[3], PullToken::Relation(_, PullSpec::Expr(_))));
        assert!(matches!(&tokens[4], PullToken::Relation(_, PullSpec::Recurse)));
    }

    #[test]
    fn recursion_marker_needs_a_relation() {
        assert!(PullExpr::from_json(&json!(["..."])).is_err());
        assert!(PullExpr::parse("[42]").is_err());
    }

    #[test]
    fn expressions_print_as_json() {
        let expr = PullExpr::new()
            .attr("person:name")
            .unwrap()
            .relation("person:parent", PullSpec::Recurse)
            .unwrap();
        assert_eq!(expr.to_json(), json!(["person:name", {"person:parent": "..."}]));
        assert_eq!(PullExpr::parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn absent_sorts_before_everything() {
        let mut pulled = vec![
            Pulled::Many(vec![]),
            Pulled::Value(Value::reference("b")),
            Pulled::Value(Value::from(3i64)),
            Pulled::Absent,
            Pulled::Record(Record::default()),
        ];
        pulled.sort();
        assert!(pulled[0].is_absent());
        assert_eq!(pulled[1], Pulled::Value(Value::from(3i64)));
        assert_eq!(pulled[2], Pulled::Value(Value::reference("b")));
        assert!(pulled[3].as_record().is_some());
        assert!(pulled[4].as_many().is_some());
    }
}
