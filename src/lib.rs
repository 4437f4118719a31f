//! Tripl – an embeddable entity/attribute/value graph store.
//!
//! Everything is a triple `(entity, attribute, value)`:
//! * An [`construct::Eid`] is an opaque entity identity.
//! * An [`construct::Attribute`] is a namespaced token such as `person:name`.
//!   Writing an underscore after the colon (`person:_parent`) turns it into a
//!   reverse lookup: "the entities pointing at me through `person:parent`".
//! * A [`construct::Value`] is either a literal or a reference to an entity.
//!
//! The store keeps a forward index (entity, attribute, values) and, for
//! attributes declared as references, a reverse index (target, attribute,
//! referrers) that is always the exact mirror of the forward one.
//!
//! ## Schema
//! The schema is data: attribute declarations live on the `db:schema`
//! entity of the very store they govern (see [`schema`]), and the store keeps
//! a typed table of them up to date as they are asserted or retracted.
//! Attributes default to cardinality many; an attribute declared
//! `db.cardinality:one` holds a single value and asserting a new one replaces
//! the old.
//!
//! ## Facts
//! Nested maps of attributes to values describe entities (see [`fact`]).
//! Nested maps become entities of their own, and natural keys can merge maps
//! describing the same entity (see [`assertion`]).
//!
//! ## Reading
//! * [`pattern`] finds the entities sharing values with a pattern.
//! * [`pull`] projects an entity and its neighborhood into a nested record,
//!   following relations to any depth without looping on cycles.
//! * [`entity`] offers ad hoc attribute access.
//!
//! ## Quick Start
//! ```
//! use serde_json::json;
//! use tripl::{Fact, PullExpr, Store};
//!
//! let mut store = Store::new()?;
//! store.assert_fact(Fact::from_json(&json!({
//!     "db:ident": "alice",
//!     "person:parent": {"db:ident": "bob"}
//! }))?)?;
//! let record = store.pull(&PullExpr::parse(r#"["person:parent"]"#)?, "alice")?;
//! assert_eq!(record.to_json(), json!({"person:parent": ["bob"]}));
//! # Ok::<(), tripl::TriplError>(())
//! ```

pub mod assertion;
pub mod config;
pub mod construct;
pub mod datatype;
pub mod entity;
pub mod error;
pub mod fact;
pub mod index;
pub mod interface;
pub mod pattern;
pub mod persist;
pub mod pull;
pub mod schema;
pub mod store;

pub use crate::assertion::{AssertReport, Conflict, Facts, IdentityTable};
pub use crate::config::StoreConfig;
pub use crate::construct::{Attribute, Direction, Eid, Triple, Value};
pub use crate::datatype::{DataType, Literal};
pub use crate::entity::{Entity, Field};
pub use crate::error::{Result, TriplError};
pub use crate::fact::{EntityTemplate, Fact, FactMap, FactValue};
pub use crate::interface::SharedStore;
pub use crate::pattern::Pattern;
pub use crate::pull::{PullExpr, PullSpec, PullTarget, PullTargets, PullToken, Pulled, Record, SortBy};
pub use crate::schema::{AttributeSchema, Cardinality, Schema, SchemaMap, SchemaResolver, ValueType};
pub use crate::store::{Store, StoreBuilder};
