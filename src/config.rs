//! Store configuration read from an optional file and `TRIPL_*` environment
//! variables, e.g. `TRIPL_LAZY_REFS=false` or
//! `TRIPL_DEFAULT_CARDINALITY=one`.

use std::path::Path;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::schema::Cardinality;
use crate::store::DEFAULT_IDENT_ATTR;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Traverse text values naming known entities as if they were references.
    pub lazy_refs: Option<bool>,
    /// Cardinality of attributes without a declaration.
    pub default_cardinality: Option<Cardinality>,
    /// The attribute holding an entity's identity.
    pub ident_attr: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lazy_refs: None,
            default_cardinality: None,
            ident_attr: DEFAULT_IDENT_ATTR.to_string(),
        }
    }
}

impl StoreConfig {
    /// Reads the configuration. A missing file is not an error; anything
    /// left unset keeps its default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let settings = builder
            .add_source(Environment::with_prefix("TRIPL").try_parsing(true))
            .build()?;
        let config: StoreConfig = settings.try_deserialize()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }
}
