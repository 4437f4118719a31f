//! Loading stores from JSON files and saving them back.
//!
//! Two file layouts are read: an array of facts, as accepted by
//! [`crate::fact::facts_from_json`], and the index layout written by
//! [`dump_file`], an object `{eid: {attribute: [values...]}}`.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::construct::{Attribute, Triple, Value};
use crate::error::{Result, TriplError};
use crate::fact::{Fact, facts_from_json};
use crate::schema::SchemaMap;
use crate::store::Store;

/// Reads one file into a new store.
pub fn load_file(path: impl AsRef<Path>, schema: Option<SchemaMap>, config: StoreConfig) -> Result<Store> {
    load_files(&[path], schema, config)
}

/// Reads several files into one store. Settings come from the first file;
/// attribute declarations found in any of them apply to all.
pub fn load_files<P: AsRef<Path>>(
    paths: &[P],
    schema: Option<SchemaMap>,
    config: StoreConfig,
) -> Result<Store> {
    let (first, rest) = paths
        .split_first()
        .ok_or_else(|| TriplError::Persistence("no files to load".into()))?;
    let mut builder = Store::builder().config(config).facts(read_facts(first.as_ref())?);
    if let Some(schema) = schema {
        builder = builder.schema(schema);
    }
    let (mut store, report) = builder.build_with_report()?;
    let mut conflicts = report.conflicts.len();
    for path in rest {
        let report = store.assert_facts(read_facts(path.as_ref())?, &[])?;
        conflicts += report.conflicts.len();
    }
    info!(
        files = paths.len(),
        triples = store.len(),
        entities = store.index().entity_count(),
        conflicts,
        "store loaded"
    );
    Ok(store)
}

/// Reads the facts of one file, in either layout.
pub fn read_facts(path: &Path) -> Result<Vec<Fact>> {
    let text = fs::read_to_string(path)
        .map_err(|e| TriplError::Persistence(format!("{}: {}", path.display(), e)))?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    match &json {
        serde_json::Value::Object(_) => index_facts(&json),
        _ => facts_from_json(&json),
    }
}

// A saved index becomes a list of triples, schema triples first so that
// references are indexed as soon as their data arrives.
fn index_facts(json: &serde_json::Value) -> Result<Vec<Fact>> {
    let mut schema = Vec::new();
    let mut data = Vec::new();
    let entities = json
        .as_object()
        .ok_or_else(|| TriplError::parse("a saved index must be an object"))?;
    for (eid, attributes) in entities {
        let attributes = attributes
            .as_object()
            .ok_or_else(|| TriplError::parse(format!("{} does not map attributes", eid)))?;
        for (attribute, values) in attributes {
            let attribute = Attribute::parse(attribute)?;
            let values = match values {
                serde_json::Value::Array(values) => values.iter().collect(),
                serde_json::Value::Null => Vec::new(),
                single => vec![single],
            };
            for value in values {
                let Some(value) = Value::from_json(value) else {
                    warn!(%eid, %attribute, %value, "skipping a value that is not a literal");
                    continue;
                };
                let triple = Triple::new(eid.as_str(), attribute.clone(), value);
                if attribute.namespace() == "db" || attribute.namespace().starts_with("db.") {
                    schema.push(Fact::Triple(triple));
                } else {
                    data.push(Fact::Triple(triple));
                }
            }
        }
    }
    schema.extend(data);
    Ok(schema)
}

/// Writes the whole index, with values in order.
pub fn dump_file(store: &Store, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(&store.to_eav_map())?;
    fs::write(path, json).map_err(|e| TriplError::Persistence(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), triples = store.len(), "store saved");
    Ok(())
}
