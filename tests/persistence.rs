use std::fs;

use serde_json::json;

use tripl::fact::facts_from_json;
use tripl::persist::{dump_file, load_file, load_files};
use tripl::schema::AttributeSchema;
use tripl::{Attribute, Cardinality, PullExpr, SchemaMap, SchemaResolver, Store, StoreConfig};

fn attr(token: &str) -> Attribute {
    Attribute::parse(token).unwrap()
}

#[test]
fn saved_stores_load_back_identically() {
    let mut schema = SchemaMap::new();
    schema.insert(attr("person:parent"), AttributeSchema::many().reference());
    schema.insert(attr("person:name"), AttributeSchema::one());
    let facts = facts_from_json(&json!([
        {"db:ident": "alice", "person:name": "Alice", "person:age": 7,
         "person:parent": {"db:ident": "bob", "person:name": "Bob"}},
        {"db:ident": "carol", "person:parent": ["alice", "bob"], "person:tall": true}
    ]))
    .unwrap();
    let store = Store::builder()
        .schema(schema)
        .facts(facts)
        .lazy_refs(false)
        .build()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("family.json");
    dump_file(&store, &path).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["carol"]["person:parent"], json!(["alice", "bob"]));

    let loaded = load_file(&path, None, StoreConfig::default()).unwrap();
    assert_eq!(loaded.len(), store.len());
    assert_eq!(loaded.settings(), store.settings());
    assert_eq!(loaded.to_eav_map(), store.to_eav_map());
    assert!(loaded.index().is_consistent(loaded.schema()));

    let expr = PullExpr::parse(r#"["*", {"person:_parent": ["person:name"]}]"#).unwrap();
    assert_eq!(
        loaded.pull(&expr, "bob").unwrap().to_json(),
        store.pull(&expr, "bob").unwrap().to_json()
    );
}

#[test]
fn loading_many_files_merges_their_schemas() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");
    fs::write(
        &first,
        json!([
            {"db:ident": "db:schema", "db.refs:lazy": false,
             "db:attributes": [{"db:ident": "person:name", "db:cardinality": "db.cardinality:one"}]},
            {"db:ident": "a", "person:name": "A"}
        ])
        .to_string(),
    )
    .unwrap();
    fs::write(
        &second,
        json!([
            {"db:ident": "db:schema", "db.refs:lazy": true,
             "db:attributes": [{"db:ident": "person:age", "db:cardinality": "db.cardinality:one"}]},
            {"db:ident": "b", "person:age": 3}
        ])
        .to_string(),
    )
    .unwrap();

    let store = load_files(&[&first, &second], None, StoreConfig::default()).unwrap();
    assert!(!store.settings().lazy_refs);
    assert_eq!(store.schema().cardinality(&attr("person:name")), Cardinality::One);
    assert_eq!(store.schema().cardinality(&attr("person:age")), Cardinality::One);
    assert!(store.contains_entity("a"));
    assert!(store.contains_entity("b"));

    let expr = PullExpr::parse(r#"["person:age"]"#).unwrap();
    assert_eq!(store.pull(&expr, "b").unwrap().to_json(), json!({"person:age": 3}));
}

#[test]
fn missing_files_are_persistence_errors() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_file(dir.path().join("absent.json"), None, StoreConfig::default());
    assert!(matches!(result, Err(tripl::TriplError::Persistence(_))));
    let nothing: [&str; 0] = [];
    assert!(load_files(&nothing, None, StoreConfig::default()).is_err());
}
