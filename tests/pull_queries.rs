use std::io;
use std::sync::{Arc, Mutex};

use serde_json::json;

use tripl::fact::facts_from_json;
use tripl::schema::AttributeSchema;
use tripl::{
    Attribute, Cardinality, Fact, Pattern, PullExpr, Pulled, SchemaMap, SortBy, Store, TriplError,
    Value,
};

fn attr(token: &str) -> Attribute {
    Attribute::parse(token).unwrap()
}

fn expr(text: &str) -> PullExpr {
    PullExpr::parse(text).unwrap()
}

fn store_with(facts: serde_json::Value) -> Store {
    Store::builder()
        .facts(facts_from_json(&facts).unwrap())
        .build()
        .unwrap()
}

fn alice_and_bob() -> Fact {
    Fact::from_json(&json!({"db:ident": "alice", "person:parent": {"db:ident": "bob"}})).unwrap()
}

#[test]
fn undeclared_attributes_pull_as_sequences() {
    let mut store = Store::new().unwrap();
    store.assert_fact(alice_and_bob()).unwrap();
    let alice = store.pull(&expr(r#"["person:parent"]"#), "alice").unwrap();
    assert_eq!(alice.to_json(), json!({"person:parent": ["bob"]}));
}

#[test]
fn cardinality_one_attributes_collapse_to_a_scalar() {
    let mut schema = SchemaMap::new();
    schema.insert(attr("person:parent"), AttributeSchema::one());
    let mut store = Store::builder().schema(schema).build().unwrap();
    store.assert_fact(alice_and_bob()).unwrap();
    let alice = store.pull(&expr(r#"["person:parent"]"#), "alice").unwrap();
    assert_eq!(alice.to_json(), json!({"person:parent": "bob"}));

    let mut store = Store::builder()
        .default_cardinality(Cardinality::One)
        .build()
        .unwrap();
    store.assert_fact(alice_and_bob()).unwrap();
    let alice = store.pull(&expr(r#"["person:parent"]"#), "alice").unwrap();
    assert_eq!(alice.to_json(), json!({"person:parent": "bob"}));
}

#[test]
fn missing_attributes_are_absent_or_empty() {
    let mut schema = SchemaMap::new();
    schema.insert(attr("person:name"), AttributeSchema::one());
    let mut store = Store::builder().schema(schema).build().unwrap();
    store.assert_fact(alice_and_bob()).unwrap();
    let bob = store
        .pull(&expr(r#"["person:name", "person:nick"]"#), "bob")
        .unwrap();
    assert_eq!(bob.get("person:name"), Some(&Pulled::Absent));
    assert_eq!(bob.to_json(), json!({"person:name": null, "person:nick": []}));
}

#[test]
fn wildcard_pulls_every_stored_attribute() {
    let mut schema = SchemaMap::new();
    schema.insert(attr("person:name"), AttributeSchema::one());
    let facts = facts_from_json(&json!([{
        "db:ident": "alice",
        "person:name": "Alice",
        "person:nick": ["ally", "al"],
        "person:parent": {"db:ident": "bob", "person:name": "Bob"}
    }]))
    .unwrap();
    let store = Store::builder().schema(schema).facts(facts).build().unwrap();

    let alice = store.pull(&expr(r#"["*"]"#), "alice").unwrap();
    assert_eq!(
        alice.to_json(),
        json!({
            "db:ident": "alice",
            "person:name": "Alice",
            "person:nick": ["al", "ally"],
            "person:parent": ["bob"]
        })
    );

    // explicit relations take precedence over the wildcard
    let alice = store
        .pull(&expr(r#"["*", {"person:parent": ["person:name"]}]"#), "alice")
        .unwrap();
    assert_eq!(alice.to_json()["person:parent"], json!([{"person:name": "Bob"}]));
    assert_eq!(alice.len(), 4);
}

#[test]
fn recursion_follows_chains_to_the_end() {
    let store = store_with(json!([
        {"db:ident": "a", "person:parent": "b"},
        {"db:ident": "b", "person:parent": "c"},
        {"db:ident": "c"}
    ]));
    let ancestors = store
        .pull(&expr(r#"["db:ident", {"person:parent": "..."}]"#), "a")
        .unwrap();
    assert_eq!(
        ancestors.to_json(),
        json!({
            "db:ident": "a",
            "person:parent": [{
                "db:ident": "b",
                "person:parent": [{"db:ident": "c", "person:parent": []}]
            }]
        })
    );
}

#[test]
fn recursion_stops_at_cycles() {
    let store = store_with(json!([
        {"db:ident": "a", "person:parent": "b"},
        {"db:ident": "b", "person:parent": "a"}
    ]));
    let pulled = store
        .pull(&expr(r#"["db:ident", {"person:parent": "..."}]"#), "a")
        .unwrap();
    assert_eq!(
        pulled.to_json(),
        json!({
            "db:ident": "a",
            "person:parent": [{
                "db:ident": "b",
                "person:parent": [{"db:ident": "a"}]
            }]
        })
    );

    let itself = store_with(json!([{"db:ident": "x", "person:parent": "x"}]));
    let pulled = itself
        .pull(&expr(r#"["*", {"person:parent": "..."}]"#), "x")
        .unwrap();
    assert_eq!(
        pulled.to_json(),
        json!({"db:ident": "x", "person:parent": [{"db:ident": "x"}]})
    );
}

#[test]
fn shared_ancestors_are_expanded_once() {
    let store = store_with(json!([
        {"db:ident": "a", "person:parent": ["b", "c"]},
        {"db:ident": "b", "person:parent": "c"},
        {"db:ident": "c", "person:parent": "d"},
        {"db:ident": "d"}
    ]));
    let pulled = store
        .pull(&expr(r#"["db:ident", {"person:parent": "..."}]"#), "a")
        .unwrap();
    assert_eq!(
        pulled.to_json(),
        json!({
            "db:ident": "a",
            "person:parent": [
                {
                    "db:ident": "b",
                    "person:parent": [{
                        "db:ident": "c",
                        "person:parent": [{"db:ident": "d", "person:parent": []}]
                    }]
                },
                {"db:ident": "c"}
            ]
        })
    );
}

fn count_records(json: &serde_json::Value) -> usize {
    match json {
        serde_json::Value::Object(fields) => 1 + fields.values().map(count_records).sum::<usize>(),
        serde_json::Value::Array(items) => items.iter().map(count_records).sum(),
        _ => 0,
    }
}

#[test]
fn recursion_over_chained_diamonds_stays_linear() {
    // l{i} has parents a{i} and b{i}, and both of those have parent l{i+1}
    let depth = 16;
    let mut facts = Vec::new();
    for i in 0..depth {
        let next = format!("l{}", i + 1);
        facts.push(json!({"db:ident": format!("l{}", i),
                          "person:parent": [format!("a{}", i), format!("b{}", i)]}));
        facts.push(json!({"db:ident": format!("a{}", i), "person:parent": &next}));
        facts.push(json!({"db:ident": format!("b{}", i), "person:parent": &next}));
    }
    facts.push(json!({"db:ident": format!("l{}", depth)}));
    let store = store_with(serde_json::Value::Array(facts));
    let people = 3 * depth + 1;

    let pulled = store
        .pull(&expr(r#"["db:ident", {"person:parent": "..."}]"#), "l0")
        .unwrap();
    // every person expanded once, plus one identity-only record per rejoin
    assert_eq!(count_records(&pulled.to_json()), people + depth);
}

#[test]
fn recursion_inside_a_nested_expression_uses_the_top_level() {
    let store = store_with(json!([
        {"db:ident": "a", "person:home": {"db:ident": "h", "place:owner": "b"}},
        {"db:ident": "b", "person:home": {"db:ident": "g"}}
    ]));
    let pulled = store
        .pull(
            &expr(r#"["db:ident", {"person:home": [{"place:owner": "..."}]}]"#),
            "a",
        )
        .unwrap();
    assert_eq!(
        pulled.to_json(),
        json!({
            "db:ident": "a",
            "person:home": [{"place:owner": [{
                "db:ident": "b",
                "person:home": [{"place:owner": []}]
            }]}]
        })
    );
}

#[test]
fn reverse_lookups_list_referrer_identities() {
    let lookup = expr(r#"["person:_parent"]"#);

    // scanned under lazy references
    let mut lazy = Store::new().unwrap();
    lazy.assert_fact(alice_and_bob()).unwrap();
    assert_eq!(
        lazy.pull(&lookup, "bob").unwrap().to_json(),
        json!({"person:_parent": ["alice"]})
    );

    // read from the reverse index once declared
    let mut schema = SchemaMap::new();
    schema.insert(attr("person:parent"), AttributeSchema::many().reference());
    let mut declared = Store::builder()
        .schema(schema)
        .lazy_refs(false)
        .build()
        .unwrap();
    declared.assert_fact(alice_and_bob()).unwrap();
    assert_eq!(
        declared.pull(&lookup, "bob").unwrap().to_json(),
        json!({"person:_parent": ["alice"]})
    );

    // neither: nothing to look in
    let mut strict = Store::builder().lazy_refs(false).build().unwrap();
    strict.assert_fact(alice_and_bob()).unwrap();
    assert_eq!(
        strict.pull(&lookup, "bob").unwrap().to_json(),
        json!({"person:_parent": []})
    );
}

#[test]
fn reverse_relations_pull_the_referrers() {
    let store = store_with(json!([
        {"db:ident": "alice", "person:age": 7, "person:parent": {"db:ident": "bob"}},
        {"db:ident": "carol", "person:age": 9, "person:parent": "bob"}
    ]));
    let bob = store
        .pull(&expr(r#"[{"person:_parent": ["person:age"]}]"#), "bob")
        .unwrap();
    assert_eq!(
        bob.to_json(),
        json!({"person:_parent": [{"person:age": [7]}, {"person:age": [9]}]})
    );
}

#[test]
fn text_is_only_followed_under_lazy_references() {
    let facts = json!([
        {"db:ident": "carol", "person:parent": "dave"},
        {"db:ident": "dave", "person:age": 60}
    ]);
    let parent = expr(r#"[{"person:parent": ["person:age"]}]"#);

    let lazy = store_with(facts.clone());
    assert_eq!(
        lazy.pull(&parent, "carol").unwrap().to_json(),
        json!({"person:parent": [{"person:age": [60]}]})
    );

    let strict = Store::builder()
        .lazy_refs(false)
        .facts(facts_from_json(&facts).unwrap())
        .build()
        .unwrap();
    assert_eq!(
        strict.pull(&parent, "carol").unwrap().to_json(),
        json!({"person:parent": []})
    );
}

#[test]
fn pattern_targets_must_match_exactly_one_entity() {
    let store = store_with(json!([
        {"db:ident": "a", "person:age": 30},
        {"db:ident": "b", "person:age": 30},
        {"db:ident": "c", "person:age": 40}
    ]));
    let ident = expr(r#"["db:ident"]"#);

    let forty = Pattern::new().with("person:age", 40i64).unwrap();
    assert_eq!(
        store.pull(&ident, forty).unwrap().to_json(),
        json!({"db:ident": "c"})
    );

    let thirty = Pattern::new().with("person:age", 30i64).unwrap();
    assert!(matches!(
        store.pull(&ident, thirty),
        Err(TriplError::AmbiguousPattern { matches: 2, .. })
    ));

    let fifty = Pattern::new().with("person:age", 50i64).unwrap();
    assert!(matches!(store.pull(&ident, fifty), Err(TriplError::NoMatch { .. })));

    assert!(matches!(
        store.pull(&ident, "nobody"),
        Err(TriplError::UnknownEntity(_))
    ));
}

#[test]
fn entity_views_are_pull_targets() {
    let store = store_with(json!([{"db:ident": "a", "person:age": 30}]));
    let a = store.entity("a");
    let pulled = store.pull(&expr(r#"["person:age"]"#), &a).unwrap();
    assert_eq!(pulled.to_json(), json!({"person:age": [30]}));
}

#[test]
fn pull_many_sorts_with_absent_first() {
    let mut schema = SchemaMap::new();
    schema.insert(attr("person:age"), AttributeSchema::one());
    let facts = facts_from_json(&json!([
        {"db:ident": "a", "person:age": 30},
        {"db:ident": "b", "person:age": 20},
        {"db:ident": "c"}
    ]))
    .unwrap();
    let store = Store::builder().schema(schema).facts(facts).build().unwrap();
    let ident_and_age = expr(r#"["db:ident", "person:age"]"#);
    let idents = |records: Vec<tripl::Record>| -> Vec<Value> {
        records
            .iter()
            .filter_map(|record| record.get("db:ident").and_then(Pulled::as_value).cloned())
            .collect()
    };

    let unsorted = store
        .pull_many(&ident_and_age, vec!["a", "b", "c"], None)
        .unwrap();
    assert_eq!(
        idents(unsorted),
        vec![Value::text("a"), Value::text("b"), Value::text("c")]
    );

    let ascending = SortBy::ascending("person:age").unwrap();
    let sorted = store
        .pull_many(&ident_and_age, vec!["a", "b", "c"], Some(&ascending))
        .unwrap();
    assert_eq!(
        idents(sorted),
        vec![Value::text("c"), Value::text("b"), Value::text("a")]
    );

    let descending = SortBy::descending("person:age").unwrap();
    let sorted = store
        .pull_many(&ident_and_age, vec!["c", "a", "b"], Some(&descending))
        .unwrap();
    assert_eq!(
        idents(sorted),
        vec![Value::text("a"), Value::text("b"), Value::text("c")]
    );
}

#[test]
fn pull_many_over_a_pattern_visits_every_match() {
    let store = store_with(json!([
        {"db:ident": "a", "person:age": 30},
        {"db:ident": "b", "person:age": 30},
        {"db:ident": "c", "person:age": 40}
    ]));
    let thirty = Pattern::new().with("person:age", 30i64).unwrap();
    let records = store
        .pull_many(&expr(r#"["db:ident"]"#), thirty, None)
        .unwrap();
    let json: Vec<serde_json::Value> = records.iter().map(|r| r.to_json()).collect();
    assert_eq!(json, vec![json!({"db:ident": "a"}), json!({"db:ident": "b"})]);
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn logged_while<T>(run: impl FnOnce() -> T) -> (T, String) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, run);
    let text = String::from_utf8_lossy(&captured.0.lock().unwrap()).into_owned();
    (out, text)
}

#[test]
fn numbers_are_not_followed_even_under_lazy_references() {
    let store = store_with(json!([{"db:ident": "a", "thing:size": 3}]));
    let (pulled, log) = logged_while(|| {
        store
            .pull(&expr(r#"[{"thing:size": ["db:ident"]}]"#), "a")
            .unwrap()
    });
    assert_eq!(pulled.to_json(), json!({"thing:size": []}));
    assert!(log.contains("not an entity"));
    assert!(!log.contains("without lazy references"));
}
