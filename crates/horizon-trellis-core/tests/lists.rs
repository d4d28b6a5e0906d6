//! Integration tests for list materialization and reordering.

use horizon_trellis_core::{Store, TrellisConfig, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn list_store() -> Store {
    Store::from_html(r#"<ul><li sb-mark="list.#"></li></ul>"#, TrellisConfig::default()).unwrap()
}

/// `(key, text)` of every realized element under `prefix`, in document order.
fn realized(store: &Store, prefix: &str) -> Vec<(String, String)> {
    let doc = store.document();
    doc.with_read(|tree| {
        tree.query_attr_prefix(tree.root(), "sb-mark", prefix)
            .into_iter()
            .filter(|&el| !tree.is_template(el))
            .filter_map(|el| {
                let key = tree.attribute(el, "sb-mark")?;
                (!key.ends_with(".#")).then(|| (key.to_string(), tree.text_content(el)))
            })
            .collect()
    })
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_push_appends_in_order() {
    init_tracing();
    let store = list_store();
    store.set("list", Value::array(["x"]));
    assert_eq!(store.node("list").push(["y"]), 2);

    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "x"), ("list.1", "y")]));
    assert_eq!(
        store.document().to_html(),
        r#"<ul><li sb-mark="list.0">x</li><li sb-mark="list.1">y</li><template sb-mark="list.#"><li sb-mark="list.#"></li></template></ul>"#
    );
}

#[test]
fn test_splice_middle_keeps_ascending_order() {
    init_tracing();
    let store = list_store();
    store.set("list", Value::array(["a", "b", "c"]));

    let removed = store.node("list").splice(1, 1, Vec::<Value>::new());
    assert_eq!(removed, vec![Some(Value::from("b"))]);
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "a"), ("list.1", "c")]));
}

#[test]
fn test_splice_insert_in_middle() {
    let store = list_store();
    store.set("list", Value::array(["a", "d"]));
    store.node("list").splice(1, 0, ["b", "c"]);

    assert_eq!(
        realized(&store, "list."),
        pairs(&[("list.0", "a"), ("list.1", "b"), ("list.2", "c"), ("list.3", "d")])
    );
}

#[test]
fn test_shift_and_unshift() {
    let store = list_store();
    store.set("list", Value::array(["a", "b", "c"]));
    let list = store.node("list");

    assert_eq!(list.shift(), Some(Value::from("a")));
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "b"), ("list.1", "c")]));

    list.unshift(["z"]);
    assert_eq!(
        realized(&store, "list."),
        pairs(&[("list.0", "z"), ("list.1", "b"), ("list.2", "c")])
    );

    assert_eq!(list.pop(), Some(Value::from("c")));
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "z"), ("list.1", "b")]));
}

#[test]
fn test_length_write_restores_index_order() {
    init_tracing();
    let store = list_store();
    store.set("list", Value::Array(vec![Some("a".into()), None, Some("c".into())]));
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "a"), ("list.2", "c")]));

    // An index write lands before the template, after higher indexes.
    store.set("list.1", "b");
    assert_eq!(
        realized(&store, "list."),
        pairs(&[("list.0", "a"), ("list.2", "c"), ("list.1", "b")])
    );

    store.set("list.length", 3);
    assert_eq!(
        realized(&store, "list."),
        pairs(&[("list.0", "a"), ("list.1", "b"), ("list.2", "c")])
    );
}

#[test]
fn test_truncating_length_leaves_elements_until_deleted() {
    let store = list_store();
    store.set("list", Value::array(["a", "b"]));
    store.delete("list.1");
    store.set("list.length", 1);
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "a")]));
    assert_eq!(store.get("list"), Some(Value::array(["a"])));
}

#[test]
fn test_reassigning_the_array_rerenders() {
    let store = list_store();
    store.set("list", Value::array(["a", "b", "c"]));
    store.set("list", Value::array(["q"]));
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "q")]));
    assert_eq!(store.document().query_attr_eq("sb-mark", "list.#").len(), 1);
}

#[test]
fn test_object_items_and_replacement() {
    init_tracing();
    let store = Store::from_html(
        r#"<ul><li sb-mark="people.#"><b sb-mark="people.#.name"></b><i sb-mark="people.#.role"></i></li></ul>"#,
        TrellisConfig::default(),
    )
    .unwrap();
    store.set(
        "people",
        Value::array([
            Value::object([("name", "ada"), ("role", "analyst")]),
            Value::object([("name", "alan"), ("role", "logician")]),
        ]),
    );
    assert_eq!(
        realized(&store, "people.1."),
        pairs(&[("people.1.name", "alan"), ("people.1.role", "logician")])
    );

    store.set("people.1", Value::object([("name", "grace"), ("role", "admiral")]));
    assert_eq!(
        realized(&store, "people."),
        pairs(&[
            ("people.0", "adaanalyst"),
            ("people.0.name", "ada"),
            ("people.0.role", "analyst"),
            ("people.1", "graceadmiral"),
            ("people.1.name", "grace"),
            ("people.1.role", "admiral"),
        ])
    );
}

#[test]
fn test_nested_lists() {
    init_tracing();
    let store = Store::from_html(
        r#"<div sb-mark="groups.#"><h2 sb-mark="groups.#.name"></h2><span sb-mark="groups.#.tags.#"></span></div>"#,
        TrellisConfig::default(),
    )
    .unwrap();
    store.set(
        "groups",
        Value::array([
            Value::object([("name", Value::from("one")), ("tags", Value::array(["a", "b"]))]),
            Value::object([("name", Value::from("two")), ("tags", Value::array(["c"]))]),
        ]),
    );

    assert_eq!(
        realized(&store, "groups.0.tags."),
        pairs(&[("groups.0.tags.0", "a"), ("groups.0.tags.1", "b")])
    );
    assert_eq!(realized(&store, "groups.1.tags."), pairs(&[("groups.1.tags.0", "c")]));

    store.node("groups.1.tags").push(["d"]);
    assert_eq!(
        realized(&store, "groups.1.tags."),
        pairs(&[("groups.1.tags.0", "c"), ("groups.1.tags.1", "d")])
    );
    assert_eq!(realized(&store, "groups.0.name"), pairs(&[("groups.0.name", "one")]));
}

#[test]
fn test_explicit_template_placeholder() {
    let store = Store::from_html(
        r#"<ol><template sb-mark="steps.#"><li sb-mark="steps.#"></li></template></ol>"#,
        TrellisConfig::default(),
    )
    .unwrap();
    store.set("steps", Value::array(["mix", "bake"]));
    assert_eq!(
        store.document().to_html(),
        r#"<ol><li sb-mark="steps.0">mix</li><li sb-mark="steps.1">bake</li><template sb-mark="steps.#"><li sb-mark="steps.#"></li></template></ol>"#
    );
}

#[test]
fn test_array_without_placeholder_renders_nothing() {
    let store = Store::from_html(r#"<p sb-mark="tags"></p>"#, TrellisConfig::default()).unwrap();
    store.set("tags", Value::array(["a"]));
    assert_eq!(store.document().to_html(), r#"<p sb-mark="tags"></p>"#);
    assert_eq!(store.get("tags"), Some(Value::array(["a"])));
}

#[test]
fn test_computed_items_render_their_result() {
    let store = list_store();
    store.set("n", 2);
    store.set(
        "list",
        Value::array([
            Value::from("plain"),
            Value::computed(|s| Some(Value::from(s.get("n")?.as_f64()? * 10.0))),
        ]),
    );
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "plain"), ("list.1", "20")]));

    store.set("n", 3);
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "plain"), ("list.1", "30")]));
}

#[test]
fn test_out_of_range_length_and_index_writes_are_rejected() {
    init_tracing();
    let store = list_store();
    store.set("list", Value::array(["a"]));

    assert!(!store.set("list.length", 1e30));
    assert!(!store.set("list.length", 4_294_967_296u64));
    assert!(!store.set("list.99999999999999999999", "z"));
    assert!(!store.set("list.4294967295", "z"));
    assert!(!store.set("list.01", "z"));

    assert_eq!(store.get("list"), Some(Value::array(["a"])));
    assert_eq!(store.get("list.99999999999999999999"), None);
    assert_eq!(realized(&store, "list."), pairs(&[("list.0", "a")]));
}
