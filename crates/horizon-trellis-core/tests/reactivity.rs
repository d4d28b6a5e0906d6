//! Integration tests for reads, writes, computed values, watchers and
//! directives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use horizon_trellis_core::{DirectiveParams, Store, TrellisConfig, Value, truthy};
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn text_of_mark(store: &Store, key: &str) -> Option<String> {
    let doc = store.document();
    doc.query_attr_eq("sb-mark", key)
        .first()
        .map(|&el| doc.text_content(el))
}

#[test]
fn test_get_returns_what_was_set() {
    init_tracing();
    let store = Store::default();
    let users = Value::array([
        Value::object([("name", Value::from("ada")), ("age", Value::from(36))]),
        Value::object([("name", Value::from("alan")), ("age", Value::from(41))]),
    ]);

    assert!(store.set("users", users.clone()));
    assert_eq!(store.get("users"), Some(users));
    assert_eq!(store.get("users.1.name"), Some(Value::from("alan")));

    assert!(store.set("users.1.name", "grace"));
    assert_eq!(store.get("users.1.name"), Some(Value::from("grace")));
    assert_eq!(store.get("users.0.name"), Some(Value::from("ada")));
}

#[test]
fn test_nested_children_are_bound() {
    init_tracing();
    let store = Store::from_html(
        r#"<h1 sb-mark="user.name"></h1><p sb-mark="user.bio"></p>"#,
        TrellisConfig::default(),
    )
    .unwrap();

    store.set("user", Value::object([("name", "ada"), ("bio", "mathematician")]));
    assert_eq!(text_of_mark(&store, "user.name").as_deref(), Some("ada"));
    assert_eq!(text_of_mark(&store, "user.bio").as_deref(), Some("mathematician"));

    store.set("user.name", "Ada Lovelace");
    assert_eq!(text_of_mark(&store, "user.name").as_deref(), Some("Ada Lovelace"));
}

#[test]
fn test_primitive_text_rendering() {
    let store = Store::from_html(
        r#"<i sb-mark="nothing"></i><i sb-mark="ratio"></i><i sb-mark="flag"></i>"#,
        TrellisConfig::default(),
    )
    .unwrap();
    store.set("nothing", Value::from(serde_json::json!(null)));
    store.set("ratio", 0.5);
    store.set("flag", false);
    assert_eq!(text_of_mark(&store, "nothing").as_deref(), Some("null"));
    assert_eq!(text_of_mark(&store, "ratio").as_deref(), Some("0.5"));
    assert_eq!(text_of_mark(&store, "flag").as_deref(), Some("false"));
}

#[test]
fn test_resetting_same_value_propagates_each_time() {
    init_tracing();
    let store = Store::from_html(r#"<p sb-count="n"></p>"#, TrellisConfig::default()).unwrap();

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    store.directive(
        "count",
        move |_: &DirectiveParams<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        false,
    );

    let watched = Arc::new(AtomicUsize::new(0));
    let counter = watched.clone();
    store.watch("n", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.set("n", 7);
    store.set("n", 7);
    assert_eq!(watched.load(Ordering::SeqCst), 2);
    assert_eq!(handled.load(Ordering::SeqCst), 2);
}

#[test]
fn test_computed_follows_its_dependency() {
    init_tracing();
    let store = Store::from_html(r#"<span sb-mark="b"></span>"#, TrellisConfig::default()).unwrap();
    store.set("a", 10);
    store.set("b", Value::computed(|s| Some(Value::from(s.get("a")?.as_f64()? + 5.0))));
    assert_eq!(store.get("b"), Some(Value::from(15)));
    assert_eq!(text_of_mark(&store, "b").as_deref(), Some("15"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    store.watch("b", move |v| log.lock().push(v.cloned()));

    store.set("a", 20);
    assert_eq!(*seen.lock(), vec![Some(Value::from(25))]);
    assert_eq!(text_of_mark(&store, "b").as_deref(), Some("25"));
    assert_eq!(store.dependents_of("a"), vec!["b"]);
}

#[test]
fn test_forward_reference_is_not_captured() {
    init_tracing();
    let store = Store::default();
    store.set("b", Value::computed(|s| Some(Value::from(s.get("a")?.as_f64()? + 5.0))));
    store.set("a", 10);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    store.watch("b", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.set("a", 20);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(store.dependents_of("a").is_empty());
    // Reads still evaluate the function.
    assert_eq!(store.get("b"), Some(Value::from(25)));
}

#[test]
fn test_computed_reading_a_container_reruns_on_leaf_change() {
    let store = Store::default();
    store.set("cart", Value::object([("items", Value::array([2, 3]))]));
    store.set(
        "total",
        Value::computed(|s| {
            let items = s.get("cart.items")?;
            let sum: f64 = items.as_array()?.iter().flatten().filter_map(Value::as_f64).sum();
            Some(Value::from(sum))
        }),
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    store.watch("total", move |v| log.lock().push(v.cloned()));

    store.set("cart.items.0", 10);
    store.node("cart.items").push([5]);
    assert_eq!(
        *seen.lock(),
        vec![Some(Value::from(13)), Some(Value::from(18)), Some(Value::from(18))]
    );
}

#[test]
fn test_ancestor_watcher_receives_the_whole_container() {
    init_tracing();
    let store = Store::default();
    store.set("user", Value::object([("name", "ada"), ("city", "london")]));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    store.watch("user", move |v| log.lock().push(v.cloned()));

    store.set("user.city", "paris");
    assert_eq!(
        *seen.lock(),
        vec![Some(Value::object([("name", "ada"), ("city", "paris")]))]
    );
}

#[test]
fn test_unwatch_variants() {
    let store = Store::default();
    let fired = Arc::new(AtomicUsize::new(0));
    let add = |store: &Store, path: &str| {
        let counter = fired.clone();
        store.watch(path, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    };

    let first = add(&store, "a");
    add(&store, "a");
    let other = add(&store, "b");
    assert_eq!(store.watcher_count(), 3);

    assert!(store.unwatch("a", first));
    store.set("a", 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    assert!(store.unwatch_id(other));
    assert!(store.unwatch_path("a"));
    store.set("a", 2);
    store.set("b", 2);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    add(&store, "c");
    store.unwatch_all();
    assert_eq!(store.watcher_count(), 0);
}

#[test]
fn test_delete_removes_element_and_dependents() {
    init_tracing();
    let store = Store::from_html(r#"<div><p sb-mark="a"></p></div>"#, TrellisConfig::default()).unwrap();
    store.set("a", 1);
    store.set("b", Value::computed(|s| s.get("a")));
    assert_eq!(store.dependents_of("a"), vec!["b"]);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    store.watch("b", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(store.delete("a"));
    assert_eq!(store.get("a"), None);
    assert!(store.document().query_attr_eq("sb-mark", "a").is_empty());
    assert!(store.dependency_paths().is_empty());

    store.set("a", 2);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_delete_removes_nested_bindings_sharing_the_key() {
    let store = Store::from_html(
        r#"<section><div sb-mark="note"><span sb-mark="note"></span></div><p>kept</p></section>"#,
        TrellisConfig::default(),
    )
    .unwrap();
    store.delete("note");
    assert_eq!(store.document().to_html(), "<section><p>kept</p></section>");
}

#[test]
fn test_deleting_a_computed_stops_it() {
    let store = Store::default();
    store.set("a", 1);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    store.set(
        "double",
        Value::computed(move |s| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(Value::from(s.get("a")?.as_f64()? * 2.0))
        }),
    );
    store.delete("double");
    let before = runs.load(Ordering::SeqCst);
    store.set("a", 2);
    assert_eq!(runs.load(Ordering::SeqCst), before);
}

#[test]
fn test_overwriting_a_computed_drops_its_subscription() {
    let store = Store::default();
    store.set("a", 1);
    store.set("label", Value::computed(|s| s.get("a")));
    store.set("label", "fixed");
    assert!(store.dependents_of("a").is_empty());

    store.set("a", 2);
    assert_eq!(store.get("label"), Some(Value::from("fixed")));
}

#[test]
fn test_missing_paths_are_noops() {
    let store = Store::from_html(r#"<p sb-mark="a.b"></p>"#, TrellisConfig::default()).unwrap();
    assert!(!store.set("a.b", 1));
    assert_eq!(store.get("a.b"), None);
    assert_eq!(text_of_mark(&store, "a.b").as_deref(), Some(""));
    assert!(!store.delete("a.b"));
}

#[test]
fn test_parametric_directive_receives_argument() {
    init_tracing();
    let store = Store::from_html(
        r#"<p sb-class="active:on">x</p><p sb-class="activeness:on">y</p>"#,
        TrellisConfig::default(),
    )
    .unwrap();
    assert!(store.directive(
        "class",
        |p: &DirectiveParams<'_>| {
            let class = p.param.unwrap_or_default().to_string();
            let on = truthy(p.value);
            let _ = p.store.document().with_write(|tree| {
                if on {
                    tree.set_attribute(p.el, "class", &class)
                } else {
                    tree.remove_attribute(p.el, "class").map(|_| ())
                }
            });
        },
        true,
    ));
    assert!(!store.directive("class", |_: &DirectiveParams<'_>| {}, false));

    store.set("active", true);
    assert_eq!(
        store.document().to_html(),
        r#"<p sb-class="active:on" class="on">x</p><p sb-class="activeness:on">y</p>"#
    );

    store.set("active", false);
    assert_eq!(
        store.document().to_html(),
        r#"<p sb-class="active:on">x</p><p sb-class="activeness:on">y</p>"#
    );
}

#[test]
fn test_prefix_from_configuration() {
    init_tracing();
    let config = TrellisConfig::from_toml_str("prefix = \"data-\"\n").unwrap();
    let store = Store::from_html(r#"<b data-mark="n"></b><b sb-mark="n"></b>"#, config).unwrap();
    store.set("n", 3);
    assert_eq!(store.document().to_html(), r#"<b data-mark="n">3</b><b sb-mark="n"></b>"#);

    store.set_prefix("sb");
    store.set("n", 4);
    assert_eq!(store.document().to_html(), r#"<b data-mark="n">3</b><b sb-mark="n">4</b>"#);
}

#[test]
fn test_sync_applies_current_values_to_inserted_markup() {
    let store = Store::default();
    store.set("title", "hello");
    let doc = store.document();
    let inserted = doc.append_html(doc.root(), r#"<h1><span sb-mark="title"></span></h1>"#).unwrap();

    store.sync(inserted[0]);
    assert_eq!(text_of_mark(&store, "title").as_deref(), Some("hello"));
}

#[test]
fn test_store_is_shared_across_threads() {
    let store = Store::from_html(r#"<p sb-mark="n"></p>"#, TrellisConfig::default()).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = store.clone();
            std::thread::spawn(move || store.set(&format!("t{i}"), i))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(store.keys("").len(), 4);
    assert_eq!(store.get("t3"), Some(Value::from(3)));
}

/// A computed reading `dep` that, on its first run only, waits for another
/// thread to reach the same point before reading.
fn read_after_rendezvous(barrier: Arc<Barrier>, dep: &'static str) -> Value {
    let waited = AtomicBool::new(false);
    Value::computed(move |s| {
        if !waited.swap(true, Ordering::SeqCst) {
            barrier.wait();
        }
        s.get(dep)
    })
}

#[test]
fn test_concurrent_registration_keeps_each_dependency() {
    init_tracing();
    let store = Store::default();
    store.set("a", 1);
    store.set("b", 2);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [("x", "a"), ("y", "b")]
        .into_iter()
        .map(|(path, dep)| {
            let store = store.clone();
            let computed = read_after_rendezvous(barrier.clone(), dep);
            std::thread::spawn(move || store.set(path, computed))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    assert_eq!(store.dependents_of("a"), vec!["x"]);
    assert_eq!(store.dependents_of("b"), vec!["y"]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    store.watch("y", move |v| log.lock().push(v.cloned()));
    store.set("b", 20);
    assert_eq!(*seen.lock(), vec![Some(Value::from(20))]);
}
