//! Integration tests for asynchronous values and deferred dispatch.

use std::sync::Arc;
use std::time::Duration;

use horizon_trellis_core::dom::{Document, ReadyState};
use horizon_trellis_core::{ComputeError, Store, TrellisConfig, Value};
use parking_lot::Mutex;
use tokio::sync::oneshot;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn mark_text(store: &Store, key: &str) -> String {
    let doc = store.document();
    doc.query_attr_eq("sb-mark", key)
        .first()
        .map(|&el| doc.text_content(el))
        .unwrap_or_default()
}

async fn receive(rx: oneshot::Receiver<Value>) -> Result<Value, ComputeError> {
    rx.await.map_err(|err| ComputeError::new(err.to_string()))
}

#[test]
fn test_set_async_applies_when_settled() {
    init_tracing();
    let store = Store::from_html(r#"<p sb-mark="status"></p>"#, TrellisConfig::default()).unwrap();
    store.set("status", "loading");

    let (tx, rx) = oneshot::channel();
    store.set_async("status", receive(rx));
    assert_eq!(store.poll_pending(), 0);
    assert_eq!(mark_text(&store, "status"), "loading");

    tx.send(Value::from("ready")).unwrap();
    assert_eq!(store.poll_pending(), 1);
    assert_eq!(mark_text(&store, "status"), "ready");
    assert_eq!(store.pending_count(), 0);
}

#[test]
fn test_settle_waits_for_other_threads() {
    init_tracing();
    let store = Store::from_html(r#"<p sb-mark="user.name"></p>"#, TrellisConfig::default()).unwrap();

    let (tx, rx) = oneshot::channel();
    store.set_async("user", receive(rx));
    let sender = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        let _ = tx.send(Value::object([("name", "ada")]));
    });

    pollster::block_on(store.settle());
    sender.join().unwrap();
    assert_eq!(mark_text(&store, "user.name"), "ada");
}

#[test]
fn test_superseded_value_still_lands() {
    let store = Store::default();
    let (tx, rx) = oneshot::channel();
    store.set_async("q", receive(rx));
    store.set("q", "newer");

    tx.send(Value::from("older")).unwrap();
    store.poll_pending();
    assert_eq!(store.get("q"), Some(Value::from("older")));
}

#[test]
fn test_rejection_leaves_document_unchanged() {
    init_tracing();
    let store = Store::from_html(r#"<p sb-mark="feed"></p>"#, TrellisConfig::default()).unwrap();
    store.set("feed", "cached");

    let (tx, rx) = oneshot::channel::<Value>();
    store.set_async("feed", receive(rx));
    drop(tx);

    assert_eq!(store.poll_pending(), 1);
    assert_eq!(store.get("feed"), Some(Value::from("cached")));
    assert_eq!(mark_text(&store, "feed"), "cached");
}

#[test]
fn test_async_computed_rerenders_on_dependency_change() {
    init_tracing();
    let store = Store::from_html(r#"<span sb-mark="label"></span>"#, TrellisConfig::default()).unwrap();
    store.set("id", 1);

    let senders: Arc<Mutex<Vec<oneshot::Sender<Value>>>> = Arc::default();
    let registry = senders.clone();
    store.set(
        "label",
        Value::computed_async(move |s| {
            let id = s.get("id").map(|v| v.to_text()).unwrap_or_default();
            let (tx, rx) = oneshot::channel();
            registry.lock().push(tx);
            async move {
                let suffix = receive(rx).await?;
                Ok(Value::from(format!("item {id} {}", suffix.to_text())))
            }
        }),
    );

    // One future for registration, which is dropped, and one for propagation.
    let resolve_last = |suffix: &str| {
        let tx = senders.lock().pop().unwrap();
        tx.send(Value::from(suffix)).unwrap();
    };
    resolve_last("loaded");
    assert_eq!(store.poll_pending(), 1);
    assert_eq!(mark_text(&store, "label"), "item 1 loaded");

    store.set("id", 2);
    resolve_last("again");
    assert_eq!(store.poll_pending(), 1);
    assert_eq!(mark_text(&store, "label"), "item 2 again");
}

#[test]
fn test_deferred_dispatch_replays_in_order() {
    init_tracing();
    let doc = Document::from_html(r#"<ul><li sb-mark="list.#"></li></ul><p sb-mark="count"></p>"#).unwrap();
    doc.set_ready_state(ReadyState::Loading);
    let store = Store::new(doc, TrellisConfig::default().with_defer_until_ready(true));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    store.watch("count", move |v| log.lock().push(v.cloned()));

    store.set("list", Value::array(["a"]));
    store.node("list").push(["b"]);
    store.set("count", 2);
    assert_eq!(*seen.lock(), vec![Some(Value::from(2))]);
    assert!(store.deferred_count() > 0);
    assert_eq!(mark_text(&store, "count"), "");

    store.document_ready();
    assert_eq!(store.deferred_count(), 0);
    assert_eq!(mark_text(&store, "list.0"), "a");
    assert_eq!(mark_text(&store, "list.1"), "b");
    assert_eq!(mark_text(&store, "count"), "2");
}

#[test]
fn test_without_defer_loading_documents_render_immediately() {
    let doc = Document::from_html(r#"<p sb-mark="n"></p>"#).unwrap();
    doc.set_ready_state(ReadyState::Loading);
    let store = Store::new(doc, TrellisConfig::default().with_defer_until_ready(false));
    store.set("n", 1);
    assert_eq!(mark_text(&store, "n"), "1");
}
