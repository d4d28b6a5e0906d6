//! Horizon Trellis Todo List Example
//!
//! Walks a small todo page through the reactive features:
//! - List rendering through a `todos.#` placeholder
//! - Computed values that follow their dependencies
//! - `if` / `ifnot` toggling
//! - A custom parametric directive
//! - A value that arrives asynchronously
//!
//! Run with: RUST_LOG=horizon_trellis_core=debug cargo run -p horizon-trellis --example todo_list

use std::thread;
use std::time::Duration;

use horizon_trellis::prelude::*;
use horizon_trellis::truthy;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

const PAGE: &str = r#"
<section>
  <h1 sb-mark="title"></h1>
  <ul>
    <li sb-mark="todos.#" sb-done="todos.#.done:done">
      <span sb-mark="todos.#.text"></span>
    </li>
  </ul>
  <p sb-ifnot="remaining">Nothing left to do.</p>
  <p sb-if="remaining"><b sb-mark="remaining"></b> remaining</p>
  <footer sb-mark="motd"></footer>
</section>
"#;

fn todo(text: &str, done: bool) -> Value {
    Value::object([("text", Value::from(text)), ("done", Value::from(done))])
}

fn print_page(store: &Store, step: &str) {
    println!("--- {step}");
    println!("{}", store.document().to_html());
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store = Store::from_html(PAGE, TrellisConfig::default())?;

    // `sb-done="path:class"` sets `class` while the value at `path` is truthy.
    store.directive(
        "done",
        |p: &DirectiveParams<'_>| {
            let class = p.param.unwrap_or("done");
            let on = truthy(p.value);
            let result = p.store.document().with_write(|tree| {
                if on {
                    tree.set_attribute(p.el, "class", class)
                } else {
                    tree.remove_attribute(p.el, "class").map(|_| ())
                }
            });
            if let Err(err) = result {
                tracing::warn!(key = p.key, %err, "could not toggle class");
            }
        },
        true,
    );

    store.set("title", "Today");
    store.set("todos", Value::array([todo("write", true), todo("test", false)]));
    store.set(
        "remaining",
        Value::computed(|s| {
            let Some(Value::Array(items)) = s.get("todos") else {
                return Some(Value::from(0));
            };
            let open = items
                .iter()
                .flatten()
                .filter(|item| !truthy(item.as_object().and_then(|o| o.get("done"))))
                .count();
            Some(Value::from(open))
        }),
    );
    print_page(&store, "initial");

    let todos = store.node("todos");
    todos.push([todo("ship", false)]);
    print_page(&store, "after push");

    store.set("todos.1.done", true);
    store.set("todos.2.done", true);
    print_page(&store, "all done");

    todos.shift();
    print_page(&store, "after shift");

    let (tx, rx) = oneshot::channel();
    store.set_async("motd", async move {
        rx.await.map_err(|err| ComputeError::new(err.to_string()))
    });
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = tx.send(Value::from("Have a good one"));
    });
    pollster::block_on(store.settle());
    sender.join().map_err(|_| "message thread panicked")?;
    print_page(&store, "settled");

    Ok(())
}
