//! Path watchers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::path;
use crate::value::Value;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier returned by [`Store::watch`](crate::Store::watch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        Self(NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A watcher callback. Receives the current value at the watched path.
pub type Watcher = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Exact path to its watchers, in registration order.
#[derive(Default)]
pub(crate) struct WatcherMap {
    map: IndexMap<String, Vec<(WatcherId, Watcher)>>,
}

/// How a watcher relates to the changed path.
pub(crate) enum Matched {
    /// Registered at the changed path itself.
    Exact(Vec<Watcher>),
    /// Registered at an ancestor of the changed path.
    Ancestor(String, Vec<Watcher>),
}

impl WatcherMap {
    pub(crate) fn add(&mut self, key: &str, watcher: Watcher) -> WatcherId {
        let id = WatcherId::next();
        self.map.entry(key.to_string()).or_default().push((id, watcher));
        id
    }

    /// Watchers to notify for a change at `key`, grouped by watched path in
    /// registration order. Callbacks are cloned out so none run under a lock.
    pub(crate) fn matching(&self, key: &str) -> Vec<Matched> {
        self.map
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .filter_map(|(watched, list)| {
                let callbacks = list.iter().map(|(_, w)| w.clone()).collect();
                if watched == key {
                    Some(Matched::Exact(callbacks))
                } else if path::is_descendant(key, watched) {
                    Some(Matched::Ancestor(watched.clone(), callbacks))
                } else {
                    None
                }
            })
            .collect()
    }

    pub(crate) fn remove(&mut self, key: &str, id: WatcherId) -> bool {
        let Some(list) = self.map.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(wid, _)| *wid != id);
        before != list.len()
    }

    pub(crate) fn remove_path(&mut self, key: &str) -> bool {
        self.map.shift_remove(key).is_some()
    }

    pub(crate) fn remove_id(&mut self, id: WatcherId) -> bool {
        let mut removed = false;
        for list in self.map.values_mut() {
            let before = list.len();
            list.retain(|(wid, _)| *wid != id);
            removed |= before != list.len();
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }
}
