//! Dependency tracking for computed values.
//!
//! A computed function is evaluated once when it is assigned, with recording
//! switched on for the calling thread. Every existing path read through the
//! store during that evaluation is captured, and the computed is filed under
//! each captured path in the [`DependencyMap`].

use std::thread::ThreadId;

use indexmap::{IndexMap, IndexSet};

use crate::path;
use crate::value::{Computed, ComputedId};

/// Describes the container owning a value: its path and whether it is an
/// array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Owner {
    /// Path of the owning container (empty for the root).
    pub path: String,
    /// Whether the owner is an array.
    pub is_array: bool,
}

impl Owner {
    /// The root object.
    pub fn root() -> Self {
        Self::default()
    }

    /// An owner at `path`.
    pub fn new(path: impl Into<String>, is_array: bool) -> Self {
        Self {
            path: path.into(),
            is_array,
        }
    }
}

/// A computed value subscribed to a dependency path.
#[derive(Debug, Clone)]
pub(crate) struct Dependent {
    /// Path the computed is stored at.
    pub(crate) path: String,
    pub(crate) computed: Computed,
    pub(crate) owner: Owner,
    pub(crate) prop: String,
}

/// Dependency path to the computeds that must re-run when it changes.
#[derive(Debug, Default)]
pub(crate) struct DependencyMap {
    map: IndexMap<String, Vec<Dependent>>,
}

impl DependencyMap {
    /// File `dependent` under each captured path.
    pub(crate) fn subscribe(&mut self, captured: &IndexSet<String>, dependent: &Dependent) {
        for dep in captured {
            self.map
                .entry(dep.clone())
                .or_default()
                .push(dependent.clone());
        }
    }

    /// Dependents to re-run for a change at `key`: entries whose dependency
    /// path equals `key` or is its ancestor or descendant, each computed
    /// once.
    pub(crate) fn affected_by(&self, key: &str) -> Vec<Dependent> {
        let mut seen: IndexSet<ComputedId> = IndexSet::new();
        self.map
            .iter()
            .filter(|(dep, _)| path::related(dep, key))
            .flat_map(|(_, list)| list.iter())
            .filter(|d| seen.insert(d.computed.id()))
            .cloned()
            .collect()
    }

    /// Drop dependents stored at `key` or below it, keeping the entries
    /// keyed by those paths so other computeds stay subscribed.
    pub(crate) fn drop_dependents_at(&mut self, key: &str) {
        for list in self.map.values_mut() {
            list.retain(|d| !path::is_self_or_descendant(&d.path, key));
        }
    }

    /// Purge a deleted path: its own entry, the entries below it and every
    /// dependent stored there.
    pub(crate) fn purge(&mut self, key: &str) {
        self.map.retain(|dep, _| !path::is_self_or_descendant(dep, key));
        self.drop_dependents_at(key);
    }

    /// Dependency paths with at least one subscriber.
    pub(crate) fn paths(&self) -> Vec<String> {
        self.map
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Paths of the computeds subscribed directly to `key`.
    pub(crate) fn dependents_of(&self, key: &str) -> Vec<String> {
        self.map
            .get(key)
            .map(|list| list.iter().map(|d| d.path.clone()).collect())
            .unwrap_or_default()
    }
}

/// Paths captured while computeds are registered, kept per thread.
///
/// Each thread owns a stack: a registration nested inside another one
/// records into its own entry, and threads registering at the same time
/// never see each other's reads.
#[derive(Debug, Default)]
pub(crate) struct Recordings {
    stacks: IndexMap<ThreadId, Vec<IndexSet<String>>>,
}

impl Recordings {
    /// Start a recording on the current thread and return its depth.
    pub(crate) fn start(&mut self) -> usize {
        let stack = self.stacks.entry(std::thread::current().id()).or_default();
        stack.push(IndexSet::new());
        stack.len()
    }

    /// End the recording started at `depth` on the current thread, along
    /// with any left open above it.
    pub(crate) fn finish(&mut self, depth: usize) -> IndexSet<String> {
        let thread = std::thread::current().id();
        let Some(stack) = self.stacks.get_mut(&thread) else {
            return IndexSet::new();
        };
        let captured = if depth > 0 && stack.len() >= depth {
            stack.truncate(depth);
            stack.pop().unwrap_or_default()
        } else {
            IndexSet::new()
        };
        if stack.is_empty() {
            self.stacks.swap_remove(&thread);
        }
        captured
    }

    /// Whether the current thread is recording.
    pub(crate) fn is_recording(&self) -> bool {
        self.stacks.contains_key(&std::thread::current().id())
    }

    /// Record a read into the innermost recording of the current thread.
    pub(crate) fn record(&mut self, path: &str) {
        if let Some(top) = self
            .stacks
            .get_mut(&std::thread::current().id())
            .and_then(|stack| stack.last_mut())
        {
            top.insert(path.to_string());
        }
    }

    /// Whether no thread is recording.
    pub(crate) fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Computation;

    fn dependent(path: &str) -> Dependent {
        Dependent {
            path: path.to_string(),
            computed: Computed::new(|_| Computation::Ready(None)),
            owner: Owner::root(),
            prop: path.to_string(),
        }
    }

    fn captured(paths: &[&str]) -> IndexSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_affected_matches_ancestors_and_descendants() {
        let mut deps = DependencyMap::default();
        let total = dependent("total");
        deps.subscribe(&captured(&["cart", "cart.items"]), &total);
        let label = dependent("label");
        deps.subscribe(&captured(&["user.name"]), &label);

        let hits: Vec<_> = deps.affected_by("cart.items.0").into_iter().map(|d| d.path).collect();
        assert_eq!(hits, vec!["total"]);

        let hits: Vec<_> = deps.affected_by("user").into_iter().map(|d| d.path).collect();
        assert_eq!(hits, vec!["label"]);

        assert!(deps.affected_by("username").is_empty());
    }

    #[test]
    fn test_purge_removes_entries_and_dependents() {
        let mut deps = DependencyMap::default();
        deps.subscribe(&captured(&["a"]), &dependent("b"));
        deps.subscribe(&captured(&["b"]), &dependent("c"));

        deps.purge("b");
        assert_eq!(deps.paths(), Vec::<String>::new());
        assert!(deps.affected_by("a").is_empty());
    }

    #[test]
    fn test_drop_dependents_keeps_subscriptions_to_path() {
        let mut deps = DependencyMap::default();
        deps.subscribe(&captured(&["a"]), &dependent("b"));
        deps.subscribe(&captured(&["b"]), &dependent("c"));

        deps.drop_dependents_at("b");
        assert_eq!(deps.paths(), vec!["b"]);
        assert_eq!(deps.dependents_of("b"), vec!["c"]);
    }

    #[test]
    fn test_recordings_are_per_thread() {
        let recordings = parking_lot::Mutex::new(Recordings::default());
        let depth = recordings.lock().start();
        recordings.lock().record("a");

        std::thread::scope(|s| {
            s.spawn(|| {
                assert!(!recordings.lock().is_recording());
                recordings.lock().record("ignored");
                let depth = recordings.lock().start();
                recordings.lock().record("b");
                assert_eq!(recordings.lock().finish(depth), captured(&["b"]));
            });
        });

        let mut recordings = recordings.into_inner();
        assert!(recordings.is_recording());
        assert_eq!(recordings.finish(depth), captured(&["a"]));
        assert!(recordings.is_empty());
    }

    #[test]
    fn test_nested_recording_is_separate() {
        let mut recordings = Recordings::default();
        let outer = recordings.start();
        recordings.record("a");
        let inner = recordings.start();
        recordings.record("b");
        assert_eq!(recordings.finish(inner), captured(&["b"]));
        recordings.record("c");
        assert_eq!(recordings.finish(outer), captured(&["a", "c"]));
        assert!(!recordings.is_recording());
    }
}
