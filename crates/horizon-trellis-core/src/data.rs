//! Arena of reactive nodes backing the store.
//!
//! Every object and array reachable from the root is a slot that records its
//! own path. Leaves (primitives and computed functions) are slots too, so a
//! path resolves to exactly one slot. Replacing or deleting a property frees
//! the whole subtree below it.

use indexmap::IndexMap;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;
use crate::path;
use crate::value::Value;

new_key_type! {
    /// Identifier of a reactive node in the data arena.
    pub(crate) struct SlotKey;
}

#[derive(Debug)]
enum SlotKind {
    Leaf(Value),
    Object(IndexMap<String, SlotKey>),
    Array(Vec<Option<SlotKey>>),
}

#[derive(Debug)]
struct Slot {
    path: String,
    kind: SlotKind,
}

/// The shape of the container at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Object,
    Array,
    Leaf,
}

/// Outcome of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Assigned {
    /// The value was stored; `parent_is_array` describes its owner.
    Stored { parent_is_array: bool },
    /// The parent path does not resolve to a container.
    MissingParent,
    /// The property cannot be set on the parent (non-index key on an array,
    /// or a non-numeric length).
    Rejected,
}

#[derive(Debug)]
pub(crate) struct DataTree {
    slots: SlotMap<SlotKey, Slot>,
    root: SlotKey,
}

impl DataTree {
    pub(crate) fn new() -> Self {
        let mut slots = SlotMap::with_key();
        let root = slots.insert(Slot {
            path: String::new(),
            kind: SlotKind::Object(IndexMap::new()),
        });
        Self { slots, root }
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn lookup(&self, path: &str) -> Option<SlotKey> {
        let mut current = self.root;
        for segment in path::segments(path) {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    fn child(&self, key: SlotKey, prop: &str) -> Option<SlotKey> {
        match &self.slots.get(key)?.kind {
            SlotKind::Object(map) => map.get(prop).copied(),
            SlotKind::Array(items) => items.get(path::parse_index(prop)?).copied().flatten(),
            SlotKind::Leaf(_) => None,
        }
    }

    /// Whether a property exists at the path. Array `length` does not count:
    /// it is not an enumerable property.
    pub(crate) fn exists(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// The shape of the node at the path.
    pub(crate) fn shape(&self, path: &str) -> Option<Shape> {
        let key = self.lookup(path)?;
        Some(match self.slots[key].kind {
            SlotKind::Object(_) => Shape::Object,
            SlotKind::Array(_) => Shape::Array,
            SlotKind::Leaf(_) => Shape::Leaf,
        })
    }

    /// Length of the array at the path.
    pub(crate) fn array_len(&self, path: &str) -> Option<usize> {
        match &self.slots[self.lookup(path)?].kind {
            SlotKind::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Own enumerable keys of the container at the path. Array holes are
    /// skipped.
    pub(crate) fn keys(&self, path: &str) -> Vec<String> {
        let Some(key) = self.lookup(path) else {
            return Vec::new();
        };
        match &self.slots[key].kind {
            SlotKind::Object(map) => map.keys().cloned().collect(),
            SlotKind::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.is_some())
                .map(|(i, _)| i.to_string())
                .collect(),
            SlotKind::Leaf(_) => Vec::new(),
        }
    }

    /// Materialize the value at the path. Computed leaves are returned as
    /// functions. `list.length` reads the array length.
    pub(crate) fn read(&self, path: &str) -> Option<Value> {
        if let Some(key) = self.lookup(path) {
            return Some(self.materialize(key));
        }
        let (parent, prop) = path::split_last(path);
        if prop == "length" {
            return self.array_len(parent).map(Value::from);
        }
        None
    }

    fn materialize(&self, key: SlotKey) -> Value {
        match &self.slots[key].kind {
            SlotKind::Leaf(value) => value.clone(),
            SlotKind::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, &child)| (k.clone(), self.materialize(child)))
                    .collect(),
            ),
            SlotKind::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.map(|child| self.materialize(child)))
                    .collect(),
            ),
        }
    }

    /// Path recorded on the node at `path`. Used to check that relocated
    /// nodes were re-pathed.
    #[cfg(test)]
    fn recorded_path(&self, path: &str) -> Option<&str> {
        self.lookup(path).map(|k| self.slots[k].path.as_str())
    }

    fn build(&mut self, value: Value, path: String) -> SlotKey {
        let kind = match value {
            Value::Object(map) => {
                let children = map
                    .into_iter()
                    .map(|(k, v)| {
                        let child_path = path::join(&path, &k);
                        let child = self.build(v, child_path);
                        (k, child)
                    })
                    .collect();
                SlotKind::Object(children)
            }
            Value::Array(items) => {
                let children = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| item.map(|v| self.build(v, path::join(&path, &i.to_string()))))
                    .collect();
                SlotKind::Array(children)
            }
            leaf => SlotKind::Leaf(leaf),
        };
        self.slots.insert(Slot { path, kind })
    }

    fn free(&mut self, key: SlotKey) {
        let mut stack = vec![key];
        while let Some(key) = stack.pop() {
            let Some(slot) = self.slots.remove(key) else {
                continue;
            };
            tracing::trace!(target: targets::STORE, path = %slot.path, "freed reactive node");
            match slot.kind {
                SlotKind::Object(map) => stack.extend(map.into_values()),
                SlotKind::Array(items) => stack.extend(items.into_iter().flatten()),
                SlotKind::Leaf(_) => {}
            }
        }
    }

    /// Store `value` under `prop` of the container at `parent`.
    pub(crate) fn assign(&mut self, parent: &str, prop: &str, value: Value) -> Assigned {
        let Some(parent_key) = self.lookup(parent) else {
            return Assigned::MissingParent;
        };

        let is_array = match &self.slots[parent_key].kind {
            SlotKind::Object(_) => false,
            SlotKind::Array(_) => true,
            SlotKind::Leaf(_) => return Assigned::MissingParent,
        };

        if is_array && prop == "length" {
            let Some(len) = value.as_f64().and_then(path::array_length) else {
                tracing::warn!(target: targets::STORE, path = parent, ?value, "invalid array length");
                return Assigned::Rejected;
            };
            if !self.set_length(parent_key, len) {
                tracing::warn!(target: targets::STORE, path = parent, len, "array length could not be allocated");
                return Assigned::Rejected;
            }
            return Assigned::Stored { parent_is_array: true };
        }
        let index = if is_array {
            let Some(index) = path::parse_index(prop) else {
                tracing::debug!(target: targets::STORE, path = parent, prop, "not an array index");
                return Assigned::Rejected;
            };
            if !self.reserve(parent_key, index + 1) {
                tracing::warn!(target: targets::STORE, path = parent, index, "array index could not be allocated");
                return Assigned::Rejected;
            }
            Some(index)
        } else {
            None
        };

        let child = self.build(value, path::join(parent, prop));
        let replaced = match (&mut self.slots[parent_key].kind, index) {
            (SlotKind::Object(map), _) => map.insert(prop.to_string(), child),
            (SlotKind::Array(items), Some(index)) => {
                if index >= items.len() {
                    items.resize(index + 1, None);
                }
                items[index].replace(child)
            }
            _ => None,
        };
        if let Some(old) = replaced {
            self.free(old);
        }
        Assigned::Stored { parent_is_array: is_array }
    }

    /// Make room for `len` items in the array at `key` without aborting on
    /// allocation failure.
    fn reserve(&mut self, key: SlotKey, len: usize) -> bool {
        match &mut self.slots[key].kind {
            SlotKind::Array(items) => items.try_reserve(len.saturating_sub(items.len())).is_ok(),
            _ => true,
        }
    }

    fn set_length(&mut self, key: SlotKey, len: usize) -> bool {
        if !self.reserve(key, len) {
            return false;
        }
        let removed = match &mut self.slots[key].kind {
            SlotKind::Array(items) if len < items.len() => items.split_off(len),
            SlotKind::Array(items) => {
                items.resize(len, None);
                Vec::new()
            }
            _ => Vec::new(),
        };
        for child in removed.into_iter().flatten() {
            self.free(child);
        }
        true
    }

    /// Delete `prop` from the container at `parent`. Array deletes leave a
    /// hole. Returns `None` when the parent does not resolve, otherwise
    /// whether the parent is an array.
    pub(crate) fn remove(&mut self, parent: &str, prop: &str) -> Option<bool> {
        let parent_key = self.lookup(parent)?;
        let (removed, is_array) = match &mut self.slots[parent_key].kind {
            SlotKind::Object(map) => (map.shift_remove(prop), false),
            SlotKind::Array(items) => {
                let removed = path::parse_index(prop)
                    .and_then(|i| items.get_mut(i))
                    .and_then(Option::take);
                (removed, true)
            }
            SlotKind::Leaf(_) => return None,
        };
        if let Some(old) = removed {
            self.free(old);
        }
        Some(is_array)
    }
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}
