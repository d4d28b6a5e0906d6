//! Path handles over a store.
//!
//! A [`Reactive`] addresses one node of the data tree. Reads and writes go
//! through the store, so they propagate like any other change. The array
//! mutators are expressed as the index writes, deletes and final `length`
//! write a JavaScript array method performs, which is what keeps list
//! elements in step with the data.

use std::fmt;

use crate::logging::targets;
use crate::path;
use crate::store::Store;
use crate::value::Value;

/// Handle to the node at a path.
#[derive(Clone)]
pub struct Reactive {
    store: Store,
    path: String,
}

impl Reactive {
    pub(crate) fn new(store: Store, path: String) -> Self {
        Self { store, path }
    }

    /// Path of this node (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The store this handle reads from.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Handle to a child node.
    pub fn node(&self, prop: &str) -> Reactive {
        Reactive::new(self.store.clone(), self.child(prop))
    }

    fn child(&self, prop: &str) -> String {
        path::join(&self.path, prop)
    }

    /// Current value of this node, computeds resolved.
    pub fn value(&self) -> Option<Value> {
        self.store.get(&self.path)
    }

    /// Read a child.
    pub fn get(&self, prop: &str) -> Option<Value> {
        self.store.get(&self.child(prop))
    }

    /// Write a child.
    pub fn set(&self, prop: &str, value: impl Into<Value>) -> bool {
        self.store.set(&self.child(prop), value)
    }

    /// Delete a child.
    pub fn delete(&self, prop: &str) -> bool {
        self.store.delete(&self.child(prop))
    }

    /// Whether a child exists.
    pub fn has(&self, prop: &str) -> bool {
        self.store.contains(&self.child(prop))
    }

    /// Own keys; array holes are skipped.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys(&self.path)
    }

    /// Array length, or number of keys for an object.
    pub fn len(&self) -> usize {
        self.store
            .array_len(&self.path)
            .unwrap_or_else(|| self.keys().len())
    }

    /// Whether [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this node is an array.
    pub fn is_array(&self) -> bool {
        self.store.is_array(&self.path)
    }

    // =========================================================================
    // Array mutators
    // =========================================================================

    fn array_len(&self, method: &str) -> Option<usize> {
        let len = self.store.array_len(&self.path);
        if len.is_none() {
            tracing::debug!(target: targets::STORE, path = %self.path, method, "not an array");
        }
        len
    }

    fn raw(&self, index: usize) -> Option<Value> {
        self.store.raw(&self.child(&index.to_string()))
    }

    /// Copy index `from` to index `to`, or delete `to` when `from` is a hole.
    fn shift_item(&self, from: usize, to: usize) {
        match self.raw(from) {
            Some(value) => {
                self.set(&to.to_string(), value);
            }
            None => {
                self.delete(&to.to_string());
            }
        }
    }

    fn set_len(&self, len: usize) {
        self.set("length", len);
    }

    /// Append items; returns the new length.
    pub fn push<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let Some(mut len) = self.array_len("push") else {
            return 0;
        };
        for item in items {
            self.set(&len.to_string(), item);
            len += 1;
        }
        self.set_len(len);
        len
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<Value> {
        let len = self.array_len("pop")?;
        if len == 0 {
            self.set_len(0);
            return None;
        }
        let index = len - 1;
        let last = self.raw(index);
        self.delete(&index.to_string());
        self.set_len(index);
        last
    }

    /// Remove and return the first item, moving the rest down.
    pub fn shift(&self) -> Option<Value> {
        let len = self.array_len("shift")?;
        if len == 0 {
            self.set_len(0);
            return None;
        }
        let first = self.raw(0);
        for from in 1..len {
            self.shift_item(from, from - 1);
        }
        self.delete(&(len - 1).to_string());
        self.set_len(len - 1);
        first
    }

    /// Insert items at the front; returns the new length.
    pub fn unshift<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let Some(len) = self.array_len("unshift") else {
            return 0;
        };
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let count = items.len();
        if count > 0 {
            for from in (0..len).rev() {
                self.shift_item(from, from + count);
            }
            for (i, item) in items.into_iter().enumerate() {
                self.set(&i.to_string(), item);
            }
        }
        self.set_len(len + count);
        len + count
    }

    /// Remove `delete_count` items at `start` and insert `items` there.
    /// Returns the removed items; holes come back as `None`.
    ///
    /// `start` and `delete_count` are clamped to the array bounds.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Vec<Option<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let Some(len) = self.array_len("splice") else {
            return Vec::new();
        };
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let count = items.len();

        let removed: Vec<Option<Value>> = (start..start + delete_count).map(|i| self.raw(i)).collect();

        if count < delete_count {
            for k in start..len - delete_count {
                self.shift_item(k + delete_count, k + count);
            }
            for k in (len - delete_count + count..len).rev() {
                self.delete(&k.to_string());
            }
        } else if count > delete_count {
            for k in (start..len - delete_count).rev() {
                self.shift_item(k + delete_count, k + count);
            }
        }
        for (i, item) in items.into_iter().enumerate() {
            self.set(&(start + i).to_string(), item);
        }
        self.set_len(len - delete_count + count);
        removed
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive").field("path", &self.path).finish()
    }
}
