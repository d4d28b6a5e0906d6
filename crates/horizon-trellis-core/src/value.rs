//! Values held by the reactive store.
//!
//! [`Value`] mirrors the JSON data model plus a [`Computed`] variant. An absent
//! value ("undefined") is represented by `Option::None` at every API boundary,
//! and array holes left by deletes are `None` elements.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::ComputeError;
use crate::logging::targets;
use crate::store::Store;

/// Ordered map used for object values.
pub type Map = IndexMap<String, Value>;

/// A value stored at a path.
#[derive(Clone, PartialEq)]
pub enum Value {
    /// `null`
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All numbers are `f64`, as in JavaScript.
    Number(f64),
    /// A string.
    String(String),
    /// An array. `None` elements are holes.
    Array(Vec<Option<Value>>),
    /// An object with insertion-ordered keys.
    Object(Map),
    /// A value derived from other paths.
    Computed(Computed),
}

impl Value {
    /// Create a computed value from a synchronous function.
    ///
    /// The function is evaluated once when assigned, and every path it reads
    /// through the store at that moment becomes a dependency.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&Store) -> Option<Value> + Send + Sync + 'static,
    {
        Self::Computed(Computed::new(move |store| Computation::Ready(f(store))))
    }

    /// Create a computed value whose result arrives asynchronously.
    ///
    /// Only reads made before the future is returned are captured as
    /// dependencies.
    pub fn computed_async<F, Fut>(f: F) -> Self
    where
        F: Fn(&Store) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ComputeError>> + Send + 'static,
    {
        Self::Computed(Computed::new(move |store| Computation::Pending(f(store).boxed())))
    }

    /// Build an object value from key/value pairs.
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Build an array value without holes.
    pub fn array<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::Array(items.into_iter().map(|v| Some(v.into())).collect())
    }

    /// Whether this is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Whether this is an object.
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Whether this is an array or an object.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    /// Whether this is a computed value.
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Array items, if this is an array.
    pub fn as_array(&self) -> Option<&[Option<Value>]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Object entries, if this is an object.
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// JavaScript truthiness: `false`, `0`, `NaN`, `""` and `null` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Computed(_) => true,
        }
    }

    /// Convert to JSON. Holes and non-finite numbers become `null`; computed
    /// values must be resolved beforehand and otherwise render as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null | Self::Computed(_) => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.as_ref().map_or(serde_json::Value::Null, Value::to_json))
                    .collect(),
            ),
            Self::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Text as rendered into an element: strings verbatim, numbers as
    /// JavaScript prints them, arrays and objects as JSON.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => self.to_json().to_string(),
            Self::Computed(c) => format!("[computed #{}]", c.id().as_raw()),
        }
    }
}

/// Render an optional value as element text; `None` renders as `undefined`.
pub fn text_of(value: Option<&Value>) -> String {
    value.map_or_else(|| "undefined".to_string(), Value::to_text)
}

/// Whether an optional value is truthy; `None` is falsy.
pub fn truthy(value: Option<&Value>) -> bool {
    value.is_some_and(Value::is_truthy)
}

fn number_to_json(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computed(c) => write!(f, "{c:?}"),
            Self::Array(items) => f.debug_list().entries(items).finish(),
            Self::Object(map) => f.debug_map().entries(map).finish(),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Null | Self::Computed(_) => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(_) => self.to_json().serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Self::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Object(map)
    }
}

impl From<Computed> for Value {
    fn from(computed: Computed) -> Self {
        Self::Computed(computed)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::array(items),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

// =============================================================================
// Computed values
// =============================================================================

static NEXT_COMPUTED_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a computed function, used to run it once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputedId(u64);

impl ComputedId {
    fn next() -> Self {
        Self(NEXT_COMPUTED_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// The outcome of running a computed function.
pub enum Computation {
    /// The value is available now (`None` is undefined).
    Ready(Option<Value>),
    /// The value will be available when the future settles.
    Pending(BoxFuture<'static, std::result::Result<Value, ComputeError>>),
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Pending(_) => f.write_str("Pending"),
        }
    }
}

type ComputeFn = dyn Fn(&Store) -> Computation + Send + Sync;

/// A function value whose result is derived from other store paths.
///
/// Computed functions are not memoized: they run every time they are read or
/// one of their dependencies changes. Clones share the function and its id.
#[derive(Clone)]
pub struct Computed {
    id: ComputedId,
    f: Arc<ComputeFn>,
}

impl Computed {
    /// Wrap a function returning a [`Computation`].
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Store) -> Computation + Send + Sync + 'static,
    {
        Self {
            id: ComputedId::next(),
            f: Arc::new(f),
        }
    }

    /// This function's identity.
    pub fn id(&self) -> ComputedId {
        self.id
    }

    /// Run the function. A panic is contained, logged and read as undefined.
    pub fn evaluate(&self, store: &Store) -> Computation {
        match catch_unwind(AssertUnwindSafe(|| (self.f)(store))) {
            Ok(computation) => computation,
            Err(_) => {
                tracing::error!(target: targets::DEPS, id = self.id.0, "computed function panicked");
                Computation::Ready(None)
            }
        }
    }
}

impl PartialEq for Computed {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Computed").field(&self.id.0).finish()
    }
}
