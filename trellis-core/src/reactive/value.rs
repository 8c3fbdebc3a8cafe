//! Plain Values
//!
//! Reactive state is made of dynamically shaped values: scalars, callbacks,
//! and structured objects (string-keyed maps or ordered lists). Structured
//! objects live behind a shared handle, [`RawObject`], which carries a unique
//! [`ObjectId`]. That id is what the dependency graph and the wrapper
//! registries key on.
//!
//! Values compare by identity for objects and callbacks and by value for
//! scalars, with `NaN` equal to itself and `0.0` distinct from `-0.0`.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::dep::PropKey;

/// Counter for generating unique object IDs.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of a structured object or reactive cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Generate a new unique object ID.
    pub(crate) fn next() -> Self {
        Self(OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A shared callback, used for event handlers and emitted events.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&Value)>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value) + 'static,
    {
        Self(Rc::new(f))
    }

    pub fn call(&self, arg: &Value) {
        (self.0)(arg)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Callback) -> bool {
        Rc::as_ptr(&self.0) as *const () == Rc::as_ptr(&other.0) as *const ()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Storage behind a [`RawObject`].
#[derive(Debug, Clone)]
pub enum RawData {
    Map(IndexMap<Rc<str>, Value>),
    List(Vec<Value>),
}

struct RawInner {
    id: ObjectId,
    data: RefCell<RawData>,
    /// Set by `mark_raw`; such objects are never wrapped.
    skip: Cell<bool>,
}

/// A structured object: the "raw" side of an observed object.
///
/// Cloning the handle shares the object. Mutating it directly bypasses
/// dependency tracking; go through [`Observed`](super::Observed) for that.
#[derive(Clone)]
pub struct RawObject(Rc<RawInner>);

impl RawObject {
    pub fn from_data(data: RawData) -> Self {
        Self(Rc::new(RawInner {
            id: ObjectId::next(),
            data: RefCell::new(data),
            skip: Cell::new(false),
        }))
    }

    /// An empty map.
    pub fn map() -> Self {
        Self::from_data(RawData::Map(IndexMap::new()))
    }

    /// An empty list.
    pub fn list() -> Self {
        Self::from_data(RawData::List(Vec::new()))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &RawObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_list(&self) -> bool {
        matches!(&*self.0.data.borrow(), RawData::List(_))
    }

    pub fn len(&self) -> usize {
        match &*self.0.data.borrow() {
            RawData::Map(map) => map.len(),
            RawData::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Untracked read.
    pub fn get(&self, key: &PropKey) -> Option<Value> {
        match (&*self.0.data.borrow(), key) {
            (RawData::Map(map), PropKey::Named(name)) => map.get(name).cloned(),
            (RawData::List(list), PropKey::Index(index)) => list.get(*index).cloned(),
            (RawData::List(list), PropKey::Length) => Some(Value::Number(list.len() as f64)),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &PropKey) -> bool {
        match (&*self.0.data.borrow(), key) {
            (RawData::Map(map), PropKey::Named(name)) => map.contains_key(name),
            (RawData::List(list), PropKey::Index(index)) => *index < list.len(),
            (RawData::List(_), PropKey::Length) => true,
            _ => false,
        }
    }

    /// Own keys in insertion (or index) order.
    pub fn keys(&self) -> Vec<PropKey> {
        match &*self.0.data.borrow() {
            RawData::Map(map) => map.keys().map(|k| PropKey::Named(k.clone())).collect(),
            RawData::List(list) => (0..list.len()).map(PropKey::Index).collect(),
        }
    }

    /// Untracked insert into a map. No-op on lists.
    pub fn insert(&self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> &Self {
        if let RawData::Map(map) = &mut *self.0.data.borrow_mut() {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Untracked append to a list. No-op on maps.
    pub fn push(&self, value: impl Into<Value>) -> &Self {
        if let RawData::List(list) = &mut *self.0.data.borrow_mut() {
            list.push(value.into());
        }
        self
    }

    /// Exclude this object from wrapping.
    pub fn mark_raw(&self) -> &Self {
        self.0.skip.set(true);
        self
    }

    pub fn is_marked_raw(&self) -> bool {
        self.0.skip.get()
    }

    pub(crate) fn data(&self) -> Ref<'_, RawData> {
        self.0.data.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, RawData> {
        self.0.data.borrow_mut()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Objects may be cyclic, so only the shape is printed.
        f.debug_struct("RawObject")
            .field("id", &self.0.id)
            .field("kind", &if self.is_list() { "list" } else { "map" })
            .field("len", &self.len())
            .finish()
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Callback(Callback),
    Object(RawObject),
}

impl Value {
    /// Build a map object from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Value
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Object(RawObject::from_data(RawData::Map(map)))
    }

    /// Build a list object.
    pub fn list<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let list = items.into_iter().map(Into::into).collect();
        Value::Object(RawObject::from_data(RawData::List(list)))
    }

    pub fn callback<F>(f: F) -> Value
    where
        F: Fn(&Value) + 'static,
    {
        Value::Callback(Callback::new(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RawObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_callback(&self) -> Option<&Callback> {
        match self {
            Value::Callback(cb) => Some(cb),
            _ => None,
        }
    }

    /// JavaScript-style truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Callback(_) | Value::Object(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Callback(_) => "callback",
            Value::Object(obj) if obj.is_list() => "list",
            Value::Object(_) => "map",
        }
    }

    /// Parse JSON into a fresh object graph.
    pub fn from_json_str(json: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Identity/value comparison used to suppress no-op writes.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            (x.is_nan() && y.is_nan())
                || (x == y && x.is_sign_negative() == y.is_sign_negative())
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Callback(x), Value::Callback(y)) => x.ptr_eq(y),
        (Value::Object(x), Value::Object(y)) => x.ptr_eq(y),
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        same_value(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({})", format_number(*n)),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Callback(cb) => cb.fmt(f),
            Value::Object(obj) => obj.fmt(f),
        }
    }
}

/// Format a number the way string coercion does: integral values drop the
/// fractional part and negative zero prints as `0`.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Callback(_) => f.write_str("[function]"),
            Value::Object(obj) => match &*obj.data() {
                RawData::Map(_) => f.write_str("[object Object]"),
                RawData::List(list) => {
                    for (i, item) in list.iter().enumerate() {
                        if i > 0 {
                            f.write_str(",")?;
                        }
                        if !item.is_null() {
                            write!(f, "{item}")?;
                        }
                    }
                    Ok(())
                }
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Callback(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Object(obj) => match &*obj.data() {
                RawData::Map(map) => {
                    let mut out = serializer.serialize_map(Some(map.len()))?;
                    for (k, v) in map {
                        out.serialize_entry(&**k, v)?;
                    }
                    out.end()
                }
                RawData::List(list) => {
                    let mut out = serializer.serialize_seq(Some(list.len()))?;
                    for v in list {
                        out.serialize_element(v)?;
                    }
                    out.end()
                }
            },
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => Value::list(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Value::map(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<RawObject> for Value {
    fn from(obj: RawObject) -> Self {
        Value::Object(obj)
    }
}

impl From<Callback> for Value {
    fn from(cb: Callback) -> Self {
        Value::Callback(cb)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
