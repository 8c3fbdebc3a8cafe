//! Observed Objects
//!
//! An [`Observed`] is the reactive wrapper around a [`RawObject`]. Reads go
//! through [`Observed::get`] and record a dependency for the running effect;
//! writes go through [`Observed::set`] and re-run the effects that read the
//! written key. The wrapper stores nothing of its own: every read and write
//! passes through to the raw object after the bookkeeping.
//!
//! # Identity
//!
//! Wrapping the same raw object twice (with the same flavour) returns the
//! same wrapper, enforced through a registry on the [`Runtime`] keyed by the
//! raw object's id. Distinct raw objects always get distinct wrappers.
//!
//! # Nested values
//!
//! Nested objects are wrapped when they are read, not when the parent is
//! wrapped. A deep wrapper hands out deep wrappers for nested objects; a
//! shallow one hands out the raw nested value; a readonly one hands out
//! readonly wrappers.

use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::error::ReactivityError;

use super::dep::{PropKey, TriggerKind};
use super::runtime::Runtime;
use super::value::{same_value, ObjectId, RawData, RawObject, Value};

/// Which kind of wrapper an [`Observed`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Tracks reads, triggers on writes, wraps nested objects on read.
    Deep,
    /// Tracks and triggers, but hands out nested objects raw.
    Shallow,
    /// Rejects writes and does not track; nested objects come back readonly.
    Readonly,
    /// Rejects writes and does not track; nested objects come back raw.
    ShallowReadonly,
}

impl Flavor {
    pub fn is_readonly(self) -> bool {
        matches!(self, Flavor::Readonly | Flavor::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Flavor::Shallow | Flavor::ShallowReadonly)
    }
}

/// Largest length a list may be grown to through a write.
pub const MAX_LIST_LEN: usize = 1 << 24;

pub(crate) struct ObservedInner {
    raw: RawObject,
    flavor: Flavor,
    runtime: Runtime,
}

impl Drop for ObservedInner {
    fn drop(&mut self) {
        let key = (self.raw.id(), self.flavor);
        // Skipped while the registry is mid-update; `wrap` replaces dead entries.
        if let Ok(mut registry) = self.runtime.inner().registry.try_borrow_mut() {
            if registry.get(&key).is_some_and(|w| w.strong_count() == 0) {
                registry.remove(&key);
            }
        }
    }
}

/// Reactive wrapper around a structured object.
#[derive(Clone)]
pub struct Observed {
    inner: Rc<ObservedInner>,
}

/// The result of a tracked read: either a plain value or, for structured
/// values read through a deep wrapper, another wrapper.
#[derive(Clone, Debug)]
pub enum Tracked {
    Value(Value),
    Observed(Observed),
}

impl Tracked {
    /// The underlying raw value.
    pub fn to_value(&self) -> Value {
        match self {
            Tracked::Value(value) => value.clone(),
            Tracked::Observed(observed) => Value::Object(observed.raw()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Tracked::Value(value) => value,
            Tracked::Observed(observed) => Value::Object(observed.raw()),
        }
    }

    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Tracked::Observed(observed) => Some(observed),
            Tracked::Value(_) => None,
        }
    }

    pub fn into_observed(self) -> Option<Observed> {
        match self {
            Tracked::Observed(observed) => Some(observed),
            Tracked::Value(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Tracked::Value(value) => value.as_f64(),
            Tracked::Observed(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Tracked::Value(value) => value.as_bool(),
            Tracked::Observed(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tracked::Value(value) => value.as_str(),
            Tracked::Observed(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Tracked::Value(Value::Null))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Tracked::Value(value) => value.truthy(),
            Tracked::Observed(_) => true,
        }
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        same_value(&self.to_value(), &other.to_value())
    }
}

impl fmt::Display for Tracked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_value().fmt(f)
    }
}

impl From<Tracked> for Value {
    fn from(tracked: Tracked) -> Self {
        tracked.into_value()
    }
}

impl From<Observed> for Value {
    fn from(observed: Observed) -> Self {
        Value::Object(observed.raw())
    }
}

impl From<&Observed> for Value {
    fn from(observed: &Observed) -> Self {
        Value::Object(observed.raw())
    }
}

impl Observed {
    /// The raw object behind this wrapper.
    pub fn raw(&self) -> RawObject {
        self.inner.raw.clone()
    }

    pub fn id(&self) -> ObjectId {
        self.inner.raw.id()
    }

    pub fn flavor(&self) -> Flavor {
        self.inner.flavor
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.flavor.is_readonly()
    }

    pub fn is_list(&self) -> bool {
        self.inner.raw.is_list()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn ptr_eq(&self, other: &Observed) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self, key: PropKey) {
        if !self.is_readonly() {
            self.inner.runtime.track(self.id(), key);
        }
    }

    fn iterate_key(&self) -> PropKey {
        if self.is_list() {
            PropKey::Length
        } else {
            PropKey::Iterate
        }
    }

    fn wrap_child(&self, value: Value) -> Tracked {
        match value {
            Value::Object(obj) if !self.inner.flavor.is_shallow() && !obj.is_marked_raw() => {
                let flavor = if self.is_readonly() {
                    Flavor::Readonly
                } else {
                    Flavor::Deep
                };
                Tracked::Observed(self.inner.runtime.wrap(&obj, flavor))
            }
            value => Tracked::Value(value),
        }
    }

    /// Tracked read. Missing keys read as null.
    pub fn get(&self, key: impl Into<PropKey>) -> Tracked {
        let key = key.into();
        let value = self.inner.raw.get(&key).unwrap_or_default();
        self.track(key);
        self.wrap_child(value)
    }

    /// Tracked membership test.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        let present = self.inner.raw.contains_key(&key);
        self.track(key);
        present
    }

    /// Own keys; subscribes to additions and removals.
    pub fn keys(&self) -> Vec<PropKey> {
        self.track(self.iterate_key());
        self.inner.raw.keys()
    }

    pub fn len(&self) -> usize {
        self.track(self.iterate_key());
        self.inner.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked read of every entry.
    pub fn entries(&self) -> Vec<(PropKey, Tracked)> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.get(key.clone());
                (key, value)
            })
            .collect()
    }

    pub fn values(&self) -> Vec<Tracked> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    fn report(&self, err: &ReactivityError) {
        if matches!(err, ReactivityError::ReadonlyWrite { .. })
            && !self.inner.runtime.config().warn_on_readonly
        {
            return;
        }
        warn!(target_id = %self.id(), %err, "write ignored");
    }

    /// Write a key, triggering dependents if the value changed.
    ///
    /// Failures (readonly target, key that does not fit the object) are
    /// reported as warnings; use [`Observed::try_set`] to handle them.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) {
        if let Err(err) = self.try_set(key, value) {
            self.report(&err);
        }
    }

    pub fn try_set(
        &self,
        key: impl Into<PropKey>,
        value: impl Into<Value>,
    ) -> Result<(), ReactivityError> {
        let key = key.into();
        let value = value.into();

        if self.is_readonly() {
            return Err(ReactivityError::ReadonlyWrite {
                key: key.to_string(),
            });
        }

        let raw = &self.inner.raw;
        let (kind, new_len) = {
            let mut data = raw.data_mut();
            match (&mut *data, &key) {
                (RawData::Map(map), PropKey::Named(name)) => match map.get_mut(name) {
                    Some(slot) if same_value(slot, &value) => return Ok(()),
                    Some(slot) => {
                        *slot = value;
                        (TriggerKind::Set, None)
                    }
                    None => {
                        map.insert(name.clone(), value);
                        (TriggerKind::Add, None)
                    }
                },
                (RawData::List(list), PropKey::Index(index)) => {
                    if let Some(slot) = list.get_mut(*index) {
                        if same_value(slot, &value) {
                            return Ok(());
                        }
                        *slot = value;
                        (TriggerKind::Set, None)
                    } else {
                        if *index >= MAX_LIST_LEN {
                            return Err(ReactivityError::LengthOutOfRange {
                                len: index.saturating_add(1),
                                max: MAX_LIST_LEN,
                            });
                        }
                        list.resize(*index, Value::Null);
                        list.push(value);
                        (TriggerKind::Add, None)
                    }
                }
                (RawData::List(list), PropKey::Length) => {
                    let len = value
                        .as_f64()
                        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                        .ok_or_else(|| ReactivityError::InvalidKey {
                            key: "length".to_string(),
                        })? as usize;
                    if len == list.len() {
                        return Ok(());
                    }
                    if len > MAX_LIST_LEN {
                        return Err(ReactivityError::LengthOutOfRange {
                            len,
                            max: MAX_LIST_LEN,
                        });
                    }
                    list.resize(len, Value::Null);
                    (TriggerKind::Set, Some(len))
                }
                _ => {
                    return Err(ReactivityError::InvalidKey {
                        key: key.to_string(),
                    })
                }
            }
        };

        self.inner
            .runtime
            .trigger(self.id(), kind, Some(&key), raw.is_list(), new_len);
        Ok(())
    }

    /// Remove a key. Dependents are only notified if the key existed.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        match self.try_delete(key) {
            Ok(removed) => removed,
            Err(err) => {
                self.report(&err);
                false
            }
        }
    }

    pub fn try_delete(&self, key: impl Into<PropKey>) -> Result<bool, ReactivityError> {
        let key = key.into();
        if self.is_readonly() {
            return Err(ReactivityError::ReadonlyWrite {
                key: key.to_string(),
            });
        }

        let raw = &self.inner.raw;
        let removed = {
            let mut data = raw.data_mut();
            match (&mut *data, &key) {
                (RawData::Map(map), PropKey::Named(name)) => map.shift_remove(name).is_some(),
                (RawData::List(list), PropKey::Index(index)) => match list.get_mut(*index) {
                    Some(slot) => {
                        *slot = Value::Null;
                        true
                    }
                    None => false,
                },
                _ => false,
            }
        };

        if removed {
            self.inner
                .runtime
                .trigger(self.id(), TriggerKind::Delete, Some(&key), raw.is_list(), None);
        }
        Ok(removed)
    }

    /// Append to a list.
    pub fn push(&self, value: impl Into<Value>) {
        // Read the length raw so pushing never subscribes to it.
        let len = self.inner.raw.len();
        self.set(PropKey::Index(len), value);
    }

    /// Remove and return the last element of a list.
    pub fn pop(&self) -> Option<Value> {
        if self.is_readonly() {
            self.report(&ReactivityError::ReadonlyWrite {
                key: "length".to_string(),
            });
            return None;
        }

        let (popped, len) = {
            let mut data = self.inner.raw.data_mut();
            match &mut *data {
                RawData::List(list) => (list.pop(), list.len()),
                RawData::Map(_) => (None, 0),
            }
        };

        if popped.is_some() {
            self.inner.runtime.trigger(
                self.id(),
                TriggerKind::Set,
                Some(&PropKey::Length),
                true,
                Some(len),
            );
        }
        popped
    }

    /// Remove everything. Every dependent of this object is notified.
    pub fn clear(&self) {
        if self.is_readonly() {
            self.report(&ReactivityError::ReadonlyWrite {
                key: "<clear>".to_string(),
            });
            return;
        }

        let had_entries = {
            let mut data = self.inner.raw.data_mut();
            let had = match &*data {
                RawData::Map(map) => !map.is_empty(),
                RawData::List(list) => !list.is_empty(),
            };
            match &mut *data {
                RawData::Map(map) => map.clear(),
                RawData::List(list) => list.clear(),
            }
            had
        };

        if had_entries {
            self.inner.runtime.trigger(
                self.id(),
                TriggerKind::Clear,
                None,
                self.is_list(),
                Some(0),
            );
        }
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("id", &self.id())
            .field("flavor", &self.inner.flavor)
            .finish()
    }
}

/// The raw value behind a tracked read.
pub fn to_raw(value: &Tracked) -> Value {
    value.to_value()
}

/// Whether the value is a writable (deep or shallow) wrapper.
pub fn is_reactive(value: &Tracked) -> bool {
    matches!(value, Tracked::Observed(o) if !o.is_readonly())
}

pub fn is_readonly(value: &Tracked) -> bool {
    matches!(value, Tracked::Observed(o) if o.is_readonly())
}

impl Runtime {
    pub(crate) fn wrap(&self, raw: &RawObject, flavor: Flavor) -> Observed {
        let key = (raw.id(), flavor);
        let existing = self
            .inner()
            .registry
            .borrow()
            .get(&key)
            .and_then(Weak::upgrade);
        if let Some(inner) = existing {
            return Observed { inner };
        }

        let inner = Rc::new(ObservedInner {
            raw: raw.clone(),
            flavor,
            runtime: self.clone(),
        });
        self.inner()
            .registry
            .borrow_mut()
            .insert(key, Rc::downgrade(&inner));
        Observed { inner }
    }

    /// Wrap a value for deep reactivity.
    ///
    /// Scalars, callbacks and objects marked raw come back unchanged.
    pub fn reactive(&self, value: impl Into<Value>) -> Tracked {
        match value.into() {
            Value::Object(obj) if !obj.is_marked_raw() => {
                Tracked::Observed(self.wrap(&obj, Flavor::Deep))
            }
            value => Tracked::Value(value),
        }
    }

    /// Deep wrapper for a raw object.
    pub fn reactive_object(&self, raw: &RawObject) -> Observed {
        self.wrap(raw, Flavor::Deep)
    }

    /// Deep wrapper around a fresh map.
    pub fn reactive_map<K, V, I>(&self, entries: I) -> Observed
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        match Value::map(entries) {
            Value::Object(raw) => self.wrap(&raw, Flavor::Deep),
            _ => unreachable!("Value::map always builds an object"),
        }
    }

    /// Deep wrapper around a fresh list.
    pub fn reactive_list<V, I>(&self, items: I) -> Observed
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        match Value::list(items) {
            Value::Object(raw) => self.wrap(&raw, Flavor::Deep),
            _ => unreachable!("Value::list always builds an object"),
        }
    }

    pub fn shallow_reactive(&self, raw: &RawObject) -> Observed {
        self.wrap(raw, Flavor::Shallow)
    }

    pub fn readonly(&self, raw: &RawObject) -> Observed {
        self.wrap(raw, Flavor::Readonly)
    }

    pub fn shallow_readonly(&self, raw: &RawObject) -> Observed {
        self.wrap(raw, Flavor::ShallowReadonly)
    }
}
