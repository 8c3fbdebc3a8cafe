//! Ref Implementation
//!
//! A Ref is a reactive box around a single [`Value`]. Reading it registers
//! a dependency on the box itself under [`PropKey::Value`]; writing it
//! notifies those dependents.
//!
//! # Writes
//!
//! A write is compared against the stored raw value with [`same_value`] and
//! does nothing if they match, so assigning the current value never starts
//! a trigger cascade. Assigning a wrapper stores its raw object, which keeps
//! the comparison on raw forms.
//!
//! # Deep vs shallow
//!
//! A deep ref hands out structured values as deep [`Observed`] wrappers, so
//! `count.get()` on a ref holding an object gives reactive access to its
//! fields. A shallow ref hands out the raw value and only `set` (or
//! [`Ref::trigger`]) notifies.
//!
//! [`Observed`]: super::Observed

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::dep::{PropKey, TriggerKind};
use super::proxy::{Flavor, Tracked};
use super::runtime::Runtime;
use super::value::{same_value, ObjectId, Value};

struct RefInner {
    id: ObjectId,
    raw: RefCell<Value>,
    shallow: bool,
    runtime: Runtime,
}

/// A reactive single-value container.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_ref(1);
///
/// count.set(2);
/// assert_eq!(count.get().as_f64(), Some(2.0));
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Rc<RefInner>,
}

impl Ref {
    fn new(runtime: &Runtime, value: Value, shallow: bool) -> Self {
        Self {
            inner: Rc::new(RefInner {
                id: ObjectId::next(),
                raw: RefCell::new(value),
                shallow,
                runtime: runtime.clone(),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn wrap(&self, value: Value) -> Tracked {
        match value {
            Value::Object(obj) if !self.inner.shallow && !obj.is_marked_raw() => {
                Tracked::Observed(self.inner.runtime.wrap(&obj, Flavor::Deep))
            }
            value => Tracked::Value(value),
        }
    }

    /// Read the value, subscribing the running effect.
    pub fn get(&self) -> Tracked {
        self.inner.runtime.track(self.inner.id, PropKey::Value);
        self.get_untracked()
    }

    /// Read the value without subscribing anything.
    pub fn get_untracked(&self) -> Tracked {
        let value = self.inner.raw.borrow().clone();
        self.wrap(value)
    }

    /// The stored raw value.
    pub fn raw(&self) -> Value {
        self.inner.raw.borrow().clone()
    }

    /// Store a new value. Dependents re-run only if it differs.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        {
            let mut raw = self.inner.raw.borrow_mut();
            if same_value(&raw, &value) {
                return;
            }
            *raw = value;
        }
        self.trigger();
    }

    /// Replace the value with `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let current = self.raw();
        self.set(f(&current));
    }

    /// Notify dependents without changing the value.
    ///
    /// Useful after mutating the raw contents of a shallow ref.
    pub fn trigger(&self) {
        self.inner.runtime.trigger(
            self.inner.id,
            TriggerKind::Set,
            Some(&PropKey::Value),
            false,
            None,
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .subscriber_count(self.inner.id, &PropKey::Value)
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.raw.borrow())
            .field("shallow", &self.inner.shallow)
            .finish()
    }
}

/// Either a ref or a plain value.
#[derive(Clone, Debug)]
pub enum MaybeRef {
    Ref(Ref),
    Value(Value),
}

impl MaybeRef {
    pub fn is_ref(&self) -> bool {
        matches!(self, MaybeRef::Ref(_))
    }

    /// The ref's (tracked) value, or the plain value as is.
    pub fn unref(&self) -> Tracked {
        match self {
            MaybeRef::Ref(r) => r.get(),
            MaybeRef::Value(v) => Tracked::Value(v.clone()),
        }
    }
}

impl From<Ref> for MaybeRef {
    fn from(r: Ref) -> Self {
        MaybeRef::Ref(r)
    }
}

impl From<&Ref> for MaybeRef {
    fn from(r: &Ref) -> Self {
        MaybeRef::Ref(r.clone())
    }
}

impl<T: Into<Value>> From<T> for MaybeRef {
    fn from(value: T) -> Self {
        MaybeRef::Value(value.into())
    }
}

/// Read through a ref, or return a plain value unchanged.
pub fn unref(source: impl Into<MaybeRef>) -> Tracked {
    source.into().unref()
}

pub fn is_ref(source: &MaybeRef) -> bool {
    source.is_ref()
}

impl Runtime {
    /// Create a deep ref.
    pub fn create_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(self, value.into(), false)
    }

    /// Create a ref whose structured contents are not made reactive.
    pub fn create_shallow_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(self, value.into(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn watch_runs(rt: &Runtime, f: impl Fn() + 'static) -> Rc<Cell<usize>> {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let _ = rt.effect(move || {
            f();
            runs_clone.set(runs_clone.get() + 1);
        });
        runs
    }

    #[test]
    fn ref_get_and_set() {
        let rt = Runtime::new();
        let count = rt.create_ref(0);
        assert_eq!(count.get().as_f64(), Some(0.0));

        count.set(5);
        assert_eq!(count.get().as_f64(), Some(5.0));

        count.update(|v| Value::from(v.as_f64().unwrap_or(0.0) * 2.0));
        assert_eq!(count.get().as_f64(), Some(10.0));
    }

    #[test]
    fn same_value_write_does_not_trigger() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);

        let c = count.clone();
        let runs = watch_runs(&rt, move || {
            c.get();
        });
        assert_eq!(count.subscriber_count(), 1);

        count.set(1);
        assert_eq!(runs.get(), 1);

        count.set(2);
        assert_eq!(runs.get(), 2);

        // NaN is the same value as NaN.
        count.set(f64::NAN);
        count.set(f64::NAN);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn deep_ref_wraps_nested_objects() {
        let rt = Runtime::new();
        let user = rt.create_ref(Value::map([("name", "ada")]));

        let u = user.clone();
        let runs = watch_runs(&rt, move || {
            if let Some(obj) = u.get().into_observed() {
                obj.get("name");
            }
        });

        let obj = user.get().into_observed().expect("deep ref wraps");
        obj.set("name", "grace");
        assert_eq!(runs.get(), 2);

        // Assigning the wrapper stores the same raw object: no trigger.
        user.set(&obj);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn shallow_ref_needs_explicit_trigger() {
        let rt = Runtime::new();
        let list = rt.create_shallow_ref(Value::list([1, 2]));

        let l = list.clone();
        let runs = watch_runs(&rt, move || {
            l.get();
        });

        match list.get_untracked() {
            Tracked::Value(Value::Object(raw)) => {
                raw.push(3);
            }
            other => panic!("shallow ref should hand out raw values, got {other:?}"),
        }
        assert_eq!(runs.get(), 1);

        list.trigger();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unref_passes_plain_values_through() {
        let rt = Runtime::new();
        let r = rt.create_ref("x");

        assert!(is_ref(&MaybeRef::from(&r)));
        assert!(!is_ref(&MaybeRef::from(3)));
        assert_eq!(unref(&r).as_str(), Some("x"));
        assert_eq!(unref(3).as_f64(), Some(3.0));
    }
}
