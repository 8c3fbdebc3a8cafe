//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when read
//! after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. The getter is wrapped in a lazy [`Effect`]. Nothing runs until the
//!    first read.
//!
//! 2. A read while dirty runs the effect, which tracks whatever the getter
//!    reads and caches the result. The cell is then clean.
//!
//! 3. When a dependency changes, the effect's scheduler does not re-run the
//!    getter. It marks the cell dirty and notifies the cell's own
//!    dependents, which pull the new value when they read it.
//!
//! Computeds that are never read after an invalidation stay dirty and cost
//! nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::error::ReactivityError;

use super::dep::{PropKey, TriggerKind};
use super::effect::{Effect, EffectOptions, Scheduler};
use super::runtime::Runtime;
use super::value::ObjectId;

struct ComputedInner<T> {
    id: ObjectId,
    getter: Rc<dyn Fn() -> T>,
    setter: Option<Rc<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    effect: Effect,
    runtime: Runtime,
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_ref(2);
///
/// let c = count.clone();
/// let doubled = rt.computed(move || c.get().as_f64().unwrap_or(0.0) * 2.0);
/// assert_eq!(doubled.get(), 4.0);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10.0);
/// ```
pub struct Computed<T: Clone + 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    fn new(runtime: &Runtime, getter: Rc<dyn Fn() -> T>, setter: Option<Rc<dyn Fn(T)>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let run_weak = weak.clone();
            let notify_weak = weak.clone();

            let effect = Effect::new(
                runtime,
                move || {
                    if let Some(inner) = run_weak.upgrade() {
                        let value = (inner.getter)();
                        *inner.value.borrow_mut() = Some(value);
                    }
                },
                EffectOptions::lazy().with_scheduler(Scheduler::custom(move |_| {
                    if let Some(inner) = notify_weak.upgrade() {
                        if !inner.dirty.replace(true) {
                            inner.runtime.trigger(
                                inner.id,
                                TriggerKind::Set,
                                Some(&PropKey::Value),
                                false,
                                None,
                            );
                        }
                    }
                })),
            );

            ComputedInner {
                id: ObjectId::next(),
                getter,
                setter,
                value: RefCell::new(None),
                dirty: Cell::new(true),
                effect,
                runtime: runtime.clone(),
            }
        });

        Self { inner }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Read the value, recomputing first if a dependency changed.
    pub fn get(&self) -> T {
        let inner = &self.inner;
        if inner.dirty.replace(false) {
            inner.effect.run();
        }
        inner.runtime.track(inner.id, PropKey::Value);

        let cached = inner.value.borrow().clone();
        match cached {
            Some(value) => value,
            // A getter that reads its own cell never finishes its first run.
            None => (inner.getter)(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.setter.is_none()
    }

    /// Invoke the setter. Without one this warns and does nothing.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            warn!(computed = %self.inner.id, %err, "write ignored");
        }
    }

    pub fn try_set(&self, value: T) -> Result<(), ReactivityError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactivityError::ComputedReadonly),
        }
    }

    /// The effect driving this cell.
    pub fn effect(&self) -> &Effect {
        &self.inner.effect
    }

    /// Detach from all dependencies. Reads keep returning the value cached
    /// at this point; nothing marks the cell dirty again.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("dirty", &self.inner.dirty.get())
            .finish()
    }
}

impl Runtime {
    /// Create a getter-only computed cell.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(self, Rc::new(getter), None)
    }

    /// Create a computed cell whose writes are forwarded to `setter`.
    pub fn computed_with_setter<T, F, S>(&self, getter: F, setter: S) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Computed::new(self, Rc::new(getter), Some(Rc::new(setter)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_is_lazy_and_cached() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);
        let calls = Rc::new(Cell::new(0));

        let c = count.clone();
        let calls_clone = calls.clone();
        let doubled = rt.computed(move || {
            calls_clone.set(calls_clone.get() + 1);
            c.get().as_f64().unwrap_or(0.0) * 2.0
        });

        // Not evaluated until read.
        assert_eq!(calls.get(), 0);

        assert_eq!(doubled.get(), 2.0);
        assert_eq!(doubled.get(), 2.0);
        assert_eq!(calls.get(), 1);

        // Invalidation alone does not recompute.
        count.set(3);
        assert!(doubled.is_dirty());
        assert_eq!(calls.get(), 1);

        assert_eq!(doubled.get(), 6.0);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn stopped_computed_keeps_its_cached_value() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);
        let c = count.clone();
        let doubled = rt.computed(move || c.get().as_f64().unwrap_or(0.0) * 2.0);

        assert_eq!(doubled.get(), 2.0);
        doubled.stop();

        count.set(5);
        assert!(!doubled.is_dirty());
        assert_eq!(doubled.get(), 2.0);
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn computed_notifies_its_dependents() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);

        let c = count.clone();
        let plus_one = rt.computed(move || c.get().as_f64().unwrap_or(0.0) + 1.0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let p = plus_one.clone();
        let seen_clone = seen.clone();
        let _effect = rt.effect(move || seen_clone.borrow_mut().push(p.get()));

        count.set(10);
        assert_eq!(*seen.borrow(), vec![2.0, 11.0]);
    }

    #[test]
    fn chained_computeds() {
        let rt = Runtime::new();
        let base = rt.create_ref(2);

        let b = base.clone();
        let squared = rt.computed(move || {
            let n = b.get().as_f64().unwrap_or(0.0);
            n * n
        });
        let s = squared.clone();
        let label = rt.computed(move || format!("n^2 = {}", s.get()));

        assert_eq!(label.get(), "n^2 = 4");
        base.set(3);
        assert_eq!(label.get(), "n^2 = 9");
    }

    #[test]
    fn setter_is_invoked_and_missing_setter_is_reported() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);

        let c = count.clone();
        let c2 = count.clone();
        let writable = rt.computed_with_setter(
            move || c.get().as_f64().unwrap_or(0.0),
            move |v: f64| c2.set(v),
        );
        writable.set(7.0);
        assert_eq!(count.get().as_f64(), Some(7.0));
        assert_eq!(writable.get(), 7.0);

        let readonly = rt.computed(|| 1);
        assert!(readonly.is_readonly());
        readonly.set(2);
        assert_eq!(readonly.get(), 1);
        assert_eq!(readonly.try_set(2), Err(ReactivityError::ComputedReadonly));
    }

    #[test]
    fn dropping_a_computed_releases_its_subscriptions() {
        let rt = Runtime::new();
        let count = rt.create_ref(1);

        let c = count.clone();
        let doubled = rt.computed(move || c.get().as_f64().unwrap_or(0.0) * 2.0);
        doubled.get();
        assert_eq!(count.subscriber_count(), 1);

        drop(doubled);
        assert_eq!(count.subscriber_count(), 0);
    }
}
