//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazy).
//!
//! 2. Every run first unsubscribes the effect from all buckets it was in,
//!    then re-tracks whatever the function reads this time. Dependencies
//!    therefore always reflect the latest run.
//!
//! 3. When a dependency changes, the effect is delivered to its scheduler:
//!    run synchronously (the default), queued for the next flush, or handed
//!    to a custom function.
//!
//! # Stopping
//!
//! [`Effect::stop`] is the only cancellation primitive. It unsubscribes the
//! effect from every bucket and marks it inactive for good. An inactive
//! effect can still be run by hand; it then executes its function without
//! tracking anything. Stopping does not interrupt a run already in progress.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::dep::Dep;
use super::runtime::{Runtime, WeakRuntime};
use super::scheduler::Job;

/// Unique identifier for an effect.
///
/// Ids are allocated in creation order, which the job queue relies on to run
/// parents before children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// How a triggered effect gets re-run.
#[derive(Clone, Default)]
pub enum Scheduler {
    /// Run immediately, inside the triggering write.
    #[default]
    Sync,
    /// Push onto the runtime's job queue.
    Queued,
    /// Hand the effect to a custom function.
    Custom(Rc<dyn Fn(&Effect)>),
}

impl Scheduler {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Effect) + 'static,
    {
        Scheduler::Custom(Rc::new(f))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduler::Sync => f.write_str("Sync"),
            Scheduler::Queued => f.write_str("Queued"),
            Scheduler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Options for [`Runtime::effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    pub scheduler: Scheduler,
    /// Let the effect be re-triggered by its own writes.
    pub allow_recurse: bool,
    /// Called once when the effect is stopped.
    pub on_stop: Option<Rc<dyn Fn()>>,
}

impl EffectOptions {
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn on_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_stop = Some(Rc::new(f));
        self
    }
}

pub(crate) struct EffectInner {
    id: EffectId,
    run: Rc<dyn Fn()>,
    scheduler: Scheduler,
    allow_recurse: bool,
    on_stop: Option<Rc<dyn Fn()>>,
    active: Cell<bool>,
    /// Buckets this effect is subscribed to, for O(k) teardown.
    deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,
    run_count: Cell<usize>,
    runtime: WeakRuntime,
}

/// A side-effecting computation that re-runs when dependencies change.
///
/// Cloning an `Effect` yields another handle to the same computation.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_ref(0);
///
/// let c = count.clone();
/// let effect = rt.effect(move || {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.stop();
/// count.set(6); // Prints nothing
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn new<F>(runtime: &Runtime, run: F, options: EffectOptions) -> Self
    where
        F: Fn() + 'static,
    {
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: EffectId::next(),
                run: Rc::new(run),
                scheduler: options.scheduler,
                allow_recurse: options.allow_recurse,
                on_stop: options.on_stop,
                active: Cell::new(true),
                deps: RefCell::new(SmallVec::new()),
                run_count: Cell::new(0),
                runtime: runtime.downgrade(),
            }),
        };

        if !options.lazy {
            effect.run();
        }

        effect
    }

    pub fn id(&self) -> EffectId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Effect) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Execute the effect function.
    ///
    /// Active effects run inside a reactive context and re-track their
    /// dependencies; inactive ones just call the function. A run requested
    /// while the same effect is already on the context stack is skipped.
    pub fn run(&self) {
        let run = self.inner.run.clone();

        if !self.inner.active.get() {
            run();
            return;
        }

        let Some(runtime) = self.inner.runtime.upgrade() else {
            run();
            return;
        };

        if runtime.inner().context.borrow().contains(self.inner.id) {
            trace!(effect = %self.inner.id, "already running, skipped");
            return;
        }

        self.cleanup();

        let _ctx = ReactiveContext::enter(&runtime, self.clone());
        trace!(effect = %self.inner.id, "run");
        run();
        self.inner.run_count.set(self.inner.run_count.get() + 1);
    }

    /// Deliver a trigger according to the effect's scheduler.
    pub(crate) fn schedule(&self) {
        match &self.inner.scheduler {
            Scheduler::Sync => self.run(),
            Scheduler::Queued => match self.inner.runtime.upgrade() {
                Some(runtime) => {
                    let effect = self.clone();
                    runtime.queue_job(Job::new(self.inner.id.raw(), move || effect.run()));
                }
                None => self.run(),
            },
            Scheduler::Custom(scheduler) => scheduler(self),
        }
    }

    /// Unsubscribe from every dependency and deactivate permanently.
    pub fn stop(&self) {
        if !self.inner.active.get() {
            return;
        }
        self.cleanup();
        if let Some(on_stop) = &self.inner.on_stop {
            on_stop();
        }
        self.inner.active.set(false);
        debug!(effect = %self.inner.id, "stopped");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub(crate) fn allow_recurse(&self) -> bool {
        self.inner.allow_recurse
    }

    /// Get the number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of buckets the effect is subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    pub(crate) fn record_dep(&self, dep: &Rc<Dep>) {
        self.inner.deps.borrow_mut().push(Rc::downgrade(dep));
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                dep.unsubscribe(self.inner.id);
            }
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl Runtime {
    /// Create an effect that runs now and whenever its dependencies change.
    pub fn effect<F>(&self, f: F) -> Effect
    where
        F: Fn() + 'static,
    {
        Effect::new(self, f, EffectOptions::default())
    }

    pub fn effect_with<F>(&self, f: F, options: EffectOptions) -> Effect
    where
        F: Fn() + 'static,
    {
        Effect::new(self, f, options)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
