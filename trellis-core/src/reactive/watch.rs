//! Watchers
//!
//! A watcher runs a callback with the new and previous value of a source
//! whenever the source changes. It is built on a lazy [`Effect`] whose run
//! evaluates the source (tracking it) and whose scheduler compares the
//! result against the previous one.
//!
//! Sources can be refs, computed cells, getters, or observed objects. An
//! observed object is watched deeply: every nested key is tracked and any
//! write anywhere inside fires the callback.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::config::FlushMode;

use super::cell::Ref;
use super::computed::Computed;
use super::effect::{Effect, EffectOptions, Scheduler};
use super::proxy::{Flavor, Observed};
use super::runtime::Runtime;
use super::scheduler::Job;
use super::value::{same_value, ObjectId, Value};

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    Ref(Ref),
    Observed(Observed),
    Getter(Rc<dyn Fn() -> Value>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(f))
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Ref(r) => f.debug_tuple("Ref").field(&r.id()).finish(),
            WatchSource::Observed(o) => f.debug_tuple("Observed").field(&o.id()).finish(),
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

impl From<Ref> for WatchSource {
    fn from(r: Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<&Ref> for WatchSource {
    fn from(r: &Ref) -> Self {
        WatchSource::Ref(r.clone())
    }
}

impl From<Observed> for WatchSource {
    fn from(o: Observed) -> Self {
        WatchSource::Observed(o)
    }
}

impl From<&Observed> for WatchSource {
    fn from(o: &Observed) -> Self {
        WatchSource::Observed(o.clone())
    }
}

impl From<Computed<Value>> for WatchSource {
    fn from(c: Computed<Value>) -> Self {
        WatchSource::getter(move || c.get())
    }
}

/// Options for [`Runtime::watch`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Call the callback once right away, with a null previous value.
    pub immediate: bool,
    /// Track every nested key of the source's value.
    pub deep: bool,
    /// Defaults to the runtime's configured flush mode.
    pub flush: Option<FlushMode>,
}

impl WatchOptions {
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = Some(flush);
        self
    }
}

/// Stop handle returned by [`Runtime::watch`] and [`Runtime::watch_effect`].
///
/// Dropping the handle does not stop the watcher.
#[derive(Clone, Debug)]
pub struct WatchHandle {
    effect: Effect,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

struct WatchState {
    runtime: Runtime,
    deep: bool,
    latest: RefCell<Value>,
    old: RefCell<Value>,
    callback: Rc<dyn Fn(&Value, &Value)>,
}

impl WatchState {
    /// Re-evaluate the source and call back if it changed. `force` skips
    /// the comparison for the immediate first call.
    fn job(&self, effect: &Effect, force: bool) {
        if !effect.is_active() {
            return;
        }
        effect.run();

        let new = self.latest.borrow().clone();
        let old = self.old.replace(new.clone());
        if force || self.deep || !same_value(&new, &old) {
            let callback = self.callback.clone();
            self.runtime.untracked(|| callback(&new, &old));
        }
    }
}

/// Subscribe to every key reachable from `value`.
fn traverse(runtime: &Runtime, value: &Value, seen: &mut HashSet<ObjectId>) {
    let Value::Object(raw) = value else {
        return;
    };
    if raw.is_marked_raw() || !seen.insert(raw.id()) {
        return;
    }
    let observed = runtime.wrap(raw, Flavor::Deep);
    for (_, child) in observed.entries() {
        traverse(runtime, &child.to_value(), seen);
    }
}

fn scheduler_for(runtime: &Runtime, flush: Option<FlushMode>, job: Rc<dyn Fn(&Effect)>) -> Scheduler {
    let flush = flush.unwrap_or_else(|| runtime.config().flush);
    match flush {
        FlushMode::Sync => Scheduler::custom(move |effect| job(effect)),
        FlushMode::Batched => {
            let runtime = runtime.clone();
            Scheduler::custom(move |effect| {
                let job = job.clone();
                let effect = effect.clone();
                runtime.queue_job(Job::new(effect.id().raw(), move || job(&effect)));
            })
        }
    }
}

impl Runtime {
    /// Run `callback(new, old)` whenever `source` changes.
    pub fn watch<F>(
        &self,
        source: impl Into<WatchSource>,
        callback: F,
        options: WatchOptions,
    ) -> WatchHandle
    where
        F: Fn(&Value, &Value) + 'static,
    {
        let source = source.into();
        let deep = options.deep || matches!(source, WatchSource::Observed(_));

        let read: Rc<dyn Fn() -> Value> = match source {
            WatchSource::Ref(r) => Rc::new(move || r.get().into_value()),
            WatchSource::Observed(o) => Rc::new(move || Value::from(&o)),
            WatchSource::Getter(f) => f,
        };

        let state = Rc::new(WatchState {
            runtime: self.clone(),
            deep,
            latest: RefCell::new(Value::Null),
            old: RefCell::new(Value::Null),
            callback: Rc::new(callback),
        });

        let run_state = state.clone();
        let run = move || {
            let value = read();
            if run_state.deep {
                traverse(&run_state.runtime, &value, &mut HashSet::new());
            }
            *run_state.latest.borrow_mut() = value;
        };

        let job_state = state.clone();
        let job: Rc<dyn Fn(&Effect)> = Rc::new(move |effect| job_state.job(effect, false));
        let scheduler = scheduler_for(self, options.flush, job);

        let effect = self.effect_with(run, EffectOptions::lazy().with_scheduler(scheduler));

        if options.immediate {
            state.job(&effect, true);
        } else {
            effect.run();
            let initial = state.latest.borrow().clone();
            *state.old.borrow_mut() = initial;
        }

        WatchHandle { effect }
    }

    /// Run `f` now and again whenever anything it read changes.
    ///
    /// Unlike [`Runtime::effect`], re-runs follow the runtime's flush mode.
    pub fn watch_effect<F>(&self, f: F) -> WatchHandle
    where
        F: Fn() + 'static,
    {
        let scheduler = match self.config().flush {
            FlushMode::Sync => Scheduler::Sync,
            FlushMode::Batched => Scheduler::Queued,
        };
        let effect = self.effect_with(f, EffectOptions::default().with_scheduler(scheduler));
        WatchHandle { effect }
    }
}
