//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects observed objects,
//! refs, computed cells and effects. It owns every piece of shared mutable
//! bookkeeping:
//!
//! - the dependency graph (`object -> key -> effects`),
//! - the raw-to-wrapper registries that keep wrapper identity stable,
//! - the stack of running effects,
//! - the queue of batched jobs,
//! - the runtime configuration.
//!
//! # How It Works
//!
//! 1. When an effect runs, it pushes itself onto the context stack.
//!
//! 2. Tracked reads look up the innermost effect and subscribe it to the
//!    bucket for `(object, key)`.
//!
//! 3. Writes collect the affected buckets and schedule each subscribed effect
//!    in subscription order. The effect that is currently running is skipped,
//!    so an effect writing state it reads does not re-enter itself.
//!
//! Everything is single-threaded and synchronous. Independent runtimes do
//! not share any state, which keeps tests isolated; the free functions in
//! [`crate::api`] use a thread-local default instance.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::trace;

use crate::config::RuntimeConfig;

use super::context::{ContextStack, PauseTracking};
use super::dep::{DepGraph, PropKey, TriggerKind};
use super::effect::{Effect, EffectId};
use super::proxy::{Flavor, ObservedInner};
use super::scheduler::JobQueue;
use super::value::ObjectId;

pub(crate) struct RuntimeInner {
    pub(crate) graph: RefCell<DepGraph>,
    pub(crate) registry: RefCell<HashMap<(ObjectId, Flavor), Weak<ObservedInner>>>,
    pub(crate) context: RefCell<ContextStack>,
    pub(crate) queue: RefCell<JobQueue>,
    config: RefCell<RuntimeConfig>,
}

/// Handle to a reactivity system.
///
/// Cloning the handle shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

impl Runtime {
    /// Create an independent runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(DepGraph::new()),
                registry: RefCell::new(HashMap::new()),
                context: RefCell::new(ContextStack::default()),
                queue: RefCell::new(JobQueue::default()),
                config: RefCell::new(config),
            }),
        }
    }

    /// The thread's default runtime.
    pub fn current() -> Self {
        CURRENT.with(Runtime::clone)
    }

    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &RuntimeInner {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub fn config(&self) -> Ref<'_, RuntimeConfig> {
        self.inner.config.borrow()
    }

    pub fn set_config(&self, config: RuntimeConfig) {
        *self.inner.config.borrow_mut() = config;
    }

    /// Whether a tracked read right now would subscribe an effect.
    pub fn is_tracking(&self) -> bool {
        let ctx = self.inner.context.borrow();
        ctx.should_track() && ctx.current().is_some()
    }

    /// The innermost running effect, if any.
    pub fn current_effect(&self) -> Option<Effect> {
        self.inner.context.borrow().current().cloned()
    }

    /// Run `f` without subscribing the current effect to anything it reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pause = PauseTracking::new(self);
        f()
    }

    /// Record that the current effect depends on `(target, key)`.
    pub(crate) fn track(&self, target: ObjectId, key: PropKey) {
        let effect = {
            let ctx = self.inner.context.borrow();
            if !ctx.should_track() {
                return;
            }
            match ctx.current() {
                Some(effect) if effect.is_active() => effect.clone(),
                _ => return,
            }
        };

        let dep = self.inner.graph.borrow_mut().dep_for(target, key.clone());
        if dep.subscribe(&effect) {
            effect.record_dep(&dep);
            trace!(effect = %effect.id(), %target, %key, "track");
        }
    }

    /// Notify every effect depending on a mutated `(target, key)`.
    pub(crate) fn trigger(
        &self,
        target: ObjectId,
        kind: TriggerKind,
        key: Option<&PropKey>,
        is_list: bool,
        new_len: Option<usize>,
    ) {
        let deps = self
            .inner
            .graph
            .borrow()
            .collect(target, kind, key, is_list, new_len);
        if deps.is_empty() {
            return;
        }

        let active = self.current_effect().map(|e| e.id());

        // An effect subscribed to several affected buckets runs once per trigger.
        let mut effects: IndexMap<EffectId, Effect> = IndexMap::new();
        for dep in deps {
            for effect in dep.subscribers() {
                if Some(effect.id()) == active && !effect.allow_recurse() {
                    continue;
                }
                effects.entry(effect.id()).or_insert(effect);
            }
        }

        trace!(
            %target,
            ?kind,
            key = key.map(|k| k.to_string()).unwrap_or_default(),
            count = effects.len(),
            "trigger"
        );

        for effect in effects.into_values() {
            // An earlier subscriber may have stopped this one.
            if effect.is_active() {
                effect.schedule();
            }
        }
    }

    /// Number of effects currently subscribed to `(target, key)`.
    pub fn subscriber_count(&self, target: ObjectId, key: &PropKey) -> usize {
        self.inner.graph.borrow().subscriber_count(target, key)
    }

    /// Number of dependency buckets created so far.
    pub fn bucket_count(&self) -> usize {
        self.inner.graph.borrow().bucket_count()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("buckets", &self.bucket_count())
            .field("depth", &self.inner.context.borrow().depth())
            .field("config", &*self.inner.config.borrow())
            .finish()
    }
}

/// Non-owning runtime handle, held by effects so the graph (which owns the
/// effects) does not keep itself alive.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}
