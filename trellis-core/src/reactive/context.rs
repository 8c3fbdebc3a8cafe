//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a reactive property is
//! read, we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns an explicit stack of running effects. Entering a
//! context pushes the effect; dropping the guard pops it. Nested effects
//! (a computed read from inside a render effect, say) therefore attribute
//! their reads to the innermost computation and hand tracking back to the
//! outer one when they finish.
//!
//! Tracking can also be paused, for reads that must not subscribe anything
//! (list mutators reading their own length, watcher callbacks).

use super::effect::{Effect, EffectId};
use super::runtime::Runtime;

/// The per-runtime context stack.
pub(crate) struct ContextStack {
    entries: Vec<Effect>,
    should_track: bool,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            should_track: true,
        }
    }
}

impl ContextStack {
    /// The innermost running effect.
    pub(crate) fn current(&self) -> Option<&Effect> {
        self.entries.last()
    }

    pub(crate) fn contains(&self, id: EffectId) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    pub(crate) fn should_track(&self) -> bool {
        self.should_track
    }

    pub(crate) fn depth(&self) -> usize {
        self.entries.len()
    }
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub(crate) struct ReactiveContext {
    runtime: Runtime,
    effect_id: EffectId,
    prev_should_track: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given effect.
    ///
    /// While this context is active, tracked reads subscribe the effect.
    pub(crate) fn enter(runtime: &Runtime, effect: Effect) -> Self {
        let effect_id = effect.id();
        let prev_should_track = {
            let mut ctx = runtime.inner().context.borrow_mut();
            ctx.entries.push(effect);
            std::mem::replace(&mut ctx.should_track, true)
        };

        Self {
            runtime: runtime.clone(),
            effect_id,
            prev_should_track,
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let mut ctx = self.runtime.inner().context.borrow_mut();
        let popped = ctx.entries.pop();
        ctx.should_track = self.prev_should_track;

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect_id,
                entry.id()
            );
        }
    }
}

/// Guard that restores tracking when dropped.
pub(crate) struct PauseTracking {
    runtime: Runtime,
    prev_should_track: bool,
}

impl PauseTracking {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        let prev_should_track =
            std::mem::replace(&mut runtime.inner().context.borrow_mut().should_track, false);
        Self {
            runtime: runtime.clone(),
            prev_should_track,
        }
    }
}

impl Drop for PauseTracking {
    fn drop(&mut self) {
        self.runtime.inner().context.borrow_mut().should_track = self.prev_should_track;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::EffectOptions;

    fn lazy_effect(rt: &Runtime) -> Effect {
        rt.effect_with(|| {}, EffectOptions::lazy())
    }

    #[test]
    fn context_tracks_effect() {
        let rt = Runtime::new();
        let effect = lazy_effect(&rt);

        assert!(!rt.is_tracking());
        assert!(rt.current_effect().is_none());

        {
            let _ctx = ReactiveContext::enter(&rt, effect.clone());
            assert!(rt.is_tracking());
            assert_eq!(rt.current_effect().map(|e| e.id()), Some(effect.id()));
        }

        // Context should be cleaned up after drop
        assert!(!rt.is_tracking());
        assert!(rt.current_effect().is_none());
    }

    #[test]
    fn nested_contexts() {
        let rt = Runtime::new();
        let outer = lazy_effect(&rt);
        let inner = lazy_effect(&rt);

        {
            let _ctx1 = ReactiveContext::enter(&rt, outer.clone());
            assert_eq!(rt.current_effect().map(|e| e.id()), Some(outer.id()));

            {
                let _ctx2 = ReactiveContext::enter(&rt, inner.clone());
                assert_eq!(rt.current_effect().map(|e| e.id()), Some(inner.id()));
                assert_eq!(rt.inner().context.borrow().depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(rt.current_effect().map(|e| e.id()), Some(outer.id()));
        }

        assert!(rt.current_effect().is_none());
    }

    #[test]
    fn pause_tracking_restores_previous_state() {
        let rt = Runtime::new();
        let effect = lazy_effect(&rt);
        let _ctx = ReactiveContext::enter(&rt, effect);

        {
            let _pause = PauseTracking::new(&rt);
            assert!(!rt.is_tracking());
        }
        assert!(rt.is_tracking());
    }
}
