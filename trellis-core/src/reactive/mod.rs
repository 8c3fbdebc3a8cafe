//! Reactive Primitives
//!
//! This module implements the reactivity engine: observed objects, refs,
//! computed cells, effects and watchers, all coordinated by a [`Runtime`].
//!
//! # Concepts
//!
//! ## Observed objects
//!
//! An [`Observed`] wraps a structured [`Value`] (a map or a list). Reading a
//! key through it records a dependency for the running effect; writing a key
//! re-runs the effects that read it. Wrapping the same raw object twice
//! yields the same wrapper.
//!
//! ## Refs and computed cells
//!
//! A [`Ref`] is a reactive box around one value. A [`Computed`] is a cached
//! derived value that recomputes lazily, on the first read after one of its
//! dependencies changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change. Component render drivers and watchers are effects.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically: the runtime keeps an explicit
//! stack of running effects, and every tracked read subscribes the innermost
//! one. Writes deliver synchronously by default; [`Scheduler::Queued`] opts
//! an effect into the batched job queue.

mod cell;
mod computed;
mod context;
mod dep;
mod effect;
mod proxy;
mod runtime;
mod scheduler;
mod value;
mod watch;

pub use cell::{is_ref, unref, MaybeRef, Ref};
pub use computed::Computed;
pub use dep::{PropKey, TriggerKind};
pub use effect::{Effect, EffectId, EffectOptions, Scheduler};
pub use proxy::{is_reactive, is_readonly, to_raw, Flavor, Observed, Tracked, MAX_LIST_LEN};
pub use runtime::Runtime;
pub use scheduler::Job;
pub use value::{same_value, Callback, ObjectId, RawData, RawObject, Value};
pub use watch::{WatchHandle, WatchOptions, WatchSource};

pub(crate) use value::format_number;
