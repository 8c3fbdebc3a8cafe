//! Free-function API.
//!
//! Each function forwards to the thread's default [`Runtime`]. Code that
//! needs isolated runtimes (tests, several apps on one thread) calls the
//! same operations as methods on its own `Runtime`.

use std::rc::Rc;

use crate::app::App;
use crate::reactive::{
    Computed, Effect, EffectOptions, Observed, RawObject, Ref, Runtime, Tracked, Value,
    WatchHandle, WatchOptions, WatchSource,
};
use crate::render::{Component, Props};

/// Wrap a structured value. Scalars come back unchanged.
pub fn reactive(value: impl Into<Value>) -> Tracked {
    Runtime::current().reactive(value)
}

pub fn shallow_reactive(raw: &RawObject) -> Observed {
    Runtime::current().shallow_reactive(raw)
}

pub fn readonly(raw: &RawObject) -> Observed {
    Runtime::current().readonly(raw)
}

pub fn shallow_readonly(raw: &RawObject) -> Observed {
    Runtime::current().shallow_readonly(raw)
}

pub fn create_ref(value: impl Into<Value>) -> Ref {
    Runtime::current().create_ref(value)
}

pub fn create_shallow_ref(value: impl Into<Value>) -> Ref {
    Runtime::current().create_shallow_ref(value)
}

/// Notify subscribers of a shallow ref whose inner value was mutated.
pub fn trigger_ref(cell: &Ref) {
    cell.trigger();
}

pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().computed(getter)
}

pub fn computed_with_setter<T, F, S>(getter: F, setter: S) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    Runtime::current().computed_with_setter(getter, setter)
}

pub fn watch<F>(source: impl Into<WatchSource>, callback: F, options: WatchOptions) -> WatchHandle
where
    F: Fn(&Value, &Value) + 'static,
{
    Runtime::current().watch(source, callback, options)
}

pub fn watch_effect<F>(f: F) -> WatchHandle
where
    F: Fn() + 'static,
{
    Runtime::current().watch_effect(f)
}

/// Run `f` now and again whenever anything it read changes.
pub fn effect<F>(f: F) -> Effect
where
    F: Fn() + 'static,
{
    Runtime::current().effect(f)
}

pub fn effect_with<F>(f: F, options: EffectOptions) -> Effect
where
    F: Fn() + 'static,
{
    Runtime::current().effect_with(f, options)
}

pub fn stop(effect: &Effect) {
    effect.stop();
}

/// Run queued jobs of the default runtime.
pub fn flush_jobs() -> usize {
    Runtime::current().flush_jobs()
}

pub async fn next_tick() {
    Runtime::current().next_tick().await
}

pub fn define_component(component: Component) -> Rc<Component> {
    component.build()
}

/// An app mounting `root` into an in-memory DOM on the default runtime.
pub fn create_app(root: Rc<Component>, root_props: Option<Props>) -> App {
    let app = App::new(root);
    match root_props {
        Some(props) => app.with_props(props),
        None => app,
    }
}
