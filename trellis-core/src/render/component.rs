//! Components.
//!
//! A [`Component`] is a definition: an optional `setup` function, an
//! optional render function, and optionally a template string. Mounting a
//! component vnode creates a [`ComponentInstance`] that owns
//!
//! - the props bag, a shallow reactive map the parent's patches update in
//!   place,
//! - the slots passed as children,
//! - the state returned by `setup`, if any,
//! - the last rendered subtree,
//! - the render effect that re-renders whenever anything the render
//!   function read changes.
//!
//! Template strings are never compiled. A component that only has a
//! template renders a fixed diagnostic tree and logs a warning.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::error::{Result, TrellisError};
use crate::reactive::{Effect, Observed, PropKey, RawObject, Runtime, Tracked, Value};

use super::host::{Host, NodeId};
use super::props::handler_key;
use super::vnode::{h, props, Children, VNode};

pub type SetupFn = Rc<dyn Fn(&SetupContext) -> Result<SetupResult>>;
pub type RenderFn = Rc<dyn Fn(&RenderScope) -> Result<VNode>>;
pub type ErrorHandler = Rc<dyn Fn(&TrellisError)>;
pub type DirectiveHook = Rc<dyn Fn(&dyn Host, NodeId, &Value)>;

/// What `setup` hands back.
#[derive(Clone)]
pub enum SetupResult {
    /// Use this render function instead of the definition's.
    Render(RenderFn),
    /// State merged into the render scope, looked up before props.
    State(Observed),
    None,
}

impl SetupResult {
    pub fn render<F>(f: F) -> Self
    where
        F: Fn(&RenderScope) -> Result<VNode> + 'static,
    {
        SetupResult::Render(Rc::new(f))
    }
}

impl From<Observed> for SetupResult {
    fn from(state: Observed) -> Self {
        SetupResult::State(state)
    }
}

/// A component definition.
///
/// ```rust
/// use trellis_core::render::{h, Component, SetupResult};
///
/// let counter = Component::new("Counter")
///     .setup(|ctx| {
///         let state = ctx.runtime().reactive_map([("count", 0)]);
///         Ok(SetupResult::State(state))
///     })
///     .render(|scope| Ok(h("span", scope.get("count").to_string())))
///     .build();
/// assert_eq!(counter.name(), "Counter");
/// ```
pub struct Component {
    name: Rc<str>,
    setup: Option<SetupFn>,
    render: Option<RenderFn>,
    template: Option<Rc<str>>,
}

impl Component {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            setup: None,
            render: None,
            template: None,
        }
    }

    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn(&SetupContext) -> Result<SetupResult> + 'static,
    {
        self.setup = Some(Rc::new(f));
        self
    }

    pub fn render<F>(mut self, f: F) -> Self
    where
        F: Fn(&RenderScope) -> Result<VNode> + 'static,
    {
        self.render = Some(Rc::new(f));
        self
    }

    pub fn template(mut self, template: impl Into<Rc<str>>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Freeze the definition. Vnodes compare component types by this `Rc`.
    pub fn build(self) -> Rc<Component> {
        Rc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("setup", &self.setup.is_some())
            .field("render", &self.render.is_some())
            .field("template", &self.template)
            .finish()
    }
}

/// A named slot: produces fresh vnodes on every call.
#[derive(Clone)]
pub struct Slot(Rc<dyn Fn() -> Vec<VNode>>);

impl Slot {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Vec<VNode> + 'static,
    {
        Self(Rc::new(f))
    }

    pub(crate) fn from_nodes(nodes: Vec<VNode>) -> Self {
        Self::new(move || nodes.iter().map(VNode::clone_fresh).collect())
    }

    pub fn call(&self) -> Vec<VNode> {
        (self.0)()
    }
}

pub type Slots = IndexMap<Rc<str>, Slot>;

/// Hooks of a custom directive, applied through `v-<name>` props.
#[derive(Clone, Default)]
pub struct Directive {
    pub(crate) mounted: Option<DirectiveHook>,
    pub(crate) updated: Option<DirectiveHook>,
    pub(crate) unmounted: Option<DirectiveHook>,
}

impl Directive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_mounted<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Host, NodeId, &Value) + 'static,
    {
        self.mounted = Some(Rc::new(f));
        self
    }

    pub fn on_updated<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Host, NodeId, &Value) + 'static,
    {
        self.updated = Some(Rc::new(f));
        self
    }

    pub fn on_unmounted<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Host, NodeId, &Value) + 'static,
    {
        self.unmounted = Some(Rc::new(f));
        self
    }
}

/// Registries and hooks shared by every instance of one app.
#[derive(Default)]
pub(crate) struct AppContext {
    pub(crate) components: RefCell<IndexMap<Rc<str>, Rc<Component>>>,
    pub(crate) directives: RefCell<IndexMap<Rc<str>, Directive>>,
    pub(crate) error_handler: RefCell<Option<ErrorHandler>>,
}

impl AppContext {
    pub(crate) fn directive(&self, name: &str) -> Option<Directive> {
        self.directives.borrow().get(name).cloned()
    }

    pub(crate) fn report(&self, err: &TrellisError) {
        let handler = self.error_handler.borrow().clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}

struct Shared {
    name: Rc<str>,
    props: Observed,
    slots: RefCell<Slots>,
    runtime: Runtime,
    app: Rc<AppContext>,
}

impl Shared {
    fn slot(&self, name: &str) -> Vec<VNode> {
        let slot = self.slots.borrow().get(name).cloned();
        slot.map(|s| s.call()).unwrap_or_default()
    }

    fn emit(&self, event: &str, payload: &Value) {
        let key = handler_key(event);
        match self.props.raw().get(&PropKey::from(key.as_str())) {
            Some(Value::Callback(handler)) => handler.call(payload),
            _ => trace!(component = %self.name, event, "no listener for emitted event"),
        }
    }
}

/// Passed to `setup`.
#[derive(Clone)]
pub struct SetupContext {
    shared: Rc<Shared>,
}

impl SetupContext {
    /// The props bag. Reads are tracked.
    pub fn props(&self) -> &Observed {
        &self.shared.props
    }

    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.shared.slot(name)
    }

    /// Call the parent's `on<Event>` handler, if it passed one.
    pub fn emit(&self, event: &str, payload: impl Into<Value>) {
        self.shared.emit(event, &payload.into());
    }

    pub fn runtime(&self) -> &Runtime {
        &self.shared.runtime
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// Passed to render functions.
#[derive(Clone)]
pub struct RenderScope {
    shared: Rc<Shared>,
    state: Option<Observed>,
}

impl RenderScope {
    /// Look a name up in the setup state, then in props. Tracked.
    pub fn get(&self, key: &str) -> Tracked {
        if let Some(state) = &self.state {
            if state.has(key) {
                return state.get(key);
            }
        }
        self.shared.props.get(key)
    }

    pub fn props(&self) -> &Observed {
        &self.shared.props
    }

    pub fn state(&self) -> Option<&Observed> {
        self.state.as_ref()
    }

    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.shared.slot(name)
    }

    pub fn emit(&self, event: &str, payload: impl Into<Value>) {
        self.shared.emit(event, &payload.into());
    }

    pub fn runtime(&self) -> &Runtime {
        &self.shared.runtime
    }

    /// A component registered on the app under `name`.
    pub fn resolve_component(&self, name: &str) -> Option<Rc<Component>> {
        let found = self.shared.app.components.borrow().get(name).cloned();
        if found.is_none() {
            warn!(component = %self.shared.name, name, "failed to resolve component");
        }
        found
    }
}

enum RenderSource {
    Function(RenderFn),
    Template(Rc<str>),
    Missing,
}

pub(crate) struct InstanceInner {
    def: Rc<Component>,
    shared: Rc<Shared>,
    render: RenderSource,
    state: Option<Observed>,
    subtree: RefCell<Option<VNode>>,
    effect: RefCell<Option<Effect>>,
    mounted: Cell<bool>,
    mount_point: Cell<(NodeId, Option<NodeId>)>,
    pending_error: RefCell<Option<TrellisError>>,
}

/// A mounted component.
#[derive(Clone)]
pub(crate) struct ComponentInstance(Rc<InstanceInner>);

pub(crate) fn normalize_slots(children: &Children) -> Slots {
    match children {
        Children::Slots(slots) => slots.clone(),
        _ => Slots::new(),
    }
}

fn props_object(vnode: &VNode) -> RawObject {
    let raw = RawObject::map();
    if let Some(props) = vnode.props() {
        for (k, v) in props {
            raw.insert(k.clone(), v.clone());
        }
    }
    raw
}

impl ComponentInstance {
    /// Create the instance and run `setup`, untracked.
    pub(crate) fn create(
        def: Rc<Component>,
        vnode: &VNode,
        runtime: &Runtime,
        app: Rc<AppContext>,
    ) -> Result<Self> {
        let props = runtime.shallow_reactive(&props_object(vnode));
        let shared = Rc::new(Shared {
            name: def.name.clone(),
            props,
            slots: RefCell::new(normalize_slots(&vnode.children())),
            runtime: runtime.clone(),
            app,
        });

        let result = match &def.setup {
            Some(setup) => {
                let ctx = SetupContext {
                    shared: shared.clone(),
                };
                runtime
                    .untracked(|| setup(&ctx))
                    .map_err(|e| e.in_component(&def.name))?
            }
            None => SetupResult::None,
        };

        let (render, state) = match result {
            SetupResult::Render(f) => (RenderSource::Function(f), None),
            SetupResult::State(state) => (Self::definition_render(&def), Some(state)),
            SetupResult::None => (Self::definition_render(&def), None),
        };

        Ok(Self(Rc::new(InstanceInner {
            def,
            shared,
            render,
            state,
            subtree: RefCell::new(None),
            effect: RefCell::new(None),
            mounted: Cell::new(false),
            mount_point: Cell::new((NodeId(0), None)),
            pending_error: RefCell::new(None),
        })))
    }

    fn definition_render(def: &Component) -> RenderSource {
        match (&def.render, &def.template) {
            (Some(render), _) => RenderSource::Function(render.clone()),
            (None, Some(template)) => RenderSource::Template(template.clone()),
            (None, None) => RenderSource::Missing,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.0.def.name
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<InstanceInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn from_inner(inner: Rc<InstanceInner>) -> Self {
        Self(inner)
    }

    /// Run the render function (or its fallback) and return the new tree.
    pub(crate) fn render_tree(&self) -> Result<VNode> {
        match &self.0.render {
            RenderSource::Function(render) => {
                let scope = RenderScope {
                    shared: self.0.shared.clone(),
                    state: self.0.state.clone(),
                };
                render(&scope).map_err(|e| e.in_component(self.name()))
            }
            RenderSource::Template(template) => {
                warn!(
                    component = self.name(),
                    template_len = template.len(),
                    "template compilation is not supported; rendering a placeholder"
                );
                Ok(h(
                    "div",
                    (
                        props([("class", "trellis-template-placeholder")]),
                        format!("[{}] template compilation is not supported", self.name()),
                    ),
                ))
            }
            RenderSource::Missing => {
                warn!(component = self.name(), "component is missing a render function");
                Ok(VNode::comment(""))
            }
        }
    }

    /// Bring the props bag and slots in line with a new parent vnode.
    ///
    /// Changed props trigger the instance's own render effect.
    pub(crate) fn update_from(&self, vnode: &VNode) {
        let bag = &self.0.shared.props;
        let next = vnode.props();

        for key in bag.raw().keys() {
            let PropKey::Named(name) = &key else { continue };
            if next.map_or(true, |p| !p.contains_key(name)) {
                bag.delete(key.clone());
            }
        }
        if let Some(next) = next {
            for (k, v) in next {
                bag.set(k, v.clone());
            }
        }

        *self.0.shared.slots.borrow_mut() = normalize_slots(&vnode.children());
    }

    pub(crate) fn app(&self) -> &Rc<AppContext> {
        &self.0.shared.app
    }

    pub(crate) fn subtree(&self) -> Option<VNode> {
        self.0.subtree.borrow().clone()
    }

    pub(crate) fn replace_subtree(&self, tree: Option<VNode>) -> Option<VNode> {
        std::mem::replace(&mut *self.0.subtree.borrow_mut(), tree)
    }

    pub(crate) fn effect(&self) -> Option<Effect> {
        self.0.effect.borrow().clone()
    }

    pub(crate) fn set_effect(&self, effect: Effect) {
        *self.0.effect.borrow_mut() = Some(effect);
    }

    pub(crate) fn is_mounted(&self) -> bool {
        self.0.mounted.get()
    }

    pub(crate) fn set_mounted(&self, mounted: bool) {
        self.0.mounted.set(mounted);
    }

    pub(crate) fn mount_point(&self) -> (NodeId, Option<NodeId>) {
        self.0.mount_point.get()
    }

    pub(crate) fn set_mount_point(&self, container: NodeId, anchor: Option<NodeId>) {
        self.0.mount_point.set((container, anchor));
    }

    pub(crate) fn stash_error(&self, err: TrellisError) {
        *self.0.pending_error.borrow_mut() = Some(err);
    }

    pub(crate) fn take_error(&self) -> Option<TrellisError> {
        self.0.pending_error.borrow_mut().take()
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("name", &self.name())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instance(def: Rc<Component>, vnode: &VNode) -> ComponentInstance {
        ComponentInstance::create(def, vnode, &Runtime::new(), Rc::new(AppContext::default()))
            .unwrap()
    }

    #[test]
    fn render_scope_prefers_state_over_props() {
        let def = Component::new("Greeter")
            .setup(|ctx| {
                let state = ctx.runtime().reactive_map([("greeting", "hello")]);
                Ok(state.into())
            })
            .render(|scope| {
                Ok(h(
                    "p",
                    format!("{} {}", scope.get("greeting"), scope.get("name")),
                ))
            })
            .build();

        let vnode = h(&def, props([("name", "ada"), ("greeting", "ignored")]));
        let inst = instance(def, &vnode);
        let tree = inst.render_tree().unwrap();
        assert_eq!(tree.children().as_text(), Some("hello ada"));
    }

    #[test]
    fn setup_render_function_wins() {
        let def = Component::new("Both")
            .setup(|_| Ok(SetupResult::render(|_| Ok(h("b", ())))))
            .render(|_| Ok(h("i", ())))
            .build();
        let vnode = h(&def, ());
        let tree = instance(def, &vnode).render_tree().unwrap();
        assert!(matches!(tree.ty(), crate::render::VNodeType::Element(tag) if &**tag == "b"));
    }

    #[test]
    fn template_only_component_renders_placeholder() {
        let def = Component::new("Legacy").template("<div>{{ msg }}</div>").build();
        let vnode = h(&def, ());
        let tree = instance(def, &vnode).render_tree().unwrap();
        assert_eq!(
            tree.prop("class"),
            Some(&Value::from("trellis-template-placeholder"))
        );
    }

    #[test]
    fn setup_errors_carry_the_component_name() {
        let def = Component::new("Broken")
            .setup(|_| Err(TrellisError::render("no state")))
            .build();
        let vnode = h(&def, ());
        let err = ComponentInstance::create(
            def,
            &vnode,
            &Runtime::new(),
            Rc::new(AppContext::default()),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "render failed in Broken: no state");
    }

    #[test]
    fn emit_calls_the_parent_handler() {
        let got = Rc::new(Cell::new(0.0));
        let got_clone = got.clone();
        let def = Component::new("Child")
            .setup(|ctx| {
                ctx.emit("item-picked", 42);
                Ok(SetupResult::None)
            })
            .build();
        let vnode = h(
            &def,
            props([(
                "onItemPicked",
                Value::callback(move |v| got_clone.set(v.as_f64().unwrap_or(0.0))),
            )]),
        );
        instance(def, &vnode);
        assert_eq!(got.get(), 42.0);
    }

    #[test]
    fn list_children_become_the_default_slot() {
        let def = Component::new("Card")
            .render(|scope| Ok(h("section", scope.slot("default"))))
            .build();
        let vnode = h(&def, vec![h("p", "body")]);
        let tree = instance(def, &vnode).render_tree().unwrap();
        assert_eq!(tree.children().as_list().len(), 1);
    }

    #[test]
    fn update_from_syncs_the_props_bag() {
        let def = Component::new("Leaf").build();
        let first = h(&def, props([("a", 1), ("b", 2)]));
        let inst = instance(def.clone(), &first);

        let second = h(&def, props([("b", 3), ("c", 4)]));
        inst.update_from(&second);

        let bag = &inst.0.shared.props;
        assert!(!bag.has("a"));
        assert_eq!(bag.get("b").as_f64(), Some(3.0));
        assert_eq!(bag.get("c").as_f64(), Some(4.0));
    }
}
