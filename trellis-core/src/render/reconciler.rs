//! Reconciler
//!
//! The [`Renderer`] turns vnode trees into host nodes and keeps them in
//! sync. [`Renderer::patch`] is the central algorithm:
//!
//! 1. Identical handles: nothing to do.
//! 2. Different type or key: unmount the old node and mount the new one in
//!    its place. DOM is never reused across incompatible nodes.
//! 3. No old node: mount fresh.
//! 4. Otherwise patch in place. Elements diff their props and then their
//!    children; components update their props bag and let their own render
//!    effect decide whether to re-render.
//!
//! # Child lists
//!
//! Lists are diffed by trimming matching nodes (same type and key) from
//! both ends. What remains in the middle is handled as a batch: pure
//! additions are mounted before the node after the trimmed tail, pure
//! removals are unmounted, and anything else unmounts the whole old middle
//! and mounts the whole new middle. No moves are detected in that last
//! case, so nodes in the middle are never reused.
//!
//! # Component render driver
//!
//! Every component instance owns an effect that calls its render function
//! and patches the previous subtree against the result. The effect's
//! scheduler follows [`RuntimeConfig::flush`](crate::config::RuntimeConfig).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use crate::config::FlushMode;
use crate::error::{ReconciliationError, Result, TrellisError};
use crate::reactive::{same_value, EffectOptions, Runtime, Scheduler};

use super::component::{AppContext, Component, ComponentInstance, Directive};
use super::host::{Host, NodeId};
use super::props::{is_reserved, patch_prop};
use super::vnode::{Functional, Props, ShapeFlags, VNode, VNodeType};

struct RendererInner {
    host: Rc<dyn Host>,
    runtime: Runtime,
    roots: RefCell<HashMap<NodeId, VNode>>,
    app: Rc<AppContext>,
}

/// Mounts and patches vnode trees against a [`Host`].
///
/// Cloning shares the renderer.
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererInner>,
}

#[derive(Clone, Copy)]
enum DirectivePhase {
    Mounted,
    Updated,
    Unmounted,
}

impl Renderer {
    /// A renderer on the thread's default runtime.
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_runtime(host, Runtime::current())
    }

    pub fn with_runtime(host: Rc<dyn Host>, runtime: Runtime) -> Self {
        Self {
            inner: Rc::new(RendererInner {
                host,
                runtime,
                roots: RefCell::new(HashMap::new()),
                app: Rc::new(AppContext::default()),
            }),
        }
    }

    pub fn host(&self) -> &dyn Host {
        &*self.inner.host
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// Called with errors raised by re-renders that no caller is waiting on.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&TrellisError) + 'static,
    {
        *self.inner.app.error_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn register_component(&self, name: impl Into<Rc<str>>, component: Rc<Component>) {
        self.inner
            .app
            .components
            .borrow_mut()
            .insert(name.into(), component);
    }

    pub fn register_directive(&self, name: impl Into<Rc<str>>, directive: Directive) {
        self.inner
            .app
            .directives
            .borrow_mut()
            .insert(name.into(), directive);
    }

    /// The tree last rendered into `container`.
    pub fn root(&self, container: NodeId) -> Option<VNode> {
        self.inner.roots.borrow().get(&container).cloned()
    }

    /// Render `vnode` into `container`, patching against the previous tree.
    /// `None` unmounts whatever is there.
    pub fn render(&self, vnode: Option<VNode>, container: NodeId) -> Result<()> {
        let prev = self.root(container);
        match vnode {
            Some(vnode) => {
                self.patch(prev.as_ref(), &vnode, container, None)?;
                self.inner.roots.borrow_mut().insert(container, vnode);
            }
            None => {
                if let Some(prev) = prev {
                    self.unmount(&prev, true);
                }
                self.inner.roots.borrow_mut().remove(&container);
            }
        }
        Ok(())
    }

    /// Converge the host from `n1` to `n2` inside `container`.
    pub fn patch(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        let Some(n1) = n1 else {
            return self.mount(n2, container, anchor);
        };
        if n1.ptr_eq(n2) {
            return Ok(());
        }

        if !n1.is_same_node(n2) {
            trace!(old = ?n1.ty(), new = ?n2.ty(), "replace");
            let anchor = self.next_host_node(n1);
            self.unmount(n1, true);
            return self.mount(n2, container, anchor);
        }

        match n2.ty() {
            VNodeType::Text => {
                let el = n1
                    .el()
                    .ok_or(ReconciliationError::MissingElement { kind: "text" })?;
                n2.set_el(Some(el));
                let next = n2.children();
                let text = next.as_text().unwrap_or("");
                if n1.children().as_text() != Some(text) {
                    self.host().set_text(el, text);
                }
            }
            VNodeType::Comment | VNodeType::Unknown => {
                n2.set_el(n1.el());
            }
            VNodeType::Element(_) => self.patch_element(n1, n2)?,
            VNodeType::Fragment => self.patch_fragment(n1, n2, container)?,
            VNodeType::Component(_) => self.update_component_vnode(n1, n2)?,
            VNodeType::Functional(f) => self.patch_functional(f, n1, n2, container, anchor)?,
        }
        Ok(())
    }

    fn mount(&self, vnode: &VNode, container: NodeId, anchor: Option<NodeId>) -> Result<()> {
        if vnode.is_mounted() {
            warn!(vnode = ?vnode.ty(), "vnode is already mounted; reuse a fresh copy instead");
        }

        let host = self.host();
        match vnode.ty() {
            VNodeType::Text => {
                let el = host.create_text(vnode.children().as_text().unwrap_or(""));
                vnode.set_el(Some(el));
                host.insert(el, container, anchor);
            }
            VNodeType::Comment => {
                let el = host.create_comment(vnode.children().as_text().unwrap_or(""));
                vnode.set_el(Some(el));
                host.insert(el, container, anchor);
            }
            VNodeType::Unknown => {
                warn!("cannot render a vnode of unknown type");
                let el = host.create_comment("");
                vnode.set_el(Some(el));
                host.insert(el, container, anchor);
            }
            VNodeType::Element(tag) => self.mount_element(vnode, tag, container, anchor)?,
            VNodeType::Fragment => {
                let start = host.create_text("");
                let end = host.create_text("");
                host.insert(start, container, anchor);
                host.insert(end, container, anchor);
                vnode.set_el(Some(start));
                vnode.set_anchor(Some(end));
                self.mount_children(&vnode.claim_children(), container, Some(end))?;
            }
            VNodeType::Component(def) => self.mount_component(vnode, def, container, anchor)?,
            VNodeType::Functional(f) => {
                let tree = self.render_functional(f, vnode);
                self.patch(None, &tree, container, anchor)?;
                vnode.set_subtree(Some(tree));
            }
        }
        Ok(())
    }

    fn mount_element(
        &self,
        vnode: &VNode,
        tag: &str,
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        let host = self.host();
        let el = host.create_element(tag);
        vnode.set_el(Some(el));

        if let Some(text) = vnode.children().as_text() {
            host.set_element_text(el, text);
        }
        self.mount_children(&vnode.claim_children(), el, None)?;

        if let Some(props) = vnode.props() {
            for (key, value) in props {
                patch_prop(host, el, key, None, Some(value), vnode.invokers());
            }
        }

        host.insert(el, container, anchor);
        self.run_directives(vnode, el, DirectivePhase::Mounted);
        Ok(())
    }

    fn mount_children(
        &self,
        children: &[VNode],
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        for child in children {
            self.mount(child, container, anchor)?;
        }
        Ok(())
    }

    fn patch_element(&self, n1: &VNode, n2: &VNode) -> Result<()> {
        let el = n1
            .el()
            .ok_or(ReconciliationError::MissingElement { kind: "element" })?;
        n2.set_el(Some(el));
        n2.take_invokers(n1);

        self.patch_props(el, n1.props(), n2.props(), n2);
        self.patch_children(n1, n2, el, None)?;
        self.run_directives(n2, el, DirectivePhase::Updated);
        Ok(())
    }

    fn patch_props(&self, el: NodeId, old: Option<&Props>, new: Option<&Props>, vnode: &VNode) {
        let empty = Props::new();
        let old = old.unwrap_or(&empty);
        let new = new.unwrap_or(&empty);
        let host = self.host();

        for (key, next) in new {
            if is_reserved(key) {
                continue;
            }
            let prev = old.get(key);
            if prev.map_or(true, |prev| !same_value(prev, next)) {
                patch_prop(host, el, key, prev, Some(next), vnode.invokers());
            }
        }
        for (key, prev) in old {
            if !is_reserved(key) && !new.contains_key(key) {
                patch_prop(host, el, key, Some(prev), None, vnode.invokers());
            }
        }
    }

    fn patch_children(
        &self,
        n1: &VNode,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        let host = self.host();
        let old = n1.children().as_list().to_vec();
        let old_text = n1.children().as_text().map(Rc::<str>::from);

        if n2.shape().contains(ShapeFlags::ARRAY_CHILDREN) {
            let new = n2.claim_children();
            if n1.shape().contains(ShapeFlags::ARRAY_CHILDREN) {
                return self.patch_list(&old, &new, container, anchor);
            }
            if old_text.is_some() {
                host.set_element_text(container, "");
            }
            return self.mount_children(&new, container, anchor);
        }

        self.unmount_children(&old);
        match n2.children().as_text() {
            Some(text) if old_text.as_deref() != Some(text) => {
                host.set_element_text(container, text)
            }
            Some(_) => {}
            None if old_text.is_some() => host.set_element_text(container, ""),
            None => {}
        }
        Ok(())
    }

    /// Two-end trim diff of keyed (or positional) children.
    fn patch_list(
        &self,
        old: &[VNode],
        new: &[VNode],
        container: NodeId,
        parent_anchor: Option<NodeId>,
    ) -> Result<()> {
        let mut start = 0;
        let mut old_end = old.len();
        let mut new_end = new.len();

        while start < old_end && start < new_end && old[start].is_same_node(&new[start]) {
            self.patch(Some(&old[start]), &new[start], container, None)?;
            start += 1;
        }

        while start < old_end
            && start < new_end
            && old[old_end - 1].is_same_node(&new[new_end - 1])
        {
            self.patch(Some(&old[old_end - 1]), &new[new_end - 1], container, None)?;
            old_end -= 1;
            new_end -= 1;
        }

        // Whatever follows the middle on the new side is already in place.
        let anchor = new
            .get(new_end)
            .and_then(|next| self.host_el(next))
            .or(parent_anchor);

        if start == old_end {
            trace!(count = new_end - start, "mount middle");
            self.mount_children(&new[start..new_end], container, anchor)?;
        } else if start == new_end {
            trace!(count = old_end - start, "unmount middle");
            self.unmount_children(&old[start..old_end]);
        } else {
            trace!(
                removed = old_end - start,
                added = new_end - start,
                "replace middle"
            );
            self.unmount_children(&old[start..old_end]);
            self.mount_children(&new[start..new_end], container, anchor)?;
        }
        Ok(())
    }

    fn patch_fragment(&self, n1: &VNode, n2: &VNode, container: NodeId) -> Result<()> {
        let missing = ReconciliationError::MissingElement { kind: "fragment" };
        let start = n1.el().ok_or(missing.clone())?;
        let end = n1.anchor().ok_or(missing)?;
        n2.set_el(Some(start));
        n2.set_anchor(Some(end));
        self.patch_children(n1, n2, container, Some(end))
    }

    fn render_functional(&self, f: &Functional, vnode: &VNode) -> VNode {
        let empty = Props::new();
        f.call(vnode.props().unwrap_or(&empty), &vnode.children())
    }

    fn patch_functional(
        &self,
        f: &Functional,
        n1: &VNode,
        n2: &VNode,
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        let prev = n1
            .subtree()
            .ok_or(ReconciliationError::MissingElement { kind: "functional" })?;
        let next = self.render_functional(f, n2);
        self.patch(Some(&prev), &next, container, anchor)?;
        n2.set_subtree(Some(next));
        n1.set_subtree(None);
        Ok(())
    }

    fn mount_component(
        &self,
        vnode: &VNode,
        def: &Rc<Component>,
        container: NodeId,
        anchor: Option<NodeId>,
    ) -> Result<()> {
        let instance =
            ComponentInstance::create(def.clone(), vnode, self.runtime(), self.inner.app.clone())?;
        instance.set_mount_point(container, anchor);
        vnode.set_component(Some(instance.clone()));
        debug!(component = instance.name(), "mount component");
        self.setup_render_effect(&instance)
    }

    fn setup_render_effect(&self, instance: &ComponentInstance) -> Result<()> {
        let renderer: Weak<RendererInner> = Rc::downgrade(&self.inner);
        let weak_instance = instance.downgrade();

        let run = move || {
            let (Some(renderer), Some(instance)) = (renderer.upgrade(), weak_instance.upgrade())
            else {
                return;
            };
            let renderer = Renderer { inner: renderer };
            let instance = ComponentInstance::from_inner(instance);

            if let Err(err) = renderer.update_component(&instance) {
                if instance.is_mounted() {
                    error!(component = instance.name(), %err, "re-render failed");
                    instance.app().report(&err);
                } else {
                    instance.stash_error(err);
                }
            }
        };

        let scheduler = match self.runtime().config().flush {
            FlushMode::Sync => Scheduler::Sync,
            FlushMode::Batched => Scheduler::Queued,
        };
        let effect = self
            .runtime()
            .effect_with(run, EffectOptions::lazy().with_scheduler(scheduler));
        instance.set_effect(effect.clone());

        // The first render is always synchronous so mount can report errors.
        effect.run();
        match instance.take_error() {
            Some(err) => {
                effect.stop();
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Render a component and patch its previous subtree against the result.
    fn update_component(&self, instance: &ComponentInstance) -> Result<()> {
        let next = instance.render_tree()?;

        match instance.subtree() {
            None => {
                let (container, anchor) = instance.mount_point();
                self.patch(None, &next, container, anchor)?;
                instance.replace_subtree(Some(next));
                instance.set_mounted(true);
            }
            Some(prev) => {
                let el = self
                    .host_el(&prev)
                    .ok_or(ReconciliationError::MissingElement { kind: "component" })?;
                let container = self
                    .host()
                    .parent_node(el)
                    .ok_or(ReconciliationError::MissingParent { node: el.raw() })?;
                let anchor = self.next_host_node(&prev);
                self.patch(Some(&prev), &next, container, anchor)?;
                instance.replace_subtree(Some(next));
                trace!(component = instance.name(), "updated");
            }
        }
        Ok(())
    }

    fn update_component_vnode(&self, n1: &VNode, n2: &VNode) -> Result<()> {
        let instance = n1
            .component()
            .ok_or(ReconciliationError::MissingInstance)?;
        n2.set_component(Some(instance.clone()));
        n1.set_component(None);

        let effect = instance.effect();
        let runs_before = effect.as_ref().map(|e| e.run_count());

        // Changed props re-run the instance's render effect on their own.
        instance.update_from(n2);

        // Slot content cannot be compared, so slotted children always update.
        if n2.shape().contains(ShapeFlags::SLOTS_CHILDREN) {
            if let Some(effect) = effect {
                if Some(effect.run_count()) == runs_before && effect.is_active() {
                    effect.schedule();
                }
            }
        }
        Ok(())
    }

    fn unmount_children(&self, children: &[VNode]) {
        for child in children {
            self.unmount(child, true);
        }
    }

    /// Tear down `vnode`. Component effects below it are stopped; host nodes
    /// are removed only at the top (`do_remove`), since detaching a root
    /// takes its descendants with it.
    pub fn unmount(&self, vnode: &VNode, do_remove: bool) {
        let host = self.host();
        match vnode.ty() {
            VNodeType::Component(_) => {
                if let Some(instance) = vnode.component() {
                    if let Some(effect) = instance.effect() {
                        effect.stop();
                    }
                    if let Some(tree) = instance.replace_subtree(None) {
                        self.unmount(&tree, do_remove);
                    }
                    instance.set_mounted(false);
                    debug!(component = instance.name(), "unmount component");
                }
                vnode.set_component(None);
            }
            VNodeType::Functional(_) => {
                if let Some(tree) = vnode.subtree() {
                    self.unmount(&tree, do_remove);
                }
                vnode.set_subtree(None);
            }
            VNodeType::Fragment => {
                for child in vnode.children().as_list().to_vec() {
                    self.unmount(&child, false);
                }
                if do_remove {
                    self.remove_fragment(vnode);
                }
            }
            VNodeType::Element(_) => {
                for child in vnode.children().as_list().to_vec() {
                    self.unmount(&child, false);
                }
                if let Some(el) = vnode.el() {
                    self.run_directives(vnode, el, DirectivePhase::Unmounted);
                    if do_remove {
                        host.remove(el);
                    }
                }
            }
            VNodeType::Text | VNodeType::Comment | VNodeType::Unknown => {
                if let (true, Some(el)) = (do_remove, vnode.el()) {
                    host.remove(el);
                }
            }
        }
        vnode.set_el(None);
        vnode.set_anchor(None);
    }

    /// Remove every host node from a fragment's start marker to its end
    /// marker, inclusive.
    fn remove_fragment(&self, vnode: &VNode) {
        let host = self.host();
        let end = vnode.anchor();
        let mut cur = vnode.el();
        while let Some(node) = cur {
            let next = host.next_sibling(node);
            host.remove(node);
            if Some(node) == end {
                break;
            }
            cur = next;
        }
    }

    /// The first host node a mounted vnode occupies.
    pub fn host_el(&self, vnode: &VNode) -> Option<NodeId> {
        match vnode.ty() {
            VNodeType::Component(_) => vnode
                .component()?
                .subtree()
                .and_then(|tree| self.host_el(&tree)),
            VNodeType::Functional(_) => vnode.subtree().and_then(|tree| self.host_el(&tree)),
            _ => vnode.el(),
        }
    }

    /// The host node right after everything a mounted vnode occupies.
    fn next_host_node(&self, vnode: &VNode) -> Option<NodeId> {
        match vnode.ty() {
            VNodeType::Component(_) => vnode
                .component()?
                .subtree()
                .and_then(|tree| self.next_host_node(&tree)),
            VNodeType::Functional(_) => vnode
                .subtree()
                .and_then(|tree| self.next_host_node(&tree)),
            VNodeType::Fragment => vnode.anchor().and_then(|end| self.host().next_sibling(end)),
            _ => vnode.el().and_then(|el| self.host().next_sibling(el)),
        }
    }

    fn run_directives(&self, vnode: &VNode, el: NodeId, phase: DirectivePhase) {
        let Some(props) = vnode.props() else { return };
        for (key, value) in props {
            let Some(name) = key.strip_prefix("v-") else {
                continue;
            };
            let Some(directive) = self.inner.app.directive(name) else {
                if matches!(phase, DirectivePhase::Mounted) {
                    warn!(directive = name, "failed to resolve directive");
                }
                continue;
            };
            let hook = match phase {
                DirectivePhase::Mounted => directive.mounted,
                DirectivePhase::Updated => directive.updated,
                DirectivePhase::Unmounted => directive.unmounted,
            };
            if let Some(hook) = hook {
                hook(self.host(), el, value);
            }
        }
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("roots", &self.inner.roots.borrow().len())
            .finish()
    }
}
