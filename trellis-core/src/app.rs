//! Application shell.
//!
//! An [`App`] owns a root component, a renderer and the app-wide
//! registries (components, directives, plugins). It mounts the root into a
//! container found by selector or passed as a node.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::{MountError, Result, TrellisError};
use crate::reactive::Runtime;
use crate::render::{
    Children, Component, Directive, Host, MemoryDom, NodeId, Props, Renderer, VNode, VNodeType,
};

/// Extension installed into an [`App`] once.
pub trait Plugin {
    fn install(&self, app: &mut App);
}

/// Where an app mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountTarget {
    /// `#id` or a tag name, resolved with [`Host::query_selector`].
    Selector(String),
    Node(NodeId),
}

impl From<&str> for MountTarget {
    fn from(selector: &str) -> Self {
        MountTarget::Selector(selector.to_string())
    }
}

impl From<String> for MountTarget {
    fn from(selector: String) -> Self {
        MountTarget::Selector(selector)
    }
}

impl From<NodeId> for MountTarget {
    fn from(node: NodeId) -> Self {
        MountTarget::Node(node)
    }
}

pub struct App {
    root: Rc<Component>,
    root_props: Option<Props>,
    renderer: Renderer,
    plugins: HashSet<TypeId>,
    container: Option<NodeId>,
}

impl App {
    /// An app rendering into a fresh [`MemoryDom`] on the thread's runtime.
    pub fn new(root: Rc<Component>) -> Self {
        Self::with_host(root, Rc::new(MemoryDom::new()), Runtime::current())
    }

    pub fn with_host(root: Rc<Component>, host: Rc<dyn Host>, runtime: Runtime) -> Self {
        Self {
            root,
            root_props: None,
            renderer: Renderer::with_runtime(host, runtime),
            plugins: HashSet::new(),
            container: None,
        }
    }

    /// Props passed to the root component.
    pub fn with_props(mut self, props: Props) -> Self {
        self.root_props = Some(props);
        self
    }

    /// Install `plugin`. A plugin type is installed at most once.
    pub fn use_plugin<P>(&mut self, plugin: P) -> &mut Self
    where
        P: Plugin + 'static,
    {
        if !self.plugins.insert(TypeId::of::<P>()) {
            warn!(
                plugin = std::any::type_name::<P>(),
                "plugin has already been applied to target app"
            );
            return self;
        }
        plugin.install(self);
        self
    }

    /// Register a component resolvable by name from any render scope.
    pub fn component(&mut self, name: &str, component: Rc<Component>) -> &mut Self {
        self.renderer.register_component(name, component);
        self
    }

    /// Register a directive applied through `v-<name>` props.
    pub fn directive(&mut self, name: &str, directive: Directive) -> &mut Self {
        self.renderer.register_directive(name, directive);
        self
    }

    /// Errors from re-renders that happen outside any call into the app.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&TrellisError) + 'static,
    {
        self.renderer.on_error(handler);
        self
    }

    pub fn config(&self) -> RuntimeConfig {
        self.renderer.runtime().config().clone()
    }

    pub fn set_config(&mut self, config: RuntimeConfig) -> &mut Self {
        self.renderer.runtime().set_config(config);
        self
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn runtime(&self) -> &Runtime {
        self.renderer.runtime()
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn is_mounted(&self) -> bool {
        self.container.is_some()
    }

    /// Mount the root component, replacing whatever `target` contains.
    pub fn mount(&mut self, target: impl Into<MountTarget>) -> Result<()> {
        if self.container.is_some() {
            return Err(MountError::AlreadyMounted.into());
        }

        let host = self.renderer.host();
        let container = match target.into() {
            MountTarget::Node(node) => node,
            MountTarget::Selector(selector) => match host.query_selector(&selector) {
                Some(node) => node,
                None => {
                    warn!(target = %selector, "failed to mount app: mount target not found");
                    return Err(MountError::TargetNotFound { selector }.into());
                }
            },
        };

        host.set_element_text(container, "");
        let root = VNode::new(
            VNodeType::Component(self.root.clone()),
            self.root_props.clone(),
            Children::None,
        );
        self.renderer.render(Some(root), container)?;
        self.container = Some(container);
        debug!(component = self.root.name(), %container, "app mounted");
        Ok(())
    }

    /// Tear down the mounted tree.
    pub fn unmount(&mut self) -> Result<()> {
        let container = self.container.take().ok_or(MountError::NotMounted)?;
        self.renderer.render(None, container)?;
        debug!(component = self.root.name(), "app unmounted");
        Ok(())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("root", &self.root.name())
            .field("plugins", &self.plugins.len())
            .field("container", &self.container)
            .finish()
    }
}
