//! Host abstraction.
//!
//! The reconciler never touches a document directly. Every observable effect
//! of rendering goes through [`Host`], a small set of DOM-shaped operations
//! against opaque [`NodeId`] handles. [`MemoryDom`](super::MemoryDom) is the
//! in-process implementation; a browser binding would forward the same calls
//! to `document.createElement` and friends.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reactive::Callback;

/// Handle to a node owned by a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// DOM operations the renderer needs.
///
/// Methods take `&self`: hosts use interior mutability, since event
/// listeners they invoke may re-enter the renderer.
pub trait Host {
    fn create_element(&self, tag: &str) -> NodeId;

    fn create_text(&self, text: &str) -> NodeId;

    fn create_comment(&self, text: &str) -> NodeId;

    /// Replace the data of a text or comment node.
    fn set_text(&self, node: NodeId, text: &str);

    /// Replace every child of an element with a single text node (or with
    /// nothing, for an empty string).
    fn set_element_text(&self, el: NodeId, text: &str);

    /// Insert `child` into `parent` before `anchor`, or at the end. A node
    /// that already has a parent is moved.
    fn insert(&self, child: NodeId, parent: NodeId, anchor: Option<NodeId>);

    /// Detach a node from its parent.
    fn remove(&self, node: NodeId);

    fn parent_node(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn set_attribute(&self, el: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, el: NodeId, name: &str);

    /// Set one style property. An empty value clears it.
    fn set_style(&self, el: NodeId, name: &str, value: &str);

    fn add_event_listener(&self, el: NodeId, event: &str, listener: Callback);

    fn remove_event_listener(&self, el: NodeId, event: &str);

    /// Resolve a selector to a connected node.
    fn query_selector(&self, selector: &str) -> Option<NodeId>;
}
