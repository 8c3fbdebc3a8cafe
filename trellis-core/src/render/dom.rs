//! In-memory DOM.
//!
//! [`MemoryDom`] implements [`Host`] over an arena of nodes and records every
//! mutation it receives as a [`DomOp`]. The log is the renderer's wire
//! format: it serializes to JSON or MessagePack and can be replayed by a
//! remote document.
//!
//! Invariants:
//! - Node ids are never reused. A removed node stays in the arena, detached.
//! - A node has at most one parent; inserting an attached node moves it.
//! - Only nodes reachable from the document root are "connected" and
//!   visible to [`Host::query_selector`].

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::reactive::{Callback, Value};

use super::host::{Host, NodeId};

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DomOp {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    CreateComment { node: NodeId, text: String },
    SetText { node: NodeId, text: String },
    SetElementText { node: NodeId, text: String },
    Insert {
        parent: NodeId,
        child: NodeId,
        anchor: Option<NodeId>,
    },
    Remove { node: NodeId },
    SetAttribute { node: NodeId, name: String, value: String },
    RemoveAttribute { node: NodeId, name: String },
    SetStyle { node: NodeId, name: String, value: String },
    AddEventListener { node: NodeId, event: String },
    RemoveEventListener { node: NodeId, event: String },
}

impl DomOp {
    /// Decode a MessagePack-encoded log.
    pub fn decode_msgpack(bytes: &[u8]) -> Result<Vec<DomOp>, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }

    pub fn is_create(&self) -> bool {
        matches!(
            self,
            DomOp::CreateElement { .. } | DomOp::CreateText { .. } | DomOp::CreateComment { .. }
        )
    }
}

enum NodeKind {
    Element {
        tag: Rc<str>,
        attrs: IndexMap<Rc<str>, String>,
        style: IndexMap<Rc<str>, String>,
        listeners: IndexMap<Rc<str>, Callback>,
    },
    Text(String),
    Comment(String),
}

struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    log: Vec<DomOp>,
}

impl Document {
    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.node_mut(id) {
            n.parent = None;
        }
    }

    fn is_connected(&self, mut id: NodeId) -> bool {
        loop {
            if id == self.root {
                return true;
            }
            match self.node(id).and_then(|n| n.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn find(&self, from: NodeId, pred: &dyn Fn(&Node) -> bool) -> Option<NodeId> {
        let node = self.node(from)?;
        if pred(node) {
            return Some(from);
        }
        node.children.iter().find_map(|c| self.find(*c, pred))
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(&escape(text)),
            NodeKind::Comment(text) => {
                let _ = write!(out, "<!--{text}-->");
            }
            NodeKind::Element {
                tag, attrs, style, ..
            } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{}\"", escape(value));
                }
                if !style.is_empty() {
                    let css: Vec<String> =
                        style.iter().map(|(k, v)| format!("{k}: {v};")).collect();
                    let _ = write!(out, " style=\"{}\"", escape(&css.join(" ")));
                }
                out.push('>');
                for child in &node.children {
                    self.write_html(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn write_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Comment(_) => {}
            NodeKind::Element { .. } => {
                for child in &node.children {
                    self.write_text(*child, out);
                }
            }
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// An in-memory document implementing [`Host`].
///
/// Cloning shares the document.
#[derive(Clone)]
pub struct MemoryDom {
    doc: Rc<RefCell<Document>>,
}

impl MemoryDom {
    /// Create a document with an empty `<body>` root.
    pub fn new() -> Self {
        let mut doc = Document {
            nodes: Vec::new(),
            root: NodeId(0),
            log: Vec::new(),
        };
        doc.root = doc.alloc(NodeKind::Element {
            tag: "body".into(),
            attrs: IndexMap::new(),
            style: IndexMap::new(),
            listeners: IndexMap::new(),
        });
        Self {
            doc: Rc::new(RefCell::new(doc)),
        }
    }

    pub fn root(&self) -> NodeId {
        self.doc.borrow().root
    }

    /// Append a `<div id="...">` to the body, for use as a mount target.
    /// Setting it up is not recorded in the mutation log.
    pub fn create_container(&self, id: &str) -> NodeId {
        let mut doc = self.doc.borrow_mut();
        let mut attrs = IndexMap::new();
        attrs.insert(Rc::from("id"), id.to_string());
        let node = doc.alloc(NodeKind::Element {
            tag: "div".into(),
            attrs,
            style: IndexMap::new(),
            listeners: IndexMap::new(),
        });
        let root = doc.root;
        doc.nodes[node.0 as usize].parent = Some(root);
        doc.nodes[root.0 as usize].children.push(node);
        node
    }

    fn record(&self, op: DomOp) {
        self.doc.borrow_mut().log.push(op);
    }

    // ---- mutation log --------------------------------------------------

    pub fn ops(&self) -> Vec<DomOp> {
        self.doc.borrow().log.clone()
    }

    /// Drain the log.
    pub fn take_ops(&self) -> Vec<DomOp> {
        std::mem::take(&mut self.doc.borrow_mut().log)
    }

    pub fn clear_ops(&self) {
        self.doc.borrow_mut().log.clear();
    }

    pub fn ops_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.doc.borrow().log)
    }

    pub fn ops_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(&self.doc.borrow().log)
    }

    // ---- inspection ----------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.doc.borrow().nodes.len()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.doc.borrow().node(node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag.to_string()),
            _ => None,
        }
    }

    /// Data of a text or comment node.
    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.doc.borrow().node(node)?.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text.clone()),
            NodeKind::Element { .. } => None,
        }
    }

    pub fn is_comment(&self, node: NodeId) -> bool {
        matches!(
            self.doc.borrow().node(node).map(|n| &n.kind),
            Some(NodeKind::Comment(_))
        )
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.doc.borrow().node(node)?.kind {
            NodeKind::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    pub fn attributes(&self, node: NodeId) -> IndexMap<String, String> {
        match self.doc.borrow().node(node).map(|n| &n.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            _ => IndexMap::new(),
        }
    }

    pub fn style(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.doc.borrow().node(node)?.kind {
            NodeKind::Element { style, .. } => style.get(name).cloned(),
            _ => None,
        }
    }

    pub fn has_listener(&self, node: NodeId, event: &str) -> bool {
        match self.doc.borrow().node(node).map(|n| &n.kind) {
            Some(NodeKind::Element { listeners, .. }) => listeners.contains_key(event),
            _ => false,
        }
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.doc
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.doc.borrow().is_connected(node)
    }

    /// Concatenated text of a subtree, comments excluded.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.doc.borrow().write_text(node, &mut out);
        out
    }

    /// Serialize a node and its subtree.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.doc.borrow().write_html(node, &mut out);
        out
    }

    /// Serialize the children of a node.
    pub fn inner_html(&self, node: NodeId) -> String {
        let doc = self.doc.borrow();
        let mut out = String::new();
        if let Some(n) = doc.node(node) {
            for child in &n.children {
                doc.write_html(*child, &mut out);
            }
        }
        out
    }

    /// Invoke the listener registered for `event` on `node`.
    ///
    /// Returns false if there is none.
    pub fn dispatch(&self, node: NodeId, event: &str, detail: &Value) -> bool {
        let listener = match self.doc.borrow().node(node).map(|n| &n.kind) {
            Some(NodeKind::Element { listeners, .. }) => listeners.get(event).cloned(),
            _ => None,
        };
        // The document borrow is released here; the handler may mutate it.
        match listener {
            Some(listener) => {
                listener.call(detail);
                true
            }
            None => false,
        }
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryDom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let doc = self.doc.borrow();
        f.debug_struct("MemoryDom")
            .field("nodes", &doc.nodes.len())
            .field("ops", &doc.log.len())
            .finish()
    }
}

impl Host for MemoryDom {
    fn create_element(&self, tag: &str) -> NodeId {
        let node = self.doc.borrow_mut().alloc(NodeKind::Element {
            tag: tag.into(),
            attrs: IndexMap::new(),
            style: IndexMap::new(),
            listeners: IndexMap::new(),
        });
        self.record(DomOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text(&self, text: &str) -> NodeId {
        let node = self
            .doc
            .borrow_mut()
            .alloc(NodeKind::Text(text.to_string()));
        self.record(DomOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn create_comment(&self, text: &str) -> NodeId {
        let node = self
            .doc
            .borrow_mut()
            .alloc(NodeKind::Comment(text.to_string()));
        self.record(DomOp::CreateComment {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&self, node: NodeId, text: &str) {
        {
            let mut doc = self.doc.borrow_mut();
            match doc.node_mut(node).map(|n| &mut n.kind) {
                Some(NodeKind::Text(data)) | Some(NodeKind::Comment(data)) => {
                    *data = text.to_string();
                }
                _ => {
                    warn!(%node, "set_text on a node without character data");
                    return;
                }
            }
        }
        self.record(DomOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn set_element_text(&self, el: NodeId, text: &str) {
        {
            let mut doc = self.doc.borrow_mut();
            for child in doc.node(el).map(|n| n.children.clone()).unwrap_or_default() {
                doc.detach(child);
            }
            if !text.is_empty() {
                let child = doc.alloc(NodeKind::Text(text.to_string()));
                doc.nodes[child.0 as usize].parent = Some(el);
                if let Some(n) = doc.node_mut(el) {
                    n.children.push(child);
                }
            }
        }
        self.record(DomOp::SetElementText {
            node: el,
            text: text.to_string(),
        });
    }

    fn insert(&self, child: NodeId, parent: NodeId, anchor: Option<NodeId>) {
        {
            let mut doc = self.doc.borrow_mut();
            doc.detach(child);
            let Some(p) = doc.node_mut(parent) else {
                warn!(%parent, "insert into unknown node");
                return;
            };
            let index = anchor.and_then(|a| p.children.iter().position(|c| *c == a));
            if anchor.is_some() && index.is_none() {
                warn!(%parent, ?anchor, "anchor is not a child of parent, appending");
            }
            match index {
                Some(i) => p.children.insert(i, child),
                None => p.children.push(child),
            }
            if let Some(c) = doc.node_mut(child) {
                c.parent = Some(parent);
            }
        }
        self.record(DomOp::Insert {
            parent,
            child,
            anchor,
        });
    }

    fn remove(&self, node: NodeId) {
        self.doc.borrow_mut().detach(node);
        self.record(DomOp::Remove { node });
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.doc.borrow().node(node)?.parent
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let doc = self.doc.borrow();
        let parent = doc.node(node)?.parent?;
        let siblings = &doc.node(parent)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    fn set_attribute(&self, el: NodeId, name: &str, value: &str) {
        if let Some(NodeKind::Element { attrs, .. }) =
            self.doc.borrow_mut().node_mut(el).map(|n| &mut n.kind)
        {
            attrs.insert(name.into(), value.to_string());
        }
        self.record(DomOp::SetAttribute {
            node: el,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attribute(&self, el: NodeId, name: &str) {
        if let Some(NodeKind::Element { attrs, .. }) =
            self.doc.borrow_mut().node_mut(el).map(|n| &mut n.kind)
        {
            attrs.shift_remove(name);
        }
        self.record(DomOp::RemoveAttribute {
            node: el,
            name: name.to_string(),
        });
    }

    fn set_style(&self, el: NodeId, name: &str, value: &str) {
        if let Some(NodeKind::Element { style, .. }) =
            self.doc.borrow_mut().node_mut(el).map(|n| &mut n.kind)
        {
            if value.is_empty() {
                style.shift_remove(name);
            } else {
                style.insert(name.into(), value.to_string());
            }
        }
        self.record(DomOp::SetStyle {
            node: el,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn add_event_listener(&self, el: NodeId, event: &str, listener: Callback) {
        if let Some(NodeKind::Element { listeners, .. }) =
            self.doc.borrow_mut().node_mut(el).map(|n| &mut n.kind)
        {
            listeners.insert(event.into(), listener);
        }
        self.record(DomOp::AddEventListener {
            node: el,
            event: event.to_string(),
        });
    }

    fn remove_event_listener(&self, el: NodeId, event: &str) {
        if let Some(NodeKind::Element { listeners, .. }) =
            self.doc.borrow_mut().node_mut(el).map(|n| &mut n.kind)
        {
            listeners.shift_remove(event);
        }
        self.record(DomOp::RemoveEventListener {
            node: el,
            event: event.to_string(),
        });
    }

    fn query_selector(&self, selector: &str) -> Option<NodeId> {
        let doc = self.doc.borrow();
        let root = doc.root;
        match selector.strip_prefix('#') {
            Some(id) => doc.find(root, &|n| match &n.kind {
                NodeKind::Element { attrs, .. } => attrs.get("id").map(String::as_str) == Some(id),
                _ => false,
            }),
            None => doc.find(root, &|n| match &n.kind {
                NodeKind::Element { tag, .. } => &**tag == selector,
                _ => false,
            }),
        }
    }
}
