//! Virtual nodes.
//!
//! A [`VNode`] describes one renderable unit: an element, a component, a
//! text or comment node, or a fragment. [`h`] builds them.
//!
//! The description is fixed once built, except that the renderer may swap a
//! list child for a fresh copy when the same node is placed twice. A vnode
//! also carries a few mutable slots the renderer fills in while it is mounted: the host
//! node it produced, the end marker of a fragment, the instance of a
//! component, and the event invokers of an element.
//!
//! # Shape flags
//!
//! The kind of node and the kind of its children are folded into
//! [`ShapeFlags`] once, at construction. The reconciler tests the flags
//! rather than re-inspecting the type and children.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use tracing::{trace, warn};

use crate::reactive::{format_number, Value};

use super::component::{Component, ComponentInstance, Slot, Slots};
use super::host::NodeId;
use super::props::Invokers;

bitflags! {
    /// What a vnode is, and what its children are.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u16 {
        const ELEMENT = 1;
        const FUNCTIONAL_COMPONENT = 1 << 1;
        const STATEFUL_COMPONENT = 1 << 2;
        const TEXT = 1 << 3;
        const COMMENT = 1 << 4;
        const FRAGMENT = 1 << 5;
        const TEXT_CHILDREN = 1 << 6;
        const ARRAY_CHILDREN = 1 << 7;
        const SLOTS_CHILDREN = 1 << 8;

        const COMPONENT = Self::FUNCTIONAL_COMPONENT.bits() | Self::STATEFUL_COMPONENT.bits();
    }
}

/// Props of a vnode, in declaration order.
pub type Props = IndexMap<Rc<str>, Value>;

/// Build a [`Props`] map.
pub fn props<K, V, I>(entries: I) -> Props
where
    K: Into<Rc<str>>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Render function of a functional component.
#[derive(Clone)]
pub struct Functional(Rc<dyn Fn(&Props, &Children) -> VNode>);

impl Functional {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Props, &Children) -> VNode + 'static,
    {
        Self(Rc::new(f))
    }

    pub(crate) fn call(&self, props: &Props, children: &Children) -> VNode {
        (self.0)(props, children)
    }

    pub fn ptr_eq(&self, other: &Functional) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const u8,
            Rc::as_ptr(&other.0) as *const u8,
        )
    }
}

/// The kind of a vnode.
#[derive(Clone)]
pub enum VNodeType {
    Element(Rc<str>),
    Component(Rc<Component>),
    Functional(Functional),
    Text,
    Comment,
    Fragment,
    /// A type that could not be classified. It renders as an empty comment.
    Unknown,
}

impl VNodeType {
    /// Same logical type: equal tags, or the same component definition.
    pub fn same(&self, other: &VNodeType) -> bool {
        match (self, other) {
            (VNodeType::Element(a), VNodeType::Element(b)) => a == b,
            (VNodeType::Component(a), VNodeType::Component(b)) => Rc::ptr_eq(a, b),
            (VNodeType::Functional(a), VNodeType::Functional(b)) => a.ptr_eq(b),
            (VNodeType::Text, VNodeType::Text)
            | (VNodeType::Comment, VNodeType::Comment)
            | (VNodeType::Fragment, VNodeType::Fragment)
            | (VNodeType::Unknown, VNodeType::Unknown) => true,
            _ => false,
        }
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            VNodeType::Element(_) => ShapeFlags::ELEMENT,
            VNodeType::Component(_) => ShapeFlags::STATEFUL_COMPONENT,
            VNodeType::Functional(_) => ShapeFlags::FUNCTIONAL_COMPONENT,
            VNodeType::Text => ShapeFlags::TEXT,
            VNodeType::Comment => ShapeFlags::COMMENT,
            VNodeType::Fragment => ShapeFlags::FRAGMENT,
            VNodeType::Unknown => ShapeFlags::empty(),
        }
    }
}

impl fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeType::Element(tag) => write!(f, "<{tag}>"),
            VNodeType::Component(c) => write!(f, "Component({})", c.name()),
            VNodeType::Functional(_) => f.write_str("Functional"),
            VNodeType::Text => f.write_str("Text"),
            VNodeType::Comment => f.write_str("Comment"),
            VNodeType::Fragment => f.write_str("Fragment"),
            VNodeType::Unknown => f.write_str("Unknown"),
        }
    }
}

impl From<&str> for VNodeType {
    fn from(tag: &str) -> Self {
        if tag.is_empty() {
            VNodeType::Unknown
        } else {
            VNodeType::Element(tag.into())
        }
    }
}

impl From<String> for VNodeType {
    fn from(tag: String) -> Self {
        VNodeType::from(tag.as_str())
    }
}

impl From<Rc<Component>> for VNodeType {
    fn from(c: Rc<Component>) -> Self {
        VNodeType::Component(c)
    }
}

impl From<&Rc<Component>> for VNodeType {
    fn from(c: &Rc<Component>) -> Self {
        VNodeType::Component(c.clone())
    }
}

impl From<Functional> for VNodeType {
    fn from(f: Functional) -> Self {
        VNodeType::Functional(f)
    }
}

/// Identity hint for list reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Rc<str>),
    Int(i64),
}

impl Key {
    fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Null => None,
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(Key::Int(*n as i64)),
            Value::Number(n) => Some(Key::Str(format_number(*n).into())),
            Value::Str(s) => Some(Key::Str(s.clone())),
            other => Some(Key::Str(other.to_string().into())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{n}"),
        }
    }
}

/// Normalized children of a vnode.
#[derive(Clone, Default)]
pub enum Children {
    #[default]
    None,
    Text(Rc<str>),
    List(Vec<VNode>),
    Slots(Slots),
}

impl Children {
    pub fn as_list(&self) -> &[VNode] {
        match self {
            Children::List(list) => list,
            _ => &[],
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Children::Text(text) => Some(text),
            _ => None,
        }
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::empty(),
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::List(_) => ShapeFlags::ARRAY_CHILDREN,
            Children::Slots(_) => ShapeFlags::SLOTS_CHILDREN,
        }
    }

    fn fresh(&self) -> Children {
        match self {
            Children::List(list) => Children::List(list.iter().map(VNode::clone_fresh).collect()),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Children::None => f.write_str("None"),
            Children::Text(t) => write!(f, "Text({t:?})"),
            Children::List(list) => f.debug_list().entries(list).finish(),
            Children::Slots(slots) => f.debug_set().entries(slots.keys()).finish(),
        }
    }
}

impl From<()> for Children {
    fn from(_: ()) -> Self {
        Children::None
    }
}

impl From<&str> for Children {
    fn from(text: &str) -> Self {
        Children::Text(text.into())
    }
}

impl From<String> for Children {
    fn from(text: String) -> Self {
        Children::Text(text.into())
    }
}

impl From<Vec<VNode>> for Children {
    fn from(list: Vec<VNode>) -> Self {
        Children::List(list)
    }
}

impl From<VNode> for Children {
    fn from(node: VNode) -> Self {
        Children::List(vec![node])
    }
}

impl From<Slots> for Children {
    fn from(slots: Slots) -> Self {
        Children::Slots(slots)
    }
}

/// Second argument of [`h`]: props, children, or both.
#[derive(Default)]
pub struct HArgs {
    props: Option<Props>,
    children: Children,
}

impl From<()> for HArgs {
    fn from(_: ()) -> Self {
        HArgs::default()
    }
}

impl From<Props> for HArgs {
    fn from(props: Props) -> Self {
        HArgs {
            props: Some(props),
            children: Children::None,
        }
    }
}

impl<C: Into<Children>> From<(Props, C)> for HArgs {
    fn from((props, children): (Props, C)) -> Self {
        HArgs {
            props: Some(props),
            children: children.into(),
        }
    }
}

macro_rules! hargs_from_children {
    ($($t:ty),*) => {
        $(
            impl From<$t> for HArgs {
                fn from(children: $t) -> Self {
                    HArgs {
                        props: None,
                        children: children.into(),
                    }
                }
            }
        )*
    };
}

hargs_from_children!(&str, String, Vec<VNode>, VNode, Slots, Children);

impl From<&str> for VNode {
    fn from(text: &str) -> Self {
        VNode::text(text)
    }
}

impl From<String> for VNode {
    fn from(text: String) -> Self {
        VNode::text(text)
    }
}

impl From<Value> for VNode {
    fn from(value: Value) -> Self {
        VNode::text(value.to_string())
    }
}

struct VNodeData {
    ty: VNodeType,
    props: Option<Props>,
    children: RefCell<Children>,
    key: Option<Key>,
    shape: ShapeFlags,
    el: Cell<Option<NodeId>>,
    anchor: Cell<Option<NodeId>>,
    component: RefCell<Option<ComponentInstance>>,
    subtree: RefCell<Option<VNode>>,
    invokers: RefCell<Invokers>,
}

/// A virtual node. Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct VNode(Rc<VNodeData>);

impl VNode {
    /// Build a vnode. `key` is taken out of the props.
    pub fn new(ty: VNodeType, mut props: Option<Props>, children: Children) -> VNode {
        let key = props
            .as_mut()
            .and_then(|p| p.shift_remove("key"))
            .and_then(|k| Key::from_value(&k));

        let children = match (&ty, children) {
            // List or text children of a component become its default slot.
            (VNodeType::Component(_), Children::List(list)) => {
                let mut slots = Slots::new();
                slots.insert("default".into(), Slot::from_nodes(list));
                Children::Slots(slots)
            }
            (VNodeType::Component(_), Children::Text(text)) => {
                let mut slots = Slots::new();
                slots.insert("default".into(), Slot::from_nodes(vec![VNode::text(text)]));
                Children::Slots(slots)
            }
            // A fragment always holds a list.
            (VNodeType::Fragment, Children::Text(text)) => Children::List(vec![VNode::text(text)]),
            (VNodeType::Fragment, Children::None) => Children::List(Vec::new()),
            (_, children) => children,
        };

        if matches!(ty, VNodeType::Unknown) {
            warn!("invalid vnode type");
        }

        let shape = ty.shape() | children.shape();
        VNode(Rc::new(VNodeData {
            ty,
            props,
            children: RefCell::new(children),
            key,
            shape,
            el: Cell::new(None),
            anchor: Cell::new(None),
            component: RefCell::new(None),
            subtree: RefCell::new(None),
            invokers: RefCell::new(Invokers::new()),
        }))
    }

    pub fn text(text: impl Into<Rc<str>>) -> VNode {
        VNode::new(VNodeType::Text, None, Children::Text(text.into()))
    }

    pub fn comment(text: impl Into<Rc<str>>) -> VNode {
        VNode::new(VNodeType::Comment, None, Children::Text(text.into()))
    }

    /// A copy of the description with none of the mounted state.
    pub fn clone_fresh(&self) -> VNode {
        let mut props = self.0.props.clone();
        if let Some(key) = &self.0.key {
            let key = match key {
                Key::Str(s) => Value::Str(s.clone()),
                Key::Int(n) => Value::from(*n),
            };
            props.get_or_insert_with(Props::new).insert("key".into(), key);
        }
        VNode::new(self.0.ty.clone(), props, self.0.children.borrow().fresh())
    }

    pub fn ty(&self) -> &VNodeType {
        &self.0.ty
    }

    pub fn props(&self) -> Option<&Props> {
        self.0.props.as_ref()
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.0.props.as_ref()?.get(name)
    }

    pub fn children(&self) -> Ref<'_, Children> {
        self.0.children.borrow()
    }

    /// The list children, with every entry that already backs host nodes
    /// (or repeats an earlier entry) replaced by a fresh copy. Each position
    /// then owns its own host nodes.
    pub(crate) fn claim_children(&self) -> Vec<VNode> {
        let mut children = self.0.children.borrow_mut();
        let Children::List(list) = &mut *children else {
            return Vec::new();
        };
        let mut seen = HashSet::with_capacity(list.len());
        for child in list.iter_mut() {
            if child.is_mounted() || !seen.insert(Rc::as_ptr(&child.0)) {
                trace!(vnode = ?child.ty(), "child already placed; using a fresh copy");
                *child = child.clone_fresh();
                seen.insert(Rc::as_ptr(&child.0));
            }
        }
        list.clone()
    }

    pub fn key(&self) -> Option<&Key> {
        self.0.key.as_ref()
    }

    pub fn shape(&self) -> ShapeFlags {
        self.0.shape
    }

    /// The host node this vnode produced, while mounted.
    pub fn el(&self) -> Option<NodeId> {
        self.0.el.get()
    }

    pub(crate) fn set_el(&self, el: Option<NodeId>) {
        self.0.el.set(el);
    }

    /// End marker of a mounted fragment.
    pub fn anchor(&self) -> Option<NodeId> {
        self.0.anchor.get()
    }

    pub(crate) fn set_anchor(&self, anchor: Option<NodeId>) {
        self.0.anchor.set(anchor);
    }

    pub(crate) fn component(&self) -> Option<ComponentInstance> {
        self.0.component.borrow().clone()
    }

    pub(crate) fn set_component(&self, instance: Option<ComponentInstance>) {
        *self.0.component.borrow_mut() = instance;
    }

    /// Rendered tree of a functional component.
    pub(crate) fn subtree(&self) -> Option<VNode> {
        self.0.subtree.borrow().clone()
    }

    pub(crate) fn set_subtree(&self, subtree: Option<VNode>) {
        *self.0.subtree.borrow_mut() = subtree;
    }

    pub(crate) fn invokers(&self) -> &RefCell<Invokers> {
        &self.0.invokers
    }

    /// Hand the event invokers of `prev` over to this node.
    pub(crate) fn take_invokers(&self, prev: &VNode) {
        let invokers = std::mem::take(&mut *prev.0.invokers.borrow_mut());
        *self.0.invokers.borrow_mut() = invokers;
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Same type and same key: the reconciler may patch one into the other.
    pub fn is_same_node(&self, other: &VNode) -> bool {
        self.0.key == other.0.key && self.0.ty.same(&other.0.ty)
    }

    pub fn is_mounted(&self) -> bool {
        self.0.el.get().is_some() || self.0.component.borrow().is_some()
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("type", &self.0.ty);
        if let Some(key) = &self.0.key {
            s.field("key", key);
        }
        if let Some(props) = &self.0.props {
            s.field("props", props);
        }
        s.field("children", &*self.0.children.borrow()).finish()
    }
}

/// Build a vnode.
///
/// ```rust
/// use trellis_core::render::{h, props};
///
/// let list = h("ul", (props([("class", "todo")]), vec![
///     h("li", (props([("key", 1)]), "first")),
///     h("li", (props([("key", 2)]), "second")),
/// ]));
/// assert_eq!(list.children().as_list().len(), 2);
/// ```
pub fn h(ty: impl Into<VNodeType>, args: impl Into<HArgs>) -> VNode {
    let args = args.into();
    VNode::new(ty.into(), args.props, args.children)
}

/// A fragment of sibling nodes.
pub fn fragment(children: impl Into<Children>) -> VNode {
    VNode::new(VNodeType::Fragment, None, children.into())
}

pub fn text(text: impl Into<Rc<str>>) -> VNode {
    VNode::text(text)
}

pub fn comment(text: impl Into<Rc<str>>) -> VNode {
    VNode::comment(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_flags_are_computed_at_construction() {
        let el = h("div", "hi");
        assert!(el.shape().contains(ShapeFlags::ELEMENT | ShapeFlags::TEXT_CHILDREN));
        assert!(!el.shape().intersects(ShapeFlags::COMPONENT));

        let list = h("ul", vec![h("li", ())]);
        assert!(list.shape().contains(ShapeFlags::ARRAY_CHILDREN));

        let comp = Component::new("Leaf").build();
        let node = h(&comp, vec![h("span", ())]);
        assert!(node.shape().contains(ShapeFlags::STATEFUL_COMPONENT | ShapeFlags::SLOTS_CHILDREN));
        assert!(node.shape().intersects(ShapeFlags::COMPONENT));
    }

    #[test]
    fn single_vnode_argument_becomes_a_list() {
        let node = h("div", h("span", "x"));
        assert_eq!(node.children().as_list().len(), 1);
    }

    #[test]
    fn key_is_extracted_from_props() {
        let node = h("li", props([("key", Value::from(3)), ("id", Value::from("x"))]));
        assert_eq!(node.key(), Some(&Key::Int(3)));
        assert!(node.prop("key").is_none());
        assert_eq!(node.prop("id"), Some(&Value::from("x")));

        let named = h("li", props([("key", "a")]));
        assert_eq!(named.key(), Some(&Key::Str("a".into())));
    }

    #[test]
    fn same_node_requires_type_and_key() {
        let a = h("li", props([("key", 1)]));
        let b = h("li", props([("key", 1)]));
        let c = h("li", props([("key", 2)]));
        let d = h("p", props([("key", 1)]));
        assert!(a.is_same_node(&b));
        assert!(!a.is_same_node(&c));
        assert!(!a.is_same_node(&d));

        let x = Component::new("X").build();
        let y = Component::new("X").build();
        assert!(h(&x, ()).is_same_node(&h(&x, ())));
        assert!(!h(&x, ()).is_same_node(&h(&y, ())));
    }

    #[test]
    fn empty_tag_is_unknown() {
        let node = h("", ());
        assert!(matches!(node.ty(), VNodeType::Unknown));
        assert!(node.shape().is_empty());
    }

    #[test]
    fn clone_fresh_keeps_key_and_drops_mount_state() {
        let node = h("li", props([("key", "k")]));
        node.set_el(Some(NodeId(7)));
        let copy = node.clone_fresh();
        assert_eq!(copy.key(), node.key());
        assert_eq!(copy.el(), None);
        assert!(!copy.ptr_eq(&node));
    }

    #[test]
    fn fragment_children_are_always_a_list() {
        assert!(fragment(()).shape().contains(ShapeFlags::FRAGMENT | ShapeFlags::ARRAY_CHILDREN));
        assert_eq!(fragment("t").children().as_list().len(), 1);
    }
}
