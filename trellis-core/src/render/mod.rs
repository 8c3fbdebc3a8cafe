//! Virtual Tree Rendering
//!
//! This module turns descriptions of UI (vnodes) into host nodes and keeps
//! the host in sync as those descriptions change.
//!
//! # Overview
//!
//! - [`h`] builds vnodes: elements, text, comments, fragments, components.
//! - [`Renderer`] mounts a tree into a container and patches it against
//!   the next tree.
//! - [`Host`] is the node-manipulation surface the renderer drives.
//!   [`MemoryDom`] implements it in memory and records every mutation as a
//!   [`DomOp`].
//! - [`Component`] pairs a setup function with a render function. Each
//!   mounted instance re-renders through its own reactive effect.
//!
//! # Design Decisions
//!
//! 1. Host nodes are plain ids. The renderer never holds references into
//!    the host, so any arena or external tree can sit behind [`Host`].
//!
//! 2. A vnode caches its shape flags at creation; the patcher branches on
//!    them instead of re-inspecting types and children.
//!
//! 3. Event handlers go through a per-element invoker so swapping a
//!    handler never touches the host's listener list.

mod component;
mod dom;
mod host;
mod props;
mod reconciler;
mod vnode;

pub use component::{
    Component, Directive, DirectiveHook, ErrorHandler, RenderFn, RenderScope, SetupContext,
    SetupFn, SetupResult, Slot, Slots,
};
pub use dom::{DomOp, MemoryDom};
pub use host::{Host, NodeId};
pub use props::{normalize_class, normalize_style};
pub use reconciler::Renderer;
pub use vnode::{
    comment, fragment, h, props, text, Children, Functional, HArgs, Key, Props, ShapeFlags,
    VNode, VNodeType,
};
