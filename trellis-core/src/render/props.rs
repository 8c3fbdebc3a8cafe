//! DOM prop adapter.
//!
//! Translates one prop change on an element into host calls:
//!
//! - `class` is normalized from a string, list or `{name: bool}` map.
//! - `style` is diffed key by key. Keys missing from the new style are
//!   cleared to the empty string; the `style` attribute itself is never
//!   removed.
//! - `on[A-Z]*` props are event handlers. Each (element, event) pair gets
//!   one native listener that calls through an [`Invoker`]; a changed
//!   handler only swaps the invoker's target.
//! - Everything else is an attribute, set by string coercion. Null and
//!   `false` remove it.
//!
//! `key`, `ref` and `v-*` props are reserved and never reach the host.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::reactive::{Callback, RawData, Value};

use super::host::{Host, NodeId};

/// Stable listener target for one (element, event) pair.
pub(crate) struct Invoker {
    handler: RefCell<Callback>,
}

impl Invoker {
    fn new(handler: Callback) -> Rc<Self> {
        Rc::new(Self {
            handler: RefCell::new(handler),
        })
    }

    fn listener(self: &Rc<Self>) -> Callback {
        let invoker = self.clone();
        Callback::new(move |event| {
            let handler = invoker.handler.borrow().clone();
            handler.call(event);
        })
    }
}

pub(crate) type Invokers = IndexMap<Rc<str>, Rc<Invoker>>;

pub(crate) fn is_reserved(key: &str) -> bool {
    key == "key" || key == "ref" || key.starts_with("v-")
}

/// `onClick`, `onUpdate`, ... but not `once` or `on`.
pub(crate) fn is_on(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() > 2 && bytes.starts_with(b"on") && bytes[2].is_ascii_uppercase()
}

/// `onClick` -> `click`.
pub(crate) fn event_name(key: &str) -> String {
    key[2..].to_ascii_lowercase()
}

/// `item-click` -> `onItemClick`.
pub(crate) fn handler_key(event: &str) -> String {
    let mut out = String::from("on");
    let mut upper = true;
    for c in event.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Flatten a class value into a space separated list.
pub fn normalize_class(value: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_class(value, &mut parts);
    parts.join(" ")
}

fn collect_class(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Str(s) => out.extend(s.split_whitespace().map(str::to_string)),
        Value::Object(obj) => match &*obj.data() {
            RawData::List(items) => {
                for item in items {
                    collect_class(item, out);
                }
            }
            RawData::Map(map) => {
                out.extend(
                    map.iter()
                        .filter(|(_, on)| on.truthy())
                        .map(|(name, _)| name.to_string()),
                );
            }
        },
        _ => {}
    }
}

/// Style declarations of a value: a `{prop: value}` map or a CSS string.
pub fn normalize_style(value: &Value) -> IndexMap<String, String> {
    match value {
        Value::Str(css) => css
            .split(';')
            .filter_map(|decl| {
                let (name, value) = decl.split_once(':')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect(),
        Value::Object(obj) => match &*obj.data() {
            RawData::Map(map) => map
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            RawData::List(_) => IndexMap::new(),
        },
        _ => IndexMap::new(),
    }
}

fn patch_style(host: &dyn Host, el: NodeId, prev: Option<&Value>, next: Option<&Value>) {
    let old = prev.map(normalize_style).unwrap_or_default();
    let new = next.map(normalize_style).unwrap_or_default();

    for (name, value) in &new {
        if old.get(name) != Some(value) {
            host.set_style(el, name, value);
        }
    }
    for name in old.keys() {
        if !new.contains_key(name) {
            host.set_style(el, name, "");
        }
    }
}

fn patch_event(
    host: &dyn Host,
    el: NodeId,
    key: &str,
    next: Option<&Value>,
    invokers: &RefCell<Invokers>,
) {
    let event = event_name(key);
    let handler = next.and_then(Value::as_callback).cloned();
    let existing = invokers.borrow().get(key).cloned();

    match (existing, handler) {
        (Some(invoker), Some(handler)) => {
            *invoker.handler.borrow_mut() = handler;
        }
        (None, Some(handler)) => {
            let invoker = Invoker::new(handler);
            host.add_event_listener(el, &event, invoker.listener());
            invokers.borrow_mut().insert(key.into(), invoker);
        }
        (Some(_), None) => {
            host.remove_event_listener(el, &event);
            invokers.borrow_mut().shift_remove(key);
        }
        (None, None) => {}
    }
}

/// Apply the change of one prop from `prev` to `next` (absent = `None`).
pub(crate) fn patch_prop(
    host: &dyn Host,
    el: NodeId,
    key: &str,
    prev: Option<&Value>,
    next: Option<&Value>,
    invokers: &RefCell<Invokers>,
) {
    trace!(%el, key, "patch prop");

    if is_reserved(key) {
        return;
    }

    if key == "class" {
        match next.map(normalize_class) {
            Some(class) if !class.is_empty() => host.set_attribute(el, "class", &class),
            _ => host.remove_attribute(el, "class"),
        }
    } else if key == "style" {
        patch_style(host, el, prev, next);
    } else if is_on(key) {
        patch_event(host, el, key, next, invokers);
    } else {
        match next {
            None | Some(Value::Null) | Some(Value::Bool(false)) => host.remove_attribute(el, key),
            Some(value) => host.set_attribute(el, key, &value.to_string()),
        }
    }
}
