//! Dependency Graph
//!
//! Maps `(object, key)` pairs to the set of effects that read them. The
//! graph is two-level: object id first, then property key. Buckets are
//! created lazily on the first tracked read and are only emptied by effects
//! unsubscribing themselves; buckets are never pruned proactively.
//!
//! Buckets preserve subscription order, which is the order triggers fire in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::effect::{Effect, EffectId};
use super::value::ObjectId;

/// Key of a tracked property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// A named property of a map.
    Named(Rc<str>),
    /// An element of a list.
    Index(usize),
    /// The length of a list.
    Length,
    /// Synthetic key read by iteration over a map's keys.
    Iterate,
    /// Synthetic key of single-value cells (refs and computed cells).
    Value,
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Named(name.into())
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Named(name.into())
    }
}

impl From<Rc<str>> for PropKey {
    fn from(name: Rc<str>) -> Self {
        PropKey::Named(name)
    }
}

impl From<&Rc<str>> for PropKey {
    fn from(name: &Rc<str>) -> Self {
        PropKey::Named(name.clone())
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Named(name) => f.write_str(name),
            PropKey::Index(index) => write!(f, "{index}"),
            PropKey::Length => f.write_str("length"),
            PropKey::Iterate => f.write_str("<iterate>"),
            PropKey::Value => f.write_str("value"),
        }
    }
}

/// What kind of mutation fired a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Add,
    Set,
    Delete,
    Clear,
}

/// One dependency bucket: the effects subscribed to a single key.
pub(crate) struct Dep {
    subscribers: RefCell<IndexMap<EffectId, Effect>>,
}

impl Dep {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            subscribers: RefCell::new(IndexMap::new()),
        })
    }

    /// Add an effect. Returns false if it was already subscribed.
    pub(crate) fn subscribe(&self, effect: &Effect) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.contains_key(&effect.id()) {
            return false;
        }
        subscribers.insert(effect.id(), effect.clone());
        true
    }

    pub(crate) fn unsubscribe(&self, id: EffectId) {
        self.subscribers.borrow_mut().shift_remove(&id);
    }

    /// Snapshot of the current subscribers, in subscription order.
    pub(crate) fn subscribers(&self) -> Vec<Effect> {
        self.subscribers.borrow().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// The dependency graph: `object -> key -> bucket`.
#[derive(Default)]
pub(crate) struct DepGraph {
    targets: HashMap<ObjectId, IndexMap<PropKey, Rc<Dep>>>,
}

impl DepGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The bucket for `(target, key)`, created on first use.
    pub(crate) fn dep_for(&mut self, target: ObjectId, key: PropKey) -> Rc<Dep> {
        self.targets
            .entry(target)
            .or_default()
            .entry(key)
            .or_insert_with(Dep::new)
            .clone()
    }

    pub(crate) fn get(&self, target: ObjectId, key: &PropKey) -> Option<Rc<Dep>> {
        self.targets.get(&target)?.get(key).cloned()
    }

    /// Buckets affected by a mutation.
    ///
    /// `new_len` is only meaningful for a list length write; indices at or
    /// past the new length are affected too.
    pub(crate) fn collect(
        &self,
        target: ObjectId,
        kind: TriggerKind,
        key: Option<&PropKey>,
        is_list: bool,
        new_len: Option<usize>,
    ) -> Vec<Rc<Dep>> {
        let Some(deps) = self.targets.get(&target) else {
            return Vec::new();
        };

        if kind == TriggerKind::Clear {
            return deps.values().cloned().collect();
        }

        let mut out = Vec::new();

        if is_list && key == Some(&PropKey::Length) {
            for (k, dep) in deps {
                match k {
                    PropKey::Length => out.push(dep.clone()),
                    PropKey::Index(i) if new_len.is_some_and(|len| *i >= len) => {
                        out.push(dep.clone())
                    }
                    _ => {}
                }
            }
            return out;
        }

        if let Some(dep) = key.and_then(|k| deps.get(k)) {
            out.push(dep.clone());
        }

        let extra = match kind {
            TriggerKind::Add if is_list => matches!(key, Some(PropKey::Index(_)))
                .then_some(PropKey::Length),
            TriggerKind::Add | TriggerKind::Delete if !is_list => Some(PropKey::Iterate),
            _ => None,
        };
        if let Some(dep) = extra.and_then(|k| deps.get(&k)) {
            out.push(dep.clone());
        }

        out
    }

    /// Number of effects subscribed to `(target, key)`.
    pub(crate) fn subscriber_count(&self, target: ObjectId, key: &PropKey) -> usize {
        self.get(target, key).map(|dep| dep.len()).unwrap_or(0)
    }

    /// Total number of buckets ever created.
    pub(crate) fn bucket_count(&self) -> usize {
        self.targets.values().map(IndexMap::len).sum()
    }
}
