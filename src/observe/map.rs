use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::observe::dep::Dep;
use crate::observe::list::depend_list;
use crate::observe::value::{eq_values, Value};

/// A map-like observable container.
///
/// Every entry is a slot holding its value and its own [`Dep`]; the node
/// additionally owns one shape dependency that fires when the key set
/// changes. Reads register the active evaluation context on the slot's
/// dependency (and, for container values, on the child's shape dependency),
/// writes notify it — no explicit subscribe calls anywhere.
///
/// `ObservedMap` is a handle; clones share the node. Nodes are born
/// observed, so wrapping is idempotent by construction.
///
/// # Examples
///
/// ```
/// use ripple::{ObservedMap, Value};
///
/// let state = ObservedMap::new();
/// state.set("count", 1);
/// assert_eq!(state.get("count"), Value::Int(1));
/// assert_eq!(state.get("missing"), Value::Null);
/// ```
pub struct ObservedMap {
    inner: Rc<MapNode>,
}

struct MapNode {
    entries: RefCell<IndexMap<String, Slot>>,
    // shape: key added or removed
    dep: Dep,
    frozen: Cell<bool>,
}

struct Slot {
    value: RefCell<Value>,
    dep: Dep,
}

impl ObservedMap {
    pub fn new() -> Self {
        ObservedMap {
            inner: Rc::new(MapNode {
                entries: RefCell::new(IndexMap::new()),
                dep: Dep::new(),
                frozen: Cell::new(false),
            }),
        }
    }

    /// Handle identity.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn shape_dep(&self) -> Dep {
        self.inner.dep.clone()
    }

    /// Decline tracking and notification from now on. Reads and writes still
    /// work, they just stop participating in the dependency graph — the
    /// escape hatch for values that must never become reactive.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    /// Tracked read of one slot.
    ///
    /// Returns `Value::Null` for absent keys without registering anything:
    /// no slot exists yet to subscribe to. Structural listeners should read
    /// [`ObservedMap::len`] or [`ObservedMap::keys`], or watch deep.
    pub fn get(&self, key: &str) -> Value {
        let value = {
            let entries = self.inner.entries.borrow();
            match entries.get(key) {
                Some(slot) => {
                    if !self.is_frozen() {
                        slot.dep.depend();
                    }
                    slot.value.borrow().clone()
                }
                None => return Value::Null,
            }
        };
        if !self.is_frozen() {
            // a context that reads a reference to a nested container must
            // also see that container's structural mutations
            if let Some(child) = value.observer() {
                child.depend();
                if let Value::List(list) = &value {
                    depend_list(list);
                }
            }
        }
        value
    }

    /// Write one slot, installing it first if the key is new.
    ///
    /// Writing an existing slot with a value that is [`Value::same_as`] the
    /// current one is a no-op. A new key notifies the shape dependency
    /// instead of a slot dependency.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let changed = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get(&key) {
                Some(slot) => {
                    if slot.value.borrow().same_as(&value) {
                        None
                    } else {
                        *slot.value.borrow_mut() = value;
                        Some(slot.dep.clone())
                    }
                }
                None => {
                    let slot = Slot {
                        value: RefCell::new(value),
                        dep: Dep::new(),
                    };
                    entries.insert(key, slot);
                    Some(self.inner.dep.clone())
                }
            }
        };
        if self.is_frozen() {
            return;
        }
        if let Some(dep) = changed {
            dep.notify();
        }
    }

    /// Remove a key, notifying the shape dependency when it existed.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let removed = self.inner.entries.borrow_mut().shift_remove(key);
        removed.map(|slot| {
            if !self.is_frozen() {
                self.inner.dep.notify();
            }
            slot.value.into_inner()
        })
    }

    /// Number of keys; tracked against the shape dependency.
    pub fn len(&self) -> usize {
        if !self.is_frozen() {
            self.inner.dep.depend();
        }
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked against the shape dependency.
    pub fn contains_key(&self, key: &str) -> bool {
        if !self.is_frozen() {
            self.inner.dep.depend();
        }
        self.inner.entries.borrow().contains_key(key)
    }

    /// Keys in insertion order; tracked against the shape dependency.
    pub fn keys(&self) -> Vec<String> {
        if !self.is_frozen() {
            self.inner.dep.depend();
        }
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Snapshot of (slot dep, value) pairs for the deep-registration walk.
    pub(crate) fn slots_snapshot(&self) -> Vec<(Dep, Value)> {
        self.inner
            .entries
            .borrow()
            .values()
            .map(|slot| (slot.dep.clone(), slot.value.borrow().clone()))
            .collect()
    }

    pub(crate) fn eq_untracked(&self, other: &Self, seen: &mut HashSet<(usize, usize)>) -> bool {
        if !seen.insert((self.node_addr(), other.node_addr())) {
            return true;
        }
        let a = self.inner.entries.borrow();
        let b = other.inner.entries.borrow();
        a.len() == b.len()
            && a.iter().all(|(key, slot)| {
                b.get(key).is_some_and(|theirs| {
                    eq_values(&slot.value.borrow(), &theirs.value.borrow(), seen)
                })
            })
    }

    pub(crate) fn node_addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl Default for ObservedMap {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ObservedMap {
    fn clone(&self) -> Self {
        ObservedMap {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ObservedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.entries.borrow();
        let mut map = f.debug_map();
        for (key, slot) in entries.iter() {
            map.entry(key, &*slot.value.borrow());
        }
        map.finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ObservedMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = ObservedMap::new();
        {
            let mut entries = map.inner.entries.borrow_mut();
            for (key, value) in iter {
                entries.insert(
                    key.into(),
                    Slot {
                        value: RefCell::new(value.into()),
                        dep: Dep::new(),
                    },
                );
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    #[test]
    fn get_set_roundtrip() {
        Runtime::scope(|| {
            let map = ObservedMap::new();
            map.set("name", "ripple");
            map.set("count", 3);
            assert_eq!(map.get("name"), Value::from("ripple"));
            assert_eq!(map.get("count"), Value::Int(3));
            assert_eq!(map.len(), 2);
        });
    }

    #[test]
    fn delete_removes_and_reports() {
        Runtime::scope(|| {
            let map = ObservedMap::new();
            map.set("a", 1);
            assert_eq!(map.delete("a"), Some(Value::Int(1)));
            assert_eq!(map.delete("a"), None);
            assert_eq!(map.get("a"), Value::Null);
        });
    }

    #[test]
    fn keys_keep_insertion_order() {
        Runtime::scope(|| {
            let map = ObservedMap::new();
            map.set("z", 1);
            map.set("a", 2);
            map.set("m", 3);
            assert_eq!(map.keys(), vec!["z", "a", "m"]);
        });
    }

    #[test]
    fn frozen_map_still_reads_and_writes() {
        Runtime::scope(|| {
            let map = ObservedMap::new();
            map.set("a", 1);
            map.freeze();
            map.set("a", 2);
            assert_eq!(map.get("a"), Value::Int(2));
        });
    }
}
