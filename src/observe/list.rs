use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use crate::observe::dep::Dep;
use crate::observe::value::{eq_values, total_order, Value};

/// A sequence observable container.
///
/// The whole list is one dependency: element reads are not intercepted per
/// index, so the list's shape dependency stands in for "anything about this
/// list". The fixed vocabulary of mutating operations — `append`,
/// `remove_last`, `remove_first`, `prepend`, `splice`, `sort`, `reverse` —
/// performs the real mutation and then notifies. A raw positional write via
/// [`ObservedList::store`] deliberately notifies nothing; that boundary is
/// part of the contract.
///
/// # Examples
///
/// ```
/// use ripple::{ObservedList, Value};
///
/// let list = ObservedList::from_values(vec![Value::Int(1), Value::Int(2)]);
/// list.append(3);
/// assert_eq!(list.len(), 3);
/// assert_eq!(list.remove_first(), Some(Value::Int(1)));
/// ```
pub struct ObservedList {
    inner: Rc<ListNode>,
}

struct ListNode {
    items: RefCell<Vec<Value>>,
    dep: Dep,
    frozen: Cell<bool>,
}

impl ObservedList {
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        ObservedList {
            inner: Rc::new(ListNode {
                items: RefCell::new(values),
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

    /// Decline tracking and notification from now on.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    fn track(&self) {
        if !self.is_frozen() {
            self.inner.dep.depend();
        }
    }

    fn notify(&self) {
        if !self.is_frozen() {
            self.inner.dep.notify();
        }
    }

    /// Tracked length read.
    pub fn len(&self) -> usize {
        self.track();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked element read. Granularity is the whole list.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.track();
        self.inner.items.borrow().get(index).cloned()
    }

    /// Tracked snapshot of all elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.inner.items.borrow().clone()
    }

    // --- the seven intercepted mutations ---

    pub fn append(&self, value: impl Into<Value>) {
        self.inner.items.borrow_mut().push(value.into());
        self.notify();
    }

    pub fn remove_last(&self) -> Option<Value> {
        let removed = self.inner.items.borrow_mut().pop();
        self.notify();
        removed
    }

    pub fn remove_first(&self) -> Option<Value> {
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.notify();
        removed
    }

    pub fn prepend(&self, value: impl Into<Value>) {
        self.inner.items.borrow_mut().insert(0, value.into());
        self.notify();
    }

    /// Remove `delete_count` elements starting at `start` and insert
    /// `items` in their place, returning the removed elements. Out-of-range
    /// positions are clamped.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let removed = {
            let mut list = self.inner.items.borrow_mut();
            let start = start.min(list.len());
            let end = start.saturating_add(delete_count).min(list.len());
            list.splice(start..end, items).collect()
        };
        self.notify();
        removed
    }

    /// Sort by the natural value order (type rank, then value).
    pub fn sort(&self) {
        self.inner.items.borrow_mut().sort_by(total_order);
        self.notify();
    }

    /// Sort with a comparator. The comparator must not touch this list.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        self.inner.items.borrow_mut().sort_by(compare);
        self.notify();
    }

    pub fn reverse(&self) {
        self.inner.items.borrow_mut().reverse();
        self.notify();
    }

    // --- index writes ---

    /// Notifying index write, routed through [`ObservedList::splice`] so the
    /// interception path is honored. Pads with `Null` when `index` is past
    /// the end.
    pub fn set_index(&self, index: usize, value: impl Into<Value>) {
        {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                items.resize(index, Value::Null);
            }
        }
        self.splice(index, 1, vec![value.into()]);
    }

    /// Raw positional write: the value changes, nothing is notified.
    ///
    /// This is the explicit rendition of a plain `arr[i] = v` index
    /// assignment, which the reactivity system does not intercept. The
    /// documented limitation is preserved on purpose; use
    /// [`ObservedList::set_index`] for a notifying write. Out-of-range
    /// indices are ignored.
    pub fn store(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.inner.items.borrow_mut();
        if let Some(slot) = items.get_mut(index) {
            *slot = value.into();
        }
    }

    /// Untracked snapshot for the deep-registration walk and debugging.
    pub(crate) fn items_snapshot(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    pub(crate) fn eq_untracked(&self, other: &Self, seen: &mut HashSet<(usize, usize)>) -> bool {
        if !seen.insert((self.node_addr(), other.node_addr())) {
            return true;
        }
        let a = self.inner.items.borrow();
        let b = other.inner.items.borrow();
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| eq_values(x, y, seen))
    }

    pub(crate) fn node_addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

/// Register the active context on every container reachable from the list's
/// elements. Element access is not interceptable per index, so a context
/// that read the list must hear about structural changes anywhere inside it.
pub(crate) fn depend_list(list: &ObservedList) {
    for item in list.items_snapshot() {
        if let Some(dep) = item.observer() {
            dep.depend();
        }
        if let Value::List(nested) = &item {
            depend_list(nested);
        }
    }
}

impl Default for ObservedList {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ObservedList {
    fn clone(&self) -> Self {
        ObservedList {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ObservedList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.inner.items.borrow().iter())
            .finish()
    }
}

impl From<Vec<Value>> for ObservedList {
    fn from(values: Vec<Value>) -> Self {
        Self::from_values(values)
    }
}
