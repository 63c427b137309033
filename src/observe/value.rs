use std::cmp::Ordering;
use std::collections::HashSet;
use std::rc::Rc;

use crate::observe::dep::Dep;
use crate::observe::list::ObservedList;
use crate::observe::map::ObservedMap;

/// A dynamic structured value.
///
/// Scalars are plain data; the `List` and `Map` variants hold observed
/// container nodes, so any structured value reachable from observed state is
/// itself observable. Containers are handles — cloning a `Value` clones the
/// handle, not the contents, and identity is handle identity.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(ObservedList),
    Map(ObservedMap),
}

impl Value {
    /// Whether this value is a structured container.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// The container's shape dependency, unless frozen or scalar.
    pub(crate) fn observer(&self) -> Option<Dep> {
        match self {
            Value::List(list) if !list.is_frozen() => Some(list.shape_dep()),
            Value::Map(map) if !map.is_frozen() => Some(map.shape_dep()),
            _ => None,
        }
    }

    /// The change predicate: value equality for scalars with NaN considered
    /// equal to itself, handle identity for containers. A setter seeing
    /// `same_as` is a no-op; a watcher seeing `!same_as` fires its callback.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ObservedList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ObservedMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Structural equality, for assertions and tests. Containers compare by
/// contents without registering dependencies; reactive code paths use
/// [`Value::same_as`] instead.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        eq_values(self, other, &mut HashSet::new())
    }
}

/// Structural comparison threaded through a seen-set of node address pairs,
/// so self-referential containers terminate; a pair already under
/// comparison counts as equal.
pub(crate) fn eq_values(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => x.ptr_eq(y) || x.eq_untracked(y, seen),
        (Value::Map(x), Value::Map(y)) => x.ptr_eq(y) || x.eq_untracked(y, seen),
        _ => false,
    }
}

/// Total order used by `ObservedList::sort`: rank by type, numbers compared
/// numerically across `Int` and `Float`, containers left in place.
pub(crate) fn total_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::List(_) => 4,
            Value::Map(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ if rank(a) == 2 && rank(b) == 2 => {
            let x = a.as_float().unwrap_or(f64::NAN);
            let y = b.as_float().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v.as_str()))
    }
}

impl From<ObservedList> for Value {
    fn from(v: ObservedList) -> Self {
        Value::List(v)
    }
}

impl From<ObservedMap> for Value {
    fn from(v: ObservedMap) -> Self {
        Value::Map(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(ObservedList::from_values(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_as_treats_nan_as_unchanged() {
        let a = Value::Float(f64::NAN);
        let b = Value::Float(f64::NAN);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Value::Float(0.0)));
    }

    #[test]
    fn same_as_is_identity_for_containers() {
        let list = ObservedList::from_values(vec![Value::Int(1)]);
        let alias = Value::List(list.clone());
        let copy = Value::List(ObservedList::from_values(vec![Value::Int(1)]));
        let original = Value::List(list);
        assert!(original.same_as(&alias));
        assert!(!original.same_as(&copy));
        // structural equality still sees the copy as equal
        assert_eq!(original, copy);
    }

    #[test]
    fn structural_equality_handles_cycles() {
        let a = ObservedMap::new();
        let b = ObservedMap::new();
        a.set("peer", b.clone());
        b.set("peer", a.clone());

        let c = ObservedMap::new();
        let d = ObservedMap::new();
        c.set("peer", d.clone());
        d.set("peer", c.clone());

        assert_eq!(Value::Map(a.clone()), Value::Map(c));

        let lopsided = ObservedMap::new();
        lopsided.set("peer", ObservedMap::new());
        assert_ne!(Value::Map(a), Value::Map(lopsided));
    }

    #[test]
    fn sort_order_ranks_types_then_values() {
        let mut values = vec![
            Value::from("b"),
            Value::Int(10),
            Value::Null,
            Value::Float(2.5),
            Value::from(true),
        ];
        values.sort_by(total_order);
        assert_eq!(values[0], Value::Null);
        assert_eq!(values[1], Value::Bool(true));
        assert_eq!(values[2], Value::Float(2.5));
        assert_eq!(values[3], Value::Int(10));
        assert_eq!(values[4], Value::from("b"));
    }
}
