use std::collections::HashSet;

use crate::observe::value::Value;

/// Recursively register the active evaluation context on every observable
/// slot reachable from `value`, so nested properties count as dependencies
/// for deep watchers even when the thunk's top-level expression never read
/// them.
///
/// Guarded by a seen-set of shape-dep ids so self-referential structures
/// terminate. Frozen containers are skipped.
pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Map(map) => {
            if map.is_frozen() {
                return;
            }
            let shape = map.shape_dep();
            if !seen.insert(shape.id()) {
                return;
            }
            shape.depend();
            for (dep, nested) in map.slots_snapshot() {
                dep.depend();
                traverse_inner(&nested, seen);
            }
        }
        Value::List(list) => {
            if list.is_frozen() {
                return;
            }
            let shape = list.shape_dep();
            if !seen.insert(shape.id()) {
                return;
            }
            shape.depend();
            for nested in list.items_snapshot() {
                traverse_inner(&nested, seen);
            }
        }
        _ => {}
    }
}
