//! Observable values and dependency registries.
//!
//! This module provides the instrumented side of the reactive graph:
//! - [`Value`]: dynamic structured values, scalars plus observed containers
//! - [`ObservedMap`] / [`ObservedList`]: containers whose reads register
//!   dependencies and whose writes notify them
//! - [`Dep`]: the per-slot registry of interested subscribers

mod dep;
mod list;
mod map;
mod traverse;
mod value;

pub use dep::Dep;
pub use list::ObservedList;
pub use map::ObservedMap;
pub use value::Value;

pub(crate) use traverse::traverse;

/// Entry point for handing a value to the reactivity system.
///
/// Containers are observed from construction, so this is idempotent: it
/// returns the container's existing shape dependency handle. Scalars and
/// frozen containers return `None` — they decline observation.
pub fn observe(value: &Value) -> Option<Dep> {
    value.observer()
}
