// Demonstration routines, registered by the CLI binary and exercised by the
// integration tests. Each module shows one facet of the runtime: plain
// blocking work, suspendable flows, priority inheritance, and task
// variables.

pub mod basic;
pub mod expanded;
pub mod priority;
pub mod taskvar;

use crate::registry::Registry;

/// The registry of every demo routine.
pub fn registry() -> Registry {
  let builder = Registry::builder();
  let builder = basic::register(builder).expect("demo routine names are unique");
  let builder = expanded::register(builder).expect("demo routine names are unique");
  let builder = priority::register(builder).expect("demo routine names are unique");
  let builder = taskvar::register(builder).expect("demo routine names are unique");
  builder.build()
}
