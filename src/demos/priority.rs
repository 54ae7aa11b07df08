// Priority inheritance probes. A child invocation constructed inside a
// running routine inherits the parent's priority scope unless overridden.

use serde_json::json;

use crate::{
  context::{call, current_priority},
  error::RegistryError,
  invocation::Invocation,
  registry::RegistryBuilder,
  routine::{Outcome, Routine, Step, Stepper},
};

pub const QUEUE: &str = "priority";

pub fn register(builder: RegistryBuilder) -> Result<RegistryBuilder, RegistryError> {
  builder
    .routine(Routine::plain("inherited_priority", QUEUE, |_, _| {
      Ok(json!(current_priority()))
    }))?
    .routine(Routine::stepwise("priority_probe", QUEUE, |_, _| {
      Box::new(PriorityProbe::Start)
    }))
}

/// Submit a child with no explicit priority and report what it observed.
enum PriorityProbe {
  Start,
  Reported,
}

impl Stepper for PriorityProbe {
  fn resume(&mut self, input: Outcome) -> Step {
    match self {
      PriorityProbe::Start => {
        *self = PriorityProbe::Reported;
        Step::Suspend(call(Invocation::new("inherited_priority", vec![])))
      }
      PriorityProbe::Reported => Step::Done(input),
    }
  }
}
