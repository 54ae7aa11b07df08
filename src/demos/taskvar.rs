// Task-variable propagation probes. A variable set at submit time travels
// with the invocation and is visible inside children on any worker.

use serde_json::json;

use crate::{
  context::{call, TaskVar},
  error::RegistryError,
  invocation::Invocation,
  registry::RegistryBuilder,
  routine::{Outcome, Routine, Step, Stepper},
};

pub const QUEUE: &str = "taskvar";

pub static TENANT_ID: TaskVar<Option<String>> = TaskVar::new("tenant_id", None);

pub fn register(builder: RegistryBuilder) -> Result<RegistryBuilder, RegistryError> {
  builder
    .routine(Routine::plain("get_tenant", QUEUE, |_, _| {
      Ok(json!(TENANT_ID.get()))
    }))?
    .routine(Routine::stepwise("tenant_probe", QUEUE, |_, _| {
      Box::new(TenantProbe::Start)
    }))
}

/// Ask a child what tenant it sees; the answer should match our own scope.
enum TenantProbe {
  Start,
  Reported,
}

impl Stepper for TenantProbe {
  fn resume(&mut self, input: Outcome) -> Step {
    match self {
      TenantProbe::Start => {
        *self = TenantProbe::Reported;
        Step::Suspend(call(Invocation::new("get_tenant", vec![])))
      }
      TenantProbe::Reported => Step::Done(input),
    }
  }
}
