// A continuation re-enters a suspended routine with the outcome of whatever
// it was waiting on. Owned by the runner thread that dequeues it.

use uuid::Uuid;

use crate::{
  context::TaskContext,
  invocation::Invocation,
  routine::{Outcome, Step, StepHandle},
};

#[derive(Debug, Clone)]
pub struct Continuation {
  pub id: String,
  pub invocation: Invocation,
  pub step: StepHandle,
  pub result: Outcome,
  /// Scope captured at the suspension point, restored before resuming.
  pub context: TaskContext,
}

impl Continuation {
  pub fn new(
    invocation: Invocation,
    step: StepHandle,
    result: Outcome,
    context: TaskContext,
  ) -> Self {
    Self {
      id: Uuid::new_v4().simple().to_string(),
      invocation,
      step,
      result,
      context,
    }
  }

  /// Inject the result into the state machine and take the next step.
  pub(crate) fn resume(&self) -> Step {
    self.step.resume(self.result.clone())
  }
}
