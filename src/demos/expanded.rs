// A fuller flow: plain work, a deliberate failure, and a multi-stage
// suspendable routine that awaits children, pauses, gathers, and swallows
// an expected error along the way.

use std::time::Duration;

use serde_json::{json, Value};

use crate::{
  context::{call, gather, pause},
  error::{RegistryError, RoutineError},
  invocation::Invocation,
  registry::RegistryBuilder,
  routine::{Outcome, Routine, Step, Stepper},
};

pub const QUEUE: &str = "expanded";

pub fn register(builder: RegistryBuilder) -> Result<RegistryBuilder, RegistryError> {
  builder
    .routine(Routine::plain("regular", QUEUE, |args, _| {
      let instance = args.first().and_then(Value::as_i64).unwrap_or(0);
      let iterations = args.get(1).and_then(Value::as_i64).unwrap_or(0);
      for _ in 0..iterations {
        std::thread::sleep(Duration::from_millis(10));
      }
      Ok(json!(format!("instance {instance} completed")))
    }))?
    .routine(Routine::plain("raises", QUEUE, |_, _| {
      Err(RoutineError::new("value-error", "this is a test failure"))
    }))?
    .routine(Routine::stepwise("irregular", QUEUE, |_, _| {
      Box::new(IrregularFlow::Start)
    }))
}

/// await regular(1, 2); pause; gather(regular(7, 2), pause); try raises()
/// and swallow its failure; finish with regular(2, 5).
enum IrregularFlow {
  Start,
  AfterFirst,
  AfterPause,
  AfterGather,
  AfterRaises,
  Final,
}

impl Stepper for IrregularFlow {
  fn resume(&mut self, input: Outcome) -> Step {
    match self {
      IrregularFlow::Start => {
        *self = IrregularFlow::AfterFirst;
        Step::Suspend(call(Invocation::new("regular", vec![json!(1), json!(2)])))
      }
      IrregularFlow::AfterFirst => {
        if let Err(e) = input {
          return Step::Done(Err(e));
        }
        *self = IrregularFlow::AfterPause;
        Step::Suspend(pause(Duration::from_millis(400)))
      }
      IrregularFlow::AfterPause => {
        if let Err(e) = input {
          return Step::Done(Err(e));
        }
        *self = IrregularFlow::AfterGather;
        Step::Suspend(gather([
          call(Invocation::new("regular", vec![json!(7), json!(2)])),
          pause(Duration::from_millis(500)),
        ]))
      }
      IrregularFlow::AfterGather => {
        if let Err(e) = input {
          return Step::Done(Err(e));
        }
        *self = IrregularFlow::AfterRaises;
        Step::Suspend(call(Invocation::new("raises", vec![])))
      }
      IrregularFlow::AfterRaises => {
        // The failure is expected; swallow it and carry on.
        *self = IrregularFlow::Final;
        Step::Suspend(call(Invocation::new("regular", vec![json!(2), json!(5)])))
      }
      IrregularFlow::Final => Step::Done(input),
    }
  }
}
