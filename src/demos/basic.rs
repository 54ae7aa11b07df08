// Basic shapes: a plain blocking routine and a step-wise routine that runs
// its work two at a time, pausing between batches to release capacity.

use std::time::Duration;

use serde_json::Value;

use crate::{
  context::{call, gather, pause},
  error::RegistryError,
  invocation::Invocation,
  registry::RegistryBuilder,
  routine::{Outcome, Routine, Step, Stepper},
};

pub const QUEUE: &str = "basic";

pub fn register(builder: RegistryBuilder) -> Result<RegistryBuilder, RegistryError> {
  builder
    .routine(Routine::plain("blocking", QUEUE, |_, _| {
      std::thread::sleep(Duration::from_millis(100));
      Ok(Value::Null)
    }))?
    .routine(Routine::stepwise("yielding", QUEUE, |args, _| {
      let iterations = args.first().and_then(Value::as_i64).unwrap_or(0);
      Box::new(YieldingFlow {
        pairs_left: iterations / 2,
        tail: iterations % 2 == 1,
        state: YieldState::Start,
      })
    }))
}

enum YieldState {
  Start,
  Gathered,
  Paused,
  Tail,
}

/// Do the blocking work two at a time, with a pause after each pair.
struct YieldingFlow {
  pairs_left: i64,
  tail: bool,
  state: YieldState,
}

impl YieldingFlow {
  fn advance(&mut self) -> Step {
    if self.pairs_left > 0 {
      self.pairs_left -= 1;
      self.state = YieldState::Gathered;
      return Step::Suspend(gather([
        call(Invocation::new("blocking", vec![])),
        call(Invocation::new("blocking", vec![])),
      ]));
    }
    if self.tail {
      self.tail = false;
      self.state = YieldState::Tail;
      return Step::Suspend(call(Invocation::new("blocking", vec![])));
    }
    Step::Done(Ok(Value::Null))
  }
}

impl Stepper for YieldingFlow {
  fn resume(&mut self, input: Outcome) -> Step {
    if let Err(e) = input {
      return Step::Done(Err(e));
    }
    match self.state {
      YieldState::Start | YieldState::Paused => self.advance(),
      YieldState::Gathered => {
        self.state = YieldState::Paused;
        Step::Suspend(pause(Duration::from_millis(200)))
      }
      YieldState::Tail => Step::Done(Ok(Value::Null)),
    }
  }
}
