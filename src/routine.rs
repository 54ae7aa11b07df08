// Routines and the state-machine interface the runner drives.
//
// A routine comes in two shapes. A plain routine computes its value in one
// go on the runner thread. A step-wise routine hands back a Stepper: a state
// machine that yields Suspensions and is resumed with the outcome of each,
// so it can await child invocations, pauses, and gathers without occupying
// a runner thread in between.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::{error::RoutineError, suspension::Suspension};

/// Keyword arguments of an invocation.
pub type Kwargs = BTreeMap<String, Value>;

/// What a routine ultimately produces.
pub type Outcome = Result<Value, RoutineError>;

/// One step of a suspendable routine.
pub enum Step {
  /// The routine awaits this suspension; drive it again with the result.
  Suspend(Suspension),
  /// The routine is finished.
  Done(Outcome),
}

/// The generator interface of a step-wise routine.
///
/// `resume` receives the outcome of the previous suspension: `Ok` injects a
/// value, `Err` throws the child's failure into the routine. The first call
/// always receives `Ok(Value::Null)`.
pub trait Stepper: Send {
  fn resume(&mut self, input: Outcome) -> Step;
}

/// Shared handle to an in-flight routine state machine.
///
/// Exactly one of these exists per suspended invocation; clones refer to the
/// same generator. Only the runner that dequeued the continuation actually
/// steps it, so the inner lock is uncontended by construction.
#[derive(Clone)]
pub struct StepHandle(Arc<Mutex<Box<dyn Stepper>>>);

impl StepHandle {
  pub fn new(stepper: Box<dyn Stepper>) -> Self {
    Self(Arc::new(Mutex::new(stepper)))
  }

  pub(crate) fn resume(&self, input: Outcome) -> Step {
    match self.0.lock() {
      Ok(mut stepper) => stepper.resume(input),
      // A poisoned lock means a previous resume panicked; the routine is dead.
      Err(_) => Step::Done(Err(RoutineError::panicked(
        "routine state machine poisoned by an earlier panic".to_string(),
      ))),
    }
  }
}

impl fmt::Debug for StepHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<StepHandle {:p}>", Arc::as_ptr(&self.0))
  }
}

type PlainFn = dyn Fn(&[Value], &Kwargs) -> Outcome + Send + Sync;
type StepwiseFn = dyn Fn(&[Value], &Kwargs) -> Box<dyn Stepper> + Send + Sync;

pub enum RoutineBody {
  Plain(Box<PlainFn>),
  Stepwise(Box<StepwiseFn>),
}

/// A named callable bound to the queue its invocations are enqueued on.
pub struct Routine {
  pub name: String,
  pub queue: String,
  pub body: RoutineBody,
}

impl Routine {
  pub fn plain(
    name: impl Into<String>,
    queue: impl Into<String>,
    f: impl Fn(&[Value], &Kwargs) -> Outcome + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      queue: queue.into(),
      body: RoutineBody::Plain(Box::new(f)),
    }
  }

  pub fn stepwise(
    name: impl Into<String>,
    queue: impl Into<String>,
    f: impl Fn(&[Value], &Kwargs) -> Box<dyn Stepper> + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      queue: queue.into(),
      body: RoutineBody::Stepwise(Box::new(f)),
    }
  }
}

impl fmt::Debug for Routine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let shape = match self.body {
      RoutineBody::Plain(_) => "plain",
      RoutineBody::Stepwise(_) => "stepwise",
    };
    f.debug_struct("Routine")
      .field("name", &self.name)
      .field("queue", &self.queue)
      .field("shape", &shape)
      .finish()
  }
}
