// What a suspended routine is waiting on.
//
// Submitting a suspension turns it into a Completion handle. The handle for
// a child invocation is wired to the journal (it fires on the Completed
// event for that id), the handle for a pause is wired to the timer wheel,
// and a gather composes the handles of its parts.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde_json::Value;

use crate::{
  completion::Completion,
  error::RoutineError,
  invocation::Invocation,
  runtime::Runtime,
};

#[derive(Debug, Clone)]
pub enum Suspension {
  /// Wait for another invocation to complete anywhere in the fleet.
  Invocation(Invocation),
  /// Wait out a wall-clock interval without holding broker capacity.
  Pause(Duration),
  /// Wait for all parts; values aggregate in order, the first error wins.
  Gather(Vec<Suspension>),
}

impl Suspension {
  /// Turn the suspension into a pending completion handle.
  ///
  /// For the Invocation variant the completion is registered with the
  /// runtime's handler before the child is enqueued, so the Completed event
  /// cannot race past the subscription.
  pub(crate) fn submit(&self, runtime: &Runtime) -> Completion {
    match self {
      Suspension::Invocation(invocation) => {
        match runtime.submit_with_completion(invocation) {
          Ok(completion) => completion,
          Err(e) => {
            warn!("child submit failed for {:?}: {e}", invocation.id);
            Completion::ready(Err(RoutineError::from_submit(&e)))
          }
        }
      }
      Suspension::Pause(duration) => runtime.schedule_pause(*duration),
      Suspension::Gather(parts) => Self::submit_gather(parts, runtime),
    }
  }

  fn submit_gather(parts: &[Suspension], runtime: &Runtime) -> Completion {
    let done = Completion::new();
    if parts.is_empty() {
      done.complete(Ok(Value::Array(Vec::new())));
      return done;
    }

    let slots: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(vec![None; parts.len()]));
    let remaining = Arc::new(AtomicUsize::new(parts.len()));

    for (index, part) in parts.iter().enumerate() {
      let part_done = part.submit(runtime);
      let done = done.clone();
      let slots = Arc::clone(&slots);
      let remaining = Arc::clone(&remaining);
      part_done.on_ready(move |outcome| match outcome {
        Ok(value) => {
          let mut slots_guard = slots.lock().unwrap_or_else(|p| p.into_inner());
          slots_guard[index] = Some(value.clone());
          drop(slots_guard);
          if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let slots_guard = slots.lock().unwrap_or_else(|p| p.into_inner());
            let values = slots_guard
              .iter()
              .map(|slot| slot.clone().unwrap_or(Value::Null))
              .collect();
            done.complete(Ok(Value::Array(values)));
          }
        }
        // Fail fast: Completion is first-wins, so later part results are moot.
        Err(e) => done.complete(Err(e.clone())),
      });
    }
    done
  }
}

impl fmt::Display for Suspension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Suspension::Invocation(inv) => write!(f, "invocation {}", inv.id),
      Suspension::Pause(d) => write!(f, "pause {d:?}"),
      Suspension::Gather(parts) => write!(f, "gather of {}", parts.len()),
    }
  }
}
