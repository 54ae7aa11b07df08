// Completion: the handle a submitted suspension resolves through.
//
// One side completes it with an Outcome, the other either blocks on wait()
// or registers a callback. Completion is first-wins: once resolved, later
// resolutions are dropped, which is what lets a Gather fail fast on the
// first error without racing its remaining children.

use std::sync::{Arc, Condvar, Mutex};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::routine::Outcome;

type Callback = Box<dyn FnOnce(&Outcome) + Send>;

enum State {
  Pending(Vec<Callback>),
  Ready(Outcome),
}

struct Inner {
  state: Mutex<State>,
  cond: Condvar,
}

#[derive(Clone)]
pub struct Completion {
  inner: Arc<Inner>,
}

impl Completion {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(State::Pending(Vec::new())),
        cond: Condvar::new(),
      }),
    }
  }

  /// Immediately resolved completion.
  pub fn ready(outcome: Outcome) -> Self {
    let completion = Self::new();
    completion.complete(outcome);
    completion
  }

  /// Resolve with `outcome`. First resolution wins; the rest are no-ops.
  pub fn complete(&self, outcome: Outcome) {
    let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
    let callbacks = match &mut *state {
      State::Ready(_) => {
        trace!("completion already resolved, dropping {outcome:?}");
        return;
      }
      State::Pending(callbacks) => std::mem::take(callbacks),
    };
    *state = State::Ready(outcome.clone());
    self.inner.cond.notify_all();
    drop(state);
    // Callbacks run outside the lock; they may take other locks.
    for callback in callbacks {
      callback(&outcome);
    }
  }

  /// Run `f` with the outcome, now if already resolved, otherwise at
  /// resolution time on whichever thread resolves it.
  pub fn on_ready(&self, f: impl FnOnce(&Outcome) + Send + 'static) {
    let ready = {
      let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
      match &mut *state {
        State::Pending(callbacks) => {
          callbacks.push(Box::new(f));
          return;
        }
        State::Ready(outcome) => outcome.clone(),
      }
    };
    f(&ready);
  }

  /// Block until resolved.
  pub fn wait(&self) -> Outcome {
    let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
    loop {
      match &*state {
        State::Ready(outcome) => return outcome.clone(),
        State::Pending(_) => {
          state = self
            .inner
            .cond
            .wait(state)
            .unwrap_or_else(|p| p.into_inner());
        }
      }
    }
  }

  pub fn is_ready(&self) -> bool {
    matches!(
      &*self.inner.state.lock().unwrap_or_else(|p| p.into_inner()),
      State::Ready(_)
    )
  }
}

impl Default for Completion {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::thread;
  use std::time::Duration;

  use serde_json::Value;

  use super::*;
  use crate::error::RoutineError;

  #[test]
  fn wait_sees_value_completed_from_another_thread() {
    let completion = Completion::new();
    let remote = completion.clone();
    thread::spawn(move || {
      thread::sleep(Duration::from_millis(20));
      remote.complete(Ok(Value::from("done")));
    });
    assert_eq!(completion.wait(), Ok(Value::from("done")));
  }

  #[test]
  fn first_resolution_wins() {
    let completion = Completion::new();
    completion.complete(Err(RoutineError::new("first", "first")));
    completion.complete(Ok(Value::Null));
    assert!(completion.wait().is_err());
  }

  #[test]
  fn callbacks_fire_exactly_once_whether_early_or_late() {
    let fired = Arc::new(AtomicUsize::new(0));

    let completion = Completion::new();
    let counter = Arc::clone(&fired);
    completion.on_ready(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });
    completion.complete(Ok(Value::Null));
    completion.complete(Ok(Value::Null));

    // Registered after resolution: runs immediately.
    let counter = Arc::clone(&fired);
    completion.on_ready(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fired.load(Ordering::SeqCst), 2);
  }
}
