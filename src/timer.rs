// Timer wheel for Pause suspensions.
//
// One thread sleeps until the earliest deadline and resolves the attached
// completion with Ok(null). cancel_all aborts every pending pause with an
// interrupted error but keeps the wheel usable; shutdown ends the thread.

use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde_json::Value;

use crate::{completion::Completion, error::RoutineError};

struct Entry {
  deadline: Instant,
  seq: u64,
  completion: Completion,
}

// BinaryHeap is a max-heap; invert so the earliest deadline surfaces first.
impl Ord for Entry {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    other
      .deadline
      .cmp(&self.deadline)
      .then(other.seq.cmp(&self.seq))
  }
}

impl PartialOrd for Entry {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for Entry {
  fn eq(&self, other: &Self) -> bool {
    self.seq == other.seq
  }
}

impl Eq for Entry {}

struct State {
  entries: BinaryHeap<Entry>,
  next_seq: u64,
  down: bool,
}

struct Inner {
  state: Mutex<State>,
  changed: Condvar,
}

pub(crate) struct Timers {
  inner: Arc<Inner>,
  thread: Mutex<Option<JoinHandle<()>>>,
}

impl Timers {
  pub fn new() -> Self {
    let inner = Arc::new(Inner {
      state: Mutex::new(State {
        entries: BinaryHeap::new(),
        next_seq: 0,
        down: false,
      }),
      changed: Condvar::new(),
    });
    let run_inner = Arc::clone(&inner);
    let thread = std::thread::Builder::new()
      .name("conveyor-timer".to_string())
      .spawn(move || Self::run(&run_inner))
      .expect("spawning timer thread");
    Self {
      inner,
      thread: Mutex::new(Some(thread)),
    }
  }

  fn run(inner: &Inner) {
    let mut state = inner.state.lock().unwrap_or_else(|p| p.into_inner());
    loop {
      if state.down {
        return;
      }
      let now = Instant::now();
      // Resolve everything due, collecting outside-lock work.
      let mut due = Vec::new();
      while state
        .entries
        .peek()
        .is_some_and(|entry| entry.deadline <= now)
      {
        due.push(state.entries.pop().expect("peeked entry").completion);
      }
      if !due.is_empty() {
        drop(state);
        for completion in due {
          completion.complete(Ok(Value::Null));
        }
        state = inner.state.lock().unwrap_or_else(|p| p.into_inner());
        continue;
      }
      state = match state.entries.peek() {
        Some(entry) => {
          let timeout = entry.deadline.saturating_duration_since(now);
          inner
            .changed
            .wait_timeout(state, timeout)
            .unwrap_or_else(|p| p.into_inner())
            .0
        }
        None => inner.changed.wait(state).unwrap_or_else(|p| p.into_inner()),
      };
    }
  }

  /// Completion resolving Ok(null) once `duration` elapses.
  pub fn schedule(&self, duration: Duration) -> Completion {
    let completion = Completion::new();
    let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
    if state.down {
      completion.complete(Err(RoutineError::interrupted("pause")));
      return completion;
    }
    let seq = state.next_seq;
    state.next_seq += 1;
    state.entries.push(Entry {
      deadline: Instant::now() + duration,
      seq,
      completion: completion.clone(),
    });
    self.inner.changed.notify_one();
    completion
  }

  /// Abort all pending pauses with an interrupted error.
  pub fn cancel_all(&self) {
    let drained = {
      let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
      std::mem::take(&mut state.entries)
    };
    for entry in drained {
      entry.completion.complete(Err(RoutineError::interrupted("pause")));
    }
  }

  /// Cancel pending pauses and stop the thread. Idempotent.
  pub fn shutdown(&self) {
    {
      let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
      if state.down {
        return;
      }
      state.down = true;
      self.inner.changed.notify_all();
    }
    self.cancel_all();
    let thread = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(thread) = thread {
      if thread.join().is_err() {
        error!("timer thread panicked");
      }
    }
  }
}
