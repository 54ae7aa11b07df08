// The worker's internal task queue. Unbounded FIFO with an immediate
// shutdown: pending items are discarded and every blocked pop wakes up.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct State<T> {
  items: VecDeque<T>,
  down: bool,
}

pub(crate) struct TaskQueue<T> {
  state: Mutex<State<T>>,
  ready: Condvar,
}

/// Returned by push once the queue has shut down.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ShutDown;

impl<T> TaskQueue<T> {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State {
        items: VecDeque::new(),
        down: false,
      }),
      ready: Condvar::new(),
    }
  }

  pub fn push(&self, item: T) -> Result<(), ShutDown> {
    let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
    if state.down {
      return Err(ShutDown);
    }
    state.items.push_back(item);
    self.ready.notify_one();
    Ok(())
  }

  /// Block for the next item; None once shut down.
  pub fn pop(&self) -> Option<T> {
    let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
    loop {
      if state.down {
        return None;
      }
      if let Some(item) = state.items.pop_front() {
        return Some(item);
      }
      state = self.ready.wait(state).unwrap_or_else(|p| p.into_inner());
    }
  }

  /// Immediate shutdown: discard pending items, wake all poppers. Idempotent.
  pub fn shutdown(&self) {
    let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
    state.down = true;
    state.items.clear();
    self.ready.notify_all();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::thread;
  use std::time::Duration;

  use super::*;

  #[test]
  fn fifo_order() {
    let q = TaskQueue::new();
    q.push(1).unwrap();
    q.push(2).unwrap();
    assert_eq!(q.pop(), Some(1));
    assert_eq!(q.pop(), Some(2));
  }

  #[test]
  fn shutdown_wakes_blocked_pop_and_rejects_push() {
    let q = Arc::new(TaskQueue::<u32>::new());
    let popper = {
      let q = Arc::clone(&q);
      thread::spawn(move || q.pop())
    };
    thread::sleep(Duration::from_millis(20));
    q.shutdown();
    assert_eq!(popper.join().unwrap(), None);
    assert_eq!(q.push(3), Err(ShutDown));
  }

  #[test]
  fn shutdown_discards_pending_items() {
    let q = TaskQueue::new();
    q.push("left behind").unwrap();
    q.shutdown();
    assert_eq!(q.pop(), None);
  }
}
