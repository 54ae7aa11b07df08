// The in-memory receiver: fair weighted round-robin with priority-first
// selection and prefetch capacity.
//
// The queuespec's queue list is kept as a ring whose start is randomized at
// construction so a fleet of workers does not herd onto the same queue.
// Selection scans priorities from high to low across the whole ring, so a
// ready high-priority message in any listed queue beats every lower
// priority; ties go to the earliest ring position. After a message from
// ring position k is taken the ring rotates by k+1, which keeps persistently
// empty queues from skewing the distribution.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, MutexGuard,
  },
};

use bytes::Bytes;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use rand::Rng;

use crate::{
  broker::PRIORITY_LEVELS,
  message::Message,
  queuespec::QueueSpec,
  receiver::Receiver,
};
use super::broker::{QueueSlots, Shared};

struct State {
  ring: VecDeque<String>,
  /// Spare prefetch capacity. Goes negative only transiently under the lock.
  capacity: i64,
}

pub(crate) struct MemReceiver {
  shared: Arc<Shared>,
  state: Mutex<State>,
  /// Signalled when capacity is returned or the receiver shuts down.
  capacity_available: Condvar,
  down: AtomicBool,
}

impl MemReceiver {
  pub(super) fn new(shared: Arc<Shared>, queuespec: &QueueSpec) -> Self {
    let mut ring: VecDeque<String> = queuespec.queues.iter().cloned().collect();
    let offset = rand::rng().random_range(0..ring.len());
    ring.rotate_left(offset);
    Self {
      shared,
      state: Mutex::new(State {
        ring,
        capacity: queuespec.concurrency as i64,
      }),
      capacity_available: Condvar::new(),
      down: AtomicBool::new(false),
    }
  }

  fn is_down(&self) -> bool {
    self.down.load(Ordering::Acquire) || self.shared.down.load(Ordering::Acquire)
  }

  fn lock_state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|p| p.into_inner())
  }

  /// Highest-priority ready message across the ring; ties broken by ring
  /// position. Returns the winning position and the body.
  fn take_ready(
    queues: &mut HashMap<String, QueueSlots>,
    ring: &[String],
  ) -> Option<(usize, Bytes)> {
    for priority in (0..PRIORITY_LEVELS as usize).rev() {
      for (position, name) in ring.iter().enumerate() {
        if let Some(slots) = queues.get_mut(name) {
          if let Some(body) = slots[priority].pop_front() {
            return Some((position, body));
          }
        }
      }
    }
    None
  }
}

impl Receiver for MemReceiver {
  fn recv(&self) -> Option<Message> {
    // Take a capacity slot first; the broker must not over-deliver.
    let ring: Vec<String> = {
      let mut state = self.lock_state();
      while state.capacity <= 0 && !self.is_down() {
        state = self
          .capacity_available
          .wait(state)
          .unwrap_or_else(|p| p.into_inner());
      }
      if self.is_down() {
        return None;
      }
      state.capacity -= 1;
      state.ring.iter().cloned().collect()
    };

    // Then wait for a message, without holding the receiver state lock.
    let mut queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    let (position, body) = loop {
      if self.is_down() {
        return None;
      }
      if let Some(found) = Self::take_ready(&mut queues, &ring) {
        break found;
      }
      queues = self
        .shared
        .available
        .wait(queues)
        .unwrap_or_else(|p| p.into_inner());
    };
    drop(queues);

    // Rotate past the queue that actually supplied the message.
    let mut state = self.lock_state();
    let len = state.ring.len();
    state.ring.rotate_left((position + 1) % len);
    drop(state);

    trace!("delivering from ring position {position}");
    Some(Message::deliver(body))
  }

  fn pause(&self, _message: &Message) {
    if self.is_down() {
      return;
    }
    let mut state = self.lock_state();
    state.capacity += 1;
    self.capacity_available.notify_one();
  }

  fn unpause(&self, _message: &Message) {
    if self.is_down() {
      return;
    }
    let mut state = self.lock_state();
    state.capacity -= 1;
  }

  fn finish(&self, _message: &Message) {
    // No explicit acknowledgement to send: delivery already removed the
    // body, so finishing only returns the capacity slot.
    if self.is_down() {
      return;
    }
    let mut state = self.lock_state();
    state.capacity += 1;
    self.capacity_available.notify_one();
  }

  fn shutdown(&self) {
    if self.down.swap(true, Ordering::AcqRel) {
      return;
    }
    // Take each lock once so no waiter can miss the flag between its check
    // and its wait.
    let _state = self.lock_state();
    self.capacity_available.notify_all();
    drop(_state);
    let _queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    self.shared.available.notify_all();
  }
}
