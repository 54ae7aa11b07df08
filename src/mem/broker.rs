use std::{
  collections::{HashMap, VecDeque},
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
  },
};

use bytes::Bytes;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  broker::{Broker, PRIORITY_LEVELS},
  error::{BrokerError, BrokerResult},
  queuespec::QueueSpec,
  receiver::Receiver,
};
use super::receiver::MemReceiver;

/// One named queue: a sub-queue per priority level.
pub(super) type QueueSlots = [VecDeque<Bytes>; PRIORITY_LEVELS as usize];

/// State shared between the broker and its receivers.
pub(super) struct Shared {
  pub(super) queues: Mutex<HashMap<String, QueueSlots>>,
  /// Signalled on every enqueue and at shutdown.
  pub(super) available: Condvar,
  pub(super) down: AtomicBool,
}

/// Process-local broker.
pub struct MemBroker {
  shared: Arc<Shared>,
  receivers: Mutex<Vec<Arc<MemReceiver>>>,
}

impl MemBroker {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(Shared {
        queues: Mutex::new(HashMap::new()),
        available: Condvar::new(),
        down: AtomicBool::new(false),
      }),
      receivers: Mutex::new(Vec::new()),
    }
  }

  fn guard_open(&self) -> BrokerResult<()> {
    if self.shared.down.load(Ordering::Acquire) {
      Err(BrokerError::Shutdown)
    } else {
      Ok(())
    }
  }
}

impl Default for MemBroker {
  fn default() -> Self {
    Self::new()
  }
}

impl Broker for MemBroker {
  fn enqueue(&self, body: Bytes, queue: &str, priority: u8) -> BrokerResult<()> {
    self.guard_open()?;
    if priority >= PRIORITY_LEVELS {
      return Err(BrokerError::PriorityOutOfRange {
        priority,
        limit: PRIORITY_LEVELS,
      });
    }
    let mut queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    let slots = queues.get_mut(queue).ok_or_else(|| BrokerError::QueueMissing {
      queue: queue.to_string(),
    })?;
    slots[priority as usize].push_back(body);
    self.shared.available.notify_all();
    Ok(())
  }

  fn create(&self, queue: &str) -> BrokerResult<()> {
    self.guard_open()?;
    let mut queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    queues
      .entry(queue.to_string())
      .or_insert_with(|| std::array::from_fn(|_| VecDeque::new()));
    Ok(())
  }

  fn delete(&self, queue: &str) -> BrokerResult<()> {
    self.guard_open()?;
    let mut queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    queues
      .remove(queue)
      .map(|_| ())
      .ok_or_else(|| BrokerError::QueueMissing {
        queue: queue.to_string(),
      })
  }

  fn purge(&self, queue: &str) -> BrokerResult<()> {
    self.guard_open()?;
    let mut queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    let slots = queues.get_mut(queue).ok_or_else(|| BrokerError::QueueMissing {
      queue: queue.to_string(),
    })?;
    for slot in slots.iter_mut() {
      slot.clear();
    }
    Ok(())
  }

  fn receive(&self, queuespec: &QueueSpec) -> BrokerResult<Arc<dyn Receiver>> {
    self.guard_open()?;
    if queuespec.queues.is_empty() {
      return Err(BrokerError::EmptyQueueSpec);
    }
    {
      let queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
      for name in &queuespec.queues {
        if !queues.contains_key(name) {
          return Err(BrokerError::QueueMissing {
            queue: name.clone(),
          });
        }
      }
    }
    let receiver = Arc::new(MemReceiver::new(Arc::clone(&self.shared), queuespec));
    self
      .receivers
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .push(Arc::clone(&receiver));
    Ok(receiver)
  }

  fn shutdown(&self) {
    if self.shared.down.swap(true, Ordering::AcqRel) {
      return;
    }
    debug!("mem broker shutting down");
    // Wake receivers blocked on capacity first, then on message arrival.
    let receivers = std::mem::take(&mut *self.receivers.lock().unwrap_or_else(|p| p.into_inner()));
    for receiver in receivers {
      receiver.shutdown();
    }
    let mut queues = self.shared.queues.lock().unwrap_or_else(|p| p.into_inner());
    queues.clear();
    self.shared.available.notify_all();
  }
}
