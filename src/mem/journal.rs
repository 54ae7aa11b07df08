use std::sync::{
  atomic::{AtomicBool, Ordering},
  Mutex,
};

use bytes::Bytes;
use crossbeam_channel::{unbounded, Sender};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  error::JournalError,
  journal::Journal,
};

/// Process-local journal: every subscriber gets every frame published after
/// it subscribed. Frames are never stored.
pub struct MemJournal {
  subscribers: Mutex<Vec<Sender<Bytes>>>,
  down: AtomicBool,
}

impl MemJournal {
  pub fn new() -> Self {
    Self {
      subscribers: Mutex::new(Vec::new()),
      down: AtomicBool::new(false),
    }
  }
}

impl Default for MemJournal {
  fn default() -> Self {
    Self::new()
  }
}

impl Journal for MemJournal {
  fn subscribe(&self) -> Box<dyn Iterator<Item = Bytes> + Send> {
    let (tx, rx) = unbounded();
    if self.down.load(Ordering::Acquire) {
      // Sender dropped here: the iterator ends immediately.
      drop(tx);
    } else {
      self
        .subscribers
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .push(tx);
    }
    Box::new(rx.into_iter())
  }

  fn publish(&self, frame: Bytes) -> Result<(), JournalError> {
    if self.down.load(Ordering::Acquire) {
      return Err(JournalError::Shutdown);
    }
    let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
    subscribers.retain(|tx| tx.send(frame.clone()).is_ok());
    Ok(())
  }

  fn shutdown(&self) {
    if self.down.swap(true, Ordering::AcqRel) {
      return;
    }
    debug!("mem journal shutting down");
    // Dropping the senders ends every subscription iterator.
    self
      .subscribers
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_subscriber_sees_every_frame() {
    let journal = MemJournal::new();
    let mut a = journal.subscribe();
    let mut b = journal.subscribe();

    journal.publish(Bytes::from_static(b"one")).unwrap();
    journal.publish(Bytes::from_static(b"two")).unwrap();

    assert_eq!(a.next().unwrap(), Bytes::from_static(b"one"));
    assert_eq!(b.next().unwrap(), Bytes::from_static(b"one"));
    assert_eq!(a.next().unwrap(), Bytes::from_static(b"two"));
    assert_eq!(b.next().unwrap(), Bytes::from_static(b"two"));
  }

  #[test]
  fn shutdown_ends_subscriptions_and_rejects_publish() {
    let journal = MemJournal::new();
    let mut feed = journal.subscribe();
    journal.shutdown();
    journal.shutdown(); // idempotent

    assert!(feed.next().is_none());
    assert!(matches!(
      journal.publish(Bytes::from_static(b"late")),
      Err(JournalError::Shutdown)
    ));
  }
}
