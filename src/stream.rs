// Typed, filtered fan-out over the journal.
//
// A subscription is a FIFO queue fed with the event kinds it asked for.
// publish() broadcasts through the journal so every process sees the event,
// and also feeds local subscribers directly; the journal listener drops
// frames this stream published itself, so local subscribers see each event
// exactly once. publish_local() skips the journal entirely for events that
// carry in-process references.

use std::sync::{
  atomic::{AtomicBool, AtomicU64, Ordering},
  Arc, Mutex,
};
use std::thread::JoinHandle;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver as ChannelReceiver, Sender};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::{
  events::{Envelope, Event, EventKind, LocalEvent, LocalEventKind},
  journal::Journal,
};

struct Subscriber<K, E> {
  id: u64,
  kinds: Vec<K>,
  tx: Sender<E>,
}

struct Inner {
  origin: String,
  journal: Arc<dyn Journal>,
  subscribers: Mutex<Vec<Subscriber<EventKind, Event>>>,
  local_subscribers: Mutex<Vec<Subscriber<LocalEventKind, LocalEvent>>>,
  next_id: AtomicU64,
  down: AtomicBool,
  listener: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Stream {
  inner: Arc<Inner>,
}

impl Stream {
  pub fn new(journal: Arc<dyn Journal>) -> Self {
    let inner = Arc::new(Inner {
      origin: Uuid::new_v4().simple().to_string(),
      journal,
      subscribers: Mutex::new(Vec::new()),
      local_subscribers: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(1),
      down: AtomicBool::new(false),
      listener: Mutex::new(None),
    });

    let feed = inner.journal.subscribe();
    let listener_inner = Arc::clone(&inner);
    let listener = std::thread::Builder::new()
      .name("conveyor-journal".to_string())
      .spawn(move || Self::listen(&listener_inner, feed))
      .expect("spawning journal listener thread");
    *inner.listener.lock().unwrap_or_else(|p| p.into_inner()) = Some(listener);

    Self { inner }
  }

  /// Drain the journal, dispatching remote events to local subscribers.
  fn listen(inner: &Inner, feed: Box<dyn Iterator<Item = Bytes> + Send>) {
    for frame in feed {
      let envelope: Envelope = match serde_json::from_slice(&frame) {
        Ok(envelope) => envelope,
        Err(e) => {
          warn!("dropping malformed journal frame: {e}");
          continue;
        }
      };
      if envelope.origin == inner.origin {
        // Our own publication looping back; local subscribers already saw it.
        continue;
      }
      Self::dispatch(inner, envelope.event);
    }
    trace!("journal listener finished");
  }

  fn dispatch(inner: &Inner, event: Event) {
    // Snapshot under the lock, send outside it.
    let targets: Vec<Sender<Event>> = {
      let subscribers = inner.subscribers.lock().unwrap_or_else(|p| p.into_inner());
      subscribers
        .iter()
        .filter(|s| s.kinds.contains(&event.kind()))
        .map(|s| s.tx.clone())
        .collect()
    };
    for tx in targets {
      // A closed queue just means the subscriber went away.
      let _ = tx.send(event.clone());
    }
  }

  /// Subscribe to the given event kinds.
  pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription<Event> {
    let (tx, rx) = unbounded();
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .push(Subscriber {
        id,
        kinds: kinds.to_vec(),
        tx,
      });
    Subscription { id, rx }
  }

  /// Subscribe to in-process events.
  pub fn subscribe_local(&self, kinds: &[LocalEventKind]) -> Subscription<LocalEvent> {
    let (tx, rx) = unbounded();
    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
    self
      .inner
      .local_subscribers
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .push(Subscriber {
        id,
        kinds: kinds.to_vec(),
        tx,
      });
    Subscription { id, rx }
  }

  /// Close a subscription; its iterator ends once drained.
  pub fn unsubscribe<E>(&self, subscription: &Subscription<E>) {
    self.unsubscribe_by_id(subscription.id);
  }

  pub(crate) fn unsubscribe_by_id(&self, id: u64) {
    let mut subscribers = self.inner.subscribers.lock().unwrap_or_else(|p| p.into_inner());
    subscribers.retain(|s| s.id != id);
    drop(subscribers);
    let mut local = self
      .inner
      .local_subscribers
      .lock()
      .unwrap_or_else(|p| p.into_inner());
    local.retain(|s| s.id != id);
  }

  /// Publish to the whole fleet and to local subscribers.
  pub fn publish(&self, event: Event) {
    let envelope = Envelope::new(&self.inner.origin, event.clone());
    match serde_json::to_vec(&envelope) {
      Ok(frame) => {
        if let Err(e) = self.inner.journal.publish(Bytes::from(frame)) {
          // Best-effort bus: remote observers miss this one.
          debug!("journal publish failed: {e}");
        }
      }
      Err(e) => warn!("unserializable event {event:?}: {e}"),
    }
    Self::dispatch(&self.inner, event);
  }

  /// Publish to in-process subscribers only.
  pub fn publish_local(&self, event: LocalEvent) {
    let targets: Vec<Sender<LocalEvent>> = {
      let subscribers = self
        .inner
        .local_subscribers
        .lock()
        .unwrap_or_else(|p| p.into_inner());
      subscribers
        .iter()
        .filter(|s| s.kinds.contains(&event.kind()))
        .map(|s| s.tx.clone())
        .collect()
    };
    for tx in targets {
      let _ = tx.send(event.clone());
    }
  }

  /// Close every subscription and the journal. Idempotent.
  pub fn shutdown(&self) {
    if self.inner.down.swap(true, Ordering::AcqRel) {
      return;
    }
    debug!("stream shutting down");
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .clear();
    self
      .inner
      .local_subscribers
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .clear();
    self.inner.journal.shutdown();
    let listener = self
      .inner
      .listener
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .take();
    if let Some(listener) = listener {
      if listener.join().is_err() {
        error!("journal listener panicked");
      }
    }
  }
}

/// A FIFO queue of events matching a subscription's filter.
///
/// Iteration blocks for the next event and ends when the subscription is
/// closed by `unsubscribe` or stream shutdown.
pub struct Subscription<E> {
  id: u64,
  rx: ChannelReceiver<E>,
}

impl<E> Subscription<E> {
  pub(crate) fn id(&self) -> u64 {
    self.id
  }

  /// Next event, or None once the subscription is closed and drained.
  pub fn recv(&self) -> Option<E> {
    self.rx.recv().ok()
  }

  pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
    self.rx.iter()
  }

  pub(crate) fn channel(&self) -> &ChannelReceiver<E> {
    &self.rx
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mem::MemJournal;

  fn test_stream() -> Stream {
    Stream::new(Arc::new(MemJournal::new()))
  }

  #[test]
  fn subscription_filters_by_kind() {
    let stream = test_stream();
    let completions = stream.subscribe(&[EventKind::Completed]);

    stream.publish(Event::Started { id: "a".into() });
    stream.publish(Event::Completed {
      id: "a".into(),
      result: Ok(serde_json::Value::Null),
    });
    stream.shutdown();

    let seen: Vec<Event> = completions.iter().collect();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind(), EventKind::Completed);
  }

  #[test]
  fn unsubscribe_closes_the_queue() {
    let stream = test_stream();
    let events = stream.subscribe(EventKind::ALL);
    stream.unsubscribe(&events);
    stream.publish(Event::Started { id: "x".into() });
    assert!(events.recv().is_none());
    stream.shutdown();
  }

  #[test]
  fn remote_streams_see_published_events_once() {
    let journal = Arc::new(MemJournal::new());
    let here = Stream::new(Arc::clone(&journal) as Arc<dyn Journal>);
    let there = Stream::new(Arc::clone(&journal) as Arc<dyn Journal>);

    let local_view = here.subscribe(EventKind::ALL);
    let remote_view = there.subscribe(EventKind::ALL);

    here.publish(Event::Resumed { id: "r1".into() });

    assert_eq!(local_view.recv().unwrap().id(), "r1");
    assert_eq!(remote_view.recv().unwrap().id(), "r1");
    // And no duplicate from the loopback on the publishing side.
    assert!(local_view.channel().try_recv().is_err());

    here.shutdown();
    there.shutdown();
  }
}
