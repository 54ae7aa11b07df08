// Local-completion routing: the piece that turns "a Completed event for id X
// appeared on the stream" into "the completion handle someone is holding for
// X resolves".
//
// The subscription exists for the whole runtime lifetime and a handle is
// registered before its invocation is enqueued, so a completion racing in
// from a fast remote worker cannot be missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::{
  completion::Completion,
  error::RoutineError,
  events::{Event, EventKind},
  stream::Stream,
};

pub(crate) struct InvocationHandler {
  waiting: Arc<Mutex<HashMap<String, Completion>>>,
  stream: Stream,
  subscription_id: u64,
  resolver: Mutex<Option<JoinHandle<()>>>,
}

impl InvocationHandler {
  pub fn new(stream: Stream) -> Self {
    let waiting: Arc<Mutex<HashMap<String, Completion>>> = Arc::new(Mutex::new(HashMap::new()));
    let subscription = stream.subscribe(&[EventKind::Completed]);
    let subscription_id = subscription.id();

    let resolver_waiting = Arc::clone(&waiting);
    let resolver = std::thread::Builder::new()
      .name("conveyor-resolver".to_string())
      .spawn(move || {
        while let Some(event) = subscription.recv() {
          if let Event::Completed { id, result } = event {
            let handle = resolver_waiting
              .lock()
              .unwrap_or_else(|p| p.into_inner())
              .remove(&id);
            match handle {
              Some(completion) => completion.complete(result),
              None => trace!("completion for {id} with no local waiter"),
            }
          }
        }
        trace!("resolver finished");
      })
      .expect("spawning resolver thread");

    Self {
      waiting,
      stream,
      subscription_id,
      resolver: Mutex::new(Some(resolver)),
    }
  }

  /// Register interest in `invocation_id`. Call before enqueueing.
  pub fn register(&self, invocation_id: &str) -> Completion {
    let completion = Completion::new();
    self
      .waiting
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .insert(invocation_id.to_string(), completion.clone());
    completion
  }

  /// Forget a registration whose enqueue failed.
  pub fn deregister(&self, invocation_id: &str) {
    self
      .waiting
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .remove(invocation_id);
  }

  /// Close the subscription; pending waiters resolve with an interrupted
  /// error rather than blocking forever.
  pub fn shutdown(&self) {
    self.stream.unsubscribe_by_id(self.subscription_id);
    let resolver = self.resolver.lock().unwrap_or_else(|p| p.into_inner()).take();
    if let Some(resolver) = resolver {
      if resolver.join().is_err() {
        error!("resolver thread panicked");
      }
    }
    let abandoned = std::mem::take(&mut *self.waiting.lock().unwrap_or_else(|p| p.into_inner()));
    for (id, completion) in abandoned {
      debug!("abandoning waiter for {id}");
      completion.complete(Err(RoutineError::interrupted("completion wait")));
    }
  }
}
