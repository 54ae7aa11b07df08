// The runtime ties a broker, a journal-backed stream, and a routine registry
// together. It is the submission surface for producers and the factory for
// worker consumers; one process typically holds one runtime in an Arc shared
// by its workers and submitters.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};
use std::time::Duration;

use bytes::Bytes;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde_json::Value;

use crate::{
  broker::Broker,
  completion::Completion,
  config,
  consumer::Consumer,
  error::{BrokerResult, ConfigResult, RegistryError, RoutineError, SubmitError},
  events::{Event, EventKind, LocalEventKind},
  handler::InvocationHandler,
  invocation::Invocation,
  journal::Journal,
  queuespec::QueueSpec,
  registry::Registry,
  routine::Routine,
  stream::{Stream, Subscription},
  timer::Timers,
};

pub struct Runtime {
  broker: Arc<dyn Broker>,
  stream: Stream,
  registry: Registry,
  handler: InvocationHandler,
  timers: Timers,
  down: AtomicBool,
}

impl Runtime {
  pub fn new(broker: Arc<dyn Broker>, journal: Arc<dyn Journal>, registry: Registry) -> Self {
    let stream = Stream::new(journal);
    let handler = InvocationHandler::new(stream.clone());
    Self {
      broker,
      stream,
      registry,
      handler,
      timers: Timers::new(),
      down: AtomicBool::new(false),
    }
  }

  /// Build from the environment / project configuration.
  pub fn from_config(registry: Registry) -> ConfigResult<Self> {
    let settings = config::load()?;
    let (broker, journal) = config::open_transport(&settings)?;
    Ok(Self::new(broker, journal, registry))
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn routine(&self, name: &str) -> Result<Arc<Routine>, RegistryError> {
    self.registry.get(name)
  }

  /// Submit an invocation to run in the background.
  ///
  /// Publishes Submitted, then enqueues on the routine's queue.
  pub fn submit(&self, invocation: &Invocation) -> Result<(), SubmitError> {
    let routine = self.registry.get(&invocation.routine)?;
    self.stream.publish(Event::Submitted {
      id: invocation.id.clone(),
      routine: invocation.routine.clone(),
      args: invocation.args.clone(),
      kwargs: invocation.kwargs.clone(),
      priority: invocation.priority,
    });
    self.broker.enqueue(
      Bytes::from(invocation.serialize()),
      &routine.queue,
      invocation.priority,
    )?;
    debug!(
      "submitted {:?} to queue {:?} at priority {}",
      invocation.id, routine.queue, invocation.priority
    );
    Ok(())
  }

  /// Submit and get the handle that resolves on the Completed event.
  ///
  /// The handle is registered before the enqueue so a completion from a fast
  /// remote worker cannot slip past.
  pub(crate) fn submit_with_completion(
    &self,
    invocation: &Invocation,
  ) -> Result<Completion, SubmitError> {
    let completion = self.handler.register(&invocation.id);
    match self.submit(invocation) {
      Ok(()) => Ok(completion),
      Err(e) => {
        self.handler.deregister(&invocation.id);
        Err(e)
      }
    }
  }

  /// Submit and block until the invocation completes somewhere in the fleet.
  pub fn run(&self, invocation: &Invocation) -> Result<Value, RoutineError> {
    let completion = self
      .submit_with_completion(invocation)
      .map_err(|e| RoutineError::from_submit(&e))?;
    completion.wait()
  }

  pub(crate) fn schedule_pause(&self, duration: Duration) -> Completion {
    self.timers.schedule(duration)
  }

  pub(crate) fn cancel_timers(&self) {
    self.timers.cancel_all();
  }

  pub fn create(&self, queue: &str) -> BrokerResult<()> {
    self.broker.create(queue)
  }

  pub fn delete(&self, queue: &str) -> BrokerResult<()> {
    self.broker.delete(queue)
  }

  pub fn purge(&self, queue: &str) -> BrokerResult<()> {
    self.broker.purge(queue)
  }

  pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription<Event> {
    self.stream.subscribe(kinds)
  }

  pub fn unsubscribe<E>(&self, subscription: &Subscription<E>) {
    self.stream.unsubscribe(subscription);
  }

  pub(crate) fn subscribe_local(
    &self,
    kinds: &[LocalEventKind],
  ) -> Subscription<crate::events::LocalEvent> {
    self.stream.subscribe_local(kinds)
  }

  /// Open a consumer over the given queuespec.
  pub fn consume(&self, queuespec: &QueueSpec) -> BrokerResult<Consumer> {
    let receiver = self.broker.receive(queuespec)?;
    Ok(Consumer::new(self.stream.clone(), receiver))
  }

  /// Shut down broker, stream/journal, completion routing, and timers.
  /// Idempotent and safe from any thread.
  pub fn shutdown(&self) {
    if self.down.swap(true, Ordering::AcqRel) {
      return;
    }
    info!("runtime shutting down");
    self.broker.shutdown();
    self.stream.shutdown();
    self.handler.shutdown();
    self.timers.shutdown();
  }
}
