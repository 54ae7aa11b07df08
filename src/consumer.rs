// The lifecycle bridge between a receiver and the stream.
//
// Each delivered body becomes an Invocation; the consumer remembers which
// broker message carried it so acknowledgement and capacity changes land on
// the right delivery. Every lifecycle method publishes its event before
// touching the receiver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde_json::Value;

use crate::{
  context::TaskContext,
  error::RoutineError,
  events::{Event, LocalEvent},
  invocation::Invocation,
  message::Message,
  receiver::Receiver,
  routine::StepHandle,
  stream::Stream,
  suspension::Suspension,
};

pub struct Consumer {
  stream: Stream,
  receiver: Arc<dyn Receiver>,
  inflight: Mutex<HashMap<String, Message>>,
}

impl Consumer {
  pub(crate) fn new(stream: Stream, receiver: Arc<dyn Receiver>) -> Self {
    Self {
      stream,
      receiver,
      inflight: Mutex::new(HashMap::new()),
    }
  }

  /// Next deliverable invocation; None once the receiver shuts down.
  ///
  /// A body that does not parse is acknowledged and dropped: the broker
  /// redelivers at-least-once, so leaving it unacked would loop forever.
  pub fn next_invocation(&self) -> Option<Invocation> {
    loop {
      let message = self.receiver.recv()?;
      match Invocation::deserialize(message.body()) {
        Ok(invocation) => {
          self
            .inflight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(invocation.id.clone(), message);
          return Some(invocation);
        }
        Err(e) => {
          error!("discarding undeserializable message {}: {e}", message.delivery());
          self.receiver.finish(&message);
        }
      }
    }
  }

  fn message_of(&self, invocation: &Invocation) -> Option<Message> {
    self
      .inflight
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .get(&invocation.id)
      .cloned()
  }

  fn take_message(&self, invocation: &Invocation) -> Option<Message> {
    self
      .inflight
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .remove(&invocation.id)
  }

  /// Signal that the invocation is starting.
  pub fn start(&self, invocation: &Invocation) {
    self.stream.publish(Event::Started {
      id: invocation.id.clone(),
    });
  }

  /// Signal that the invocation has suspended; its slot is released.
  pub fn suspend(
    &self,
    invocation: &Invocation,
    step: &StepHandle,
    suspension: Suspension,
    context: TaskContext,
  ) {
    self.stream.publish(Event::Suspended {
      id: invocation.id.clone(),
    });
    self.stream.publish_local(LocalEvent::Suspended {
      id: invocation.id.clone(),
      invocation: invocation.clone(),
      step: step.clone(),
      suspension,
      context,
    });
    match self.message_of(invocation) {
      Some(message) => self.receiver.pause(&message),
      None => warn!("suspend for unknown invocation {}", invocation.id),
    }
  }

  /// Signal that the awaited suspension resolved to a value; the slot is
  /// reclaimed ahead of the resume.
  pub fn resolve(&self, invocation: &Invocation, step: &StepHandle, value: Value) {
    self.stream.publish(Event::Continued {
      id: invocation.id.clone(),
      value: value.clone(),
    });
    self.stream.publish_local(LocalEvent::Continued {
      id: invocation.id.clone(),
      step: step.clone(),
      value,
    });
    match self.message_of(invocation) {
      Some(message) => self.receiver.unpause(&message),
      None => warn!("resolve for unknown invocation {}", invocation.id),
    }
  }

  /// Signal that the awaited suspension failed; the slot is reclaimed so the
  /// error can be thrown into the routine.
  pub fn throw(&self, invocation: &Invocation, step: &StepHandle, error: RoutineError) {
    self.stream.publish(Event::Threw {
      id: invocation.id.clone(),
      error: error.clone(),
    });
    self.stream.publish_local(LocalEvent::Threw {
      id: invocation.id.clone(),
      step: step.clone(),
      error,
    });
    match self.message_of(invocation) {
      Some(message) => self.receiver.unpause(&message),
      None => warn!("throw for unknown invocation {}", invocation.id),
    }
  }

  /// Signal that the invocation is resuming on a runner.
  pub fn resume(&self, invocation: &Invocation) {
    self.stream.publish(Event::Resumed {
      id: invocation.id.clone(),
    });
  }

  /// Signal completion with a value and acknowledge the message.
  pub fn succeed(&self, invocation: &Invocation, value: Value) {
    self.stream.publish(Event::Completed {
      id: invocation.id.clone(),
      result: Ok(value),
    });
    match self.take_message(invocation) {
      Some(message) => self.receiver.finish(&message),
      None => warn!("completion for unknown invocation {}", invocation.id),
    }
  }

  /// Signal completion with an error and acknowledge the message.
  pub fn error(&self, invocation: &Invocation, error: RoutineError) {
    self.stream.publish(Event::Completed {
      id: invocation.id.clone(),
      result: Err(error),
    });
    match self.take_message(invocation) {
      Some(message) => self.receiver.finish(&message),
      None => warn!("completion for unknown invocation {}", invocation.id),
    }
  }
}
