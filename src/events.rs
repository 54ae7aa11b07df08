// Lifecycle events published on the stream.
//
// Wire events (Event) are serializable and travel over the journal to every
// process. Local events (LocalEvent) carry live references to the routine
// state machine and are delivered to in-process subscribers only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  context::TaskContext,
  error::RoutineError,
  invocation::Invocation,
  routine::{Outcome, StepHandle},
  suspension::Suspension,
};

/// Lifecycle of a single invocation, in publication order:
/// `Submitted → Started → (Suspended → Continued|Threw → Resumed)* → Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
  Submitted {
    id: String,
    routine: String,
    args: Vec<Value>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    kwargs: std::collections::BTreeMap<String, Value>,
    priority: u8,
  },
  Started {
    id: String,
  },
  Suspended {
    id: String,
  },
  Continued {
    id: String,
    value: Value,
  },
  Threw {
    id: String,
    error: RoutineError,
  },
  Resumed {
    id: String,
  },
  Completed {
    id: String,
    result: Outcome,
  },
}

impl Event {
  pub fn id(&self) -> &str {
    match self {
      Event::Submitted { id, .. }
      | Event::Started { id }
      | Event::Suspended { id }
      | Event::Continued { id, .. }
      | Event::Threw { id, .. }
      | Event::Resumed { id }
      | Event::Completed { id, .. } => id,
    }
  }

  pub fn kind(&self) -> EventKind {
    match self {
      Event::Submitted { .. } => EventKind::Submitted,
      Event::Started { .. } => EventKind::Started,
      Event::Suspended { .. } => EventKind::Suspended,
      Event::Continued { .. } => EventKind::Continued,
      Event::Threw { .. } => EventKind::Threw,
      Event::Resumed { .. } => EventKind::Resumed,
      Event::Completed { .. } => EventKind::Completed,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
  Submitted,
  Started,
  Suspended,
  Continued,
  Threw,
  Resumed,
  Completed,
}

impl EventKind {
  /// Every wire event kind, for subscribe-to-everything consumers.
  pub const ALL: &'static [EventKind] = &[
    EventKind::Submitted,
    EventKind::Started,
    EventKind::Suspended,
    EventKind::Continued,
    EventKind::Threw,
    EventKind::Resumed,
    EventKind::Completed,
  ];
}

// ----------------------------------------------
// ----------------------------------------------

/// In-process counterparts of the suspension events.
///
/// These carry the StepHandle (and for Suspended, the Suspension itself and
/// the scope captured at the suspension point), none of which can cross a
/// process boundary.
#[derive(Debug, Clone)]
pub enum LocalEvent {
  Suspended {
    id: String,
    invocation: Invocation,
    step: StepHandle,
    suspension: Suspension,
    context: TaskContext,
  },
  Continued {
    id: String,
    step: StepHandle,
    value: Value,
  },
  Threw {
    id: String,
    step: StepHandle,
    error: RoutineError,
  },
}

impl LocalEvent {
  pub fn kind(&self) -> LocalEventKind {
    match self {
      LocalEvent::Suspended { .. } => LocalEventKind::Suspended,
      LocalEvent::Continued { .. } => LocalEventKind::Continued,
      LocalEvent::Threw { .. } => LocalEventKind::Threw,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEventKind {
  Suspended,
  Continued,
  Threw,
}

// ----------------------------------------------
// ----------------------------------------------

/// Journal frame: an event plus the publishing stream's identity, so a
/// stream can drop its own publications when they loop back from the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
  pub origin: String,
  pub at: DateTime<Utc>,
  pub event: Event,
}

impl Envelope {
  pub fn new(origin: &str, event: Event) -> Self {
    Self {
      origin: origin.to_string(),
      at: Utc::now(),
      event,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn completed_event_roundtrips_both_outcomes() {
    let ok = Event::Completed {
      id: "a1".into(),
      result: Ok(Value::from(17)),
    };
    let err = Event::Completed {
      id: "a2".into(),
      result: Err(RoutineError::new("boom", "nope")),
    };
    for event in [ok, err] {
      let bytes = serde_json::to_vec(&event).unwrap();
      let back: Event = serde_json::from_slice(&bytes).unwrap();
      assert_eq!(back.id(), event.id());
      assert_eq!(back.kind(), EventKind::Completed);
    }
  }

  #[test]
  fn envelope_preserves_origin() {
    let env = Envelope::new("stream-1", Event::Started { id: "x".into() });
    let back: Envelope = serde_json::from_slice(&serde_json::to_vec(&env).unwrap()).unwrap();
    assert_eq!(back.origin, "stream-1");
    assert_eq!(back.event.kind(), EventKind::Started);
  }
}
