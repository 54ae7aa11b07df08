// An invocation is a request to run a named routine with arguments.
//
// Identity is the id string, never structural equality: the same payload
// enqueued twice is two distinct invocations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::{self, TaskContext};

/// The wire record for one routine call.
///
/// `priority` is inherited from the ambient priority scope at construction
/// time unless overridden, and `context` snapshots the task variables in
/// scope, so both follow the invocation to whichever worker runs it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Invocation {
  pub id: String,
  pub routine: String,
  pub args: Vec<Value>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub kwargs: BTreeMap<String, Value>,
  pub priority: u8,
  #[serde(default, skip_serializing_if = "TaskContext::is_empty")]
  pub context: TaskContext,
}

impl Invocation {
  pub fn new(routine: impl Into<String>, args: Vec<Value>) -> Self {
    Self::with_kwargs(routine, args, BTreeMap::new())
  }

  pub fn with_kwargs(
    routine: impl Into<String>,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
  ) -> Self {
    Self {
      id: Uuid::new_v4().simple().to_string(),
      routine: routine.into(),
      args,
      kwargs,
      priority: context::current_priority(),
      context: TaskContext::capture(),
    }
  }

  /// Override the inherited priority.
  pub fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }

  pub fn serialize(&self) -> Vec<u8> {
    // Infallible: every field is plain JSON data.
    serde_json::to_vec(self).unwrap_or_default()
  }

  pub fn deserialize(bytes: &[u8]) -> Result<Self, serde_json::Error> {
    serde_json::from_slice(bytes)
  }
}

impl fmt::Debug for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "<Invocation {:?} {}(", self.id, self.routine)?;
    let mut first = true;
    for a in &self.args {
      if !first {
        write!(f, ", ")?;
      }
      write!(f, "{a}")?;
      first = false;
    }
    for (k, v) in &self.kwargs {
      if !first {
        write!(f, ", ")?;
      }
      write!(f, "{k}={v}")?;
      first = false;
    }
    write!(f, ")>")
  }
}
