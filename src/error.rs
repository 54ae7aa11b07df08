// Error types, one enum per concern.
//
// Routine failures are data: they travel inside Completed events and must
// round-trip through the journal, so RoutineError is serializable and carries
// no live backtrace. Everything else is ordinary process-local error plumbing.

use serde::{Deserialize, Serialize};

/// Result alias for broker and receiver operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("no broker URI configured: set CONVEYOR_BROKER or add 'broker' under [conveyor] in conveyor.toml")]
  MissingUri,
  #[error("unsupported broker URI scheme in {uri:?}: expected 'mem:'")]
  UnsupportedScheme { uri: String },
  #[error("cannot read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("malformed config file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },
  #[error("invalid queuespec {spec:?}: {reason}")]
  InvalidQueueSpec { spec: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
  #[error("queue {queue:?} does not exist")]
  QueueMissing { queue: String },
  #[error("queue {queue:?} exists with incompatible arguments")]
  QueueIncompatible { queue: String },
  #[error("priority {priority} out of range 0..{limit}")]
  PriorityOutOfRange { priority: u8, limit: u8 },
  #[error("queuespec must name at least one queue")]
  EmptyQueueSpec,
  #[error("broker is shut down")]
  Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
  #[error("journal is shut down")]
  Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
  #[error("routine {name:?} is already registered")]
  Duplicate { name: String },
  #[error("no routine registered under {name:?}")]
  Unknown { name: String },
}

/// Submitting an invocation can fail before it ever reaches a queue.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
  #[error(transparent)]
  Registry(#[from] RegistryError),
  #[error(transparent)]
  Broker(#[from] BrokerError),
}

/// A routine failure as reported over the wire.
///
/// `kind` is a short machine-matchable tag, `message` is human text, and
/// `cause` optionally carries the rendering of an underlying failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RoutineError {
  pub kind: String,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cause: Option<String>,
}

impl RoutineError {
  pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      message: message.into(),
      cause: None,
    }
  }

  pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
    self.cause = Some(cause.into());
    self
  }

  /// A suspension was abandoned because the worker is stopping.
  pub fn interrupted(what: &str) -> Self {
    Self::new("interrupted", format!("{what} cancelled by shutdown"))
  }

  /// The routine panicked on a runner thread.
  pub fn panicked(detail: String) -> Self {
    Self::new("panic", detail)
  }

  pub fn unknown_routine(name: &str) -> Self {
    Self::new("unknown-routine", format!("no routine registered under {name:?}"))
  }

  pub(crate) fn from_submit(e: &SubmitError) -> Self {
    Self::new("submit", "child invocation could not be enqueued").with_cause(e.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn routine_error_roundtrips_without_cause() {
    let e = RoutineError::new("boom", "it broke");
    let json = serde_json::to_string(&e).unwrap();
    assert!(!json.contains("cause"));
    let back: RoutineError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, e);
  }
}
