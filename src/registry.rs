// The process-wide routine table.
//
// Built once at startup, frozen thereafter: the builder rejects duplicate
// names, and the built registry is immutable. A worker can only execute
// routines the process was built with.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
  error::RegistryError,
  routine::Routine,
};

pub struct RegistryBuilder {
  routines: BTreeMap<String, Arc<Routine>>,
}

impl RegistryBuilder {
  /// Register a routine; re-registration of a name is an error.
  pub fn routine(mut self, routine: Routine) -> Result<Self, RegistryError> {
    let name = routine.name.clone();
    if self.routines.contains_key(&name) {
      return Err(RegistryError::Duplicate { name });
    }
    self.routines.insert(name, Arc::new(routine));
    Ok(self)
  }

  pub fn build(self) -> Registry {
    Registry {
      routines: Arc::new(self.routines),
    }
  }
}

#[derive(Clone)]
pub struct Registry {
  routines: Arc<BTreeMap<String, Arc<Routine>>>,
}

impl Registry {
  pub fn builder() -> RegistryBuilder {
    RegistryBuilder {
      routines: BTreeMap::new(),
    }
  }

  pub fn get(&self, name: &str) -> Result<Arc<Routine>, RegistryError> {
    self
      .routines
      .get(name)
      .cloned()
      .ok_or_else(|| RegistryError::Unknown {
        name: name.to_string(),
      })
  }

  /// All routines, ordered by name.
  pub fn routines(&self) -> impl Iterator<Item = &Arc<Routine>> {
    self.routines.values()
  }

  /// The distinct queues the registered routines are bound to, sorted.
  pub fn queues(&self) -> Vec<String> {
    let mut queues: Vec<String> = self
      .routines
      .values()
      .map(|r| r.queue.clone())
      .collect();
    queues.sort();
    queues.dedup();
    queues
  }

  pub fn is_empty(&self) -> bool {
    self.routines.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::Value;

  use super::*;

  fn noop(name: &str, queue: &str) -> Routine {
    Routine::plain(name, queue, |_, _| Ok(Value::Null))
  }

  #[test]
  fn duplicate_registration_is_rejected() {
    let result = Registry::builder()
      .routine(noop("job", "q"))
      .unwrap()
      .routine(noop("job", "other"));
    assert!(matches!(result, Err(RegistryError::Duplicate { name }) if name == "job"));
  }

  #[test]
  fn queues_are_sorted_and_deduplicated() {
    let registry = Registry::builder()
      .routine(noop("c", "beta"))
      .unwrap()
      .routine(noop("a", "alpha"))
      .unwrap()
      .routine(noop("b", "beta"))
      .unwrap()
      .build();
    assert_eq!(registry.queues(), vec!["alpha", "beta"]);
    assert!(registry.get("missing").is_err());
  }
}
