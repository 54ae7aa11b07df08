// Dynamic scoped state: the current priority and named task variables.
//
// Both are plain thread-locals that the runner installs before executing a
// task and restores afterwards. A TaskContext is the serializable snapshot
// that travels inside an invocation, so a variable set at submit time is
// visible inside the routine even when it runs on another worker.

use std::{cell::RefCell, collections::BTreeMap, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
  invocation::Invocation,
  suspension::Suspension,
};

/// Priority used when no priority scope is active.
pub const DEFAULT_PRIORITY: u8 = 4;

thread_local! {
  static PRIORITY: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
  static VARS: RefCell<BTreeMap<String, Value>> = const { RefCell::new(BTreeMap::new()) };
}

/// The priority new invocations inherit on this thread.
pub fn current_priority() -> u8 {
  PRIORITY.with(|p| p.borrow().last().copied().unwrap_or(DEFAULT_PRIORITY))
}

/// Run `f` with the given priority as the inherited priority.
///
/// The scope is restored on unwind as well: routines run under
/// catch_unwind, and a panicking task must not leak its priority onto the
/// runner thread.
pub fn with_priority<R>(level: u8, f: impl FnOnce() -> R) -> R {
  struct Guard;
  impl Drop for Guard {
    fn drop(&mut self) {
      PRIORITY.with(|p| {
        p.borrow_mut().pop();
      });
    }
  }

  PRIORITY.with(|p| p.borrow_mut().push(level));
  let _guard = Guard;
  f()
}

/// A named variable whose value follows invocations across workers.
///
/// Reading outside any scope yields the default. Values set with [`TaskVar::scope`]
/// are captured into the context snapshot of every invocation constructed
/// inside the scope.
pub struct TaskVar<T> {
  name: &'static str,
  default: T,
}

impl<T> TaskVar<T>
where
  T: Serialize + DeserializeOwned + Clone,
{
  pub const fn new(name: &'static str, default: T) -> Self {
    Self { name, default }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  /// Current value on this thread, or the default when unset.
  pub fn get(&self) -> T {
    VARS.with(|v| {
      v.borrow()
        .get(self.name)
        .and_then(|raw| serde_json::from_value(raw.clone()).ok())
        .unwrap_or_else(|| self.default.clone())
    })
  }

  /// Run `f` with this variable set to `value`. Restored on unwind too.
  pub fn scope<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
    struct Guard {
      name: &'static str,
      prior: Option<Value>,
    }
    impl Drop for Guard {
      fn drop(&mut self) {
        let prior = self.prior.take();
        VARS.with(|v| {
          let mut vars = v.borrow_mut();
          match prior {
            Some(prior) => {
              vars.insert(self.name.to_string(), prior);
            }
            None => {
              vars.remove(self.name);
            }
          }
        });
      }
    }

    let raw = serde_json::to_value(&value).unwrap_or(Value::Null);
    let prior = VARS.with(|v| v.borrow_mut().insert(self.name.to_string(), raw));
    let _guard = Guard {
      name: self.name,
      prior,
    };
    f()
  }
}

/// Snapshot of the task variables in scope at capture time.
///
/// Only explicitly set variables appear; defaults are never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext(BTreeMap<String, Value>);

impl TaskContext {
  /// Capture the variables currently in scope on this thread.
  pub fn capture() -> Self {
    Self(VARS.with(|v| v.borrow().clone()))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn contains<T>(&self, var: &TaskVar<T>) -> bool {
    self.0.contains_key(var.name)
  }

  /// The captured value of `var`, if it was set at capture time.
  pub fn get<T: DeserializeOwned>(&self, var: &TaskVar<T>) -> Option<T> {
    self
      .0
      .get(var.name)
      .and_then(|raw| serde_json::from_value(raw.clone()).ok())
  }
}

/// Run `f` with `priority` and `context` installed as the thread's scope.
///
/// This is how the runner gives a task the environment it was submitted
/// under. The previous scope is restored on exit, even though runner threads
/// in practice never nest tasks.
pub(crate) fn enter<R>(priority: u8, context: &TaskContext, f: impl FnOnce() -> R) -> R {
  struct Guard(Option<BTreeMap<String, Value>>);
  impl Drop for Guard {
    fn drop(&mut self) {
      if let Some(saved) = self.0.take() {
        VARS.with(|v| *v.borrow_mut() = saved);
      }
    }
  }

  let saved = VARS.with(|v| std::mem::replace(&mut *v.borrow_mut(), context.0.clone()));
  let _guard = Guard(Some(saved));
  with_priority(priority, f)
}

// ----------------------------------------------
// Suspension construction helpers.
// ----------------------------------------------

/// Await a wall-clock pause of `duration`.
pub fn pause(duration: Duration) -> Suspension {
  Suspension::Pause(duration)
}

/// Await all of `parts`; results aggregate in order.
pub fn gather(parts: impl IntoIterator<Item = Suspension>) -> Suspension {
  Suspension::Gather(parts.into_iter().collect())
}

/// Await a child invocation.
pub fn call(invocation: Invocation) -> Suspension {
  Suspension::Invocation(invocation)
}
