// What a worker consumes: an ordered list of queue names and a concurrency.
//
// Duplicates in the list are meaningful. The receiver treats the list as a
// weighted ring, so naming a queue three times gives it three times the
// selection weight while it has messages.

use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
  pub queues: Vec<String>,
  pub concurrency: usize,
}

impl QueueSpec {
  pub fn new(queues: Vec<String>, concurrency: usize) -> Self {
    Self { queues, concurrency }
  }
}

/// Parses the CLI form `queue[,queue2,...]=concurrency`.
impl FromStr for QueueSpec {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = |reason: &str| ConfigError::InvalidQueueSpec {
      spec: s.to_string(),
      reason: reason.to_string(),
    };

    let (names, concurrency) = s
      .split_once('=')
      .ok_or_else(|| invalid("expected 'queues=concurrency'"))?;

    let queues: Vec<String> = names
      .split(',')
      .map(str::trim)
      .filter(|q| !q.is_empty())
      .map(str::to_string)
      .collect();
    if queues.is_empty() {
      return Err(invalid("no queue names"));
    }

    let concurrency: usize = concurrency
      .trim()
      .parse()
      .map_err(|_| invalid("concurrency is not a number"))?;
    if concurrency == 0 {
      return Err(invalid("concurrency must be positive"));
    }

    Ok(QueueSpec::new(queues, concurrency))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_single_and_multiple_queues() {
    let spec: QueueSpec = "production=10".parse().unwrap();
    assert_eq!(spec.queues, vec!["production"]);
    assert_eq!(spec.concurrency, 10);

    let spec: QueueSpec = "api, background ,api=5".parse().unwrap();
    assert_eq!(spec.queues, vec!["api", "background", "api"]);
    assert_eq!(spec.concurrency, 5);
  }

  #[test]
  fn rejects_malformed_specs() {
    for bad in ["production", "=3", "a=zero", "a=0", ",=2"] {
      assert!(bad.parse::<QueueSpec>().is_err(), "accepted {bad:?}");
    }
  }
}
