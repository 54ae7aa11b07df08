// A broker delivery. Identity is the delivery id the broker assigned, so
// two deliveries of the same bytes are distinct messages.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

static NEXT_DELIVERY: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct Message {
  delivery: u64,
  body: Bytes,
}

impl Message {
  /// Wrap a received body in a fresh delivery.
  pub fn deliver(body: Bytes) -> Self {
    Self {
      delivery: NEXT_DELIVERY.fetch_add(1, Ordering::Relaxed),
      body,
    }
  }

  pub fn delivery(&self) -> u64 {
    self.delivery
  }

  pub fn body(&self) -> &Bytes {
    &self.body
  }
}

impl PartialEq for Message {
  fn eq(&self, other: &Self) -> bool {
    self.delivery == other.delivery
  }
}

impl Eq for Message {}

impl std::hash::Hash for Message {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.delivery.hash(state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_bytes_twice_are_distinct_messages() {
    let body = Bytes::from_static(b"payload");
    let a = Message::deliver(body.clone());
    let b = Message::deliver(body);
    assert_eq!(a.body(), b.body());
    assert_ne!(a, b);
  }
}
