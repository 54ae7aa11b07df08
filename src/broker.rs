// The broker contract: the transport that moves invocation bytes.
//
// Delivery is at-least-once; routines are expected to be idempotent. Within
// one queue and priority the broker preserves FIFO order.

use std::sync::Arc;

use bytes::Bytes;

use crate::{
  error::BrokerResult,
  queuespec::QueueSpec,
  receiver::Receiver,
};

/// Priority sub-queues per named queue. Valid priorities are
/// `0..PRIORITY_LEVELS`, higher consumed first.
pub const PRIORITY_LEVELS: u8 = 10;

pub trait Broker: Send + Sync {
  /// Enqueue a message body at the given priority.
  fn enqueue(&self, body: Bytes, queue: &str, priority: u8) -> BrokerResult<()>;

  /// Create a queue. Idempotent; fails with `QueueIncompatible` when the
  /// queue already exists with a different priority configuration.
  fn create(&self, queue: &str) -> BrokerResult<()>;

  /// Delete a queue and everything in it.
  fn delete(&self, queue: &str) -> BrokerResult<()>;

  /// Drop all pending messages. Best-effort with respect to messages that
  /// are already delivered but not yet finished.
  fn purge(&self, queue: &str) -> BrokerResult<()>;

  /// Open a receiver over the queues the queuespec names.
  fn receive(&self, queuespec: &QueueSpec) -> BrokerResult<Arc<dyn Receiver>>;

  /// Final shutdown: wakes every receiver, then drops broker state.
  /// Idempotent and safe to call from any thread.
  fn shutdown(&self);
}
