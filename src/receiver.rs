// The receiver contract: a capacity-limited, priority-aware message source.
//
// A receiver starts with capacity equal to the queuespec concurrency. Every
// yielded message takes one unit; pause and finish give one back, unpause
// takes one again. recv blocks while capacity is exhausted, so the broker
// never holds more than capacity plus the unfinished in-flight messages on
// this subscription.

use crate::message::Message;

pub trait Receiver: Send + Sync {
  /// Block until a message is available and capacity allows delivering it.
  /// Returns None once the receiver has shut down.
  fn recv(&self) -> Option<Message>;

  /// The caller yields the slot of this in-flight message (suspension).
  fn pause(&self, message: &Message);

  /// The caller reclaims the slot before resuming the message.
  fn unpause(&self, message: &Message);

  /// Acknowledge the message and release its slot for good.
  fn finish(&self, message: &Message);

  /// Wake all waiters; subsequent recv calls return None. Idempotent, and
  /// pause/unpause/finish become no-ops afterwards.
  fn shutdown(&self);
}
