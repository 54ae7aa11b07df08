// The journal contract: the fan-out bus lifecycle events travel on.
//
// Every live subscriber observes every published frame, best-effort and
// from subscription time onward. Nothing is stored; a subscriber that
// connects late starts with the next frame.

use bytes::Bytes;

use crate::error::JournalError;

pub trait Journal: Send + Sync {
  /// Open a subscription delivering every frame published after this call.
  /// The iterator blocks for the next frame and ends at journal shutdown.
  fn subscribe(&self) -> Box<dyn Iterator<Item = Bytes> + Send>;

  /// Broadcast a frame to all current subscribers.
  fn publish(&self, frame: Bytes) -> Result<(), JournalError>;

  /// Close all subscriptions. Idempotent.
  fn shutdown(&self);
}
