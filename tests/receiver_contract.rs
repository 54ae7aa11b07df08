// Contract tests for the broker and its receivers: prefetch capacity,
// pause/finish accounting, priority ordering, weighted round-robin, and
// empty-queue fairness.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use conveyor::{
  broker::Broker,
  error::BrokerError,
  mem::MemBroker,
  message::Message,
  queuespec::QueueSpec,
  receiver::Receiver,
};

fn body(text: &str) -> Bytes {
  Bytes::copy_from_slice(text.as_bytes())
}

fn text(message: &Message) -> String {
  String::from_utf8_lossy(message.body()).into_owned()
}

/// Drain a receiver into a shared vector from a background thread.
fn collect(receiver: Arc<dyn Receiver>) -> (Arc<Mutex<Vec<Message>>>, thread::JoinHandle<()>) {
  let seen: Arc<Mutex<Vec<Message>>> = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&seen);
  let handle = thread::spawn(move || {
    while let Some(message) = receiver.recv() {
      sink.lock().unwrap().push(message);
    }
  });
  (seen, handle)
}

fn settle() {
  thread::sleep(Duration::from_millis(100));
}

#[test]
fn prefetch_limits_message_consumption() {
  let broker = MemBroker::new();
  broker.create("jobs").unwrap();
  for i in 0..3 {
    broker.enqueue(body(&format!("message{i}")), "jobs", 4).unwrap();
  }

  let receiver = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 2))
    .unwrap();
  let (seen, handle) = collect(receiver);

  settle();
  assert_eq!(seen.lock().unwrap().len(), 2);

  broker.shutdown();
  handle.join().unwrap();
  assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn pause_frees_capacity_and_unpause_reclaims_it() {
  let broker = MemBroker::new();
  broker.create("jobs").unwrap();
  for i in 0..3 {
    broker.enqueue(body(&format!("msg{i}")), "jobs", 4).unwrap();
  }

  let receiver = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 2))
    .unwrap();
  let (seen, handle) = collect(Arc::clone(&receiver));

  settle();
  let first = {
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    seen[0].clone()
  };

  // Suspending the first message lends its slot to the third.
  receiver.pause(&first);
  settle();
  assert_eq!(seen.lock().unwrap().len(), 3);

  // Resuming takes the slot back; nothing further arrives.
  receiver.unpause(&first);
  broker.enqueue(body("msg3"), "jobs", 4).unwrap();
  settle();
  assert_eq!(seen.lock().unwrap().len(), 3);

  broker.shutdown();
  handle.join().unwrap();
}

#[test]
fn finish_frees_capacity_permanently() {
  let broker = MemBroker::new();
  broker.create("jobs").unwrap();
  for i in 0..4 {
    broker.enqueue(body(&format!("test{i}")), "jobs", 4).unwrap();
  }

  let receiver = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 2))
    .unwrap();
  let (seen, handle) = collect(Arc::clone(&receiver));

  settle();
  let (first, second) = {
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    (seen[0].clone(), seen[1].clone())
  };

  receiver.finish(&first);
  settle();
  assert_eq!(seen.lock().unwrap().len(), 3);

  receiver.finish(&second);
  settle();
  assert_eq!(seen.lock().unwrap().len(), 4);

  broker.shutdown();
  handle.join().unwrap();
}

#[test]
fn receivers_have_independent_capacity() {
  let broker = MemBroker::new();
  broker.create("jobs").unwrap();
  for i in 0..5 {
    broker.enqueue(body(&format!("msg{i}")), "jobs", 4).unwrap();
  }

  let first = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 2))
    .unwrap();
  let second = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 3))
    .unwrap();
  let (seen_first, handle_first) = collect(first);
  let (seen_second, handle_second) = collect(second);

  settle();
  let a = seen_first.lock().unwrap().len();
  let b = seen_second.lock().unwrap().len();
  assert_eq!(a + b, 5);
  assert!(a <= 2, "receiver with capacity 2 held {a}");
  assert!(b <= 3, "receiver with capacity 3 held {b}");

  broker.shutdown();
  handle_first.join().unwrap();
  handle_second.join().unwrap();
}

#[test]
fn receive_rejects_empty_queuespec_and_missing_queues() {
  let broker = MemBroker::new();
  assert!(matches!(
    broker.receive(&QueueSpec::new(vec![], 2)),
    Err(BrokerError::EmptyQueueSpec)
  ));
  assert!(matches!(
    broker.receive(&QueueSpec::new(vec!["ghost".into()], 2)),
    Err(BrokerError::QueueMissing { queue }) if queue == "ghost"
  ));
  broker.shutdown();
}

#[test]
fn queue_management_errors() -> anyhow::Result<()> {
  let broker = MemBroker::new();
  broker.create("jobs")?;
  broker.create("jobs")?; // idempotent

  assert!(matches!(
    broker.enqueue(body("x"), "ghost", 4),
    Err(BrokerError::QueueMissing { .. })
  ));
  assert!(matches!(
    broker.enqueue(body("x"), "jobs", 10),
    Err(BrokerError::PriorityOutOfRange { .. })
  ));
  assert!(matches!(
    broker.delete("ghost"),
    Err(BrokerError::QueueMissing { .. })
  ));
  assert!(matches!(
    broker.purge("ghost"),
    Err(BrokerError::QueueMissing { .. })
  ));

  broker.enqueue(body("pending"), "jobs", 4)?;
  broker.purge("jobs")?;
  broker.delete("jobs")?;
  assert!(matches!(
    broker.enqueue(body("late"), "jobs", 4),
    Err(BrokerError::QueueMissing { .. })
  ));
  broker.shutdown();
  Ok(())
}

#[test]
fn mixed_empty_and_filled_queues_all_deliver() {
  let broker = MemBroker::new();
  for queue in ["empty1", "filled", "empty2", "also_filled"] {
    broker.create(queue).unwrap();
  }
  broker.enqueue(body("message_a"), "filled", 4).unwrap();
  broker.enqueue(body("message_b"), "also_filled", 4).unwrap();
  broker.enqueue(body("message_c"), "filled", 4).unwrap();

  let receiver = broker
    .receive(&QueueSpec::new(
      vec!["empty1".into(), "filled".into(), "empty2".into(), "also_filled".into()],
      3,
    ))
    .unwrap();
  let (seen, handle) = collect(receiver);

  settle();
  let mut bodies: Vec<String> = seen.lock().unwrap().iter().map(text).collect();
  bodies.sort();
  assert_eq!(bodies, vec!["message_a", "message_b", "message_c"]);

  broker.shutdown();
  handle.join().unwrap();
}

#[test]
fn duplicate_queue_names_weight_selection() {
  let broker = MemBroker::new();
  broker.create("hot").unwrap();
  broker.create("cold").unwrap();
  for i in 0..20 {
    broker.enqueue(body(&format!("hot_{i}")), "hot", 4).unwrap();
    broker.enqueue(body(&format!("cold_{i}")), "cold", 4).unwrap();
  }

  // hot is listed three times: 3 of every 4 picks while both are non-empty.
  let receiver = broker
    .receive(&QueueSpec::new(
      vec!["hot".into(), "cold".into(), "hot".into(), "hot".into()],
      5,
    ))
    .unwrap();

  let mut order = Vec::new();
  for _ in 0..40 {
    let message = receiver.recv().unwrap();
    order.push(if text(&message).starts_with("hot_") { 'H' } else { 'C' });
    receiver.finish(&message);
  }

  assert_eq!(order.iter().filter(|&&c| c == 'H').count(), 20);
  assert_eq!(order.iter().filter(|&&c| c == 'C').count(), 20);

  // While both queues are non-empty (the first ~26 picks), hot should take
  // roughly three quarters of the selections.
  let early = &order[..26];
  let hot_early = early.iter().filter(|&&c| c == 'H').count();
  let ratio = hot_early as f64 / early.len() as f64;
  assert!(
    ratio > 0.7,
    "expected ~75% hot in early picks, got {ratio:.2} in {order:?}"
  );

  broker.shutdown();
}

#[test]
fn empty_queue_does_not_skew_round_robin() {
  let broker = MemBroker::new();
  broker.create("queue1").unwrap();
  broker.create("empty").unwrap();
  broker.create("queue2").unwrap();
  for i in 0..50 {
    broker.enqueue(body(&format!("msg1_{i}")), "queue1", 4).unwrap();
    broker.enqueue(body(&format!("msg2_{i}")), "queue2", 4).unwrap();
  }

  let receiver = broker
    .receive(&QueueSpec::new(
      vec!["queue1".into(), "empty".into(), "queue2".into()],
      3,
    ))
    .unwrap();

  let mut order = Vec::new();
  for _ in 0..100 {
    let message = receiver.recv().unwrap();
    order.push(if text(&message).starts_with("msg1_") { '1' } else { '2' });
    receiver.finish(&message);
  }

  assert_eq!(order.iter().filter(|&&c| c == '1').count(), 50);
  assert_eq!(order.iter().filter(|&&c| c == '2').count(), 50);

  // While both queues are loaded, neither should be starved by the empty
  // queue sitting between them in the ring.
  let first_half = &order[..50];
  let q1 = first_half.iter().filter(|&&c| c == '1').count() as i64;
  let q2 = first_half.iter().filter(|&&c| c == '2').count() as i64;
  assert!(
    (q1 - q2).abs() <= 15,
    "unbalanced early distribution {q1}:{q2} in {order:?}"
  );

  broker.shutdown();
}

#[test]
fn higher_priority_consumed_first() {
  let broker = MemBroker::new();
  broker.create("jobs").unwrap();
  broker.enqueue(body("low"), "jobs", 0).unwrap();
  broker.enqueue(body("high"), "jobs", 9).unwrap();

  let receiver = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 1))
    .unwrap();

  let mut order = Vec::new();
  for _ in 0..2 {
    let message = receiver.recv().unwrap();
    order.push(text(&message));
    receiver.finish(&message);
  }
  assert_eq!(order, vec!["high", "low"]);

  broker.shutdown();
}

#[test]
fn concurrent_shutdown_is_idempotent() {
  let broker = Arc::new(MemBroker::new());
  broker.create("jobs").unwrap();

  let mut handles = Vec::new();
  for _ in 0..3 {
    let broker = Arc::clone(&broker);
    handles.push(thread::spawn(move || broker.shutdown()));
  }
  for handle in handles {
    handle.join().unwrap();
  }

  // Everything after shutdown reports Shutdown rather than hanging.
  assert!(matches!(
    broker.enqueue(body("x"), "jobs", 4),
    Err(BrokerError::Shutdown)
  ));
  assert!(matches!(broker.create("other"), Err(BrokerError::Shutdown)));
}

#[test]
fn shutdown_wakes_a_blocked_receiver() {
  let broker = Arc::new(MemBroker::new());
  broker.create("jobs").unwrap();
  let receiver = broker
    .receive(&QueueSpec::new(vec!["jobs".into()], 1))
    .unwrap();

  let blocked = thread::spawn(move || receiver.recv());
  settle();
  broker.shutdown();
  assert!(blocked.join().unwrap().is_none());
}
