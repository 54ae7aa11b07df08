// The worker: a receiver thread feeding a task queue, a pool of runner
// threads executing invocations and continuations, and a continuer thread
// that watches suspensions and re-enqueues their continuations when the
// awaited completion fires.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc, Mutex,
};

use crossbeam_channel::{select, unbounded};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde_json::Value;

use crate::{
  consumer::Consumer,
  context,
  continuation::Continuation,
  error::{BrokerResult, RoutineError},
  events::{LocalEvent, LocalEventKind},
  invocation::Invocation,
  queuespec::QueueSpec,
  routine::{Outcome, RoutineBody, Step, StepHandle},
  runtime::Runtime,
  stream::Subscription,
  taskqueue::TaskQueue,
};

enum Task {
  Invoke(Invocation),
  Continue(Continuation),
}

pub struct Worker {
  runtime: Arc<Runtime>,
  queuespec: QueueSpec,
  consumer: Arc<Consumer>,
  tasks: Arc<TaskQueue<Task>>,
  // Subscribed at construction so no suspension can slip past before run().
  continuer_events: Mutex<Option<Subscription<LocalEvent>>>,
  stopping: AtomicBool,
}

impl Worker {
  pub fn new(runtime: Arc<Runtime>, queuespec: QueueSpec) -> BrokerResult<Self> {
    let consumer = Arc::new(runtime.consume(&queuespec)?);
    let continuer_events = runtime.subscribe_local(&[LocalEventKind::Suspended]);
    Ok(Self {
      runtime,
      queuespec,
      consumer,
      tasks: Arc::new(TaskQueue::new()),
      continuer_events: Mutex::new(Some(continuer_events)),
      stopping: AtomicBool::new(false),
    })
  }

  /// Run until stopped or until a core thread dies.
  ///
  /// Spawns the runner pool plus the continuer and receiver threads, then
  /// blocks. The first thread to exit (expected after stop()/shutdown(),
  /// unexpected otherwise) triggers a full shutdown and joins the rest.
  pub fn run(self: &Arc<Self>) {
    let (exit_tx, exit_rx) = unbounded::<String>();
    let mut handles = Vec::new();

    for i in 0..self.queuespec.concurrency {
      let worker = Arc::clone(self);
      let exit_tx = exit_tx.clone();
      let name = format!("conveyor-runner-{}", i + 1);
      let thread_name = name.clone();
      handles.push(
        std::thread::Builder::new()
          .name(thread_name)
          .spawn(move || {
            worker.runner_loop();
            let _ = exit_tx.send(name);
          })
          .expect("spawning runner thread"),
      );
    }

    let events = self
      .continuer_events
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .take();
    if let Some(events) = events {
      let worker = Arc::clone(self);
      let exit_tx = exit_tx.clone();
      handles.push(
        std::thread::Builder::new()
          .name("conveyor-continuer".to_string())
          .spawn(move || {
            worker.continuer_loop(&events);
            let _ = exit_tx.send("continuer".to_string());
          })
          .expect("spawning continuer thread"),
      );
    } else {
      warn!("worker run() called twice; continuer already consumed");
    }

    {
      let worker = Arc::clone(self);
      let exit_tx = exit_tx.clone();
      handles.push(
        std::thread::Builder::new()
          .name("conveyor-receiver".to_string())
          .spawn(move || {
            worker.receiver_loop();
            let _ = exit_tx.send("receiver".to_string());
          })
          .expect("spawning receiver thread"),
      );
    }

    info!(
      "worker consuming {:?} with concurrency {}",
      self.queuespec.queues, self.queuespec.concurrency
    );

    if let Ok(name) = exit_rx.recv() {
      if self.stopping.load(Ordering::Acquire) {
        debug!("worker thread {name} finished");
      } else {
        error!("worker thread {name} exited unexpectedly; shutting down");
      }
    }

    self.shutdown();
    for handle in handles {
      if handle.join().is_err() {
        error!("worker thread panicked");
      }
    }
    info!("worker finished");
  }

  /// Soft stop: stop executing tasks and abort pending pauses, but leave the
  /// runtime up so in-flight lifecycle events still go out.
  pub fn stop(&self) {
    self.stopping.store(true, Ordering::Release);
    self.tasks.shutdown();
    self.runtime.cancel_timers();
  }

  /// Full stop: also shuts the runtime (broker, stream, timers) down.
  pub fn shutdown(&self) {
    self.stop();
    self.runtime.shutdown();
  }

  // ----------------------------------------------
  // Runner threads
  // ----------------------------------------------

  fn runner_loop(&self) {
    while let Some(task) = self.tasks.pop() {
      match task {
        Task::Invoke(invocation) => {
          self.consumer.start(&invocation);
          self.run_invocation(invocation);
        }
        Task::Continue(continuation) => {
          self.consumer.resume(&continuation.invocation);
          self.run_continuation(continuation);
        }
      }
    }
  }

  fn run_invocation(&self, invocation: Invocation) {
    let routine = match self.runtime.routine(&invocation.routine) {
      Ok(routine) => routine,
      Err(e) => {
        warn!("dropping {:?}: {e}", invocation.id);
        self
          .consumer
          .error(&invocation, RoutineError::unknown_routine(&invocation.routine));
        return;
      }
    };

    enum Began {
      Finished(Outcome),
      Stepping(StepHandle),
    }

    let began = context::enter(invocation.priority, &invocation.context, || {
      match &routine.body {
        RoutineBody::Plain(f) => {
          match catch_unwind(AssertUnwindSafe(|| f(&invocation.args, &invocation.kwargs))) {
            Ok(outcome) => Began::Finished(outcome),
            Err(payload) => Began::Finished(Err(RoutineError::panicked(panic_detail(&payload)))),
          }
        }
        RoutineBody::Stepwise(f) => {
          match catch_unwind(AssertUnwindSafe(|| f(&invocation.args, &invocation.kwargs))) {
            Ok(stepper) => Began::Stepping(StepHandle::new(stepper)),
            Err(payload) => Began::Finished(Err(RoutineError::panicked(panic_detail(&payload)))),
          }
        }
      }
    });

    match began {
      Began::Finished(Ok(value)) => self.consumer.succeed(&invocation, value),
      Began::Finished(Err(e)) => self.consumer.error(&invocation, e),
      Began::Stepping(step) => {
        // Drive the state machine to its first suspension.
        let context = invocation.context.clone();
        self.run_continuation(Continuation::new(invocation, step, Ok(Value::Null), context));
      }
    }
  }

  fn run_continuation(&self, continuation: Continuation) {
    let invocation = &continuation.invocation;
    let step = context::enter(invocation.priority, &continuation.context, || {
      catch_unwind(AssertUnwindSafe(|| continuation.resume()))
    });
    match step {
      Err(payload) => {
        self
          .consumer
          .error(invocation, RoutineError::panicked(panic_detail(&payload)));
      }
      Ok(Step::Done(Ok(value))) => self.consumer.succeed(invocation, value),
      Ok(Step::Done(Err(e))) => self.consumer.error(invocation, e),
      Ok(Step::Suspend(suspension)) => {
        self.consumer.suspend(
          invocation,
          &continuation.step,
          suspension,
          continuation.context.clone(),
        );
      }
    }
  }

  // ----------------------------------------------
  // Continuer thread
  // ----------------------------------------------

  /// Watch suspensions, submit what they await, and queue the continuation
  /// when the awaited completion fires.
  fn continuer_loop(&self, events: &Subscription<LocalEvent>) {
    let (fired_tx, fired_rx) = unbounded::<(u64, Outcome)>();
    let mut waiting: HashMap<u64, (Invocation, StepHandle, crate::context::TaskContext)> =
      HashMap::new();
    let mut next_key: u64 = 0;

    loop {
      select! {
        recv(events.channel()) -> event => match event {
          Ok(LocalEvent::Suspended { invocation, step, suspension, context, .. }) => {
            let key = next_key;
            next_key += 1;
            trace!("{} awaiting {suspension}", invocation.id);
            waiting.insert(key, (invocation, step, context));
            let fired_tx = fired_tx.clone();
            suspension.submit(&self.runtime).on_ready(move |outcome| {
              let _ = fired_tx.send((key, outcome.clone()));
            });
          }
          Ok(_) => {}
          // Stream closed: the worker is shutting down.
          Err(_) => break,
        },
        recv(fired_rx) -> fired => {
          let Ok((key, outcome)) = fired else { break };
          let Some((invocation, step, task_context)) = waiting.remove(&key) else {
            continue;
          };
          match outcome {
            Ok(value) => {
              self.consumer.resolve(&invocation, &step, value.clone());
              let _ = self.tasks.push(Task::Continue(Continuation::new(
                invocation,
                step,
                Ok(value),
                task_context,
              )));
            }
            Err(e) => {
              self.consumer.throw(&invocation, &step, e.clone());
              let _ = self.tasks.push(Task::Continue(Continuation::new(
                invocation,
                step,
                Err(e),
                task_context,
              )));
            }
          }
        },
      }
    }
  }

  // ----------------------------------------------
  // Receiver thread
  // ----------------------------------------------

  /// Feed delivered invocations to the task queue, keeping the consumer
  /// active until the receiver ends.
  fn receiver_loop(&self) {
    while let Some(invocation) = self.consumer.next_invocation() {
      trace!("received {:?}", invocation.id);
      if self.tasks.push(Task::Invoke(invocation)).is_err() {
        // Task queue already shut down; the message stays unacked and the
        // broker will redeliver it to another worker.
        continue;
      }
    }
  }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "routine panicked".to_string()
  }
}
