//! Conveyor is a distributed task-execution runtime.
//!
//! Producers submit named [`Invocation`]s to a broker; [`Worker`]s pull them
//! from one or more queues, execute the registered [`Routine`], and publish
//! lifecycle [`Event`]s on a journal-backed [`Stream`] so waiters anywhere
//! in the fleet can observe completion. A routine may suspend on a
//! [`Suspension`] (a child invocation, a timed pause, or a gather) and is
//! resumed with the result while its broker slot is lent out in the
//! meantime.
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use conveyor::{Invocation, QueueSpec, Registry, Routine, Runtime, Worker};
//!
//! let registry = Registry::builder()
//!   .routine(Routine::plain("double", "maths", |args, _| {
//!     let n = args.first().and_then(Value::as_i64).unwrap_or(0);
//!     Ok(json!(n * 2))
//!   }))
//!   .unwrap()
//!   .build();
//!
//! let runtime = Arc::new(Runtime::from_config(registry).unwrap());
//! runtime.create("maths").unwrap();
//!
//! let worker = Arc::new(Worker::new(Arc::clone(&runtime), "maths=2".parse::<QueueSpec>().unwrap()).unwrap());
//! std::thread::spawn({
//!   let worker = Arc::clone(&worker);
//!   move || worker.run()
//! });
//!
//! let answer = runtime.run(&Invocation::new("double", vec![json!(21)]));
//! assert_eq!(answer.unwrap(), json!(42));
//! ```

pub mod broker;
pub mod completion;
pub mod config;
pub mod consumer;
pub mod context;
pub mod continuation;
pub mod demos;
pub mod error;
pub mod events;
pub mod invocation;
pub mod journal;
pub mod mem;
pub mod message;
pub mod queuespec;
pub mod receiver;
pub mod registry;
pub mod routine;
pub mod runtime;
pub mod stream;
pub mod suspension;
pub mod worker;

mod handler;
mod taskqueue;
mod timer;

pub use crate::{
  broker::{Broker, PRIORITY_LEVELS},
  completion::Completion,
  consumer::Consumer,
  context::{call, current_priority, gather, pause, with_priority, TaskContext, TaskVar, DEFAULT_PRIORITY},
  continuation::Continuation,
  error::{BrokerError, ConfigError, JournalError, RegistryError, RoutineError, SubmitError},
  events::{Event, EventKind, LocalEvent, LocalEventKind},
  invocation::Invocation,
  journal::Journal,
  message::Message,
  queuespec::QueueSpec,
  receiver::Receiver,
  registry::Registry,
  routine::{Outcome, Routine, Step, StepHandle, Stepper},
  runtime::Runtime,
  stream::{Stream, Subscription},
  suspension::Suspension,
  worker::Worker,
};
