//! Command-line surface: inspect routines, tail events, run workers, and
//! manage queues.

use std::sync::Arc;

use clap::{Parser, Subcommand};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use conveyor::{
  demos,
  events::EventKind,
  queuespec::QueueSpec,
  runtime::Runtime,
  worker::Worker,
};

#[derive(Parser)]
#[command(name = "conveyor", about = "Distributed task-execution runtime")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// A function to coordinate background execution.
  #[command(subcommand)]
  Routine(RoutineCommand),

  /// Tail runtime events.
  Monitor {
    /// Print full event records instead of the one-line summary.
    #[arg(long)]
    raw: bool,
  },

  /// Run a worker to process from a queue.
  Run {
    /// Queue configuration, e.g. 'production=10' or 'api,background=5'.
    #[arg(value_name = "QUEUE[,QUEUE2,...]=CONCURRENCY")]
    queuespec: QueueSpec,
  },

  /// Sync known queues to the broker.
  Sync {
    /// Delete and recreate queues that have incompatible arguments.
    /// WARNING: this loses any pending messages in those queues.
    #[arg(long)]
    recreate: bool,
  },

  /// An ordered collection of work items to process.
  #[command(subcommand)]
  Queue(QueueCommand),
}

#[derive(Subcommand)]
enum RoutineCommand {
  /// Show all registered routines.
  List,
}

#[derive(Subcommand)]
enum QueueCommand {
  /// Purge all messages from some queues.
  Purge {
    /// Comma-separated queue names, e.g. 'production,background'.
    #[arg(value_name = "QUEUE[,QUEUE2,...]")]
    queues: String,
  },
}

fn main() {
  env_logger::init();
  let cli = Cli::parse();

  let runtime = match Runtime::from_config(demos::registry()) {
    Ok(runtime) => Arc::new(runtime),
    Err(e) => {
      eprintln!("configuration error: {e}");
      std::process::exit(2);
    }
  };

  let code = match cli.command {
    Command::Routine(RoutineCommand::List) => routine_list(&runtime),
    Command::Monitor { raw } => monitor(&runtime, raw),
    Command::Run { queuespec } => run(&runtime, queuespec),
    Command::Sync { recreate } => sync(&runtime, recreate),
    Command::Queue(QueueCommand::Purge { queues }) => queue_purge(&runtime, &queues),
  };

  runtime.shutdown();
  std::process::exit(code);
}

fn routine_list(runtime: &Runtime) -> i32 {
  let registry = runtime.registry();
  if registry.is_empty() {
    println!("No routines registered.");
    return 0;
  }

  let name_width = registry
    .routines()
    .map(|r| r.name.len())
    .chain(["Name".len()])
    .max()
    .unwrap_or(0);
  let queue_width = registry
    .routines()
    .map(|r| r.queue.len())
    .chain(["Queue".len()])
    .max()
    .unwrap_or(0);

  println!("{:<name_width$} | {:<queue_width$}", "Name", "Queue");
  println!("{}-+-{}", "-".repeat(name_width), "-".repeat(queue_width));
  for routine in registry.routines() {
    println!("{:<name_width$} | {:<queue_width$}", routine.name, routine.queue);
  }
  0
}

fn monitor(runtime: &Arc<Runtime>, raw: bool) -> i32 {
  let events = runtime.subscribe(EventKind::ALL);
  install_interrupt({
    let runtime = Arc::clone(runtime);
    move || runtime.shutdown()
  });

  while let Some(event) = events.recv() {
    if raw {
      println!("{event:?}");
    } else {
      println!(
        "{} {:>9?}  {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        event.kind(),
        event.id()
      );
    }
  }
  println!("Shutting down gracefully.");
  0
}

fn run(runtime: &Arc<Runtime>, queuespec: QueueSpec) -> i32 {
  // The in-memory broker starts empty; creating the consumed queues here is
  // idempotent and lets a worker come up before any producer.
  for queue in &queuespec.queues {
    if let Err(e) = runtime.create(queue) {
      eprintln!("cannot create queue {queue:?}: {e}");
      return 1;
    }
  }

  let worker = match Worker::new(Arc::clone(runtime), queuespec) {
    Ok(worker) => Arc::new(worker),
    Err(e) => {
      eprintln!("cannot start worker: {e}");
      return 1;
    }
  };

  install_interrupt({
    let worker = Arc::clone(&worker);
    move || worker.stop()
  });

  worker.run();
  0
}

fn sync(runtime: &Runtime, recreate: bool) -> i32 {
  let registry = runtime.registry();
  if registry.is_empty() {
    println!("No routines registered.");
    return 0;
  }

  let queues = registry.queues();
  println!("Syncing queues for {} routine(s):", registry.routines().count());

  if recreate {
    for queue in &queues {
      println!("  Recreating queue: {queue}");
      if let Err(e) = runtime.delete(queue) {
        debug!("delete {queue:?} before recreate: {e}");
      }
    }
  }

  let mut failed = Vec::new();
  for queue in &queues {
    println!("  Ensuring queue exists: {queue}");
    if runtime.create(queue).is_err() {
      failed.push(queue.clone());
    }
  }

  if !failed.is_empty() {
    eprintln!(
      "\nError: {} queue(s) have incompatible arguments: {}\n\
       Re-run with --recreate to delete and recreate them.\n\
       WARNING: This will lose any pending messages in those queues.",
      failed.len(),
      failed.join(", ")
    );
    return 1;
  }

  println!("Successfully synced {} queue(s)", queues.len());
  0
}

fn queue_purge(runtime: &Runtime, queues: &str) -> i32 {
  let queue_list: Vec<&str> = queues
    .split(',')
    .map(str::trim)
    .filter(|q| !q.is_empty())
    .collect();
  if queue_list.is_empty() {
    eprintln!("Error: No valid queue names provided");
    return 1;
  }

  let mut code = 0;
  for queue in &queue_list {
    println!("Purging queue: {queue}");
    if let Err(e) = runtime.purge(queue) {
      eprintln!("  {e}");
      code = 1;
    }
  }
  if code == 0 {
    println!("Successfully purged {} queue(s)", queue_list.len());
  }
  code
}

fn install_interrupt(handler: impl Fn() + Send + 'static) {
  if let Err(e) = ctrlc::set_handler(handler) {
    warn!("cannot install interrupt handler: {e}");
  }
}
