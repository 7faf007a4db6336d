use bounded_executor::{BoundedExecutor, ShutdownMode};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

fn long_task_fn(id: usize) {
  info!("Task {} starting (concurrency test - should take 1s)", id);
  thread::sleep(Duration::from_secs(1));
  info!("Task {} finished", id);
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Example (Limit: 2) ---");

  let concurrency_limit = 2;
  let executor = BoundedExecutor::new(concurrency_limit, "concurrency_pool");
  let num_tasks = 5;

  info!(
    "Submitting {} tasks, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_tasks,
    concurrency_limit,
    (num_tasks as f32 / concurrency_limit as f32).ceil()
  );

  let started = Instant::now();
  for i in 0..num_tasks {
    // Blocks here whenever both workers are busy.
    match executor.submit(move || long_task_fn(i)) {
      Ok(()) => info!("Task {} admitted after {:?}", i, started.elapsed()),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }

  executor.await_idle().expect("Waiting for idle failed");
  info!("All tasks processed in {:?}. Shutting down.", started.elapsed());
  executor
    .shutdown(ShutdownMode::Graceful)
    .expect("Executor shutdown failed");
  info!("--- Concurrency Limit Example End ---");
}
