use bounded_executor::{BoundedExecutor, ShutdownMode};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

fn work_task_fn(id: usize, duration_s: u64) {
  info!("Task {} starting (will run for {}s)", id, duration_s);
  thread::sleep(Duration::from_secs(duration_s));
  info!("Task {} finished after {}s", id, duration_s);
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let executor = Arc::new(BoundedExecutor::new(2, "graceful_shutdown_pool"));

  for i in 0..2 {
    executor
      .submit(move || work_task_fn(i, 2))
      .expect("Failed to submit task");
  }
  info!("2 tasks admitted. Active: {}", executor.active());

  let executor_for_shutdown = executor.clone();
  let shutdown_jh = thread::spawn(move || {
    info!("Calling shutdown(Graceful)...");
    executor_for_shutdown
      .shutdown(ShutdownMode::Graceful)
      .expect("Graceful shutdown failed");
    info!("Shutdown call completed.");
  });

  thread::sleep(Duration::from_millis(100));
  info!("Attempting to submit task after shutdown initiated...");
  match executor.submit(|| work_task_fn(99, 1)) {
    Ok(()) => tracing::error!("LATE SUBMISSION SUCCEEDED (UNEXPECTED!)"),
    Err(e) => info!("Late submission correctly failed: {}", e),
  }

  shutdown_jh.join().expect("Shutdown thread panicked");
  info!("Executor state after shutdown: {:?}", executor.state());
  info!("--- Graceful Shutdown Example End ---");
}
