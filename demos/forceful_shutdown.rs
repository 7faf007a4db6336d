use bounded_executor::{interrupt_token, BoundedExecutor, ShutdownMode};
use std::time::Duration;
use tracing::info;

// Async work can race the executor's interruption signal.
fn long_async_task(id: usize) {
  let token = interrupt_token().expect("task runs on an executor worker");
  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_time()
    .build()
    .expect("Failed to build task runtime");

  runtime.block_on(async move {
    info!("Task {} starting (would take 10s)", id);
    tokio::select! {
      _ = token.cancelled() => info!("Task {} interrupted, cleaning up", id),
      _ = tokio::time::sleep(Duration::from_secs(10)) => info!("Task {} completed", id),
    }
  });
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Forceful Shutdown Example ---");

  let executor = BoundedExecutor::new(3, "forceful_shutdown_pool");
  for i in 0..3 {
    executor
      .submit(move || long_async_task(i))
      .expect("Failed to submit task");
  }

  std::thread::sleep(Duration::from_millis(500));
  info!("In flight before interrupt: {}", executor.in_flight());

  executor
    .shutdown(ShutdownMode::Interrupt)
    .expect("Interrupting shutdown failed");
  info!(
    "Shutdown complete. Completed: {}, live workers: {}",
    executor.completed_tasks(),
    executor.live_workers()
  );
  info!("--- Forceful Shutdown Example End ---");
}
