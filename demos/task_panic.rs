use bounded_executor::{BoundedExecutor, ShutdownMode};
use tracing::info;

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Task Panic Example ---");

  let executor = BoundedExecutor::new(1, "panic_pool");

  executor
    .submit(|| {
      info!("Panicking task is about to panic!");
      panic!("This task intentionally panicked!");
    })
    .expect("Failed to submit panicking task");

  executor
    .submit(|| info!("Normal task ran on the same worker."))
    .expect("Failed to submit normal task");

  executor.await_idle().expect("Waiting for idle failed");
  info!(
    "Completed: {}, panicked: {}, workers: {}",
    executor.completed_tasks(),
    executor.panicked_tasks(),
    executor.worker_count()
  );

  executor
    .shutdown(ShutdownMode::Graceful)
    .expect("Executor shutdown failed");
  info!("--- Task Panic Example End ---");
}
