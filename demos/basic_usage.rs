use bounded_executor::{BoundedExecutor, ShutdownMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Example ---");

  let executor = BoundedExecutor::new(2, "basic_pool");
  let sum = Arc::new(AtomicUsize::new(0));

  for i in 1..=5 {
    let sum = sum.clone();
    executor
      .submit(move || {
        info!("Task {} running on {:?}", i, thread::current().name());
        thread::sleep(Duration::from_millis(100));
        sum.fetch_add(i, Ordering::SeqCst);
      })
      .expect("Failed to submit task");
    info!("Task {} admitted (in flight: {})", i, executor.in_flight());
  }

  executor.await_idle().expect("Waiting for idle failed");
  info!("All tasks done, sum = {}", sum.load(Ordering::SeqCst));

  executor
    .shutdown(ShutdownMode::Graceful)
    .expect("Executor shutdown failed");
  info!("--- Basic Usage Example End ---");
}
