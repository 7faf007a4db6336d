use bounded_executor::{BoundedExecutor, ShutdownMode, TaskCompletionInfo, TaskCompletionStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Completion Notifier Example ---");

  let executor = BoundedExecutor::new(2, "notifier_pool");

  let successes = Arc::new(AtomicUsize::new(0));
  let failures = Arc::new(AtomicUsize::new(0));
  {
    let successes = successes.clone();
    let failures = failures.clone();
    executor.add_completion_handler(move |info: TaskCompletionInfo| match info.status {
      TaskCompletionStatus::Success => {
        successes.fetch_add(1, Ordering::SeqCst);
        info!("Handler: task {} succeeded on {}", info.task_id, info.worker_name);
      }
      TaskCompletionStatus::Panicked => {
        failures.fetch_add(1, Ordering::SeqCst);
        warn!("Handler: task {} panicked on {}", info.task_id, info.worker_name);
      }
    });
  }

  for i in 0..6 {
    executor
      .submit(move || {
        thread::sleep(Duration::from_millis(100));
        if i == 3 {
          panic!("Task {} intentionally panicked!", i);
        }
      })
      .expect("Failed to submit task");
  }

  executor.await_idle().expect("Waiting for idle failed");
  info!(
    "Successes: {}, failures: {}",
    successes.load(Ordering::SeqCst),
    failures.load(Ordering::SeqCst)
  );

  executor
    .shutdown(ShutdownMode::Graceful)
    .expect("Executor shutdown failed");
  info!("--- Completion Notifier Example End ---");
}
