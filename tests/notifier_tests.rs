use bounded_executor::{
  BoundedExecutor, CancellationToken, ExecutorError, ShutdownMode, TaskCompletionInfo, TaskCompletionStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Helper to initialize tracing for tests
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bounded_executor=trace"));
    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

// Helper for collecting notifications in tests
fn create_collecting_handler() -> (
  Arc<Mutex<Vec<TaskCompletionInfo>>>,
  impl Fn(TaskCompletionInfo) + Send + Sync + 'static,
) {
  let collected_notifications = Arc::new(Mutex::new(Vec::new()));
  let collected_notifications_clone = collected_notifications.clone();
  let handler = move |info: TaskCompletionInfo| {
    tracing::debug!(
      "Test Collecting Handler: Received notification for task_id: {}, status: {:?}",
      info.task_id,
      info.status
    );
    collected_notifications_clone.lock().unwrap().push(info);
  };
  (collected_notifications, handler)
}

#[test]
fn test_completion_notifier_success() {
  setup_tracing_for_test();
  let pool_name = "test_notifier_success";
  let executor = BoundedExecutor::new(1, pool_name);
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);
  assert_eq!(executor.completion_handler_count(), 1);

  executor.submit(|| thread::sleep(Duration::from_millis(20))).unwrap();
  executor.await_idle().unwrap();

  // Handlers run before the task stops counting as in flight.
  let notifs = notifications.lock().unwrap();
  assert_eq!(notifs.len(), 1);
  let info = &notifs[0];
  assert_eq!(info.task_id, 0);
  assert_eq!(*info.pool_name, pool_name);
  assert_eq!(&*info.worker_name, "test_notifier_success - 0");
  assert_eq!(info.status, TaskCompletionStatus::Success);
  assert!(info.completion_time <= std::time::SystemTime::now());
  drop(notifs);

  executor.shutdown(ShutdownMode::Graceful).unwrap();
}

#[test]
fn test_completion_notifier_panic() {
  setup_tracing_for_test();
  let pool_name = "test_notifier_panic";
  let executor = BoundedExecutor::new(1, pool_name);
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  executor.submit(|| panic!("Task (notifier test context) intentionally panicked!")).unwrap();
  executor.await_idle().unwrap();

  let notifs = notifications.lock().unwrap();
  assert_eq!(notifs.len(), 1);
  assert_eq!(notifs[0].status, TaskCompletionStatus::Panicked);
  assert_eq!(*notifs[0].pool_name, pool_name);
  drop(notifs);

  executor.shutdown(ShutdownMode::Graceful).unwrap();
}

#[test]
fn test_completion_notifier_task_ids_are_unique() {
  setup_tracing_for_test();
  let executor = BoundedExecutor::new(3, "test_notifier_unique_ids");
  let (notifications, handler) = create_collecting_handler();
  executor.add_completion_handler(handler);

  let task_count = 12;
  for i in 0..task_count {
    executor
      .submit(move || {
        if i % 4 == 0 {
          panic!("Task {} intentionally panicked!", i);
        }
        thread::sleep(Duration::from_millis(5));
      })
      .unwrap();
  }
  executor.await_idle().unwrap();

  let notifs = notifications.lock().unwrap();
  assert_eq!(notifs.len(), task_count);
  let ids: HashSet<u64> = notifs.iter().map(|info| info.task_id).collect();
  assert_eq!(ids, (0..task_count as u64).collect::<HashSet<_>>());
  let panicked = notifs
    .iter()
    .filter(|info| info.status == TaskCompletionStatus::Panicked)
    .count();
  assert_eq!(panicked, 3);
  assert_eq!(executor.panicked_tasks(), 3);
  drop(notifs);

  executor.shutdown(ShutdownMode::Graceful).unwrap();
}

#[test]
fn test_completion_notifier_multiple_handlers() {
  setup_tracing_for_test();
  let executor = BoundedExecutor::new(2, "test_notifier_multi_handler");
  let (notifications_1, handler_1) = create_collecting_handler();
  let (notifications_2, handler_2) = create_collecting_handler();
  executor.add_completion_handler(handler_1);
  executor.add_completion_handler(handler_2);

  for _ in 0..4 {
    executor.submit(|| thread::sleep(Duration::from_millis(10))).unwrap();
  }
  executor.await_idle().unwrap();

  assert_eq!(notifications_1.lock().unwrap().len(), 4);
  assert_eq!(notifications_2.lock().unwrap().len(), 4);

  executor.shutdown(ShutdownMode::Graceful).unwrap();
}

#[test]
fn test_completion_handler_panic_does_not_affect_executor() {
  setup_tracing_for_test();
  let executor = BoundedExecutor::new(1, "test_notifier_handler_panic");
  let calls = Arc::new(AtomicUsize::new(0));
  executor.add_completion_handler(|_| panic!("Completion handler intentionally panicked!"));
  {
    let calls = calls.clone();
    executor.add_completion_handler(move |_| {
      calls.fetch_add(1, Ordering::SeqCst);
    });
  }

  for _ in 0..3 {
    executor.submit(|| {}).unwrap();
  }
  executor.await_idle().unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(executor.panicked_tasks(), 0, "handler panics are not task panics");
  assert_eq!(executor.worker_count(), 1);
  assert_eq!(executor.in_flight(), 0);

  executor.shutdown(ShutdownMode::Graceful).unwrap();
}

#[test]
fn test_no_notifications_without_handlers() {
  setup_tracing_for_test();
  let executor = BoundedExecutor::new(1, "test_notifier_no_handlers");
  assert_eq!(executor.completion_handler_count(), 0);
  executor.submit(|| {}).unwrap();
  executor.await_idle().unwrap();
  assert_eq!(executor.completed_tasks(), 1);
  executor.shutdown(ShutdownMode::Graceful).unwrap();
}

#[test]
fn test_completion_handler_sees_task_still_in_flight() {
  setup_tracing_for_test();
  let executor = Arc::new(BoundedExecutor::new(1, "test_notifier_handler_in_flight"));
  let observed = Arc::new(Mutex::new(Vec::new()));
  {
    let weak_executor = Arc::downgrade(&executor);
    let observed = observed.clone();
    let already_cancelled = CancellationToken::new();
    already_cancelled.cancel();
    executor.add_completion_handler(move |_| {
      if let Some(executor) = weak_executor.upgrade() {
        // Waiting for idle from here can only end through the token.
        let waited = executor.await_idle_cancellable(&already_cancelled);
        observed.lock().unwrap().push((executor.in_flight(), waited));
      }
    });
  }

  executor.submit(|| {}).unwrap();
  executor.await_idle().unwrap();

  let observed = observed.lock().unwrap();
  assert_eq!(observed.len(), 1);
  assert_eq!(observed[0], (1, Err(ExecutorError::Cancelled)));
  drop(observed);

  executor.shutdown(ShutdownMode::Graceful).unwrap();
}
