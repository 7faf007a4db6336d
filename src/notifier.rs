use crate::task::TaskId;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{debug, error, info, trace};

// --- Public Event Structs for Handlers ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCompletionStatus {
  Success,
  Panicked,
}

impl<T> From<&std::thread::Result<T>> for TaskCompletionStatus {
  fn from(result: &std::thread::Result<T>) -> Self {
    match result {
      Ok(_) => TaskCompletionStatus::Success,
      Err(_) => TaskCompletionStatus::Panicked,
    }
  }
}

#[derive(Debug, Clone)]
pub struct TaskCompletionInfo {
  pub task_id: TaskId,
  pub pool_name: Arc<String>,
  /// Name of the worker thread that ran the task.
  pub worker_name: Arc<str>,
  pub status: TaskCompletionStatus,
  pub completion_time: SystemTime,
}

type CompletionHandler = Arc<dyn Fn(TaskCompletionInfo) + Send + Sync + 'static>;

/// Fans task completions out to user-registered handlers.
///
/// Dispatch happens on the worker thread that finished the task, before the
/// task stops counting as in flight, so anyone who saw the executor go idle
/// also sees every handler invocation for the tasks it waited on.
pub(crate) struct CompletionNotifier {
  handlers: RwLock<Vec<CompletionHandler>>,
  pool_name: Arc<String>,
}

impl fmt::Debug for CompletionNotifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let handler_count = self.handlers.try_read().map_or(0, |guard| guard.len());
    f.debug_struct("CompletionNotifier")
      .field("pool_name", &self.pool_name)
      .field("handler_count", &handler_count)
      .finish()
  }
}

impl CompletionNotifier {
  pub(crate) fn new(pool_name: Arc<String>) -> Self {
    Self {
      handlers: RwLock::new(Vec::new()),
      pool_name,
    }
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    let mut handlers_guard = self.handlers.write();
    handlers_guard.push(Arc::new(handler));
    info!(pool_name = %*self.pool_name, "Notifier: Added new completion handler. Total handlers: {}", handlers_guard.len());
  }

  pub(crate) fn handler_count(&self) -> usize {
    self.handlers.read().len()
  }

  pub(crate) fn notify(&self, task_id: TaskId, worker_name: &Arc<str>, status: TaskCompletionStatus) {
    // Snapshot so a handler may register further handlers without deadlocking.
    let handlers: Vec<CompletionHandler> = self.handlers.read().clone();
    if handlers.is_empty() {
      trace!(pool_name = %*self.pool_name, %task_id, "No completion handlers registered, dropping notification.");
      return;
    }

    let info = TaskCompletionInfo {
      task_id,
      pool_name: self.pool_name.clone(),
      worker_name: worker_name.clone(),
      status,
      completion_time: SystemTime::now(),
    };

    debug!(pool_name = %*self.pool_name, %task_id, "Dispatching notification to {} handlers.", handlers.len());

    for handler in handlers {
      let info_for_handler = info.clone();
      let result = panic::catch_unwind(AssertUnwindSafe(|| handler(info_for_handler)));
      if let Err(payload) = result {
        error!(
          pool_name = %*self.pool_name,
          %task_id,
          "A completion handler panicked: {}",
          panic_message(&*payload)
        );
      }
    }
  }
}

/// Best-effort rendering of a panic payload for logs.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    *message
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.as_str()
  } else {
    "<non-string panic payload>"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;

  fn worker_name() -> Arc<str> {
    Arc::from("notifier_unit - 0")
  }

  #[test]
  fn test_notify_without_handlers_is_noop() {
    let notifier = CompletionNotifier::new(Arc::new("notifier_unit".to_string()));
    assert_eq!(notifier.handler_count(), 0);
    notifier.notify(1, &worker_name(), TaskCompletionStatus::Success);
  }

  #[test]
  fn test_notify_reaches_every_handler() {
    let notifier = CompletionNotifier::new(Arc::new("notifier_unit".to_string()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    for handler_idx in 0..2 {
      let seen = seen.clone();
      notifier.add_handler(move |info| seen.lock().push((handler_idx, info.task_id, info.status)));
    }

    notifier.notify(7, &worker_name(), TaskCompletionStatus::Panicked);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.contains(&(0, 7, TaskCompletionStatus::Panicked)));
    assert!(seen.contains(&(1, 7, TaskCompletionStatus::Panicked)));
  }

  #[test]
  fn test_panicking_handler_does_not_stop_dispatch() {
    let notifier = CompletionNotifier::new(Arc::new("notifier_unit".to_string()));
    let reached = Arc::new(Mutex::new(false));
    notifier.add_handler(|_| panic!("handler failure"));
    {
      let reached = reached.clone();
      notifier.add_handler(move |_| *reached.lock() = true);
    }

    notifier.notify(3, &worker_name(), TaskCompletionStatus::Success);
    assert!(*reached.lock());
  }

  #[test]
  fn test_status_from_thread_result() {
    let ok: std::thread::Result<()> = Ok(());
    let err: std::thread::Result<()> = Err(Box::new("boom"));
    assert_eq!(TaskCompletionStatus::from(&ok), TaskCompletionStatus::Success);
    assert_eq!(TaskCompletionStatus::from(&err), TaskCompletionStatus::Panicked);
    assert_eq!(panic_message(&*err.unwrap_err()), "boom");
  }
}
