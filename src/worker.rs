use crate::error::ExecutorError;
use crate::interrupt;
use crate::notifier::{panic_message, TaskCompletionStatus};
use crate::state::Shared;
use crate::task::ManagedTask;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, info_span, trace};

/// Spawns a new worker thread whose first job is `first_task`.
///
/// Called without the state lock. The caller has already counted the worker
/// as spawned and live, and records the returned handle or rolls back.
pub(crate) fn spawn_worker(
  shared: &Arc<Shared>,
  worker_index: usize,
  first_task: ManagedTask,
) -> Result<JoinHandle<()>, ExecutorError> {
  let worker_name: Arc<str> = Arc::from(format!("{} - {}", shared.pool_name, worker_index));

  let mut builder = thread::Builder::new().name(worker_name.to_string());
  if let Some(stack_size) = shared.stack_size {
    builder = builder.stack_size(stack_size);
  }

  let worker_shared = shared.clone();
  let thread_worker_name = worker_name.clone();
  builder
    .spawn(move || run_worker(worker_shared, thread_worker_name, first_task))
    .map_err(|spawn_error| {
      error!(pool_name = %*shared.pool_name, worker = %worker_name, "Failed to spawn worker thread: {}", spawn_error);
      ExecutorError::WorkerSpawn(spawn_error.to_string())
    })
}

/// Decrements the live worker count however the worker loop ends.
struct WorkerExitGuard {
  shared: Arc<Shared>,
}

impl Drop for WorkerExitGuard {
  fn drop(&mut self) {
    let mut state = self.shared.state.lock();
    state.live_workers -= 1;
    self.shared.completion.notify_all();
  }
}

/// Marks a task completed when dropped, so the in-flight count is released
/// even if something after the task body unwinds.
struct InFlightGuard<'a> {
  shared: &'a Shared,
  panicked: bool,
}

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    let mut state = self.shared.state.lock();
    state.record_completion(self.panicked);
    trace!(pool_name = %*self.shared.pool_name, in_flight = state.in_flight, "Task released its in-flight slot.");
    self.shared.completion.notify_all();
  }
}

fn run_worker(shared: Arc<Shared>, worker_name: Arc<str>, first_task: ManagedTask) {
  let _exit_guard = WorkerExitGuard { shared: shared.clone() };
  let _context = interrupt::enter_worker(shared.shutdown_token.clone());
  let _span = info_span!("bounded_executor_worker", pool_name = %*shared.pool_name, worker = %worker_name).entered();

  info!("Worker started.");

  let mut next_task = Some(first_task);
  while let Some(task) = next_task.take() {
    run_task(&shared, &worker_name, task);
    next_task = wait_for_task(&shared);
  }

  info!("Worker stopped.");
}

fn run_task(shared: &Shared, worker_name: &Arc<str>, task: ManagedTask) {
  let task_id = task.task_id;
  let mut in_flight = InFlightGuard { shared, panicked: false };

  debug!(%task_id, "Running task.");
  let outcome = panic::catch_unwind(AssertUnwindSafe(task.job));
  let status = TaskCompletionStatus::from(&outcome);

  match outcome {
    Ok(()) => trace!(%task_id, "Task executed successfully."),
    Err(payload) => {
      error!(%task_id, "Task panicked during execution: {}", panic_message(&*payload));
      in_flight.panicked = true;
    }
  }

  shared.notifier.notify(task_id, worker_name, status);
  debug!(%task_id, "Task finished.");
}

/// Parks the worker in the hand-off loop. Returns `None` once the executor is
/// no longer running and no task is waiting in the slot.
fn wait_for_task(shared: &Shared) -> Option<ManagedTask> {
  let mut state = shared.state.lock();
  state.idle_workers += 1;
  shared.admission.notify_all();

  loop {
    // The submitter that filled the slot already took this worker off the idle count.
    if let Some(task) = state.handoff.take() {
      shared.admission.notify_all();
      trace!(task_id = task.task_id, "Picked up task from hand-off slot.");
      return Some(task);
    }
    if !state.is_running() {
      state.idle_workers -= 1;
      return None;
    }
    shared.work_available.wait(&mut state);
  }
}
