use crate::error::ExecutorError;
use crate::interrupt::CancelWatch;
use crate::notifier::TaskCompletionInfo;
use crate::state::{ShutdownState, Shared};
use crate::task::{ManagedTask, TaskToExecute};
use crate::worker;

use std::fmt;
use std::sync::Arc;
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const DEFAULT_POOL_NAME: &str = "bounded-executor";

/// Defines how [`BoundedExecutor::shutdown`] treats tasks that are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
  /// Stops admissions and waits for in-flight tasks to finish on their own.
  /// The interruption signal is never raised.
  Graceful,
  /// Raises the interruption signal (`interrupt_all`) before joining.
  Interrupt,
}

/// Builder-style configuration for a [`BoundedExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
  name: String,
  max_concurrency: usize,
  stack_size: Option<usize>,
}

impl Default for ExecutorConfig {
  fn default() -> Self {
    Self {
      name: DEFAULT_POOL_NAME.to_string(),
      max_concurrency: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
      stack_size: None,
    }
  }
}

impl ExecutorConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Name used for logging and as the prefix of worker thread names.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Maximum number of tasks running at once, which is also the maximum
  /// number of worker threads. Zero is raised to one.
  pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
    self.max_concurrency = max_concurrency;
    self
  }

  /// Stack size in bytes for worker threads.
  pub fn stack_size(mut self, stack_size: usize) -> Self {
    self.stack_size = Some(stack_size);
    self
  }

  pub fn build(self) -> BoundedExecutor {
    if self.max_concurrency == 0 {
      warn!(pool_name = %self.name, "max_concurrency of 0 requested, using 1.");
    }
    let max_concurrency = self.max_concurrency.max(1);
    let shared = Shared::new(Arc::new(self.name), max_concurrency, self.stack_size);
    info!(pool_name = %*shared.pool_name, max_concurrency, "Bounded executor created.");
    BoundedExecutor { shared }
  }
}

/// A thread executor that never holds more than `max_concurrency` tasks in
/// flight. [`submit`](Self::submit) blocks until a worker can start the task
/// immediately; nothing is ever queued.
///
/// Share it between threads with `Arc`. Dropping it raises the interruption
/// signal and detaches the workers without waiting for them.
pub struct BoundedExecutor {
  shared: Arc<Shared>,
}

impl fmt::Debug for BoundedExecutor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.shared.state.lock();
    f.debug_struct("BoundedExecutor")
      .field("name", &self.shared.pool_name)
      .field("max_concurrency", &self.shared.max_concurrency)
      .field("in_flight", &state.in_flight)
      .field("live_workers", &state.live_workers)
      .field("state", &state.shutdown)
      .finish_non_exhaustive()
  }
}

impl BoundedExecutor {
  pub fn new(max_concurrency: usize, pool_name: &str) -> Self {
    ExecutorConfig::new().name(pool_name).max_concurrency(max_concurrency).build()
  }

  pub fn builder() -> ExecutorConfig {
    ExecutorConfig::new()
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  pub fn max_concurrency(&self) -> usize {
    self.shared.max_concurrency
  }

  /// Number of tasks admitted and not yet completed.
  pub fn in_flight(&self) -> usize {
    self.shared.state.lock().in_flight
  }

  /// Worker threads created over the executor's lifetime.
  pub fn worker_count(&self) -> usize {
    self.shared.state.lock().spawned_workers
  }

  /// Worker threads that have not exited yet.
  pub fn live_workers(&self) -> usize {
    self.shared.state.lock().live_workers
  }

  /// Tasks completed, successfully or not, since the executor was created.
  pub fn completed_tasks(&self) -> u64 {
    self.shared.state.lock().completed_tasks
  }

  pub fn panicked_tasks(&self) -> u64 {
    self.shared.state.lock().panicked_tasks
  }

  pub fn state(&self) -> ShutdownState {
    self.shared.state.lock().shutdown
  }

  pub fn is_shutdown(&self) -> bool {
    self.state() != ShutdownState::Running
  }

  /// Registers a handler invoked on the worker thread after every task.
  ///
  /// Handlers run before the task leaves the in-flight count, so a handler
  /// must not block on its own executor. Calling `await_idle`, `join_all` or
  /// `shutdown` from a handler deadlocks that worker, and so does `submit`
  /// while every worker is busy.
  pub fn add_completion_handler(&self, handler: impl Fn(TaskCompletionInfo) + Send + Sync + 'static) {
    self.shared.notifier.add_handler(handler);
  }

  pub fn completion_handler_count(&self) -> usize {
    self.shared.notifier.handler_count()
  }

  /// Hands `task` to a worker, blocking until one can start it right away.
  ///
  /// Returns once the task is admitted, not when it finishes. The task counts
  /// as in flight before this returns.
  ///
  /// # Errors
  /// Returns `ExecutorError::Closed` if shutdown has begun, including while
  /// the call was blocked. Returns `ExecutorError::WorkerSpawn` if a new
  /// worker thread was needed and could not be created.
  pub fn submit<F>(&self, task: F) -> Result<(), ExecutorError>
  where
    F: FnOnce() + Send + 'static,
  {
    self.admit(Box::new(task), None)
  }

  /// Like [`submit`](Self::submit), but gives up with
  /// `ExecutorError::Cancelled` if `cancel` fires before the task is
  /// admitted. A task that was not admitted never runs.
  pub fn submit_cancellable<F>(&self, task: F, cancel: &CancellationToken) -> Result<(), ExecutorError>
  where
    F: FnOnce() + Send + 'static,
  {
    self.admit(Box::new(task), Some(cancel))
  }

  /// `true` iff at least one task is in flight. A momentary snapshot.
  pub fn active(&self) -> bool {
    self.shared.state.lock().in_flight > 0
  }

  /// Blocks until the next task completes. Returns immediately if nothing is
  /// in flight. Other tasks may still be running when this returns.
  pub fn await_next_completion(&self) -> Result<(), ExecutorError> {
    self.wait_next_completion(None)
  }

  pub fn await_next_completion_cancellable(&self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
    self.wait_next_completion(Some(cancel))
  }

  /// Blocks until no task is in flight. Tasks submitted by other threads
  /// while this waits extend the wait.
  pub fn await_idle(&self) -> Result<(), ExecutorError> {
    self.wait_idle(None)
  }

  pub fn await_idle_cancellable(&self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
    self.wait_idle(Some(cancel))
  }

  /// Closes admissions and raises the interruption signal for every worker
  /// and every running task. Does not wait; pair it with
  /// [`join_all`](Self::join_all).
  pub fn interrupt_all(&self) {
    self.close_admissions();
    // Outside the lock: wakers registered on this token take the lock.
    self.shared.shutdown_token.cancel();
    debug!(pool_name = %*self.shared.pool_name, "Interruption signal raised for all workers.");
  }

  /// Blocks until every worker thread has exited, then joins them.
  ///
  /// Call after [`interrupt_all`](Self::interrupt_all) (or a graceful
  /// shutdown); on a running executor with idle workers this waits forever.
  /// Calling it from inside a task of the same executor also waits forever,
  /// since the calling worker cannot exit while it waits.
  pub fn join_all(&self) -> Result<(), ExecutorError> {
    self.wait_workers_exited(None)
  }

  pub fn join_all_cancellable(&self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
    self.wait_workers_exited(Some(cancel))
  }

  /// Shuts the executor down and waits for every worker to exit.
  ///
  /// `Graceful` waits for in-flight tasks to finish on their own, so one task
  /// that never returns blocks this forever; use
  /// [`shutdown_cancellable`](Self::shutdown_cancellable) to bound the wait.
  /// Like `join_all`, this never returns when called from one of the
  /// executor's own tasks.
  pub fn shutdown(&self, mode: ShutdownMode) -> Result<(), ExecutorError> {
    self.shutdown_with(mode, None)
  }

  /// Like [`shutdown`](Self::shutdown), but gives up with
  /// `ExecutorError::Cancelled` if `cancel` fires while waiting. Admissions
  /// stay closed; call `shutdown` or `join_all` again to finish the teardown.
  pub fn shutdown_cancellable(&self, mode: ShutdownMode, cancel: &CancellationToken) -> Result<(), ExecutorError> {
    self.shutdown_with(mode, Some(cancel))
  }

  fn shutdown_with(&self, mode: ShutdownMode, cancel: Option<&CancellationToken>) -> Result<(), ExecutorError> {
    info!(pool_name = %*self.shared.pool_name, "Initiating executor shutdown (mode: {:?}).", mode);
    match mode {
      ShutdownMode::Graceful => {
        self.close_admissions();
        self.wait_idle(cancel)?;
      }
      ShutdownMode::Interrupt => self.interrupt_all(),
    }
    self.wait_workers_exited(cancel)?;
    info!(pool_name = %*self.shared.pool_name, "Executor shutdown completed.");
    Ok(())
  }

  fn admit(&self, job: TaskToExecute, cancel: Option<&CancellationToken>) -> Result<(), ExecutorError> {
    let watch = CancelWatch::register(&self.shared, cancel);
    let mut state = self.shared.state.lock();

    loop {
      if !state.is_running() {
        warn!(pool_name = %*self.shared.pool_name, "Submit: Attempted to submit task to an executor that is shutting down or terminated.");
        return Err(ExecutorError::Closed);
      }
      if watch.is_cancelled() {
        debug!(pool_name = %*self.shared.pool_name, "Submit: Cancelled while waiting for a free worker.");
        return Err(ExecutorError::Cancelled);
      }

      if state.has_unreserved_idle_worker() {
        let task_id = state.allocate_task_id();
        state.in_flight += 1;
        state.idle_workers -= 1;
        state.handoff = Some(ManagedTask::new(task_id, job));
        self.shared.work_available.notify_one();
        debug!(pool_name = %*self.shared.pool_name, %task_id, in_flight = state.in_flight, "Task handed to idle worker.");
        return Ok(());
      }

      if state.spawned_workers < self.shared.max_concurrency {
        // Reserve the worker slot, then create the thread without holding the lock.
        let task_id = state.allocate_task_id();
        let worker_index = state.spawned_workers;
        state.in_flight += 1;
        state.spawned_workers += 1;
        state.live_workers += 1;
        drop(state);

        let spawned = worker::spawn_worker(&self.shared, worker_index, ManagedTask::new(task_id, job));

        let mut state = self.shared.state.lock();
        return match spawned {
          Ok(handle) => {
            debug!(
              pool_name = %*self.shared.pool_name,
              %task_id,
              in_flight = state.in_flight,
              "Task handed to new worker {} of at most {}.",
              worker_index + 1,
              self.shared.max_concurrency
            );
            if state.shutdown == ShutdownState::Terminated {
              // The worker already exited and join_all collected the other handles.
              drop(state);
              if handle.join().is_err() {
                error!(pool_name = %*self.shared.pool_name, "Worker thread panicked outside of a task.");
              }
            } else {
              state.workers.push(handle);
            }
            Ok(())
          }
          Err(spawn_error) => {
            state.in_flight -= 1;
            state.spawned_workers -= 1;
            state.live_workers -= 1;
            self.shared.admission.notify_all();
            self.shared.completion.notify_all();
            Err(spawn_error)
          }
        };
      }

      trace!(pool_name = %*self.shared.pool_name, in_flight = state.in_flight, "Submit: All workers busy, blocking.");
      self.shared.admission.wait(&mut state);
    }
  }

  fn wait_next_completion(&self, cancel: Option<&CancellationToken>) -> Result<(), ExecutorError> {
    let watch = CancelWatch::register(&self.shared, cancel);
    let mut state = self.shared.state.lock();
    if state.in_flight == 0 {
      return Ok(());
    }

    let observed_epoch = state.completion_epoch;
    while state.completion_epoch == observed_epoch {
      if watch.is_cancelled() {
        return Err(ExecutorError::Cancelled);
      }
      self.shared.completion.wait(&mut state);
    }
    Ok(())
  }

  fn wait_idle(&self, cancel: Option<&CancellationToken>) -> Result<(), ExecutorError> {
    let watch = CancelWatch::register(&self.shared, cancel);
    let mut state = self.shared.state.lock();
    while state.in_flight > 0 {
      if watch.is_cancelled() {
        return Err(ExecutorError::Cancelled);
      }
      trace!(pool_name = %*self.shared.pool_name, in_flight = state.in_flight, "Waiting for executor to go idle.");
      self.shared.completion.wait(&mut state);
    }
    Ok(())
  }

  fn close_admissions(&self) {
    let mut state = self.shared.state.lock();
    if state.begin_shutdown() {
      info!(pool_name = %*self.shared.pool_name, in_flight = state.in_flight, "Admissions closed, idle workers will exit.");
    }
    self.shared.notify_all_waiters();
  }

  fn wait_workers_exited(&self, cancel: Option<&CancellationToken>) -> Result<(), ExecutorError> {
    let watch = CancelWatch::register(&self.shared, cancel);
    let handles = {
      let mut state = self.shared.state.lock();
      while state.live_workers > 0 {
        if watch.is_cancelled() {
          return Err(ExecutorError::Cancelled);
        }
        self.shared.completion.wait(&mut state);
      }
      if state.mark_terminated() {
        info!(pool_name = %*self.shared.pool_name, "All workers exited, executor terminated.");
      }
      std::mem::take(&mut state.workers)
    };

    if handles.is_empty() {
      trace!(pool_name = %*self.shared.pool_name, "No worker handles left to join.");
    }
    for handle in handles {
      let worker_name = handle.thread().name().unwrap_or("<unnamed>").to_string();
      if handle.join().is_err() {
        error!(pool_name = %*self.shared.pool_name, worker = %worker_name, "Worker thread panicked outside of a task.");
      }
    }
    Ok(())
  }
}

impl Drop for BoundedExecutor {
  fn drop(&mut self) {
    if !self.is_shutdown() {
      info!(
        pool_name = %*self.shared.pool_name,
        "BoundedExecutor dropped while running. Raising interruption signal and detaching workers."
      );
      self.interrupt_all();
    } else {
      trace!(pool_name = %*self.shared.pool_name, "Drop: Shutdown already in progress or completed.");
    }
  }
}
