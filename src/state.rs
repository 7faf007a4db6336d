use crate::notifier::CompletionNotifier;
use crate::task::{ManagedTask, TaskId};

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

/// Lifecycle of an executor. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
  /// Accepting submissions.
  Running,
  /// Admissions closed; workers are finishing their current task and exiting.
  ShuttingDown,
  /// Every worker has exited and been joined.
  Terminated,
}

/// Everything guarded by the executor's single lock.
pub(crate) struct PoolState {
  pub(crate) shutdown: ShutdownState,
  /// Tasks admitted but not yet completed.
  pub(crate) in_flight: usize,
  /// Bumped on every task completion so waiters can tell a completion apart
  /// from any other wakeup.
  pub(crate) completion_epoch: u64,
  /// Single-slot rendezvous. Only ever filled for an idle worker that has
  /// already been reserved.
  pub(crate) handoff: Option<ManagedTask>,
  /// Workers parked in the hand-off loop that no submitter has reserved yet.
  pub(crate) idle_workers: usize,
  pub(crate) live_workers: usize,
  pub(crate) spawned_workers: usize,
  pub(crate) workers: Vec<JoinHandle<()>>,
  pub(crate) next_task_id: TaskId,
  pub(crate) completed_tasks: u64,
  pub(crate) panicked_tasks: u64,
}

impl PoolState {
  pub(crate) fn new() -> Self {
    Self {
      shutdown: ShutdownState::Running,
      in_flight: 0,
      completion_epoch: 0,
      handoff: None,
      idle_workers: 0,
      live_workers: 0,
      spawned_workers: 0,
      workers: Vec::new(),
      next_task_id: 0,
      completed_tasks: 0,
      panicked_tasks: 0,
    }
  }

  pub(crate) fn is_running(&self) -> bool {
    self.shutdown == ShutdownState::Running
  }

  /// True when a submitter may drop a task into the hand-off slot right now.
  pub(crate) fn has_unreserved_idle_worker(&self) -> bool {
    self.handoff.is_none() && self.idle_workers > 0
  }

  pub(crate) fn allocate_task_id(&mut self) -> TaskId {
    let task_id = self.next_task_id;
    self.next_task_id += 1;
    task_id
  }

  /// Moves `Running -> ShuttingDown`. Returns whether this call made the transition.
  pub(crate) fn begin_shutdown(&mut self) -> bool {
    if self.shutdown == ShutdownState::Running {
      self.shutdown = ShutdownState::ShuttingDown;
      true
    } else {
      false
    }
  }

  /// Moves `ShuttingDown -> Terminated` once no worker is left alive.
  pub(crate) fn mark_terminated(&mut self) -> bool {
    if self.shutdown == ShutdownState::ShuttingDown && self.live_workers == 0 {
      self.shutdown = ShutdownState::Terminated;
      true
    } else {
      false
    }
  }

  pub(crate) fn record_completion(&mut self, panicked: bool) {
    debug_assert!(self.in_flight > 0, "completion recorded with nothing in flight");
    self.in_flight = self.in_flight.saturating_sub(1);
    self.completion_epoch = self.completion_epoch.wrapping_add(1);
    self.completed_tasks += 1;
    if panicked {
      self.panicked_tasks += 1;
    }
  }
}

/// State shared between the executor handle and its worker threads.
pub(crate) struct Shared {
  pub(crate) pool_name: Arc<String>,
  pub(crate) max_concurrency: usize,
  pub(crate) stack_size: Option<usize>,
  pub(crate) state: Mutex<PoolState>,
  /// Idle workers wait here for the hand-off slot to be filled.
  pub(crate) work_available: Condvar,
  /// Submitters wait here for a worker to become free.
  pub(crate) admission: Condvar,
  /// Task completions and worker exits.
  pub(crate) completion: Condvar,
  /// The interruption signal raised by `interrupt_all`.
  pub(crate) shutdown_token: CancellationToken,
  pub(crate) notifier: CompletionNotifier,
}

impl Shared {
  pub(crate) fn new(pool_name: Arc<String>, max_concurrency: usize, stack_size: Option<usize>) -> Arc<Self> {
    Arc::new(Self {
      notifier: CompletionNotifier::new(pool_name.clone()),
      pool_name,
      max_concurrency,
      stack_size,
      state: Mutex::new(PoolState::new()),
      work_available: Condvar::new(),
      admission: Condvar::new(),
      completion: Condvar::new(),
      shutdown_token: CancellationToken::new(),
    })
  }

  /// Wakes every thread blocked on any of the executor's conditions.
  /// Callers hold the state lock so the wakeup cannot slip in between a
  /// waiter's check and its wait.
  pub(crate) fn notify_all_waiters(&self) {
    self.work_available.notify_all();
    self.admission.notify_all();
    self.completion.notify_all();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shutdown_state_only_moves_forward() {
    let mut state = PoolState::new();
    assert!(state.is_running());
    assert!(!state.mark_terminated(), "cannot terminate a running pool");

    assert!(state.begin_shutdown());
    assert_eq!(state.shutdown, ShutdownState::ShuttingDown);
    assert!(!state.begin_shutdown(), "second shutdown request is a no-op");

    state.live_workers = 1;
    assert!(!state.mark_terminated(), "a live worker blocks termination");
    state.live_workers = 0;
    assert!(state.mark_terminated());
    assert_eq!(state.shutdown, ShutdownState::Terminated);
    assert!(!state.begin_shutdown());
    assert_eq!(state.shutdown, ShutdownState::Terminated);
  }

  #[test]
  fn test_record_completion_updates_counters() {
    let mut state = PoolState::new();
    state.in_flight = 2;

    state.record_completion(false);
    assert_eq!(state.in_flight, 1);
    assert_eq!(state.completion_epoch, 1);
    assert_eq!(state.completed_tasks, 1);
    assert_eq!(state.panicked_tasks, 0);

    state.record_completion(true);
    assert_eq!(state.in_flight, 0);
    assert_eq!(state.completion_epoch, 2);
    assert_eq!(state.completed_tasks, 2);
    assert_eq!(state.panicked_tasks, 1);
  }

  #[test]
  fn test_task_ids_are_sequential() {
    let mut state = PoolState::new();
    assert_eq!(state.allocate_task_id(), 0);
    assert_eq!(state.allocate_task_id(), 1);
    assert_eq!(state.allocate_task_id(), 2);
  }

  #[test]
  fn test_handoff_requires_empty_slot_and_idle_worker() {
    let mut state = PoolState::new();
    assert!(!state.has_unreserved_idle_worker());

    state.idle_workers = 1;
    assert!(state.has_unreserved_idle_worker());

    state.handoff = Some(ManagedTask::new(0, Box::new(|| {})));
    assert!(!state.has_unreserved_idle_worker());
  }
}
