use std::fmt;

/// Identifier assigned to every admitted task, unique per executor.
pub type TaskId = u64;

/// The boxed form every submitted closure is stored in until a worker runs it.
pub(crate) type TaskToExecute = Box<dyn FnOnce() + Send + 'static>;

/// Internal representation of an admitted task travelling to a worker.
pub(crate) struct ManagedTask {
  pub(crate) task_id: TaskId,
  pub(crate) job: TaskToExecute,
}

impl ManagedTask {
  pub(crate) fn new(task_id: TaskId, job: TaskToExecute) -> Self {
    Self { task_id, job }
  }
}

impl fmt::Debug for ManagedTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManagedTask")
      .field("task_id", &self.task_id)
      .finish_non_exhaustive()
  }
}
