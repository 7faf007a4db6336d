use thiserror::Error;

/// Errors surfaced by the blocking operations of a `BoundedExecutor`.
///
/// Task panics are deliberately absent: they are caught on the worker thread
/// and reported through completion handlers instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
  #[error("Blocking executor call was cancelled before it could complete")]
  Cancelled,

  #[error("Executor is shutting down or already terminated, cannot accept new tasks")]
  Closed,

  #[error("Failed to spawn executor worker thread: {0}")]
  WorkerSpawn(String),
}
