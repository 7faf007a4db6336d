//! A fixed-capacity thread executor with blocking admission.
//!
//! `submit` hands a task straight to a worker thread and blocks while all
//! `max_concurrency` workers are busy; there is no queue, so back-pressure
//! reaches the producer. The executor also lets callers observe activity,
//! wait for the next completion or for quiescence, and tear the pool down
//! with an interrupt followed by a join.

mod error;
mod executor;
mod interrupt;
mod notifier;
mod state;
mod task;
mod worker;

pub use error::ExecutorError;
pub use executor::{BoundedExecutor, ExecutorConfig, ShutdownMode};
pub use interrupt::{interrupt_token, is_interrupted};
pub use notifier::{TaskCompletionInfo, TaskCompletionStatus};
pub use state::ShutdownState;
pub use task::TaskId;
pub use tokio_util::sync::CancellationToken;
