//! Interruption plumbing.
//!
//! Blocking calls take an optional `CancellationToken`. A [`CancelWatch`]
//! registers a waker on the token that takes the executor's lock and wakes
//! every waiter, so a cancelled caller notices on its next check without any
//! polling. Worker threads additionally expose the executor's shutdown token
//! to the tasks they run through [`interrupt_token`] and [`is_interrupted`].

use crate::state::Shared;

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::{waker, ArcWake};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::trace;

thread_local! {
  static WORKER_INTERRUPT: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

/// Returns the interruption signal of the executor whose worker is running
/// the current task, or `None` when called outside a worker thread.
///
/// Long-running tasks should check it (or await `cancelled()` on it) so that
/// `interrupt_all` can stop them.
pub fn interrupt_token() -> Option<CancellationToken> {
  WORKER_INTERRUPT.with(|slot| slot.borrow().clone())
}

/// `true` if the current thread is an executor worker and that executor has
/// been interrupted.
pub fn is_interrupted() -> bool {
  WORKER_INTERRUPT.with(|slot| slot.borrow().as_ref().is_some_and(CancellationToken::is_cancelled))
}

/// Clears the worker's thread-local interrupt token when the worker exits.
pub(crate) struct WorkerContextGuard {
  _private: (),
}

pub(crate) fn enter_worker(token: CancellationToken) -> WorkerContextGuard {
  WORKER_INTERRUPT.with(|slot| *slot.borrow_mut() = Some(token));
  WorkerContextGuard { _private: () }
}

impl Drop for WorkerContextGuard {
  fn drop(&mut self) {
    WORKER_INTERRUPT.with(|slot| slot.borrow_mut().take());
  }
}

struct WakeWaiters {
  shared: Arc<Shared>,
}

impl ArcWake for WakeWaiters {
  fn wake_by_ref(arc_self: &Arc<Self>) {
    // Taking the lock orders this wakeup after any waiter's check-then-wait.
    let _state = arc_self.shared.state.lock();
    trace!(pool_name = %*arc_self.shared.pool_name, "Caller cancellation observed, waking blocked threads.");
    arc_self.shared.notify_all_waiters();
  }
}

/// Ties a caller's cancellation token to the executor's condition variables
/// for the duration of one blocking call.
///
/// Must be created before the state lock is taken: registration polls the
/// token, and the token's waker takes that same lock.
pub(crate) struct CancelWatch {
  token: Option<CancellationToken>,
  // Dropping the future deregisters the waker.
  _registration: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl CancelWatch {
  pub(crate) fn register(shared: &Arc<Shared>, token: Option<&CancellationToken>) -> Self {
    let Some(token) = token else {
      return Self {
        token: None,
        _registration: None,
      };
    };

    let mut cancelled = Box::pin(token.clone().cancelled_owned());
    let wake = waker(Arc::new(WakeWaiters { shared: shared.clone() }));
    let mut cx = Context::from_waker(&wake);
    let registration = match cancelled.as_mut().poll(&mut cx) {
      Poll::Ready(()) => None,
      Poll::Pending => Some(cancelled),
    };

    Self {
      token: Some(token.clone()),
      _registration: registration,
    }
  }

  pub(crate) fn is_cancelled(&self) -> bool {
    self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc;
  use std::thread;
  use std::time::Duration;

  fn test_shared() -> Arc<Shared> {
    Shared::new(Arc::new("interrupt_unit".to_string()), 1, None)
  }

  #[test]
  fn test_watch_without_token_is_never_cancelled() {
    let shared = test_shared();
    let watch = CancelWatch::register(&shared, None);
    assert!(!watch.is_cancelled());
  }

  #[test]
  fn test_watch_on_already_cancelled_token() {
    let shared = test_shared();
    let token = CancellationToken::new();
    token.cancel();
    let watch = CancelWatch::register(&shared, Some(&token));
    assert!(watch.is_cancelled());
  }

  #[test]
  fn test_cancel_wakes_thread_blocked_on_condvar() {
    let shared = test_shared();
    let token = CancellationToken::new();
    let (done_tx, done_rx) = mpsc::channel();

    let waiter = {
      let shared = shared.clone();
      let token = token.clone();
      thread::spawn(move || {
        let watch = CancelWatch::register(&shared, Some(&token));
        let mut state = shared.state.lock();
        // Nothing else ever notifies `completion`; only the watch can end this loop.
        while !watch.is_cancelled() {
          shared.completion.wait(&mut state);
        }
        drop(state);
        done_tx.send(()).unwrap();
      })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(done_rx.try_recv().is_err(), "waiter should still be blocked");

    token.cancel();
    done_rx
      .recv_timeout(Duration::from_secs(2))
      .expect("cancellation did not wake the blocked waiter");
    waiter.join().unwrap();
  }

  #[test]
  fn test_worker_context_is_scoped_to_guard() {
    assert!(interrupt_token().is_none());
    assert!(!is_interrupted());

    let token = CancellationToken::new();
    {
      let _guard = enter_worker(token.clone());
      assert!(interrupt_token().is_some());
      assert!(!is_interrupted());
      token.cancel();
      assert!(is_interrupted());
    }

    assert!(interrupt_token().is_none());
    assert!(!is_interrupted());
  }
}
