//! The platform-timer hook used by the time-shifting stream combinators.
//!
//! The runtime itself never sleeps: [`delay`](crate::stream::Stream::delay),
//! [`throttle`](crate::stream::Stream::throttle) and
//! [`debounce`](crate::stream::Stream::debounce) hand their continuations to
//! an embedder-supplied [`Scheduler`], and the continuation re-enters the
//! graph as a fresh tick when the platform fires it. The crate ships no
//! platform implementation; tests drive a manual clock.

use std::time::Duration;

/// An external timer service.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run once, `after` the given duration.
    ///
    /// The returned handle cancels the task if it has not fired yet.
    fn schedule(
        &self,
        after: Duration,
        task: Box<dyn FnOnce() + Send + Sync>,
    ) -> TimerHandle;
}

/// Cancels a scheduled task.
///
/// Dropping the handle without calling [`cancel`](TimerHandle::cancel) leaves
/// the task scheduled.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    /// Wraps a cancellation action supplied by a [`Scheduler`].
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancels the scheduled task if it has not fired yet.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("pending", &self.cancel.is_some())
            .finish()
    }
}
