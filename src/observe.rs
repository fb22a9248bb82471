//! The external-observer boundary.
//!
//! Observers are ordinary listener nodes whose callbacks cross out of the
//! graph. A [`Subscription`] owns the observer and its slot in the parent's
//! listener list; dropping it without calling
//! [`deactivate`](Subscription::deactivate) deliberately leaves the
//! subscription in place, so handles can be discarded without tearing the
//! network down.

use crate::{
    graph::{NodeState, Subscriber},
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock};

/// Handle to an active observer.
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Removes the observer in O(1). If it was the parent's last listener,
    /// the deactivation cascades upstream.
    pub fn deactivate(mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// A push-only observer node.
pub(crate) struct CallbackNode<A> {
    f: Box<dyn Fn(&A) + Send + Sync>,
}

impl<A> CallbackNode<A> {
    pub(crate) fn new(f: impl Fn(&A) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { f: Box::new(f) })
    }
}

impl<A: Send + Sync + 'static> Subscriber<A> for CallbackNode<A> {
    fn push(&self, _t: Tick, value: &A) {
        (self.f)(value);
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

/// A behavior observer that is told when to switch between push and pull
/// mode.
pub(crate) struct ObserverNode<A> {
    on_push: Box<dyn Fn(&A) + Send + Sync>,
    on_begin_pull: Box<dyn Fn() + Send + Sync>,
    on_end_pull: Box<dyn Fn() + Send + Sync>,
    pulling: RwLock<bool>,
}

impl<A> ObserverNode<A> {
    pub(crate) fn new(
        on_push: impl Fn(&A) + Send + Sync + 'static,
        on_begin_pull: impl Fn() + Send + Sync + 'static,
        on_end_pull: impl Fn() + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            on_push: Box::new(on_push),
            on_begin_pull: Box::new(on_begin_pull),
            on_end_pull: Box::new(on_end_pull),
            pulling: RwLock::new(false),
        })
    }

    /// Marks the observer as pulling and invokes the hook. Used for the
    /// initial synchronization when the parent is already in a pull state.
    pub(crate) fn begin_pulling(&self) {
        *self.pulling.write().or_poisoned() = true;
        (self.on_begin_pull)();
    }
}

impl<A: Send + Sync + 'static> Subscriber<A> for ObserverNode<A> {
    fn push(&self, _t: Tick, value: &A) {
        (self.on_push)(value);
    }

    fn state_changed(&self, _t: Tick, parent: NodeState) {
        let transition = {
            let mut pulling = self.pulling.write().or_poisoned();
            if parent.is_pulling() && !*pulling {
                *pulling = true;
                Some(true)
            } else if parent == NodeState::Push && *pulling {
                *pulling = false;
                Some(false)
            } else {
                None
            }
        };
        match transition {
            Some(true) => (self.on_begin_pull)(),
            Some(false) => (self.on_end_pull)(),
            None => {}
        }
    }
}
