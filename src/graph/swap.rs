//! The switching engine: detach from an old inner source, attach to a new
//! one, renegotiate state. Shared by `chain`, `switcher`, `switch_to` and
//! `switch_stream`.

use super::{
    node::{AnySubscriber, NodeState, Source},
    SubscriberKey,
};
use crate::tick::Tick;
use std::sync::Arc;

/// Holds the current inner source of a switching node, together with the
/// subscription key while attached.
pub(crate) struct SwapSlot<A> {
    current: Arc<dyn Source<A>>,
    key: Option<SubscriberKey>,
}

impl<A> SwapSlot<A> {
    pub(crate) fn new(initial: Arc<dyn Source<A>>) -> Self {
        Self {
            current: initial,
            key: None,
        }
    }

    pub(crate) fn current(&self) -> &Arc<dyn Source<A>> {
        &self.current
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.key.is_some()
    }

    /// Subscribes `sub` to the current inner and returns the inner's state.
    /// The inner's synchronization handshake (if push-mode) fires into `sub`
    /// during this call.
    pub(crate) fn attach(&mut self, sub: AnySubscriber<A>, t: Tick) -> NodeState {
        let (key, state) = self.current.add_listener(sub, t);
        self.key = Some(key);
        state
    }

    /// Unsubscribes from the current inner, if attached.
    pub(crate) fn detach(&mut self) {
        if let Some(key) = self.key.take() {
            self.current.remove_listener(key);
        }
    }

    /// Replaces the inner source. A pointer-identical replacement is a
    /// no-op. If the slot was attached, the old inner is released before the
    /// new one is subscribed, and the new inner's state is returned.
    pub(crate) fn swap(
        &mut self,
        new: Arc<dyn Source<A>>,
        sub: AnySubscriber<A>,
        t: Tick,
    ) -> NodeState {
        let same = std::ptr::eq(
            Arc::as_ptr(&self.current) as *const (),
            Arc::as_ptr(&new) as *const (),
        );
        if same {
            return self.current.state();
        }
        let was_attached = self.key.is_some();
        self.detach();
        self.current = new;
        if was_attached {
            self.attach(sub, t)
        } else {
            self.current.state()
        }
    }
}
