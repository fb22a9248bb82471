//! Node states and the traits that connect a node to its neighbors.

use crate::{error::SampleError, tick::Tick};
use std::sync::{Arc, Weak};

/// The propagation mode of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    /// No listeners; the node is unsubscribed from its parents.
    Inactive,
    /// Parents notify the node; observers receive values synchronously.
    Push,
    /// Observers must sample the node through `pull`.
    Pull,
    /// Pull, and the node can never transition to push (e.g. a constant).
    OnlyPull,
    /// Terminal. Futures enter `Done` on resolution; new listeners are fired
    /// immediately with the stored value.
    Done,
}

impl NodeState {
    /// Whether observers of a node in this state must sample it.
    pub fn is_pulling(self) -> bool {
        matches!(self, NodeState::Pull | NodeState::OnlyPull)
    }

    /// The state of an applied node (`ap`/`lift`) over the given parents:
    /// push only when every parent pushes, only-pull when any parent can
    /// never push, pull otherwise.
    pub(crate) fn join_applied(states: impl IntoIterator<Item = NodeState>) -> NodeState {
        let mut all_push = true;
        let mut any_only_pull = false;
        for s in states {
            if s != NodeState::Push {
                all_push = false;
            }
            if s == NodeState::OnlyPull {
                any_only_pull = true;
            }
        }
        if all_push {
            NodeState::Push
        } else if any_only_pull {
            NodeState::OnlyPull
        } else {
            NodeState::Pull
        }
    }

    /// The state a switching node adopts from its current inner reactive.
    /// `OnlyPull` degrades to `Pull` because a later switch can restore push.
    pub(crate) fn join_switched(inner: NodeState) -> NodeState {
        match inner {
            NodeState::OnlyPull => NodeState::Pull,
            NodeState::Inactive => NodeState::Pull,
            other => other,
        }
    }
}

/// A downstream node that receives typed pushes from a parent.
pub(crate) trait Subscriber<A>: Send + Sync {
    /// A parent produced `value` during tick `t`.
    fn push(&self, t: Tick, value: &A);

    /// A parent's state changed; recompute and propagate if needed. Must be
    /// idempotent when the recomputed state equals the current one.
    fn state_changed(&self, t: Tick, parent: NodeState);
}

/// A downstream node that only needs to know *that* a parent fired, not what
/// it produced. Used for keep-alive subscriptions (snapshot and friends) and
/// for `moment`'s dynamic dependencies.
pub(crate) trait WakeSubscriber: Send + Sync {
    /// A parent produced a value during tick `t`.
    fn wake(&self, t: Tick);

    /// A parent's state changed.
    fn wake_state_changed(&self, t: Tick, parent: NodeState);
}

/// A type-erased listener entry: either a typed subscriber or a value-free
/// wake subscriber. Parents hold listeners weakly; a dead entry is skipped
/// during fan-out.
pub(crate) enum AnySubscriber<A> {
    /// Receives the pushed value; weakly held, as interior nodes are (a
    /// parent must not keep a dropped subgraph alive).
    Value(Weak<dyn Subscriber<A>>),
    /// Receives the pushed value; owned by the listener list. Boundary
    /// observers are held this way so that discarding a `Subscription`
    /// handle leaves the observer in place until explicit deactivation.
    Observer(Arc<dyn Subscriber<A>>),
    /// Receives only the tick.
    Wake(Weak<dyn WakeSubscriber>),
}

impl<A> Clone for AnySubscriber<A> {
    fn clone(&self) -> Self {
        match self {
            AnySubscriber::Value(w) => AnySubscriber::Value(w.clone()),
            AnySubscriber::Observer(s) => AnySubscriber::Observer(s.clone()),
            AnySubscriber::Wake(w) => AnySubscriber::Wake(w.clone()),
        }
    }
}

impl<A> AnySubscriber<A> {
    /// Delivers `value` to this entry, ignoring it if the listener is gone.
    pub(crate) fn deliver(&self, t: Tick, value: &A) {
        match self {
            AnySubscriber::Value(w) => {
                if let Some(sub) = w.upgrade() {
                    sub.push(t, value);
                }
            }
            AnySubscriber::Observer(sub) => sub.push(t, value),
            AnySubscriber::Wake(w) => {
                if let Some(sub) = w.upgrade() {
                    sub.wake(t);
                }
            }
        }
    }

    /// Notifies this entry of a parent state change.
    pub(crate) fn deliver_state(&self, t: Tick, state: NodeState) {
        match self {
            AnySubscriber::Value(w) => {
                if let Some(sub) = w.upgrade() {
                    sub.state_changed(t, state);
                }
            }
            AnySubscriber::Observer(sub) => sub.state_changed(t, state),
            AnySubscriber::Wake(w) => {
                if let Some(sub) = w.upgrade() {
                    sub.wake_state_changed(t, state);
                }
            }
        }
    }
}

/// An upstream node that discrete listeners can attach to.
pub(crate) trait Source<A>: Send + Sync {
    /// Links a listener. If the list was empty the node activates first:
    /// it subscribes to its own parents and adopts a state derived from
    /// theirs. Returns the entry key and the node's state so the caller can
    /// synchronize.
    ///
    /// A push-mode behavior delivers its current value to the new entry
    /// before returning (the synchronization handshake); a done future
    /// delivers its resolution the same way.
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (super::SubscriberKey, NodeState);

    /// Unlinks a listener in O(1). If the list becomes empty the node
    /// deactivates: it unsubscribes from its parents and returns to
    /// `Inactive` (unless it is always active or `Done`).
    fn remove_listener(&self, key: super::SubscriberKey);

    /// The node's current state.
    fn state(&self) -> NodeState;
}

/// An upstream node with a current value that can be sampled.
pub(crate) trait BehaviorSource<A>: Source<A> {
    /// Samples the value as of tick `t` without changing the shape of the
    /// graph. Sampling may commit internal bookkeeping (a stepper promotes
    /// its pending occurrence once `t` has moved past it) but never
    /// subscribes or unsubscribes anything.
    fn sample(&self, t: Tick) -> Result<A, SampleError>;
}

/// A value-free view of a source, for holders that do not know the value
/// type: `moment`'s dependency set and keep-alive subscriptions.
pub(crate) trait ErasedSource: Send + Sync {
    fn attach_wake(
        &self,
        sub: Weak<dyn WakeSubscriber>,
        t: Tick,
    ) -> (super::SubscriberKey, NodeState);

    fn detach(&self, key: super::SubscriberKey);

    fn erased_state(&self) -> NodeState;
}

/// A type-erased source handle with pointer identity, so dependency sets can
/// be diffed across re-evaluations.
#[derive(Clone)]
pub(crate) struct AnySource {
    pub(crate) id: usize,
    pub(crate) source: Arc<dyn ErasedSource>,
}

impl std::fmt::Debug for AnySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySource").field(&self.id).finish()
    }
}

/// Erases a behavior source.
pub(crate) struct ErasedBehavior<A>(pub(crate) Arc<dyn BehaviorSource<A>>);

impl<A: 'static> ErasedSource for ErasedBehavior<A> {
    fn attach_wake(
        &self,
        sub: Weak<dyn WakeSubscriber>,
        t: Tick,
    ) -> (super::SubscriberKey, NodeState) {
        self.0.add_listener(AnySubscriber::Wake(sub), t)
    }

    fn detach(&self, key: super::SubscriberKey) {
        self.0.remove_listener(key);
    }

    fn erased_state(&self) -> NodeState {
        self.0.state()
    }
}

/// The pushed-value cell of a push-mode behavior: the most recent value and
/// the tick it was published at. The tick gates the synchronization
/// handshake, so a listener that already saw the value through a broadcast
/// in the same call is not fired twice.
pub(crate) struct PushCell<A> {
    pub(crate) value: Option<A>,
    pub(crate) at: Tick,
}

impl<A> Default for PushCell<A> {
    fn default() -> Self {
        Self {
            value: None,
            at: Tick::now(),
        }
    }
}

impl<A: Clone> PushCell<A> {
    pub(crate) fn set(&mut self, t: Tick, value: A) {
        self.value = Some(value);
        self.at = t;
    }

    pub(crate) fn clear(&mut self) {
        self.value = None;
    }

    /// The value to hand a listener added at `added_at`, if the listener has
    /// not already observed it via broadcast.
    pub(crate) fn handshake(&self, added_at: Tick) -> Option<A> {
        match &self.value {
            Some(v) if self.at <= added_at => Some(v.clone()),
            _ => None,
        }
    }
}
