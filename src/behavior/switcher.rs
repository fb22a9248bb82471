//! `switcher` and `switch_to`: behaviors that follow whichever inner
//! behavior the outer reactive most recently produced.
//!
//! The outer side is any source of behaviors: a stream for `switcher`, a
//! future for `switch_to` (which therefore switches at most once). Switching
//! republishes unconditionally, even when the new inner currently holds the
//! same value as the old one.

use super::Behavior;
use crate::{
    error::SampleError,
    graph::{
        broadcast, broadcast_state, deliver_to, AnySubscriber, BehaviorSource, NodeState,
        PushCell, Source, Subscriber, SubscriberKey, SubscriberSet, SwapSlot,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link<A> {
    outer_key: Option<SubscriberKey>,
    slot: Option<SwapSlot<A>>,
    inner: Arc<dyn BehaviorSource<A>>,
    state: NodeState,
    cell: PushCell<A>,
}

pub(crate) struct SwitcherBehavior<A> {
    this: Weak<Self>,
    outer: Arc<dyn Source<Behavior<A>>>,
    port: Arc<InnerPort<A>>,
    listeners: RwLock<SubscriberSet<A>>,
    link: RwLock<Link<A>>,
}

/// Receives pushes from the currently-selected inner behavior.
struct InnerPort<A> {
    owner: Weak<SwitcherBehavior<A>>,
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for InnerPort<A> {
    fn push(&self, t: Tick, value: &A) {
        if let Some(owner) = self.owner.upgrade() {
            owner.link.write().or_poisoned().cell.set(t, value.clone());
            broadcast(&owner.listeners, t, value);
        }
    }

    fn state_changed(&self, t: Tick, _parent: NodeState) {
        if let Some(owner) = self.owner.upgrade() {
            owner.renegotiate(t);
        }
    }
}

impl<A: Clone + Send + Sync + 'static> SwitcherBehavior<A> {
    pub(crate) fn new(
        initial: Behavior<A>,
        outer: Arc<dyn Source<Behavior<A>>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            outer,
            port: Arc::new(InnerPort {
                owner: this.clone(),
            }),
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                outer_key: None,
                slot: None,
                inner: initial.node,
                state: NodeState::Inactive,
                cell: PushCell::default(),
            }),
        })
    }

    fn port_sub(&self) -> AnySubscriber<A> {
        AnySubscriber::Value(Arc::downgrade(&self.port) as Weak<dyn Subscriber<A>>)
    }

    fn renegotiate(&self, t: Tick) {
        let inner_state = self.link.read().or_poisoned().inner.state();
        let active = self.link.read().or_poisoned().slot.is_some();
        let next = if !active {
            NodeState::Inactive
        } else {
            NodeState::join_switched(inner_state)
        };
        let changed = {
            let mut link = self.link.write().or_poisoned();
            if link.state == next {
                false
            } else {
                link.state = next;
                if next != NodeState::Push {
                    link.cell.clear();
                }
                true
            }
        };
        if changed {
            broadcast_state(&self.listeners, t, next);
        }
    }

    fn activate(&self, t: Tick) {
        let inner = self.link.read().or_poisoned().inner.clone();
        let mut slot = SwapSlot::new(inner as Arc<dyn Source<A>>);
        slot.attach(self.port_sub(), t);
        self.link.write().or_poisoned().slot = Some(slot);
        let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<Behavior<A>>>);
        let (outer_key, _) = self.outer.add_listener(sub, t);
        self.link.write().or_poisoned().outer_key = Some(outer_key);
        self.renegotiate(t);
    }

    fn deactivate(&self) {
        let (outer_key, slot) = {
            let mut link = self.link.write().or_poisoned();
            link.state = NodeState::Inactive;
            link.cell.clear();
            (link.outer_key.take(), link.slot.take())
        };
        if let Some(key) = outer_key {
            self.outer.remove_listener(key);
        }
        if let Some(mut slot) = slot {
            slot.detach();
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<Behavior<A>> for SwitcherBehavior<A> {
    fn push(&self, t: Tick, next: &Behavior<A>) {
        let taken = {
            let mut link = self.link.write().or_poisoned();
            link.inner = next.node.clone();
            link.slot.take()
        };
        let Some(mut slot) = taken else {
            return;
        };
        let inner_state = slot.swap(
            next.node.clone() as Arc<dyn Source<A>>,
            self.port_sub(),
            t,
        );
        self.link.write().or_poisoned().slot = Some(slot);
        // A push-mode inner already republished via its handshake; sample a
        // pull-mode inner so the switch is observable either way.
        if inner_state != NodeState::Push {
            let value = super::sample_or_unwind(&next.node, t);
            self.link.write().or_poisoned().cell.set(t, value.clone());
            broadcast(&self.listeners, t, &value);
        }
        self.renegotiate(t);
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for SwitcherBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        if was_empty {
            self.activate(t);
        }
        let state = self.state();
        if state == NodeState::Push {
            let handshake = self.link.read().or_poisoned().cell.handshake(t);
            if let Some(value) = handshake {
                deliver_to(&self.listeners, key, t, &value);
            }
        }
        (key, state)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        let now_empty = {
            let mut listeners = self.listeners.write().or_poisoned();
            listeners.unsubscribe(key);
            listeners.is_empty()
        };
        if now_empty {
            self.deactivate();
        }
    }

    fn state(&self) -> NodeState {
        self.link.read().or_poisoned().state
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for SwitcherBehavior<A> {
    fn sample(&self, t: Tick) -> Result<A, SampleError> {
        let inner = self.link.read().or_poisoned().inner.clone();
        inner.sample(t)
    }
}
